//! Rank-based layout.
//!
//! Nodes are ranked breadth-first from the source nodes (no incoming
//! links), then placed rank by rank along the flow direction. Within a rank,
//! nodes keep declaration order.

use std::collections::VecDeque;

use petgraph::Direction as EdgeDirection;
use petgraph::graph::{DiGraph, NodeIndex};

use super::Theme;
use super::parser::Flowchart;

/// Placed node box, by center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Computed layout of a flowchart.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub width: f64,
    pub height: f64,
    /// Indexed like [`Flowchart::nodes`]
    pub nodes: Vec<Placement>,
    /// Rank of each node
    pub ranks: Vec<usize>,
}

/// Breadth-first rank of every node.
pub fn ranks(chart: &Flowchart) -> Vec<usize> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(chart.nodes.len(), chart.edges.len());
    let indices: Vec<NodeIndex> = (0..chart.nodes.len()).map(|i| graph.add_node(i)).collect();
    for edge in &chart.edges {
        graph.add_edge(indices[edge.from], indices[edge.to], ());
    }

    let mut ranks: Vec<Option<usize>> = vec![None; chart.nodes.len()];
    let mut queue = VecDeque::new();

    // Sources first; then any node only reachable through a cycle
    let sources = indices
        .iter()
        .filter(|&&idx| graph.neighbors_directed(idx, EdgeDirection::Incoming).next().is_none());
    let roots: Vec<NodeIndex> = sources.chain(indices.iter()).copied().collect();

    for root in roots {
        if ranks[graph[root]].is_some() {
            continue;
        }
        ranks[graph[root]] = Some(0);
        queue.push_back(root);

        while let Some(idx) = queue.pop_front() {
            let rank = ranks[graph[idx]].unwrap_or_default();
            // petgraph yields neighbors newest edge first
            let mut next: Vec<NodeIndex> = graph.neighbors(idx).collect();
            next.reverse();
            for neighbor in next {
                if ranks[graph[neighbor]].is_none() {
                    ranks[graph[neighbor]] = Some(rank + 1);
                    queue.push_back(neighbor);
                }
            }
        }
    }

    ranks.into_iter().map(Option::unwrap_or_default).collect()
}

/// Lay out `chart` with the sizes in `theme`.
pub fn layout(chart: &Flowchart, theme: &Theme) -> Layout {
    let ranks = ranks(chart);
    let rank_count = ranks.iter().max().map_or(0, |r| r + 1);

    let sizes: Vec<(f64, f64)> = chart
        .nodes
        .iter()
        .map(|node| {
            let chars = node.label.chars().count() as f64;
            let width = (chars * theme.char_width + 2.0 * theme.node_padding).max(theme.min_node_width);
            (width, theme.node_height)
        })
        .collect();

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); rank_count];
    for (node, &rank) in ranks.iter().enumerate() {
        members[rank].push(node);
    }

    let horizontal = chart.direction.is_horizontal();
    // Extent of a box along the flow, and across it
    let along = |(w, h): (f64, f64)| if horizontal { w } else { h };
    let across = |(w, h): (f64, f64)| if horizontal { h } else { w };

    let rank_depth: Vec<f64> = members
        .iter()
        .map(|m| m.iter().map(|&n| along(sizes[n])).fold(0.0, f64::max))
        .collect();
    let rank_breadth: Vec<f64> = members
        .iter()
        .map(|m| {
            let boxes: f64 = m.iter().map(|&n| across(sizes[n])).sum();
            boxes + theme.node_gap * m.len().saturating_sub(1) as f64
        })
        .collect();

    let total_depth = rank_depth.iter().sum::<f64>() + theme.rank_gap * rank_count.saturating_sub(1) as f64;
    let total_breadth = rank_breadth.iter().copied().fold(0.0, f64::max);

    let mut placements = vec![
        Placement {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        };
        chart.nodes.len()
    ];

    let mut offset = 0.0;
    for (rank, nodes) in members.iter().enumerate() {
        let depth = rank_depth[rank];
        let center_along = if chart.direction.is_reversed() {
            total_depth - offset - depth / 2.0
        } else {
            offset + depth / 2.0
        };

        // Center each rank across the widest one
        let mut cursor = (total_breadth - rank_breadth[rank]) / 2.0;
        for &node in nodes {
            let size = sizes[node];
            let center_across = cursor + across(size) / 2.0;
            cursor += across(size) + theme.node_gap;

            let (x, y) = if horizontal {
                (center_along, center_across)
            } else {
                (center_across, center_along)
            };
            placements[node] = Placement {
                x: x + theme.padding,
                y: y + theme.padding,
                width: size.0,
                height: size.1,
            };
        }

        offset += depth + theme.rank_gap;
    }

    let (inner_width, inner_height) = if horizontal {
        (total_depth, total_breadth)
    } else {
        (total_breadth, total_depth)
    };

    Layout {
        width: inner_width + 2.0 * theme.padding,
        height: inner_height + 2.0 * theme.padding,
        nodes: placements,
        ranks,
    }
}
