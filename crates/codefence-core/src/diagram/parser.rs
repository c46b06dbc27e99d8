//! Flowchart parser.

use chumsky::prelude::*;
use rustc_hash::FxHashMap;

use super::DiagramError;
use crate::grammar::describe;

type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Flow direction of a flowchart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    TopDown,
    BottomUp,
    LeftRight,
    RightLeft,
}

impl Direction {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "TD" | "TB" => Some(Direction::TopDown),
            "BT" => Some(Direction::BottomUp),
            "LR" => Some(Direction::LeftRight),
            "RL" => Some(Direction::RightLeft),
            _ => None,
        }
    }

    /// Whether ranks advance horizontally.
    pub fn is_horizontal(&self) -> bool {
        matches!(self, Direction::LeftRight | Direction::RightLeft)
    }

    /// Whether ranks advance toward the origin.
    pub fn is_reversed(&self) -> bool {
        matches!(self, Direction::BottomUp | Direction::RightLeft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `A[label]`, also used for bare ids
    Rect,
    /// `A(label)`
    Round,
    /// `A{label}`
    Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStyle {
    /// `-->`
    Arrow,
    /// `---`
    Open,
    /// `-.->`
    Dotted,
    /// `==>`
    Thick,
}

impl LinkStyle {
    pub fn has_arrowhead(&self) -> bool {
        !matches!(self, LinkStyle::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Index into [`Flowchart::nodes`]
    pub from: usize,
    pub to: usize,
    pub style: LinkStyle,
    pub label: Option<String>,
}

/// A parsed flowchart. Nodes keep first-mention order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Flowchart {
    pub direction: Direction,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Flowchart {
    /// Parse flowchart text.
    ///
    /// The first statement is the header; statements are separated by
    /// newlines or `;`.
    pub fn parse(text: &str) -> Result<Self, DiagramError> {
        let mut builder = Builder::default();
        let mut header_seen = false;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with("%%") {
                continue;
            }

            let body = if header_seen {
                trimmed
            } else {
                header_seen = true;
                let (direction, rest) = parse_header(trimmed, line)?;
                builder.chart.direction = direction;
                match rest {
                    Some(rest) => rest,
                    None => continue,
                }
            };

            let chains = statements()
                .parse(body)
                .into_result()
                .map_err(|errors| parse_error(line, &errors))?;
            for chain in chains {
                builder.chain(chain);
            }
        }

        if !header_seen {
            return Err(DiagramError::NoDiagram);
        }
        Ok(builder.chart)
    }

    /// Position of the node with `id`.
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

fn parse_error(line: usize, errors: &[Rich<'_, char>]) -> DiagramError {
    DiagramError::Parse {
        line,
        message: describe(errors, "end of statement"),
    }
}

/// Split the header into its direction and whatever follows a `;`.
fn parse_header(text: &str, line: usize) -> Result<(Direction, Option<&str>), DiagramError> {
    let (kind, tail) = word()
        .labelled("diagram type")
        .then(any().repeated().to_slice())
        .parse(text)
        .into_result()
        .map_err(|errors| parse_error(line, &errors))?;

    if kind != "graph" && kind != "flowchart" {
        return Err(DiagramError::Unsupported(kind.to_string()));
    }

    let (direction, rest) = header_tail()
        .parse(tail)
        .into_result()
        .map_err(|errors| parse_error(line, &errors))?;

    let direction = match direction {
        Some(name) => Direction::parse(name).ok_or_else(|| DiagramError::Parse {
            line,
            message: format!("unknown direction '{}', expected TD, TB, BT, LR or RL", name),
        })?,
        None => Direction::default(),
    };
    Ok((direction, rest))
}

/// One node mention, optionally carrying a shape and label.
struct Mention<'src> {
    id: &'src str,
    shaped: Option<(Shape, String)>,
}

struct Link<'src> {
    style: LinkStyle,
    label: Option<String>,
    to: Mention<'src>,
}

/// A node followed by zero or more links: `A --> B -.-> C`.
struct Chain<'src> {
    head: Mention<'src>,
    links: Vec<Link<'src>>,
}

fn word<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '-')
        .repeated()
        .at_least(1)
        .to_slice()
}

/// ` TD`, optionally followed by `; statements`.
fn header_tail<'src>()
-> impl Parser<'src, &'src str, (Option<&'src str>, Option<&'src str>), Extra<'src>> {
    text::inline_whitespace()
        .at_least(1)
        .ignore_then(word())
        .or_not()
        .then_ignore(text::inline_whitespace())
        .then(just(';').ignore_then(any().repeated().to_slice()).or_not())
        .then_ignore(end())
}

fn node_id<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
        .repeated()
        .at_least(1)
        .to_slice()
        .labelled("node id")
}

/// Text between `open` and `close`, trimmed and unquoted.
fn enclosed<'src>(
    open: &'static str,
    close: &'static str,
) -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    none_of(close)
        .repeated()
        .to_slice()
        .delimited_by(just(open), just(close))
        .map(|body: &str| unquote(body.trim()).to_string())
}

fn mention<'src>() -> impl Parser<'src, &'src str, Mention<'src>, Extra<'src>> + Clone {
    let shape = choice((
        enclosed("[", "]").map(|label| (Shape::Rect, label)),
        enclosed("(", ")").map(|label| (Shape::Round, label)),
        enclosed("{", "}").map(|label| (Shape::Decision, label)),
    ));

    node_id()
        .then(shape.or_not())
        .map(|(id, shaped)| Mention { id, shaped })
}

fn link_style<'src>() -> impl Parser<'src, &'src str, LinkStyle, Extra<'src>> + Clone {
    choice((
        just("-.->").to(LinkStyle::Dotted),
        just("-->").to(LinkStyle::Arrow),
        just("---").to(LinkStyle::Open),
        just("==>").to(LinkStyle::Thick),
    ))
    .labelled("link")
}

fn chain<'src>() -> impl Parser<'src, &'src str, Chain<'src>, Extra<'src>> + Clone {
    let link = link_style()
        .padded()
        .then(enclosed("|", "|").padded().or_not())
        .then(mention())
        .map(|((style, label), to)| Link { style, label, to });

    mention()
        .then(link.repeated().collect::<Vec<_>>())
        .map(|(head, links)| Chain { head, links })
}

/// Chains separated by `;`.
fn statements<'src>() -> impl Parser<'src, &'src str, Vec<Chain<'src>>, Extra<'src>> {
    chain()
        .padded()
        .separated_by(just(';'))
        .allow_trailing()
        .collect::<Vec<_>>()
        .padded()
        .then_ignore(end())
}

#[derive(Default)]
struct Builder {
    chart: Flowchart,
    index: FxHashMap<String, usize>,
}

impl Builder {
    fn chain(&mut self, chain: Chain<'_>) {
        let mut from = self.node(chain.head);
        for link in chain.links {
            let to = self.node(link.to);
            self.chart.edges.push(Edge {
                from,
                to,
                style: link.style,
                label: link.label,
            });
            from = to;
        }
    }

    /// Register a node, or refine an existing one when the mention is shaped.
    fn node(&mut self, mention: Mention<'_>) -> usize {
        if let Some(&index) = self.index.get(mention.id) {
            if let Some((shape, label)) = mention.shaped {
                let node = &mut self.chart.nodes[index];
                node.shape = shape;
                node.label = label;
            }
            return index;
        }

        let (shape, label) = mention
            .shaped
            .unwrap_or_else(|| (Shape::Rect, mention.id.to_string()));
        let index = self.chart.nodes.len();
        self.chart.nodes.push(Node {
            id: mention.id.to_string(),
            label,
            shape,
        });
        self.index.insert(mention.id.to_string(), index);
        index
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_chart() {
        let chart = Flowchart::parse("graph TD; A-->B").unwrap();
        assert_eq!(chart.direction, Direction::TopDown);
        assert_eq!(chart.nodes.len(), 2);
        assert_eq!(chart.nodes[0].label, "A");
        assert_eq!(
            chart.edges,
            vec![Edge {
                from: 0,
                to: 1,
                style: LinkStyle::Arrow,
                label: None
            }]
        );
    }

    #[test]
    fn test_shapes_links_and_chains() {
        let text = "\
flowchart LR
    %% a comment
    start(Begin) --> check{Ready?}
    check -->|yes| done[\"All done\"]
    check -.-> start
    done ==> a --- b
";
        let chart = Flowchart::parse(text).unwrap();
        assert_eq!(chart.direction, Direction::LeftRight);

        let ids: Vec<_> = chart.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["start", "check", "done", "a", "b"]);
        assert_eq!(chart.nodes[0].shape, Shape::Round);
        assert_eq!(chart.nodes[1].shape, Shape::Decision);
        assert_eq!(chart.nodes[1].label, "Ready?");
        assert_eq!(chart.nodes[2].label, "All done");

        let styles: Vec<_> = chart.edges.iter().map(|e| e.style).collect();
        assert_eq!(
            styles,
            vec![
                LinkStyle::Arrow,
                LinkStyle::Arrow,
                LinkStyle::Dotted,
                LinkStyle::Thick,
                LinkStyle::Open
            ]
        );
        assert_eq!(chart.edges[1].label.as_deref(), Some("yes"));
    }

    #[test]
    fn test_later_mention_refines_label() {
        let chart = Flowchart::parse("graph\nA --> B\nB[Second]").unwrap();
        assert_eq!(chart.nodes[1].label, "Second");
        assert_eq!(chart.node_index("B"), Some(1));
        assert_eq!(chart.node_index("Z"), None);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Flowchart::parse("sequenceDiagram\nA->>B: hi"),
            Err(DiagramError::Unsupported("sequenceDiagram".into()))
        );
        assert_eq!(Flowchart::parse("  \n%% only\n"), Err(DiagramError::NoDiagram));

        let err = Flowchart::parse("graph TD\nA --> B\nA -> B").unwrap_err();
        assert!(matches!(err, DiagramError::Parse { line: 3, .. }));
        assert!(err.to_string().starts_with("Parse error on line 3: expected "));

        let err = Flowchart::parse("graph XY").unwrap_err();
        assert!(matches!(err, DiagramError::Parse { line: 1, .. }));

        let err = Flowchart::parse("graph TD\nA[open --> B").unwrap_err();
        assert!(matches!(err, DiagramError::Parse { line: 2, .. }));

        let err = Flowchart::parse("graph TD\nA -->").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Parse error on line 2: expected "));
        assert!(message.contains("node id"));
        assert!(message.ends_with("found end of statement"));

        let err = Flowchart::parse("graph TD extra").unwrap_err();
        assert!(matches!(err, DiagramError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_separators_inside_labels() {
        let chart = Flowchart::parse("graph LR\nA[x; y] -->|a;b| B(c) ; B --> C").unwrap();
        let labels: Vec<_> = chart.nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["x; y", "c", "C"]);
        assert_eq!(chart.edges.len(), 2);
        assert_eq!(chart.edges[0].label.as_deref(), Some("a;b"));
    }

    #[test]
    fn test_header_with_trailing_statements() {
        let chart = Flowchart::parse("flowchart RL;A-->B;").unwrap();
        assert_eq!(chart.direction, Direction::RightLeft);
        assert_eq!(chart.edges.len(), 1);

        let chart = Flowchart::parse("graph").unwrap();
        assert_eq!(chart.direction, Direction::TopDown);
        assert!(chart.nodes.is_empty());
    }
}
