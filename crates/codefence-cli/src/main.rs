//! codefence CLI - render documents with interactive code blocks.

mod blocks;
mod colors;
mod diagram;
mod output;
mod render;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "codefence")]
#[command(about = "Render documents with interactive code blocks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the code blocks of a document and how each would be rendered
    Blocks {
        /// Path to the markdown document
        document: String,
    },

    /// Mount every block, wait for it to settle and print the HTML
    Render {
        /// Path to the markdown document
        document: String,

        /// Write HTML to this file instead of stdout
        #[arg(short, long)]
        out: Option<String>,

        /// Run sandboxed blocks on an in-process context instead of worker processes
        #[arg(long)]
        in_process: bool,

        /// How long to wait for blocks to settle, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Compile a diagram file to an HTML figure with inline SVG
    Diagram {
        /// Path to the diagram source
        file: String,

        /// Write HTML to this file instead of stdout
        #[arg(short, long)]
        out: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format codefence-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<codefence_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Blocks { document } => blocks::execute(&document).map_err(format_error)?,

        Commands::Render {
            document,
            out,
            in_process,
            timeout_ms,
        } => {
            render::execute(&document, out.as_deref(), in_process, timeout_ms)
                .await
                .map_err(format_error)?;
        }

        Commands::Diagram { file, out } => {
            diagram::execute(&file, out.as_deref()).await.map_err(format_error)?;
        }
    }

    Ok(())
}
