//! Trellis CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trellis_graph::{GraphMode, PropertyFilter};

mod commands;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Live relationship graphs for markdown vaults", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Vault root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the vault and print a summary
    Index,
    /// Print the graph around a document as JSON
    Graph {
        /// Document path relative to the vault root
        document: String,

        /// How the graph is grown from the document
        #[arg(short, long, default_value_t = GraphMode::Hierarchy)]
        mode: GraphMode,

        /// Keep only nodes whose label contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Keep only documents whose frontmatter matches KEY=VALUE
        #[arg(short, long = "where", value_name = "KEY=VALUE")]
        filter: Option<PropertyFilter>,

        /// Override the configured maximum depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Reconnect survivors that were linked through filtered-out documents
        #[arg(long)]
        indirect: bool,
    },
    /// Keep the index live and log every relationship change
    Watch,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("trellis={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Trellis v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Vault root: {}", cli.root.display());

    match cli.command {
        Commands::Index => commands::index(cli.root).await,
        Commands::Graph {
            document,
            mode,
            search,
            filter,
            depth,
            indirect,
        } => {
            let request = commands::GraphRequest {
                document,
                mode,
                search,
                filter,
                depth,
                indirect,
            };
            commands::graph(cli.root, request).await
        }
        Commands::Watch => commands::watch(cli.root).await,
        Commands::Version => {
            println!("Trellis v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
