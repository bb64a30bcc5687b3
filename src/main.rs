//! Knowledge Graph Engine CLI
//!
//! Loads a graph snapshot into the in-memory store and runs one engine
//! operation, printing the result as pretty JSON on stdout.
//!
//! # Usage
//!
//! ```bash
//! kge --snapshot graph.yaml validate --graph <uuid>
//! kge --snapshot graph.json recommend-next --graph <uuid> --node <uuid> --learner <uuid>
//! RUST_LOG=debug kge --snapshot graph.yaml extract --node <uuid> --depth 3
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use knowledge_graph_engine::{EngineConfig, GraphKnowledgeEngine, GraphSnapshot, KnowledgeEngine};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "kge")]
#[command(about = "Knowledge graph analytics and recommendations")]
#[command(version)]
struct Cli {
    /// Graph snapshot file (.json, otherwise YAML)
    #[arg(long, env = "KGE_SNAPSHOT")]
    snapshot: PathBuf,

    /// Engine config file (defaults to KGE_CONFIG or kge.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate graph structure
    Validate {
        #[arg(long)]
        graph: Uuid,
    },

    /// Connected components, largest first
    Components {
        #[arg(long)]
        graph: Uuid,
    },

    /// Global complexity metrics
    Complexity {
        #[arg(long)]
        graph: Uuid,
    },

    /// Predict node difficulty for a learner
    Predict {
        #[arg(long)]
        node: Uuid,
        #[arg(long)]
        learner: Uuid,
    },

    /// Recommend nodes to study after the current one
    RecommendNext {
        #[arg(long)]
        graph: Uuid,
        /// Current node
        #[arg(long)]
        node: Uuid,
        #[arg(long)]
        learner: Uuid,
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Recommend learning paths
    RecommendPaths {
        #[arg(long)]
        graph: Uuid,
        #[arg(long)]
        learner: Uuid,
        /// Target skill (repeatable)
        #[arg(long = "skill")]
        skills: Vec<String>,
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Extract a concept map around a node
    Extract {
        #[arg(long)]
        node: Uuid,
        #[arg(long, default_value = "2")]
        depth: usize,
        #[arg(long, default_value = "50")]
        max_nodes: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr so stdout stays pure JSON
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,knowledge_graph_engine=debug".into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = EngineConfig::from_yaml_and_env(cli.config.as_deref())?;
    let (store, history) = GraphSnapshot::from_path(&cli.snapshot)?
        .into_stores()
        .await?;
    let engine = GraphKnowledgeEngine::new(Arc::new(store), Arc::new(history), config);

    // Ctrl-C cancels the running operation
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Validate { graph } => print_json(&engine.validate(graph, &cancel).await?),
        Commands::Components { graph } => print_json(&engine.components(graph, &cancel).await?),
        Commands::Complexity { graph } => print_json(&engine.complexity(graph, &cancel).await?),
        Commands::Predict { node, learner } => {
            print_json(&engine.predict(node, learner, &cancel).await?)
        }
        Commands::RecommendNext {
            graph,
            node,
            learner,
            limit,
        } => print_json(
            &engine
                .recommend_next(graph, node, learner, limit, &cancel)
                .await?,
        ),
        Commands::RecommendPaths {
            graph,
            learner,
            skills,
            limit,
        } => print_json(
            &engine
                .recommend_paths(graph, learner, &skills, limit, &cancel)
                .await?,
        ),
        Commands::Extract {
            node,
            depth,
            max_nodes,
        } => print_json(&engine.extract(node, depth, max_nodes, &cancel).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
