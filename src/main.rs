use anyhow::{Context, Result};
use architect_agent::PipelineEvent;
use architect_core::FlowGraph;
use architect_vector::{seed_docs, seed_templates, MemoryStore, Retriever, VectorStore};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

mod config;
mod orchestrator;
#[cfg(feature = "web")]
mod server;

use config::ArchitectConfig;
use orchestrator::{ArchitectOrchestrator, DesignMode};

#[derive(Parser)]
#[command(name = "flow-architect")]
#[command(about = "Turns a plain-language request into a validated workflow graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Design a workflow graph for a request
    Design {
        /// What the workflow should do
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// One retrieval round and one generation call instead of the staged pipeline
        #[arg(long)]
        single_pass: bool,

        /// Write the graph JSON to a file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use an in-memory store seeded from these directories instead of Qdrant
        #[arg(long, num_args = 2, value_names = ["DOCS", "TEMPLATES"])]
        memory_store: Option<Vec<PathBuf>>,
    },

    /// Load component docs (*.md) and template categories (*.json) into Qdrant
    Seed {
        /// Directory of Markdown docs, one file per component
        #[arg(long)]
        docs: Option<PathBuf>,

        /// Directory of template category files
        #[arg(long)]
        templates: Option<PathBuf>,
    },

    /// Show what the store returns for a query
    Query {
        #[arg(value_name = "TEXT")]
        text: String,

        /// Search templates instead of documentation
        #[arg(long)]
        templates: bool,

        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Start the HTTP API
    Serve {
        /// Port to run the web server on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = ArchitectConfig::from_env()?;

    match cli.command {
        Commands::Design {
            prompt,
            single_pass,
            output,
            memory_store,
        } => {
            let mode = if single_pass {
                DesignMode::SinglePass
            } else {
                DesignMode::Pipeline
            };
            handle_design(&config, &prompt, mode, output, memory_store).await?;
        }
        Commands::Seed { docs, templates } => {
            handle_seed(&config, docs, templates).await?;
        }
        Commands::Query {
            text,
            templates,
            limit,
        } => {
            handle_query(&config, &text, templates, limit).await?;
        }
        Commands::Serve { port } => {
            start_web_server(&config, port).await?;
        }
    }

    Ok(())
}

async fn memory_store_from(dirs: &[PathBuf]) -> Result<Arc<dyn Retriever>> {
    let store = MemoryStore::new();
    if let [docs, templates] = dirs {
        seed_docs(&store, docs).await?;
        let report = seed_templates(&store, templates).await?;
        for skipped in &report.skipped_files {
            println!("{}", format!("⚠️  Skipped {}", skipped.display()).yellow());
        }
    }
    println!("💾 In-memory store with {} documents", store.len().await);
    Ok(Arc::new(store))
}

async fn handle_design(
    config: &ArchitectConfig,
    prompt: &str,
    mode: DesignMode,
    output: Option<PathBuf>,
    memory_store: Option<Vec<PathBuf>>,
) -> Result<()> {
    println!("{}", "🧩 FLOW ARCHITECT".bright_blue().bold());
    println!("{}", "═".repeat(50).bright_black());
    println!("📝 Prompt: {}", prompt.bright_yellow());
    println!();

    let orchestrator = match memory_store {
        Some(dirs) => ArchitectOrchestrator::with_retriever(config, memory_store_from(&dirs).await?)?,
        None => ArchitectOrchestrator::connect(config).await?,
    };

    let graph = match mode {
        DesignMode::SinglePass => orchestrator.design(prompt, mode).await?,
        DesignMode::Pipeline => {
            let (tx, mut rx) = tokio::sync::mpsc::channel::<PipelineEvent>(32);
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    print_event(&event);
                }
            });

            let run = orchestrator.design_with_events(prompt, Some(tx)).await?;
            let _ = printer.await;

            if run.fallback_count() > 0 {
                println!(
                    "{}",
                    format!("⚠️  {} stage(s) fell back to defaults", run.fallback_count()).yellow()
                );
            }
            run.graph
        }
    };

    print_graph(&graph);
    let json = serde_json::to_string_pretty(&serde_json::json!({ "flow_json": graph }))?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", format!("✅ Flow written to {}", path.display()).green().bold());
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::StageStarted { stage, round } => {
            println!("🔄 {} {}", stage.to_string().bright_cyan(), format!("(round {})", round).bright_black());
        }
        PipelineEvent::StageFinished {
            stage,
            elapsed_ms,
            fallback,
        } => {
            let status = if *fallback { "fallback".yellow() } else { "ok".green() };
            println!("   {} {} in {} ms", stage, status, elapsed_ms);
        }
        PipelineEvent::Fallback { stage, error } => {
            println!("   {}", format!("❌ {} failed: {}", stage, error).red());
        }
        PipelineEvent::ClarificationCapped { rounds } => {
            println!(
                "{}",
                format!("⚠️  Still ambiguous after {} clarification rounds, assembling anyway", rounds)
                    .yellow()
            );
        }
        PipelineEvent::Done { nodes, edges } => {
            println!("{}", format!("✅ Done: {} nodes, {} edges", nodes, edges).green());
        }
    }
}

fn print_graph(graph: &FlowGraph) {
    println!();
    println!("{}", "📊 Graph".bright_blue().bold());
    for node in &graph.nodes {
        println!("  • {} {}", node.id.bright_white(), format!("[{}]", node.node_type).bright_black());
    }
    for edge in &graph.edges {
        println!("  {} → {}", edge.source, edge.target);
    }
    println!();
}

async fn handle_seed(
    config: &ArchitectConfig,
    docs: Option<PathBuf>,
    templates: Option<PathBuf>,
) -> Result<()> {
    if docs.is_none() && templates.is_none() {
        anyhow::bail!("Nothing to seed: pass --docs and/or --templates");
    }

    println!("{}", "🌱 SEEDING COMPONENT STORE".bright_blue().bold());
    println!("🗄️  Qdrant: {} / {}", config.vector.url, config.vector.collection);

    let store = VectorStore::new(config.vector.clone()).await?;

    if let Some(dir) = docs {
        let report = seed_docs(&store, &dir).await?;
        println!("📚 Seeded {} documentation files", report.seeded);
    }
    if let Some(dir) = templates {
        let report = seed_templates(&store, &dir).await?;
        println!("🧱 Seeded {} templates", report.seeded);
        for skipped in &report.skipped_files {
            println!("{}", format!("⚠️  Skipped {}", skipped.display()).yellow());
        }
    }

    println!("{}", "✅ Seeding complete!".green().bold());
    Ok(())
}

async fn handle_query(config: &ArchitectConfig, text: &str, templates: bool, limit: usize) -> Result<()> {
    let store = VectorStore::new(config.vector.clone()).await?;

    let hits = if templates {
        store.query_templates(Some(text).filter(|t| !t.is_empty()), limit).await
    } else {
        store.query_docs(text, limit, None).await
    };

    if hits.is_empty() {
        println!("{}", "No matches".yellow());
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} {} {} {}",
            i + 1,
            hit.id.bright_white(),
            hit.component().unwrap_or("unknown").bright_cyan(),
            hit.content_type().unwrap_or("-").bright_black(),
            format!("distance={:.3}", hit.distance).bright_black()
        );
        let preview: String = hit.document.chars().take(150).collect();
        println!("   {}", preview.replace('\n', " ").bright_black());
    }

    Ok(())
}

#[cfg(feature = "web")]
async fn start_web_server(config: &ArchitectConfig, port: u16) -> Result<()> {
    println!("{}", "🌐 FLOW ARCHITECT API".bright_blue().bold());
    let orchestrator = Arc::new(ArchitectOrchestrator::connect(config).await?);
    server::serve(orchestrator, port).await
}

#[cfg(not(feature = "web"))]
async fn start_web_server(_config: &ArchitectConfig, _port: u16) -> Result<()> {
    anyhow::bail!("Built without the `web` feature; rebuild with --features web")
}
