//! # Audit Harness CLI (`audx`)
//!
//! The `audx` binary drives the compliance-document pipeline: batch
//! ingestion of configured targets, audit question answering, and
//! namespace maintenance.
//!
//! ## Usage
//!
//! ```bash
//! audx --config ./config/audx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `audx sync` | Ingest every configured target into the vector store |
//! | `audx ask "<question>" --org <name>` | Answer an audit question |
//! | `audx purge --org <name> --doc-type <type>` | Delete one namespace |
//! | `audx targets` | List configured targets and their namespaces |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use audit_harness::ask::{build_connector, build_embedder, build_ocr, build_store};
use audit_harness::config;
use audit_harness::indexer::Indexer;
use audit_harness::ingest::{IngestOptions, IngestPipeline};
use audit_harness::models::namespace;

/// Audit Harness — compliance-document ingestion and grounded
/// question answering.
#[derive(Parser)]
#[command(
    name = "audx",
    about = "Audit Harness — compliance-document ingestion and grounded question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/audx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest configured targets into the vector store.
    ///
    /// For each `[[targets]]` entry, lists the source folder, OCRs every
    /// supported file, extracts filename metadata, chunks the text, and
    /// upserts embedded chunks into the target's namespace. Re-running
    /// over unchanged files overwrites records in place.
    Sync {
        /// Chunk and count without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process per target.
        #[arg(long)]
        limit: Option<usize>,

        /// Restrict the run to one organization.
        #[arg(long)]
        org: Option<String>,
    },

    /// Answer an audit question from the indexed documents.
    ///
    /// Routes the question through the deterministic retrieval flows and
    /// prints the synthesized answer, its citation, and whether the
    /// answer was found in the indexed context.
    Ask {
        /// The question to answer.
        question: String,

        /// Organization whose documents to search.
        #[arg(long)]
        org: String,

        /// Print the raw answer JSON instead of formatted output.
        #[arg(long)]
        json: bool,
    },

    /// Delete every record in one namespace.
    Purge {
        /// Organization name.
        #[arg(long)]
        org: String,

        /// Document type (e.g. `procedures`, `forms`).
        #[arg(long)]
        doc_type: String,
    },

    /// List configured targets and their namespaces.
    Targets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync { dry_run, limit, org } => {
            let connector = build_connector(&cfg)?;
            let ocr = build_ocr(&cfg)?;
            let embedder = build_embedder(&cfg)?;
            let store = build_store(&cfg)?;
            let indexer = Indexer::new(embedder, store, cfg.chunking.clone());

            let pipeline = IngestPipeline::new(&cfg, connector.as_ref(), ocr.as_ref(), &indexer);
            let report = pipeline
                .run(&IngestOptions {
                    dry_run,
                    limit,
                    organization: org,
                })
                .await?;
            report.print_summary(dry_run);
        }

        Commands::Ask { question, org, json } => {
            let outcome = audit_harness::ask::ask(&cfg, &question, &org).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.answer)?);
            } else {
                println!("{}", outcome.answer.answer);
                println!();
                if let Some(citation) = &outcome.answer.citation {
                    println!(
                        "Source: {} ({}, page {})",
                        citation.title, citation.file_name, citation.page
                    );
                }
                println!(
                    "Found in context: {}",
                    if outcome.answer.found_in_context {
                        "yes"
                    } else {
                        "no"
                    }
                );
            }
        }

        Commands::Purge { org, doc_type } => {
            let store: Arc<dyn audit_harness::vector_store::VectorStore> = build_store(&cfg)?;
            let ns = namespace(&org, &doc_type);
            store.delete_all(&ns).await?;
            println!("Purged namespace {}", ns);
        }

        Commands::Targets => {
            if cfg.targets.is_empty() {
                println!("No targets configured.");
            } else {
                for target in &cfg.targets {
                    println!(
                        "{} / {} -> {} (folder: {})",
                        target.organization,
                        target.doc_type,
                        namespace(&target.organization, &target.doc_type),
                        target.folder_id
                    );
                }
            }
        }
    }

    Ok(())
}
