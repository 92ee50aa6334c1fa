#![doc = "confsync: mirror Confluence page trees into local markdown."]

//! Pulls tracked pages (and their child pages, recursively) into a local
//! markdown tree, skipping documents whose remote version is unchanged, and
//! pushes local edits back to read-write pages followed by a forced re-pull
//! of the affected subtree.

pub mod config;
pub mod convert;
pub mod error;
pub mod gateway;
pub mod load_config;
pub mod mapper;
pub mod metadata;
pub mod pull;
pub mod push;

use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::gateway::ConfluenceGateway;
use crate::load_config::load_config;
use crate::metadata::MetadataStore;
use crate::pull::{SyncReport, SyncStatus};

#[derive(Parser)]
#[clap(
    name = "confsync",
    version,
    about = "Mirror Confluence page trees into local markdown and push local edits back"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull configured documents and their children into the local mirror
    Sync {
        /// Path to the YAML project config file
        #[clap(long)]
        config: PathBuf,
        /// Sync only this named document instead of all configured roots
        #[clap(long)]
        doc: Option<String>,
        /// Re-fetch and overwrite even if the remote version is unchanged
        #[clap(long)]
        force: bool,
    },
    /// Push a local markdown file to a read-write document, then re-sync it
    Push {
        /// Path to the YAML project config file
        #[clap(long)]
        config: PathBuf,
        /// Name of the tracked document to update
        #[clap(long)]
        doc: String,
        /// Markdown file to push; content is read from stdin when omitted
        #[clap(long)]
        file: Option<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sync { config, doc, force } => {
            let project = load_config(config)?;
            let gateway = ConfluenceGateway::new_from_env()?;
            let mut store = MetadataStore::open(project.metadata_path())?;

            println!("Sync starting...");
            let report = pull::sync(&project, doc.as_deref(), force, &gateway, &mut store).await?;
            print_report(&report);

            let failed = report.failed().len();
            if failed == 0 {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{failed} document(s) failed to sync"))
            }
        }
        Commands::Push { config, doc, file } => {
            let project = load_config(config)?;
            let content = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {e}", path))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            if content.trim().is_empty() {
                anyhow::bail!("Refusing to push empty content to '{doc}'");
            }

            let gateway = ConfluenceGateway::new_from_env()?;
            let mut store = MetadataStore::open(project.metadata_path())?;

            let outcome = push::push(&project, &doc, &content, &gateway, &mut store).await?;
            println!("Updated '{}' to version {}", doc, outcome.new_version);
            print_report(&outcome.refresh);
            Ok(())
        }
    }
}

fn print_report(report: &SyncReport) {
    for outcome in &report.outcomes {
        let label = match &outcome.status {
            SyncStatus::Created => "created",
            SyncStatus::Updated => "updated",
            SyncStatus::Skipped => "skipped",
            SyncStatus::Failed(_) => "FAILED",
        };
        let title = outcome.title.as_deref().unwrap_or("<unfetched>");
        println!("  {label:7} {} ({})", title, outcome.remote_id);
        if let SyncStatus::Failed(reason) = &outcome.status {
            println!("          reason: {reason}");
        }
    }
    println!("\n--- Sync Summary ---");
    println!("  Created: {}", report.created());
    println!("  Updated: {}", report.updated());
    println!("  Skipped: {}", report.skipped());
    println!("  Failed:  {}", report.failed().len());
}
