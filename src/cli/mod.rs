// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All pipeline work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `batches`   — epochs of training minibatches, resumable
//   2. `documents` — the document-grouped evaluation iterator
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{BatchesArgs, Commands, DocumentsArgs};

#[derive(Parser, Debug)]
#[command(
    name = "window-batcher",
    version = "0.1.0",
    about = "Cut pre-tokenized summarization shards into windows and pack them into minibatches."
)]
pub struct Cli {
    /// The subcommand to run (batches or documents)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Batches(args)   => run_batches(args),
            Commands::Documents(args) => run_documents(args),
        }
    }
}

/// Handles the `batches` subcommand.
fn run_batches(args: BatchesArgs) -> Result<()> {
    use crate::application::batch_use_case::BatchUseCase;

    let run = args.into_run_config()?;
    tracing::info!("Reading {} shards from: {}", run.split, run.pipeline.data_path);

    let report = BatchUseCase::new(run).execute()?;

    println!("{:>6} {:>12} {:>10} {:>8}", "epoch", "minibatches", "chunks", "fill");
    for s in &report {
        println!(
            "{:>6} {:>12} {:>10} {:>8.3}",
            s.epoch,
            s.minibatches,
            s.chunks,
            s.fill_ratio()
        );
    }
    if report.is_empty() {
        println!("Nothing to do: the saved progress already reached the requested epochs.");
    }
    Ok(())
}

/// Handles the `documents` subcommand.
fn run_documents(args: DocumentsArgs) -> Result<()> {
    use crate::application::document_use_case::DocumentUseCase;

    let reports = DocumentUseCase::new(args.into_run_config()?).execute()?;

    println!("{:>8} {:>8} {:>12} {:>6}", "document", "windows", "minibatches", "width");
    for r in &reports {
        println!("{:>8} {:>8} {:>12} {:>6}", r.index, r.windows, r.minibatches, r.max_width);
    }
    let windows: usize = reports.iter().map(|r| r.windows).sum();
    println!("\n{} documents, {} windows", reports.len(), windows);
    Ok(())
}
