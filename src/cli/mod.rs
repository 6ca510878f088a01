// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `init`    — build a checkpoint (fresh or from BERT weights)
//   2. `predict` — score answer spans for a feature file
//   3. `inspect` — list the parameters stored in a checkpoint
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, InitArgs, InspectArgs, PredictArgs};

use crate::ml::predictor::InferBackend;

#[derive(Parser, Debug)]
#[command(
    name = "entity-qa",
    version = "0.1.0",
    about = "Entity-aware transformer reader: build checkpoints and score answer spans."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Init(args)    => run_init(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Inspect(args) => run_inspect(args),
        }
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    use crate::application::init_use_case::InitUseCase;

    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    let summary = InitUseCase::new(args.into()).execute::<InferBackend>(&device)?;
    println!(
        "Checkpoint written: {} tensors, {} parameters.",
        summary.num_tensors, summary.num_values
    );
    if let Some(report) = summary.report {
        println!("Adapted {} tensor(s) from BERT weights.", report.loaded);
        println!("Kept initial values for {} parameter(s):", report.missing.len());
        for path in &report.missing {
            println!("  {path}");
        }
        if !report.unexpected.is_empty() {
            println!("Ignored {} checkpoint entr(ies):", report.unexpected.len());
            for path in &report.unexpected {
                println!("  {path}");
            }
        }
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let output = args.output.clone();
    let device = burn::backend::wgpu::WgpuDevice::default();
    let written = PredictUseCase::new(args.into()).execute::<InferBackend>(device)?;
    println!("Wrote {} result(s) to {}", written, output.display());
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    use crate::application::inspect_use_case::InspectUseCase;

    let device = burn::backend::wgpu::WgpuDevice::default();
    let report = InspectUseCase::new(args.checkpoint_dir, args.variant.into())
        .execute::<InferBackend>(&device)?;

    for (path, shape) in &report.tensors {
        println!("{path:<60} {shape:?}");
    }
    println!("\n{} tensors, {} parameters", report.tensors.len(), report.num_values);
    for path in &report.missing {
        println!("missing:    {path}");
    }
    for path in &report.unexpected {
        println!("unexpected: {path}");
    }
    Ok(())
}
