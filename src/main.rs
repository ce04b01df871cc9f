//! Simulator entry point: CLI wiring, scenario loading and reporting.

use anyhow::{Context, Result};
use clap::Parser;

use peakshave_sim::cli::Args;
use peakshave_sim::runner::run_scenario;
use peakshave_sim::telemetry::init_tracing;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(if args.quiet { "warn" } else { "info" });

    let scenario = args.load_scenario().context("failed to load scenario")?;
    let output = run_scenario(&scenario).context("simulation failed")?;

    if !args.quiet {
        for r in &output.results {
            println!("{r}");
        }
        println!();
    }
    println!("Strategy: {}", output.strategy);
    println!("{}", output.kpi);

    if let Some(path) = &args.telemetry_out {
        output
            .export_csv(path)
            .with_context(|| format!("failed to write telemetry to {}", path.display()))?;
        eprintln!("Telemetry written to {}", path.display());
    }

    #[cfg(feature = "api")]
    if args.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        use peakshave_sim::api::{AppState, serve};

        let state = Arc::new(AppState { output });
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(serve(state, addr))
            .with_context(|| format!("API server on {addr} failed"))?;
    }

    Ok(())
}
