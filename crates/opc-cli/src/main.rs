use std::process::ExitCode;

use clap::{Parser, Subcommand};
use opc_conformance::{
    ConformanceDriver, HarnessConfig, TestScenario, builtin_suite, operator_def, run_suite,
};
use opc_cpu::CpuBackend;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opc")]
#[command(about = "Operator conformance harness")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the built-in scenarios.
    List,
    /// Run built-in scenarios against the CPU backend.
    Run {
        /// Only run scenarios for these operators (repeatable).
        #[arg(long = "op")]
        ops: Vec<String>,
        /// Input synthesis seed (overrides OPC_SEED).
        #[arg(long)]
        seed: Option<u64>,
        /// Absolute tolerance (overrides OPC_ATOL).
        #[arg(long)]
        atol: Option<f32>,
        /// Relative tolerance (overrides OPC_RTOL).
        #[arg(long)]
        rtol: Option<f32>,
        /// Print reports as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = HarnessConfig::from_env();
    let result = match args.cmd {
        Cmd::List => list(&config),
        Cmd::Run {
            ops,
            seed,
            atol,
            rtol,
            json,
        } => {
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(atol) = atol {
                config.tolerance.atol = atol;
            }
            if let Some(rtol) = rtol {
                config.tolerance.rtol = rtol;
            }
            run(&config, &ops, json)
        }
    };

    match result {
        Ok(code) => code,
        Err(msg) => {
            error!("{msg}");
            eprintln!("error: {msg}");
            ExitCode::from(2)
        }
    }
}

fn list(config: &HarnessConfig) -> Result<ExitCode, String> {
    let suite = builtin_suite(config).map_err(|e| e.to_string())?;
    for s in &suite {
        let inputs: Vec<String> = s.shapes().input_shapes().iter().map(ToString::to_string).collect();
        let outputs: Vec<String> = s.shapes().output_shapes().iter().map(ToString::to_string).collect();
        println!(
            "{:<16} attrs={} inputs=[{}] outputs=[{}]",
            s.name(),
            s.attrs(),
            inputs.join(", "),
            outputs.join(", ")
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run(config: &HarnessConfig, ops: &[String], json: bool) -> Result<ExitCode, String> {
    if let Some(unknown) = ops.iter().find(|op| operator_def(op).is_none()) {
        return Err(format!("unknown operator `{unknown}`"));
    }
    if !(config.tolerance.atol >= 0.0 && config.tolerance.rtol >= 0.0) {
        return Err(format!("tolerances must be >= 0, got {:?}", config.tolerance));
    }

    let suite = builtin_suite(config).map_err(|e| e.to_string())?;
    let selected: Vec<&TestScenario> = suite
        .iter()
        .filter(|s| ops.is_empty() || ops.iter().any(|op| op == s.op()))
        .collect();
    info!(scenarios = selected.len(), seed = config.seed, "running suite");

    let driver = ConformanceDriver::new(CpuBackend::new());
    let summary = run_suite(&driver, selected);

    if json {
        let out = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        println!("{out}");
    } else {
        for report in &summary.reports {
            println!("{report}");
        }
        println!("{summary}");
    }

    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
