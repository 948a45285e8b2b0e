//! `qflow` — CLI driver for the questionnaire static analyzer.

use std::fs;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use qflow_verify::{analyze, report, CancelToken};

#[derive(Parser)]
#[command(name = "qflow", about = "Static analysis for YAML-defined questionnaires")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and print the JSON report.
    Check {
        file: String,
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// Print the canonical topological order, one item id per line.
    Order {
        file: String,
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(message) => {
            eprintln!("qflow: {}", message);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<i32, String> {
    match cli.command {
        Commands::Check { file, timeout_ms } => {
            let yaml = fs::read_to_string(&file).map_err(|e| format!("{}: {}", file, e))?;
            let (rep, structural_err) = analyze(&yaml, timeout_ms, &CancelToken::new());
            let json = serde_json::to_string_pretty(&rep).map_err(|e| e.to_string())?;
            println!("{}", json);
            Ok(report::exit_code(&rep, structural_err.as_ref()))
        }
        Commands::Order { file, timeout_ms } => {
            let yaml = fs::read_to_string(&file).map_err(|e| format!("{}: {}", file, e))?;
            let (rep, structural_err) = analyze(&yaml, timeout_ms, &CancelToken::new());
            if let Some(err) = &structural_err {
                return Err(err.to_string());
            }
            for item in &rep.items {
                println!("{}", item.id);
            }
            Ok(0)
        }
    }
}
