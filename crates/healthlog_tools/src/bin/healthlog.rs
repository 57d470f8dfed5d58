#![forbid(unsafe_code)]

use std::env;

use chrono::Local;
use tracing_subscriber::FmtSubscriber;

use healthlog_kernel_contracts::parse::ParseContext;
use healthlog_os::config::PipelineConfig;
use healthlog_os::understand::UnderstandingPipeline;
use healthlog_tools::notes_cli::{execute_command, log_level, USAGE};

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn init_logging() {
    let level = log_level(env::var("HEALTHLOG_LOG").ok().as_deref());
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging already initialized");
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let subcommand = args.first().ok_or_else(|| USAGE.to_string())?;
    let input = if args.len() > 1 {
        Some(args[1..].join(" "))
    } else {
        None
    };

    let config = PipelineConfig::from_env();
    tracing::info!(fallback_enabled = config.fallback_enabled, "pipeline configured");
    let pipeline = UnderstandingPipeline::with_provider(config);
    let ctx = ParseContext::at(Local::now().naive_local());

    let output = execute_command(&pipeline, subcommand, input.as_deref(), &ctx)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
