use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stepbench::config::{self, AppConfig, Cli, ConfigError, FileConfig};
use stepbench::host::{HostBackend, HostSettings};
use stepbench::{engine, logging, sweep};

fn main() {
    let cli = Cli::parse();
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "stepbench".to_string());

    let file_cfg = match FileConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(config::log_directive(&cli, &file_cfg)) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    let cfg = match AppConfig::resolve(&cli, file_cfg) {
        Ok(c) => c,
        Err(ConfigError::Usage(reason)) => {
            // usage is guidance, not a failure
            tracing::debug!(%reason, "rejected arguments");
            println!("{}", config::usage_line(&program));
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::debug!(?cfg, "resolved configuration");

    if let Err(e) = run(&cfg, &program) {
        eprintln!("fatal: {}", e);
        std::process::exit(1);
    }
}

fn run(cfg: &AppConfig, program: &str) -> Result<(), Box<dyn std::error::Error>> {
    let settings = HostSettings {
        seed: cfg.seed,
        memory_limit: cfg.memory_limit,
    };

    let Some(iterations) = cfg.sweep_iterations else {
        let mut backend = HostBackend::new(settings);
        engine::dispatch(&cfg.run, &mut backend)?;
        return Ok(());
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed))?;

    let mut backend = HostBackend::new(settings).quiet(true);
    let table = sweep::run(
        &mut backend,
        &cfg.sweep_plan,
        &cfg.run,
        iterations,
        program,
        &stop,
    )?;
    if table.interrupted {
        tracing::warn!("sweep stopped early; partial results follow");
    }
    print!("{}", table.render());
    Ok(())
}
