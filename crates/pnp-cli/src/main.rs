//! `pnp-cli` – pick-and-place operator shell.
//!
//! This binary:
//!
//! 1. Loads `~/.pnp/config.toml`, writing the defaults on first run.
//! 2. Starts the simulated arm and waits until every service answers.
//! 3. Drops the operator into an **interactive REPL** with slash-commands
//!    (`/add`, `/attach`, `/above`, `/lift`, `/help`, …).
//! 4. Intercepts **Ctrl-C**: a running motion is halted; with nothing
//!    executing the shell shuts down.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use pnp_core::{MotionOrchestrator, RetryPolicy};
use pnp_middleware::SimBackend;

fn main() {
    // Hold the guard for the whole process so pending spans are flushed.
    let telemetry = pnp_core::init_tracing("pnp");
    if telemetry.is_exporting() {
        info!("exporting spans over OTLP");
    }

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // The OTLP exporter is already installed, so the runtime can come up now.
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the Tokio runtime");
            std::process::exit(1);
        }
    };

    // ── Backend handshake ─────────────────────────────────────────────────
    let sim = {
        let _enter = runtime.enter();
        SimBackend::start(cfg.sim.clone())
    };
    print!(
        "\n  Connecting to simulated arm (group {}) … ",
        cfg.arm.group_name.dimmed()
    );
    let orchestrator = match runtime.block_on(MotionOrchestrator::connect(
        sim.services(),
        cfg.arm.clone(),
        RetryPolicy::default(),
    )) {
        Ok(orchestrator) => {
            println!("{}", "ready".green());
            Arc::new(orchestrator)
        }
        Err(e) => {
            println!("{}", "failed".red());
            println!("  {}", e.to_string().red());
            std::process::exit(1);
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let orchestrator_ctrlc = orchestrator.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        if orchestrator_ctrlc.stop() {
            println!("{}", "⚠  Ctrl-C received – motion halted.".yellow().bold());
        } else {
            println!("{}", "⚠  Ctrl-C received – nothing moving, shutting down.".yellow().bold());
            println!("{}", "  ✓ Press Enter to leave the shell.".green());
            shutdown_clone.store(true, Ordering::SeqCst);
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; motions cannot be halted from the keyboard");
    }

    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(orchestrator, &runtime, shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ____        ____ "#.bold().cyan());
    println!("{}", r#"   / __ \____  / __ \"#.bold().cyan());
    println!("{}", r#"  / /_/ / __ \/ /_/ /"#.bold().cyan());
    println!("{}", r#" / ____/ / / / ____/ "#.bold().cyan());
    println!("{}", r#"/_/   /_/ /_/_/      "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "pnp".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Pick-and-place motion shell");
    println!();
}
