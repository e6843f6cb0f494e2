//! frametimer CLI
//!
//! Replays timer scenarios against a simulated frame clock.

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use frametimer::cli::{Cli, Command, OutputFormat};
use frametimer::config::Config;
use frametimer::scenario::{Scenario, ScenarioReport};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    debug!(?level, "Logging initialized");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            scenario,
            frames,
            format,
        } => {
            let scenario = Scenario::load(&scenario)?;
            let frames = frames.unwrap_or(scenario.frames);
            let report = scenario.run_frames(&config.frame, frames)?;
            cmd_run(&report, format)
        }
        Command::Check { scenario: path } => {
            let scenario = Scenario::load(&path)?;
            scenario.frame_config(&config.frame)?;
            println!(
                "{} {}: {} timers, {} actions, {} frames",
                "✓".green(),
                path.display(),
                scenario.timers.len(),
                scenario.actions.len(),
                scenario.frames
            );
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn cmd_run(report: &ScenarioReport, format: OutputFormat) -> Result<()> {
    info!(events = report.events.len(), %format, "cmd_run: printing report");
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for event in &report.events {
                println!(
                    "{} {:>6}  {:<16} scaled={:.3} unscaled={:.3}",
                    "step".dimmed(),
                    event.step,
                    event.timer.cyan(),
                    event.scaled_time,
                    event.unscaled_time
                );
            }

            let stats = &report.stats;
            println!();
            println!(
                "{} {} firings over {} frames (set {}, cleared {}, swept {}, peak active {})",
                "Summary:".bold(),
                stats.total_fired,
                report.frames,
                stats.total_set,
                stats.total_cleared,
                stats.total_swept,
                stats.peak_active
            );
            for (name, status) in &report.final_status {
                let status = match status {
                    Some(status) => status.to_string().yellow(),
                    None => "gone".dimmed(),
                };
                println!("  {:<16} {}", name, status);
            }
        }
    }
    Ok(())
}
