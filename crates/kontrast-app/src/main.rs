// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kontrast: locally-adaptive image enhancement, morphology and colour filters.
//
// Entry point. Initialises logging and backend services, then runs one
// command (see `kontrast --help`).

mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueHint};
use kontrast_core::error::{KontrastError, Result};
use kontrast_core::{AppConfig, ParameterBag, TaskStatus};
use kontrast_imaging::{ColourFilter, MorphologyOp};
use kontrast_tasks::JobKind;
use tokio::runtime::Handle;
use tracing::{error, info};

use services::app_services::AppServices;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(author, version, about = "Locally-adaptive image enhancement and morphology")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run adaptive contrast enhancement on an image
    Enhance(JobArgs),

    /// Run a morphology operation (thinning, skeletonize, thicken, hit_or_miss,
    /// dilation, erosion, opening, closing, tophat, blackhat, gradient)
    Morph {
        op: MorphologyOp,
        #[command(flatten)]
        job: JobArgs,
    },

    /// Run a colour filter (brightness_contrast, exposure, vibrance, clarity,
    /// shadows_highlights, hdr)
    Filter {
        filter: ColourFilter,
        #[command(flatten)]
        job: JobArgs,
    },

    /// List or prune processed results
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },

    /// Show the saved configuration
    Config {
        /// Restore the defaults
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Image to process
    #[arg(value_hint = ValueHint::FilePath)]
    image: PathBuf,

    /// Parameters as a JSON object, e.g. '{"window_size": 21}'
    #[arg(long, value_parser = parse_params, default_value = "{}")]
    params: ParameterBag,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Newest entries first
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove one entry and its result image
    Delete { id: String },
    /// Remove every entry and result image
    Clear,
}

fn parse_params(json: &str) -> std::result::Result<ParameterBag, String> {
    serde_json::from_str(json).map_err(|e| format!("parameters must be a JSON object: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let svc = match AppServices::init(Handle::current()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "could not initialise services");
            return ExitCode::FAILURE;
        }
    };

    match run(&svc, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(svc: &AppServices, command: Command) -> Result<()> {
    match command {
        Command::Enhance(job) => process(svc, job.image, JobKind::Enhance, job.params).await,
        Command::Morph { op, job } => {
            process(svc, job.image, JobKind::Morphology(op), job.params).await
        }
        Command::Filter { filter, job } => {
            process(svc, job.image, JobKind::Filter(filter), job.params).await
        }
        Command::History { action } => match action.unwrap_or(HistoryAction::List { limit: None }) {
            HistoryAction::List { limit } => list_history(svc, limit),
            HistoryAction::Delete { id } => {
                if svc.delete_history(&id)? {
                    println!("deleted {id}");
                    Ok(())
                } else {
                    Err(KontrastError::InvalidInput(format!("no history entry '{id}'")))
                }
            }
            HistoryAction::Clear => {
                let removed = svc.clear_history()?;
                println!("removed {removed} history entries");
                Ok(())
            }
        },
        Command::Config { reset: true } => {
            svc.save_config(&AppConfig::default())?;
            println!("config reset in {}", svc.data_dir().display());
            Ok(())
        }
        Command::Config { reset: false } => {
            println!("{}", serde_json::to_string_pretty(&svc.config())?);
            Ok(())
        }
    }
}

async fn process(svc: &AppServices, image: PathBuf, kind: JobKind, params: ParameterBag) -> Result<()> {
    let reaper = svc.spawn_reaper();
    let id = svc.submit(&image, kind, params)?;

    let first = svc.status(id)?;
    for adj in &first.adjustments {
        info!(key = %adj.key, from = %adj.from, to = %adj.to, "{}", adj.reason);
    }
    info!(task_id = %id, %kind, estimated_secs = first.estimated.as_secs_f32(), "processing");

    let mut last_progress = first.progress;
    let view = loop {
        match svc.wait(id, POLL_INTERVAL).await {
            Ok(view) => break view,
            Err(KontrastError::Timeout(_)) => {
                let view = svc.status(id)?;
                if view.progress != last_progress {
                    info!(
                        progress = view.progress,
                        remaining_secs = view.estimated_remaining.map(|d| d.as_secs_f32()),
                        "task progress"
                    );
                    last_progress = view.progress;
                }
            }
            Err(e) => return Err(e),
        }
    };
    reaper.abort();

    match view.status {
        TaskStatus::Completed => {
            if let Some(path) = svc.result_path(&view)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        _ => Err(KontrastError::InvalidInput(
            view.error.unwrap_or_else(|| "task failed".to_string()),
        )),
    }
}

fn list_history(svc: &AppServices, limit: Option<usize>) -> Result<()> {
    for entry in svc.recent_history(limit)? {
        println!(
            "{}  {}  {} -> {}  ({})",
            entry.id,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.source_name,
            entry.result_name,
            entry.descriptive_name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("kontrast").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn job_commands_parse() {
        let cli = parse(&["morph", "skeleton", "scan.png"]).expect("parse");
        let Command::Morph { op, job } = cli.command else {
            panic!("expected morph");
        };
        assert_eq!(op, MorphologyOp::Skeletonize);
        assert_eq!(job.image, PathBuf::from("scan.png"));
        assert_eq!(job.params, ParameterBag::new());

        let cli = parse(&["filter", "hdr", "cat.jpg", "--params", r#"{"strength": 80}"#])
            .expect("parse");
        let Command::Filter { filter, job } = cli.command else {
            panic!("expected filter");
        };
        assert_eq!(filter, ColourFilter::Hdr);
        assert_eq!(job.params.number("strength"), Some(80.0));

        assert!(matches!(
            parse(&["enhance", "cat.jpg"]).expect("parse").command,
            Command::Enhance(_)
        ));
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse(&["morph", "sepia", "cat.jpg"]).is_err());
        assert!(parse(&["enhance", "cat.jpg", "--params", "not json"]).is_err());
        assert!(parse(&["enhance"]).is_err());
    }

    #[test]
    fn history_defaults_to_listing() {
        let cli = parse(&["history"]).expect("parse");
        assert!(matches!(cli.command, Command::History { action: None }));
        let cli = parse(&["history", "list", "--limit", "5"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::History { action: Some(HistoryAction::List { limit: Some(5) }) }
        ));
        let cli = parse(&["history", "delete", "1700000000000"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::History { action: Some(HistoryAction::Delete { .. }) }
        ));
    }
}
