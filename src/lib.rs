pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod scope_path;
pub mod services;
pub mod shell;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

pub use commands::organize_pipeline::{start_organization, Organizer, RunOutcome, RunSummary};
pub use config::OrganizerConfig;
pub use error::{AppError, OracleError, ParseError};
pub use services::oracle_service::{ChatMessage, OracleGateway, PlanningOracle};
pub use state::AppState;

use services::claude_service::ClaudeOracle;
use services::prompt_service::ORGANIZER_INSTRUCTIONS;

/// What the command line asked for.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub no_refine: bool,
    pub janitor_secs: Option<u64>,
}

/// Config file (explicit or platform default), then environment, then flags.
pub fn load_config(options: &RunOptions) -> Result<OrganizerConfig, AppError> {
    let mut config = match &options.config_path {
        Some(path) => OrganizerConfig::load(path)?,
        None => OrganizerConfig::load_default()?,
    };
    config.apply_env_overrides()?;
    if options.no_refine {
        config.refinement_pass = false;
    }
    if let Some(secs) = options.janitor_secs {
        config.janitor_interval_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

pub async fn run(options: RunOptions) -> anyhow::Result<RunSummary> {
    let config = load_config(&options)?;
    logging::init_tracing(config.log_filter.as_deref(), config.log_json)?;

    let oracle = ClaudeOracle::from_settings(&config.oracle)?;
    let gateway = Arc::new(OracleGateway::new(
        Arc::new(oracle),
        ORGANIZER_INSTRUCTIONS,
        config.max_transcript_messages,
    ));
    let state = AppState::new(config);

    let mut entries = state.audit.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match entries.recv().await {
                Ok(entry) => println!("{entry}"),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "status stream fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = start_organization(&state, gateway, &options.root.to_string_lossy()).await;

    // Dropping the last handle on the audit log closes the stream, so the
    // printer drains what is buffered and exits.
    drop(state);
    let _ = printer.await;

    match outcome {
        RunOutcome::Completed(summary) => Ok(summary),
        RunOutcome::AlreadyRunning => anyhow::bail!("an organization run is already in progress"),
        RunOutcome::Refused(reason) => anyhow::bail!("refused to organize: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"janitor_interval_secs": 10, "refinement_pass": true}"#).unwrap();

        let config = load_config(&RunOptions {
            root: dir.path().to_path_buf(),
            config_path: Some(path),
            no_refine: true,
            janitor_secs: Some(90),
        })
        .unwrap();

        assert!(!config.refinement_pass);
        assert_eq!(config.janitor_interval_secs, 90);
    }

    #[test]
    fn zero_janitor_flag_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{}").unwrap();

        let err = load_config(&RunOptions {
            root: dir.path().to_path_buf(),
            config_path: Some(path),
            janitor_secs: Some(0),
            ..RunOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
