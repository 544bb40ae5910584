mod bootstrap;
mod loop_runner;
mod metrics;
mod script;

use std::process::ExitCode;

use thiserror::Error;
use tilewalk_engine::{resolve_app_paths, ContentCompileError, SceneLoadError, StartupError};
use tracing::{error, info};

use bootstrap::SimConfig;
use script::ScriptError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("environment variable {var} has invalid value '{value}'")]
    InvalidEnv { var: &'static str, value: String },
    #[error(transparent)]
    Content(#[from] ContentCompileError),
    #[error(transparent)]
    Scene(#[from] SceneLoadError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("script step {step} references unknown actor '{name}'")]
    UnknownScriptActor { step: usize, name: String },
    #[error("script step {step} references unknown platform '{name}'")]
    UnknownScriptPlatform { step: usize, name: String },
}

pub(crate) fn run() -> ExitCode {
    bootstrap::init_tracing();
    match try_run() {
        Ok(summary) => {
            info!(
                scene = %summary.scene,
                ticks = summary.ticks_run,
                events = summary.events.total,
                rejected_steps = summary.rejected_steps,
                "simulation_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}

fn try_run() -> Result<loop_runner::SimSummary, AppError> {
    let paths = resolve_app_paths()?;
    let config = SimConfig::from_env(&paths)?;
    bootstrap::log_startup(&paths, &config);
    loop_runner::run_simulation(&config, &paths)
}
