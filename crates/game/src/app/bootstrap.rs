use std::env;
use std::path::{Path, PathBuf};

use tilewalk_engine::AppPaths;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::AppError;

pub(crate) const SCENE_ENV_VAR: &str = "TILEWALK_SCENE";
pub(crate) const SCRIPT_ENV_VAR: &str = "TILEWALK_SCRIPT";
pub(crate) const TICKS_ENV_VAR: &str = "TILEWALK_TICKS";
pub(crate) const TPS_ENV_VAR: &str = "TILEWALK_TPS";
pub(crate) const PATH_THREADS_ENV_VAR: &str = "TILEWALK_PATH_THREADS";

const DEFAULT_SCENE: &str = "courtyard";
/// Disables the script that would otherwise be picked up next to the scene name.
const NO_SCRIPT: &str = "none";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimConfig {
    pub(crate) scene_path: PathBuf,
    pub(crate) script_path: Option<PathBuf>,
    pub(crate) ticks: u64,
    pub(crate) ticks_per_second: u32,
    pub(crate) path_worker_threads: usize,
    pub(crate) rng_seed: Option<u64>,
}

impl SimConfig {
    pub(crate) fn defaults_for(paths: &AppPaths) -> Self {
        Self {
            scene_path: asset_path(&paths.scenes_dir, DEFAULT_SCENE),
            script_path: Some(asset_path(&paths.scripts_dir, DEFAULT_SCENE)),
            ticks: 600,
            ticks_per_second: 30,
            path_worker_threads: 2,
            rng_seed: Some(0x7e11),
        }
    }

    pub(crate) fn fixed_dt_seconds(&self) -> f32 {
        1.0 / self.ticks_per_second.max(1) as f32
    }

    pub(crate) fn from_env(paths: &AppPaths) -> Result<Self, AppError> {
        Self::from_lookup(paths, |var| env::var(var).ok())
    }

    pub(crate) fn from_lookup<F>(paths: &AppPaths, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::defaults_for(paths);
        let scene_name = lookup(SCENE_ENV_VAR)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        if let Some(scene) = &scene_name {
            config.scene_path = asset_path(&paths.scenes_dir, scene);
            config.script_path = config
                .scene_path
                .file_stem()
                .map(|stem| paths.scripts_dir.join(format!("{}.json", stem.to_string_lossy())));
        }
        match lookup(SCRIPT_ENV_VAR).map(|raw| raw.trim().to_string()) {
            Some(script) if script.eq_ignore_ascii_case(NO_SCRIPT) => config.script_path = None,
            Some(script) if !script.is_empty() => {
                config.script_path = Some(asset_path(&paths.scripts_dir, &script));
            }
            _ => {
                // The implicit script is optional; an explicit one must exist.
                if config
                    .script_path
                    .as_deref()
                    .is_some_and(|path| !path.is_file())
                {
                    config.script_path = None;
                }
            }
        }
        if let Some(ticks) = parse_var(&lookup, TICKS_ENV_VAR)? {
            config.ticks = ticks;
        }
        if let Some(tps) = parse_var::<u32, _>(&lookup, TPS_ENV_VAR)? {
            if tps == 0 {
                return Err(AppError::InvalidEnv {
                    var: TPS_ENV_VAR,
                    value: tps.to_string(),
                });
            }
            config.ticks_per_second = tps;
        }
        if let Some(threads) = parse_var(&lookup, PATH_THREADS_ENV_VAR)? {
            config.path_worker_threads = threads;
        }
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::InvalidEnv { var, value: raw }),
    }
}

/// Bare names resolve to `<dir>/<name>.json`; anything that looks like a path is used as given.
fn asset_path(dir: &Path, value: &str) -> PathBuf {
    let candidate = Path::new(value);
    if candidate.extension().is_some() || candidate.components().count() > 1 {
        candidate.to_path_buf()
    } else {
        dir.join(format!("{value}.json"))
    }
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

pub(crate) fn log_startup(paths: &AppPaths, config: &SimConfig) {
    info!("=== Tilewalk Startup ===");
    info!(
        root = %paths.root.display(),
        scene = %config.scene_path.display(),
        script = ?config.script_path.as_ref().map(|path| path.display().to_string()),
        ticks = config.ticks,
        tps = config.ticks_per_second,
        path_threads = config.path_worker_threads,
        "sim_config"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tilewalk_engine::app_paths_for_root;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_apply_without_env() {
        let paths = app_paths_for_root(PathBuf::from("/nowhere"));
        let config = SimConfig::from_lookup(&paths, lookup_from(&[])).expect("config");
        assert_eq!(config.scene_path, PathBuf::from("/nowhere/assets/scenes/courtyard.json"));
        // Missing implicit script is dropped.
        assert_eq!(config.script_path, None);
        assert_eq!(config.ticks, 600);
        assert_eq!(config.ticks_per_second, 30);
    }

    #[test]
    fn env_overrides_are_parsed() {
        let paths = app_paths_for_root(PathBuf::from("/nowhere"));
        let config = SimConfig::from_lookup(
            &paths,
            lookup_from(&[
                (SCENE_ENV_VAR, "yard"),
                (SCRIPT_ENV_VAR, "patrol"),
                (TICKS_ENV_VAR, " 120 "),
                (TPS_ENV_VAR, "60"),
                (PATH_THREADS_ENV_VAR, "0"),
            ]),
        )
        .expect("config");
        assert_eq!(config.scene_path, PathBuf::from("/nowhere/assets/scenes/yard.json"));
        assert_eq!(
            config.script_path,
            Some(PathBuf::from("/nowhere/assets/scripts/patrol.json"))
        );
        assert_eq!(config.ticks, 120);
        assert_eq!(config.path_worker_threads, 0);
        assert!((config.fixed_dt_seconds() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn script_can_be_disabled_and_paths_pass_through() {
        let paths = app_paths_for_root(PathBuf::from("/nowhere"));
        let config = SimConfig::from_lookup(
            &paths,
            lookup_from(&[(SCENE_ENV_VAR, "/tmp/custom.json"), (SCRIPT_ENV_VAR, "NONE")]),
        )
        .expect("config");
        assert_eq!(config.scene_path, PathBuf::from("/tmp/custom.json"));
        assert_eq!(config.script_path, None);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let paths = app_paths_for_root(PathBuf::from("/nowhere"));
        let err = SimConfig::from_lookup(&paths, lookup_from(&[(TICKS_ENV_VAR, "lots")]))
            .expect_err("invalid");
        assert!(matches!(err, AppError::InvalidEnv { var: TICKS_ENV_VAR, .. }));
        let err = SimConfig::from_lookup(&paths, lookup_from(&[(TPS_ENV_VAR, "0")]))
            .expect_err("zero tps");
        assert!(matches!(err, AppError::InvalidEnv { var: TPS_ENV_VAR, .. }));
    }
}
