//! Configuration vault – reads/writes `~/.pnp/config.toml`.

use pnp_core::ArmConfig;
use pnp_middleware::SimSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted operator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Frames, planner settings and grasp offsets of the arm.
    #[serde(default)]
    pub arm: ArmConfig,

    /// Simulated backend driven by the shell.
    #[serde(default)]
    pub sim: SimSettings,
}

/// Return the path to `~/.pnp/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pnp").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `PNP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PNP_BASE_FRAME` | `arm.base_frame` |
/// | `PNP_EE_FRAME` | `arm.ee_frame` |
/// | `PNP_GROUP` | `arm.group_name` |
/// | `PNP_MAX_PLANNING_TIME` | `arm.max_planning_time_s` |
///
/// The simulated backend follows the arm frames so the two never disagree.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PNP_BASE_FRAME") {
        cfg.sim.base_frame = v.clone();
        cfg.arm.base_frame = v;
    }
    if let Ok(v) = std::env::var("PNP_EE_FRAME") {
        cfg.sim.ee_link = v.clone();
        cfg.arm.ee_frame = v;
    }
    if let Ok(v) = std::env::var("PNP_GROUP") {
        cfg.sim.group_name = v.clone();
        cfg.arm.group_name = v;
    }
    if let Ok(v) = std::env::var("PNP_MAX_PLANNING_TIME")
        && let Ok(seconds) = v.parse::<f64>()
        && seconds.is_finite()
        && seconds > 0.0
    {
        cfg.arm.max_planning_time_s = seconds;
    }
}

/// Save the config to disk, creating `~/.pnp/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
