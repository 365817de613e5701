use std::{
    fs, io,
    path::{Path, PathBuf},
};

use geochange_toolchain::{ToolchainPaths, DEFAULT_AVD_NAME};
use geochange_util::{data_dir, env_trimmed, expand_user, state_file_path, write_json_atomic};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const CONFIG_FILE: &str = "config.json";

const SDK_ROOT_ENV: &str = "GEOCHANGE_SDK_ROOT";
const AVD_NAME_ENV: &str = "GEOCHANGE_AVD_NAME";
const ADB_TARGET_ENV: &str = "GEOCHANGE_ADB_TARGET";
const WORKER_THREADS_ENV: &str = "GEOCHANGE_WORKER_THREADS";
const MAX_PARALLEL_TASKS_ENV: &str = "GEOCHANGE_MAX_PARALLEL_TASKS";

pub const KEYS: [&str; 5] = [
    "sdk_root",
    "avd_name",
    "adb_target",
    "worker_threads",
    "max_parallel_tasks",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown config key {0:?} (expected one of: {keys})", keys = KEYS.join(", "))]
    UnknownKey(String),
    #[error("invalid value {value:?} for {key}: expected a positive integer")]
    InvalidValue { key: String, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sdk_root: String,
    pub avd_name: String,
    pub adb_target: String,
    pub worker_threads: usize,
    pub max_parallel_tasks: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sdk_root: data_dir().join("sdk").display().to_string(),
            avd_name: DEFAULT_AVD_NAME.into(),
            adb_target: String::new(),
            worker_threads: 2,
            max_parallel_tasks: 4,
        }
    }
}

pub fn config_path() -> PathBuf {
    state_file_path(CONFIG_FILE)
}

impl AppConfig {
    pub fn load() -> Self {
        Self::load_with(&config_path(), env_trimmed)
    }

    pub fn load_with<F>(path: &Path, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AppConfig::default();
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<AppConfig>(&data) {
                Ok(file_cfg) => cfg.merge_file(file_cfg),
                Err(err) => warn!("Failed to parse {}: {err}", path.display()),
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", path.display());
                }
            }
        }

        if let Some(value) = env(SDK_ROOT_ENV) {
            cfg.sdk_root = value;
        }
        if let Some(value) = env(AVD_NAME_ENV) {
            cfg.avd_name = value;
        }
        if let Some(value) = env(ADB_TARGET_ENV) {
            cfg.adb_target = value;
        }
        if let Some(value) = env(WORKER_THREADS_ENV) {
            apply_count(&mut cfg.worker_threads, WORKER_THREADS_ENV, &value);
        }
        if let Some(value) = env(MAX_PARALLEL_TASKS_ENV) {
            apply_count(&mut cfg.max_parallel_tasks, MAX_PARALLEL_TASKS_ENV, &value);
        }
        cfg
    }

    fn merge_file(&mut self, file_cfg: AppConfig) {
        if !file_cfg.sdk_root.trim().is_empty() {
            self.sdk_root = file_cfg.sdk_root;
        }
        if !file_cfg.avd_name.trim().is_empty() {
            self.avd_name = file_cfg.avd_name;
        }
        self.adb_target = file_cfg.adb_target;
        if file_cfg.worker_threads > 0 {
            self.worker_threads = file_cfg.worker_threads;
        }
        if file_cfg.max_parallel_tasks > 0 {
            self.max_parallel_tasks = file_cfg.max_parallel_tasks;
        }
    }

    pub fn save(&self) -> io::Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        write_json_atomic(path, self)
    }

    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        match key {
            "sdk_root" => Ok(self.sdk_root.clone()),
            "avd_name" => Ok(self.avd_name.clone()),
            "adb_target" => Ok(self.adb_target.clone()),
            "worker_threads" => Ok(self.worker_threads.to_string()),
            "max_parallel_tasks" => Ok(self.max_parallel_tasks.to_string()),
            other => Err(ConfigError::UnknownKey(other.to_string())),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key {
            "sdk_root" => self.sdk_root = value.to_string(),
            "avd_name" => {
                self.avd_name = if value.is_empty() {
                    DEFAULT_AVD_NAME.to_string()
                } else {
                    value.to_string()
                }
            }
            "adb_target" => self.adb_target = value.to_string(),
            "worker_threads" => self.worker_threads = parse_count(key, value)?,
            "max_parallel_tasks" => self.max_parallel_tasks = parse_count(key, value)?,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    pub fn sdk_root_path(&self) -> PathBuf {
        if self.sdk_root.trim().is_empty() {
            data_dir().join("sdk")
        } else {
            expand_user(self.sdk_root.trim())
        }
    }

    pub fn toolchain_paths(&self) -> ToolchainPaths {
        self.toolchain_paths_under(&data_dir())
    }

    pub fn toolchain_paths_under(&self, root: &Path) -> ToolchainPaths {
        ToolchainPaths::new(root).with_sdk_root(self.sdk_root_path())
    }

    pub fn default_target(&self) -> Option<String> {
        let target = self.adb_target.trim();
        (!target.is_empty()).then(|| target.to_string())
    }
}

pub fn remember_target(path: &Path, serial: &str) -> io::Result<bool> {
    let mut saved = AppConfig::load_with(path, |_| None);
    if saved.adb_target == serial {
        return Ok(false);
    }
    saved.adb_target = serial.to_string();
    saved.save_to(path)?;
    Ok(true)
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn apply_count(slot: &mut usize, env_key: &str, value: &str) {
    match parse_count(env_key, value) {
        Ok(count) => *slot = count,
        Err(err) => warn!("ignoring {env_key}: {err}"),
    }
}
