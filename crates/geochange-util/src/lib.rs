use std::{
    fs, io,
    path::{Path, PathBuf},
};

use geochange_telemetry as telemetry;
use serde::Serialize;
use tracing::info;

pub const HOME_ENV: &str = "GEOCHANGE_HOME";

pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return expand_user(dir.trim());
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/geochange")
    } else if let Ok(profile) = std::env::var("USERPROFILE") {
        PathBuf::from(profile).join("geochange")
    } else {
        std::env::temp_dir().join("geochange")
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn state_file_path(file_name: &str) -> PathBuf {
    state_dir().join(file_name)
}

pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn env_enabled(key: &str) -> bool {
    env_trimmed(key).is_some_and(|value| {
        matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .with_writer(io::stderr)
        .init();
    Ok(())
}

pub fn init_app_telemetry(app_name: &'static str, app_version: &'static str) {
    telemetry::install(telemetry::TelemetryOptions {
        app: app_name,
        version: app_version,
        dir: data_dir().join("telemetry").join(app_name),
        usage: env_enabled("GEOCHANGE_TELEMETRY"),
        crashes: env_enabled("GEOCHANGE_TELEMETRY_CRASH"),
    });
    telemetry::event("app.start", &[]);
    info!("{app_name} {app_version} data dir {}", data_dir().display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn write_json_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.json");
        let value = Sample {
            name: "kyiv".into(),
            count: 3,
        };

        write_json_atomic(&path, &value).unwrap();

        let back: Sample = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, value);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn env_enabled_reads_common_spellings() {
        std::env::set_var("GEOCHANGE_TEST_FLAG_ON", " Yes ");
        std::env::set_var("GEOCHANGE_TEST_FLAG_OFF", "0");
        assert!(env_enabled("GEOCHANGE_TEST_FLAG_ON"));
        assert!(!env_enabled("GEOCHANGE_TEST_FLAG_OFF"));
        assert!(!env_enabled("GEOCHANGE_TEST_FLAG_UNSET"));
    }

    #[test]
    fn expand_user_leaves_plain_paths_alone() {
        assert_eq!(expand_user("/opt/sdk"), PathBuf::from("/opt/sdk"));
        assert_eq!(expand_user("relative/dir"), PathBuf::from("relative/dir"));
    }
}
