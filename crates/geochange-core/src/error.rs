use std::time::Duration;

use geochange_process::ProcessFailure;
use geochange_targets::AdbFailure;
use geochange_toolchain::InstallError;
use thiserror::Error;

use crate::tasks::TaskKind;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0} not found; run install first")]
    ToolchainMissing(String),
    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },
    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },
    #[error("device {0} didn't come online in time; use List devices and retry")]
    DeviceUnreachable(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("{0}")]
    Io(String),
    #[error("{command} failed: {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("{} is already running", .0.label())]
    Busy(TaskKind),
}

impl TaskError {
    pub fn command_failed(command: impl Into<String>, detail: impl Into<String>) -> Self {
        TaskError::CommandFailed {
            command: command.into(),
            detail: detail.into(),
        }
    }
}

impl From<ProcessFailure> for TaskError {
    fn from(err: ProcessFailure) -> Self {
        match err {
            ProcessFailure::NotFound { program } => TaskError::ToolchainMissing(program),
            ProcessFailure::Io(message) => TaskError::Spawn {
                program: message
                    .split_once(": ")
                    .map(|(program, _)| program.to_string())
                    .unwrap_or_default(),
                message,
            },
        }
    }
}

impl From<InstallError> for TaskError {
    fn from(err: InstallError) -> Self {
        match err {
            InstallError::Download(msg) => TaskError::Download(msg),
            InstallError::Extract(msg) => TaskError::Extract(msg),
            other @ InstallError::Io { .. } => TaskError::Io(other.to_string()),
        }
    }
}

impl From<AdbFailure> for TaskError {
    fn from(err: AdbFailure) -> Self {
        match err {
            AdbFailure::NotFound => TaskError::ToolchainMissing("adb".into()),
            AdbFailure::Io(message) => TaskError::Spawn {
                program: "adb".into(),
                message,
            },
            AdbFailure::Timeout(after) => TaskError::Timeout {
                what: "adb".into(),
                after,
            },
            exit @ AdbFailure::Exit { .. } => TaskError::command_failed("adb", exit.to_string()),
        }
    }
}
