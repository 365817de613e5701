use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use geochange_process::{
    format_output, CaptureOutput, CommandRunner, CommandSpec, ProcessEnvironment, ProcessFailure,
};
use serde::Serialize;
use tracing::debug;

use crate::ids::normalize_target_id;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdbFailure {
    NotFound,
    Io(String),
    Timeout(Duration),
    Exit {
        status: i32,
        stdout: String,
        stderr: String,
    },
}

impl From<ProcessFailure> for AdbFailure {
    fn from(err: ProcessFailure) -> Self {
        match err {
            ProcessFailure::NotFound { .. } => AdbFailure::NotFound,
            ProcessFailure::Io(msg) => AdbFailure::Io(msg),
        }
    }
}

fn format_adb_failure_message(status: i32, stdout: &str, stderr: &str) -> String {
    let detail = format_output(stdout, stderr);
    if detail.trim().is_empty() {
        format!("adb command failed with exit {status}")
    } else {
        format!("adb command failed with exit {status}: {}", detail.trim())
    }
}

pub fn adb_failure_message(err: &AdbFailure) -> String {
    match err {
        AdbFailure::NotFound => "adb not found (install the SDK or put adb on PATH)".into(),
        AdbFailure::Io(msg) => msg.clone(),
        AdbFailure::Timeout(limit) => format!("adb timed out after {}s", limit.as_secs()),
        AdbFailure::Exit {
            status,
            stdout,
            stderr,
        } => format_adb_failure_message(*status, stdout, stderr),
    }
}

impl fmt::Display for AdbFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&adb_failure_message(self))
    }
}

impl std::error::Error for AdbFailure {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdbDevice {
    pub serial: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AdbDevice {
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

pub fn parse_adb_devices(output: &str, include_offline: bool) -> Vec<AdbDevice> {
    let mut devices = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("List of devices attached") || line.starts_with('*')
        {
            continue;
        }

        let mut parts = line.split_whitespace();
        let serial = match parts.next() {
            Some(s) => s,
            None => continue,
        };
        let state = match parts.next() {
            Some(s) => s,
            None => continue,
        };

        if !include_offline && state != "device" {
            continue;
        }

        let model = parts
            .filter_map(|part| part.split_once(':'))
            .find(|(key, _)| *key == "model")
            .map(|(_, value)| value.to_string());

        devices.push(AdbDevice {
            serial: normalize_target_id(serial),
            state: state.to_string(),
            model,
        });
    }

    devices
}

#[derive(Clone)]
pub struct AdbClient {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    env: Option<ProcessEnvironment>,
}

impl AdbClient {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
            env: None,
        }
    }

    pub fn with_env(mut self, env: ProcessEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    pub fn spec(&self, serial: Option<&str>, args: &[&str]) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program);
        if let Some(serial) = serial {
            spec = spec.args(["-s", serial]);
        }
        spec = spec.args(args.iter().copied());
        if let Some(env) = self.env.as_ref() {
            spec = spec.env(env.clone());
        }
        spec
    }

    pub async fn run(
        &self,
        serial: Option<&str>,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CaptureOutput, AdbFailure> {
        let mut spec = self.spec(serial, args);
        if let Some(limit) = timeout {
            spec = spec.timeout(limit);
        }
        debug!("{}", spec.display());
        let output = self.runner.capture(&spec).await?;
        if output.timed_out {
            return Err(AdbFailure::Timeout(timeout.unwrap_or_default()));
        }
        Ok(output)
    }

    pub async fn checked(
        &self,
        serial: Option<&str>,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CaptureOutput, AdbFailure> {
        let output = self.run(serial, args, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(AdbFailure::Exit {
                status: output.exit_code.unwrap_or(-1),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }

    pub async fn get_state(&self, serial: &str, timeout: Duration) -> Result<String, AdbFailure> {
        let output = self
            .checked(Some(serial), &["get-state"], Some(timeout))
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn wait_for_device(&self, serial: &str, timeout: Duration) -> Result<(), AdbFailure> {
        self.checked(Some(serial), &["wait-for-device"], Some(timeout))
            .await
            .map(|_| ())
    }

    pub async fn wait_for_disconnect(
        &self,
        serial: &str,
        timeout: Duration,
    ) -> Result<(), AdbFailure> {
        self.run(Some(serial), &["wait-for-disconnect"], Some(timeout))
            .await
            .map(|_| ())
    }

    pub async fn emu_kill(&self, serial: &str) -> Result<CaptureOutput, AdbFailure> {
        self.run(Some(serial), &["emu", "kill"], None).await
    }

    // The emulator console takes longitude first.
    pub async fn geo_fix(
        &self,
        serial: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<CaptureOutput, AdbFailure> {
        let lon = longitude.to_string();
        let lat = latitude.to_string();
        self.checked(Some(serial), &["emu", "geo", "fix", &lon, &lat], None)
            .await
    }

    pub async fn launch_app(
        &self,
        serial: Option<&str>,
        package: &str,
    ) -> Result<CaptureOutput, AdbFailure> {
        let args = [
            "shell",
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ];
        self.run(serial, &args, None).await
    }

    pub async fn devices(&self) -> Result<(CaptureOutput, Vec<AdbDevice>), AdbFailure> {
        let output = self.checked(None, &["devices"], None).await?;
        let devices = parse_adb_devices(&output.stdout, false);
        Ok((output, devices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geochange_process::{Reply, ScriptedRunner};

    const DEVICES: &str = "List of devices attached\n\
        * daemon started successfully\n\
        emulator-5554\tdevice\n\
        emulator-5556\toffline\n\
        R58M12345\tunauthorized\n\
        127.0.0.1:6520\tdevice product:aosp model:Cuttlefish transport_id:3\n";

    #[test]
    fn parses_only_ready_rows_by_default() {
        let devices = parse_adb_devices(DEVICES, false);
        let serials: Vec<_> = devices.iter().map(|d| d.serial.as_str()).collect();
        assert_eq!(serials, vec!["emulator-5554", "localhost:6520"]);
        assert_eq!(devices[1].model.as_deref(), Some("Cuttlefish"));
    }

    #[test]
    fn offline_emulator_is_not_listed() {
        let text = "List of devices attached\nemulator-5554\tdevice\nemulator-5556\toffline\n";
        let devices = parse_adb_devices(text, false);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert_eq!(
            crate::ids::select_default_serial(devices.iter().map(|d| d.serial.as_str())),
            Some("emulator-5554")
        );
    }

    #[test]
    fn include_offline_keeps_every_row() {
        let devices = parse_adb_devices(DEVICES, true);
        assert_eq!(devices.len(), 4);
        assert!(!devices[1].is_ready());
    }

    #[test]
    fn failure_messages_are_readable() {
        let err = AdbFailure::Exit {
            status: 1,
            stdout: String::new(),
            stderr: "error: device 'emulator-5554' not found".into(),
        };
        assert_eq!(
            adb_failure_message(&err),
            "adb command failed with exit 1: stderr:\nerror: device 'emulator-5554' not found"
        );
        assert_eq!(
            AdbFailure::Timeout(Duration::from_secs(25)).to_string(),
            "adb timed out after 25s"
        );
    }

    #[tokio::test]
    async fn geo_fix_sends_longitude_before_latitude() {
        let runner = Arc::new(ScriptedRunner::new());
        let adb = AdbClient::new(runner.clone(), "adb");
        adb.geo_fix("emulator-5554", 55.7558, 37.6173).await.unwrap();
        assert_eq!(
            runner.arg_lists(),
            vec![vec!["-s", "emulator-5554", "emu", "geo", "fix", "37.6173", "55.7558"]]
        );
    }

    #[tokio::test]
    async fn missing_adb_maps_to_not_found() {
        let runner = Arc::new(ScriptedRunner::new().on(
            &["devices"],
            Reply::Fail(ProcessFailure::NotFound {
                program: "adb".into(),
            }),
        ));
        let adb = AdbClient::new(runner, "adb");
        assert_eq!(adb.devices().await.unwrap_err(), AdbFailure::NotFound);
    }

    #[tokio::test]
    async fn launch_without_serial_omits_selector() {
        let runner = Arc::new(ScriptedRunner::new());
        let adb = AdbClient::new(runner.clone(), "adb");
        adb.launch_app(None, "com.android.vending").await.unwrap();
        let args = &runner.arg_lists()[0];
        assert_eq!(args[0], "shell");
        assert!(runner.was_called_with(&["-p", "com.android.vending"]));
    }
}
