use std::{fmt, time::Duration};

use serde::Serialize;
use tracing::debug;

use crate::adb::{adb_failure_message, AdbClient};

pub const STATE_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

pub const READY_TOKEN: &str = "device";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    #[default]
    Unknown,
    Offline,
    Booting,
    Online,
}

impl DeviceState {
    pub fn label(self) -> &'static str {
        match self {
            DeviceState::Unknown => "unknown",
            DeviceState::Offline => "offline",
            DeviceState::Booting => "booting",
            DeviceState::Online => "online",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone)]
pub struct DeviceTracker {
    adb: AdbClient,
}

impl DeviceTracker {
    pub fn new(adb: AdbClient) -> Self {
        Self { adb }
    }

    pub fn adb(&self) -> &AdbClient {
        &self.adb
    }

    pub async fn query_state(&self, serial: &str) -> DeviceState {
        match self.adb.get_state(serial, STATE_QUERY_TIMEOUT).await {
            Ok(state) if state == READY_TOKEN => DeviceState::Online,
            Ok(state) => {
                debug!("{serial} reports state {state:?}");
                DeviceState::Offline
            }
            Err(err) => {
                debug!("{serial} state query failed: {}", adb_failure_message(&err));
                DeviceState::Offline
            }
        }
    }

    pub async fn await_online(&self, serial: &str, timeout: Duration) -> bool {
        if let Err(err) = self.adb.wait_for_device(serial, timeout).await {
            debug!("{serial} did not attach: {}", adb_failure_message(&err));
            return false;
        }
        self.query_state(serial).await == DeviceState::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use geochange_process::{ProcessFailure, Reply, ScriptedRunner};
    use tokio::time::Instant;

    fn tracker(runner: &Arc<ScriptedRunner>) -> DeviceTracker {
        DeviceTracker::new(AdbClient::new(runner.clone(), "adb"))
    }

    #[tokio::test]
    async fn online_only_for_exact_ready_token() {
        let runner = Arc::new(ScriptedRunner::new().on(&["get-state"], Reply::stdout("device\r\n")));
        assert_eq!(
            tracker(&runner).query_state("emulator-5554").await,
            DeviceState::Online
        );

        for answer in ["", "offline\n", "unauthorized\n", "devices\n"] {
            let runner =
                Arc::new(ScriptedRunner::new().on(&["get-state"], Reply::stdout(answer)));
            assert_eq!(
                tracker(&runner).query_state("emulator-5554").await,
                DeviceState::Offline,
                "{answer:?}"
            );
        }
    }

    #[tokio::test]
    async fn spawn_error_and_bad_exit_read_as_offline() {
        let runner = Arc::new(ScriptedRunner::new().on(
            &["get-state"],
            Reply::Fail(ProcessFailure::Io("permission denied".into())),
        ));
        assert_eq!(tracker(&runner).query_state("x").await, DeviceState::Offline);

        let runner = Arc::new(ScriptedRunner::new().on(&["get-state"], Reply::exit(1)));
        assert_eq!(tracker(&runner).query_state("x").await, DeviceState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn state_query_is_bounded() {
        let runner = Arc::new(ScriptedRunner::new().on(
            &["get-state"],
            Reply::delayed(Duration::from_secs(60), "device"),
        ));
        let started = Instant::now();
        assert_eq!(tracker(&runner).query_state("x").await, DeviceState::Offline);
        assert_eq!(started.elapsed(), STATE_QUERY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn await_online_gives_up_at_timeout_without_querying() {
        let runner = Arc::new(ScriptedRunner::new().on(
            &["wait-for-device"],
            Reply::delayed(Duration::from_secs(600), ""),
        ));
        let started = Instant::now();
        let online = tracker(&runner)
            .await_online("emulator-5554", Duration::from_secs(180))
            .await;
        assert!(!online);
        assert_eq!(started.elapsed(), Duration::from_secs(180));
        assert!(!runner.was_called_with(&["get-state"]));
    }

    #[tokio::test(start_paused = true)]
    async fn await_online_confirms_after_wait() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&["wait-for-device"], Reply::delayed(Duration::from_secs(40), ""))
                .on(&["get-state"], Reply::stdout("device\n")),
        );
        let started = Instant::now();
        assert!(
            tracker(&runner)
                .await_online("emulator-5554", Duration::from_secs(180))
                .await
        );
        assert_eq!(started.elapsed(), Duration::from_secs(40));
        let args = runner.arg_lists();
        assert_eq!(args[0], vec!["-s", "emulator-5554", "wait-for-device"]);
        assert_eq!(args[1], vec!["-s", "emulator-5554", "get-state"]);
    }

    #[test]
    fn labels_are_lowercase() {
        assert_eq!(DeviceState::Booting.to_string(), "booting");
        assert_eq!(serde_json::to_string(&DeviceState::Online).unwrap(), "\"online\"");
    }
}
