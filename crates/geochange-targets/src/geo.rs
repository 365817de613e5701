use std::time::Duration;

use tracing::{info, warn};

use crate::adb::adb_failure_message;
use crate::ids::resolve_target;
use crate::tracker::{DeviceState, DeviceTracker};

pub const PRESENCE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq)]
pub struct TeleportRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub target: Option<String>,
}

impl TeleportRequest {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Online,
    Attached,
    BestEffort { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeleportReport {
    pub target: String,
    pub readiness: Readiness,
    pub dispatched: bool,
    pub detail: String,
}

impl TeleportReport {
    pub fn summary(&self) -> String {
        let readiness = match &self.readiness {
            Readiness::Online => "online".to_string(),
            Readiness::Attached => "attached".to_string(),
            Readiness::BestEffort { reason } => format!("best effort ({reason})"),
        };
        if self.dispatched {
            format!("geo fix sent to {} [{readiness}]", self.target)
        } else {
            format!("geo fix to {} failed [{readiness}]: {}", self.target, self.detail)
        }
    }
}

pub struct GeoDispatcher {
    tracker: DeviceTracker,
}

impl GeoDispatcher {
    pub fn new(tracker: DeviceTracker) -> Self {
        Self { tracker }
    }

    /// Makes one attempt to move the device to the requested coordinates. Never fails; what
    /// happened is described by the report.
    pub async fn teleport(
        &self,
        request: &TeleportRequest,
        session_default: Option<&str>,
    ) -> TeleportReport {
        let target = resolve_target(request.target.as_deref(), session_default);
        let readiness = self.ensure_present(&target).await;

        let adb = self.tracker.adb();
        let (dispatched, detail) = match adb
            .geo_fix(&target, request.latitude, request.longitude)
            .await
        {
            Ok(output) => (true, output.first_non_empty().unwrap_or("OK").to_string()),
            Err(err) => (false, adb_failure_message(&err)),
        };

        let report = TeleportReport {
            target,
            readiness,
            dispatched,
            detail,
        };
        if report.dispatched {
            info!("{}", report.summary());
        } else {
            warn!("{}", report.summary());
        }
        report
    }

    async fn ensure_present(&self, target: &str) -> Readiness {
        if self.tracker.query_state(target).await == DeviceState::Online {
            return Readiness::Online;
        }
        match self
            .tracker
            .adb()
            .wait_for_device(target, PRESENCE_TIMEOUT)
            .await
        {
            Ok(()) => Readiness::Attached,
            Err(err) => Readiness::BestEffort {
                reason: adb_failure_message(&err),
            },
        }
    }
}
