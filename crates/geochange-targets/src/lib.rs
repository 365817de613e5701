mod adb;
mod geo;
mod ids;
mod tracker;

pub use adb::{adb_failure_message, parse_adb_devices, AdbClient, AdbDevice, AdbFailure};
pub use geo::{GeoDispatcher, Readiness, TeleportReport, TeleportRequest, PRESENCE_TIMEOUT};
pub use ids::{
    is_emulator_serial, normalize_target_id, resolve_target, select_default_serial,
    DEFAULT_SERIAL,
};
pub use tracker::{DeviceState, DeviceTracker, READY_TOKEN, STATE_QUERY_TIMEOUT};
