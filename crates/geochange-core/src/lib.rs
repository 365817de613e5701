mod bridge;
pub mod config;
mod controller;
mod error;
mod events;
mod lifecycle;
mod locations;
mod session;
mod spawner;
mod tasks;

pub use bridge::Bridge;
pub use config::{AppConfig, ConfigError};
pub use controller::{Controller, TaskTicket};
pub use error::TaskError;
pub use events::{AppEvent, EventQueue, EventSender};
pub use lifecycle::{BOOT_TIMEOUT, DISCONNECT_TIMEOUT, PLAY_STORE_PACKAGE};
pub use locations::{to_json as bookmarks_json, LocationBookmark, LocationStore, LOCATIONS_FILE};
pub use session::Session;
pub use spawner::TaskSpawner;
pub use tasks::{TaskKind, TaskRegistry, TaskState};
