use std::{sync::Arc, time::Duration};

use geochange_process::{CaptureOutput, CommandRunner, CommandSpec, ProcessEnvironment, StreamExit};
use geochange_targets::{
    resolve_target, select_default_serial, AdbClient, AdbFailure, DeviceState, DeviceTracker,
    DEFAULT_SERIAL,
};
use geochange_toolchain::{install_cmdline_tools, sdk, REQUIRED_PACKAGES};
use tracing::{info, warn};

use crate::config::remember_target;
use crate::error::TaskError;
use crate::events::{AppEvent, EventSender};
use crate::session::Session;
use crate::tasks::TaskKind;

pub const BOOT_TIMEOUT: Duration = Duration::from_secs(180);
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(25);
pub const PLAY_STORE_PACKAGE: &str = "com.android.vending";

pub(crate) fn adb_client(session: &Session, runner: Arc<dyn CommandRunner>) -> AdbClient {
    let paths = session.paths();
    AdbClient::new(runner, paths.adb()).with_env(paths.environment())
}

#[derive(Clone)]
pub(crate) struct TaskContext {
    pub(crate) kind: TaskKind,
    pub(crate) session: Arc<Session>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) events: EventSender,
}

impl TaskContext {
    pub(crate) fn publish_log(&self, line: impl Into<String>) {
        self.events.log(self.kind.label(), line);
    }

    fn publish_progress(&self, step: usize, total: usize, label: &str) {
        self.events.progress(self.kind, step, total, label);
    }

    fn environment(&self) -> ProcessEnvironment {
        self.session.paths().environment()
    }

    fn adb(&self) -> AdbClient {
        adb_client(&self.session, Arc::clone(&self.runner))
    }

    async fn learn_identity(&self, serial: &str) {
        if !self.session.set_default_identity(serial) {
            return;
        }
        let Some(path) = self.session.config_path().map(|p| p.to_path_buf()) else {
            return;
        };
        let owned = serial.to_string();
        match tokio::task::spawn_blocking(move || remember_target(&path, &owned)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!("failed to remember target {serial}: {err}"),
            Err(err) => warn!("remember target task failed: {err}"),
        }
    }

    async fn stream(&self, spec: &CommandSpec) -> Result<StreamExit, TaskError> {
        self.publish_log(format!("> {}", spec.display()));
        let mut lines = self.runner.stream(spec).await?;
        while let Some(line) = lines.next_line().await {
            self.publish_log(line);
        }
        Ok(lines.wait().await)
    }

    async fn stream_checked(&self, spec: &CommandSpec) -> Result<(), TaskError> {
        let exit = self.stream(spec).await?;
        if exit.success() {
            Ok(())
        } else {
            Err(TaskError::command_failed(spec.program_name(), exit.describe()))
        }
    }

    async fn capture(&self, spec: &CommandSpec) -> Result<CaptureOutput, TaskError> {
        self.publish_log(format!("> {}", spec.display()));
        let output = self.runner.capture(spec).await?;
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            if !line.trim().is_empty() {
                self.publish_log(line.trim_end());
            }
        }
        Ok(output)
    }
}

pub(crate) async fn run_install_task(
    ctx: TaskContext,
    cmdline_tools_url: String,
) -> Result<(), TaskError> {
    let paths = ctx.session.paths().clone();
    let total = 3 + REQUIRED_PACKAGES.len();

    if paths.cmdline_tools_installed() {
        ctx.publish_log("Command-line tools already present.");
    } else {
        ctx.publish_progress(1, total, "command-line tools");
        let log_ctx = ctx.clone();
        install_cmdline_tools(&paths, &cmdline_tools_url, move |line| log_ctx.publish_log(line))
            .await?;
    }

    let env = ctx.environment();

    ctx.publish_progress(2, total, "sdkmanager --update");
    ctx.stream_checked(&sdk::update(&paths, &env)).await?;

    ctx.publish_progress(3, total, "licenses");
    ctx.publish_log("Accepting licenses...");
    let licenses = ctx.capture(&sdk::accept_licenses(&paths, &env)).await?;
    if licenses.timed_out {
        return Err(TaskError::Timeout {
            what: "license acceptance".into(),
            after: sdk::LICENSE_TIMEOUT,
        });
    }
    if !licenses.success() {
        return Err(TaskError::command_failed(
            "sdkmanager --licenses",
            licenses.status_label(),
        ));
    }

    // Every package is attempted; failures are collected for the summary.
    let mut failed = Vec::new();
    for (index, package) in REQUIRED_PACKAGES.iter().enumerate() {
        ctx.publish_progress(4 + index, total, package);
        match ctx.stream(&sdk::install_package(&paths, &env, package)).await {
            Ok(exit) if exit.success() => {}
            Ok(exit) => {
                ctx.publish_log(format!("[!] {package}: {}", exit.describe()));
                failed.push(format!("{package} ({})", exit.describe()));
            }
            Err(err) => {
                ctx.publish_log(format!("[!] {package}: {err}"));
                failed.push(format!("{package} ({err})"));
            }
        }
    }

    if failed.is_empty() {
        ctx.publish_log("SDK install finished.");
        Ok(())
    } else {
        Err(TaskError::command_failed(
            "sdkmanager",
            format!("packages failed: {}", failed.join(", ")),
        ))
    }
}

pub(crate) async fn run_create_device_task(ctx: TaskContext) -> Result<(), TaskError> {
    let paths = ctx.session.paths();
    let env = ctx.environment();
    ctx.stream_checked(&sdk::create_avd(paths, &env, ctx.session.avd_name()))
        .await?;
    ctx.publish_log("AVD created.");
    Ok(())
}

pub(crate) async fn run_start_task(ctx: TaskContext) -> Result<(), TaskError> {
    let paths = ctx.session.paths();
    let env = ctx.environment();
    let spec = sdk::launch_emulator(paths, &env, ctx.session.avd_name());
    ctx.publish_log(format!("> {}", spec.display()));
    let pid = ctx.runner.spawn_detached(&spec).await?;
    info!("emulator started with pid {pid}");
    ctx.publish_log("Start command sent. Waiting for ADB...");

    let serial = DEFAULT_SERIAL;
    ctx.events.device_state(serial, DeviceState::Booting);
    let tracker = DeviceTracker::new(ctx.adb());
    if tracker.await_online(serial, BOOT_TIMEOUT).await {
        ctx.learn_identity(serial).await;
        ctx.events.device_state(serial, DeviceState::Online);
        ctx.events.send(AppEvent::DevicesListed {
            serials: vec![serial.to_string()],
            default: ctx.session.default_identity(),
        });
        ctx.publish_log(format!("Device {serial} is online."));
        Ok(())
    } else {
        ctx.events.device_state(serial, DeviceState::Offline);
        Err(TaskError::DeviceUnreachable(serial.to_string()))
    }
}

pub(crate) async fn run_stop_task(ctx: TaskContext) -> Result<(), TaskError> {
    let serial = resolve_target(None, ctx.session.default_identity().as_deref());
    let adb = ctx.adb();
    let kill = adb.spec(Some(serial.as_str()), &["emu", "kill"]);
    ctx.publish_log(format!("> {}", kill.display()));
    let output = adb.emu_kill(&serial).await?;
    ctx.publish_log(output.first_non_empty().unwrap_or("Kill sent."));

    match adb.wait_for_disconnect(&serial, DISCONNECT_TIMEOUT).await {
        Ok(()) => {
            ctx.events.device_state(&serial, DeviceState::Offline);
            ctx.publish_log("Emulator disconnected.");
            Ok(())
        }
        Err(AdbFailure::Timeout(after)) => {
            ctx.publish_log(
                "[!] Timeout waiting for disconnect. If the emulator window is still open, close it manually.",
            );
            Err(TaskError::Timeout {
                what: "disconnect".into(),
                after,
            })
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn run_open_app_task(ctx: TaskContext) -> Result<(), TaskError> {
    let serial = ctx.session.default_identity();
    let adb = ctx.adb();
    let args = [
        "shell",
        "monkey",
        "-p",
        PLAY_STORE_PACKAGE,
        "-c",
        "android.intent.category.LAUNCHER",
        "1",
    ];
    ctx.publish_log(format!("> {}", adb.spec(serial.as_deref(), &args).display()));
    let output = adb.launch_app(serial.as_deref(), PLAY_STORE_PACKAGE).await?;
    ctx.publish_log(output.first_non_empty().unwrap_or("Launched."));
    Ok(())
}

pub(crate) async fn run_list_devices_task(ctx: TaskContext) -> Result<(), TaskError> {
    let (output, devices) = ctx.adb().devices().await?;
    if let Some(text) = output.first_non_empty() {
        ctx.publish_log(text);
    }

    let serials: Vec<String> = devices.into_iter().map(|device| device.serial).collect();
    if let Some(serial) = select_default_serial(serials.iter().map(String::as_str)) {
        ctx.learn_identity(serial).await;
    }
    for serial in &serials {
        ctx.events.device_state(serial, DeviceState::Online);
    }
    if serials.is_empty() {
        ctx.publish_log("No devices attached.");
    }
    ctx.events.send(AppEvent::DevicesListed {
        serials,
        default: ctx.session.default_identity(),
    });
    Ok(())
}
