use std::{
    error::Error,
    future::Future,
    io::{self, BufRead},
    sync::Arc,
    thread,
};

use geochange_core::{
    config::config_path, AppConfig, AppEvent, Bridge, Controller, EventQueue, LocationStore,
    Session, TaskError, TaskSpawner, TaskState, TaskTicket,
};
use geochange_process::SystemRunner;
use geochange_targets::TeleportReport;
use clap::Parser;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::cli::{Cmd, ConsoleCmd, ConsoleLine, LocationsCmd};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Serialize)]
struct StatusReport {
    sdk_root: String,
    avd_home: String,
    avd_name: String,
    cmdline_tools_installed: bool,
    emulator_installed: bool,
    avd_exists: bool,
    install_enabled: bool,
    create_enabled: bool,
    default_target: Option<String>,
    locations_file: String,
}

pub struct App {
    controller: Controller,
    bridge: Bridge,
    queue: Arc<EventQueue>,
    notify: mpsc::Receiver<()>,
    target: Option<String>,
}

impl App {
    pub fn new(config: &AppConfig, target: Option<String>) -> Self {
        let target = target.filter(|t| !t.trim().is_empty());
        let (queue, notify) = EventQueue::new();
        let session = Session::new(config.toolchain_paths(), config.avd_name.clone())
            .with_config_path(config_path());
        let session = match target.clone() {
            Some(pinned) => session.with_pinned_identity(pinned),
            None => session.with_default_identity(config.default_target()),
        };
        let controller = Controller::new(
            Arc::new(session),
            Arc::new(SystemRunner),
            queue.sender(),
            TaskSpawner::current(config.max_parallel_tasks),
        );
        let bridge = Bridge::new(Arc::new(LocationStore::open_default()), controller.clone());
        Self {
            controller,
            bridge,
            queue,
            notify,
            target,
        }
    }

    pub async fn execute(&mut self, cmd: Cmd, wait: bool) -> CliResult {
        let launched = match cmd {
            Cmd::Install => self.controller.install(),
            Cmd::CreateAvd => self.controller.create_device(),
            Cmd::Start => self.controller.start_device(),
            Cmd::Stop => self.controller.stop_device(),
            Cmd::OpenPlayStore => self.controller.open_app(),
            Cmd::Devices => self.controller.list_devices(),
            Cmd::Status { json } => return self.status(json),
            Cmd::Teleport { lat, lon } => {
                let handle = self.bridge.teleport(lat, lon, self.target.as_deref());
                return self.finish_teleport(handle, wait).await;
            }
            Cmd::Locations { cmd } => return self.locations(cmd, wait).await,
            Cmd::Config { cmd } => return crate::config_command(cmd),
            Cmd::Console => return Err("already in the console".into()),
        };
        self.finish_task(launched, wait).await
    }

    pub async fn console(&mut self) -> CliResult {
        let (tx, mut lines) = mpsc::unbounded_channel::<String>();
        thread::Builder::new()
            .name("geochange-stdin".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        println!("geochange console. Type `help` for commands, `quit` to leave.");
        let listing = self.controller.list_devices();
        self.finish_task(listing, false).await?;

        loop {
            tokio::select! {
                Some(()) = self.notify.recv() => self.pump(),
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    match self.console_line(&line).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => eprintln!("error: {err}"),
                    }
                }
            }
        }
        self.pump();
        Ok(())
    }

    async fn console_line(&mut self, line: &str) -> Result<bool, Box<dyn Error>> {
        let words = crate::cli::split_line(line);
        if words.is_empty() {
            return Ok(true);
        }
        match ConsoleLine::try_parse_from(words) {
            Ok(ConsoleLine {
                cmd: ConsoleCmd::Quit,
            }) => Ok(false),
            Ok(ConsoleLine {
                cmd: ConsoleCmd::Run(cmd),
            }) => {
                self.execute(cmd, false).await?;
                Ok(true)
            }
            Err(err) => {
                err.print()?;
                Ok(true)
            }
        }
    }

    async fn finish_task(&mut self, launched: Result<TaskTicket, TaskError>, wait: bool) -> CliResult {
        let ticket = launched?;
        if !wait {
            return Ok(());
        }
        let kind = ticket.kind();
        match self.drive(ticket.wait()).await {
            TaskState::Failed(reason) => Err(format!("{kind} failed: {reason}").into()),
            _ => Ok(()),
        }
    }

    async fn finish_teleport(&mut self, handle: JoinHandle<TeleportReport>, wait: bool) -> CliResult {
        if !wait {
            return Ok(());
        }
        let report = self.drive(handle).await?;
        if report.dispatched {
            Ok(())
        } else {
            Err(report.summary().into())
        }
    }

    async fn locations(&mut self, cmd: LocationsCmd, wait: bool) -> CliResult {
        match cmd {
            LocationsCmd::List => {
                let listing = self.bridge.request_items();
                let items = self.drive(listing).await?;
                if items.is_empty() {
                    println!("No saved locations.");
                }
                for item in items {
                    println!("{}\t{}\t{}", item.name, item.latitude, item.longitude);
                }
            }
            LocationsCmd::Save { name, lat, lon } => {
                if name.trim().is_empty() {
                    return Err("location name must not be blank".into());
                }
                let saving = self.bridge.save_item(&name, lat, lon);
                self.drive(saving).await??;
                println!("Saved {}.", name.trim());
            }
            LocationsCmd::Delete { name } => {
                let deleting = self.bridge.delete_item(&name);
                self.drive(deleting).await??;
                println!("Deleted {}.", name.trim());
            }
            LocationsCmd::Goto { name } => {
                let handle = self.bridge.goto(&name, self.target.as_deref());
                if !wait {
                    return Ok(());
                }
                let Some(report) = self.drive(handle).await? else {
                    return Err(format!("no saved location named {:?}", name.trim()).into());
                };
                if !report.dispatched {
                    return Err(report.summary().into());
                }
            }
        }
        self.pump();
        Ok(())
    }

    fn status(&self, json: bool) -> CliResult {
        let session = self.controller.session();
        let paths = session.paths();
        let availability = session.availability();
        let report = StatusReport {
            sdk_root: paths.sdk_root().display().to_string(),
            avd_home: paths.avd_home().display().to_string(),
            avd_name: session.avd_name().to_string(),
            cmdline_tools_installed: paths.cmdline_tools_installed(),
            emulator_installed: paths.emulator_installed(),
            avd_exists: paths.avd_exists(session.avd_name()),
            install_enabled: availability.install_enabled,
            create_enabled: availability.create_enabled,
            default_target: session.default_identity(),
            locations_file: self.bridge.store().path().display().to_string(),
        };
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        println!("sdk root        {}", report.sdk_root);
        println!("avd home        {}", report.avd_home);
        println!("avd             {} ({})", report.avd_name, present(report.avd_exists));
        println!("cmdline-tools   {}", present(report.cmdline_tools_installed));
        println!("emulator        {}", present(report.emulator_installed));
        println!(
            "next step       {}",
            if report.install_enabled {
                "install"
            } else if report.create_enabled {
                "create-avd"
            } else {
                "start"
            }
        );
        println!(
            "target          {}",
            report.default_target.as_deref().unwrap_or("(none)")
        );
        println!("locations       {}", report.locations_file);
        Ok(())
    }

    async fn drive<F: Future>(&mut self, fut: F) -> F::Output {
        tokio::pin!(fut);
        let output = loop {
            tokio::select! {
                output = &mut fut => break output,
                Some(()) = self.notify.recv() => self.pump(),
            }
        };
        self.pump();
        output
    }

    fn pump(&mut self) {
        for event in self.queue.drain() {
            render(event);
        }
    }
}

fn render(event: AppEvent) {
    match event {
        AppEvent::Log { source, line } => println!("[{source}] {line}"),
        AppEvent::Progress {
            kind,
            step,
            total,
            label,
        } => println!("[{kind}] step {step}/{total}: {label}"),
        AppEvent::TaskState { kind, state } => {
            if state.is_terminal() {
                println!("[{kind}] {state}");
            }
        }
        AppEvent::Availability(availability) => println!(
            "[setup] install {}, create-avd {}",
            enabled(availability.install_enabled),
            enabled(availability.create_enabled)
        ),
        AppEvent::DeviceState { serial, state } => println!("[device] {serial}: {state}"),
        AppEvent::DevicesListed { default, .. } => {
            if let Some(serial) = default {
                println!("[devices] default target {serial}");
            }
        }
        AppEvent::BookmarksChanged { json } => debug!("bookmarks changed: {json}"),
    }
}

fn present(yes: bool) -> &'static str {
    if yes {
        "present"
    } else {
        "missing"
    }
}

fn enabled(yes: bool) -> &'static str {
    if yes {
        "enabled"
    } else {
        "disabled"
    }
}
