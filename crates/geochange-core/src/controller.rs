use std::{future::Future, sync::Arc};

use geochange_process::CommandRunner;
use geochange_targets::{DeviceTracker, GeoDispatcher, TeleportReport, TeleportRequest};
use geochange_telemetry as telemetry;
use geochange_toolchain::{cmdline_tools_url, Availability};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::TaskError;
use crate::events::EventSender;
use crate::lifecycle::{
    adb_client, run_create_device_task, run_install_task, run_list_devices_task, run_open_app_task,
    run_start_task, run_stop_task, TaskContext,
};
use crate::session::Session;
use crate::spawner::TaskSpawner;
use crate::tasks::{TaskKind, TaskRegistry, TaskState};

pub struct TaskTicket {
    kind: TaskKind,
    handle: JoinHandle<TaskState>,
}

impl TaskTicket {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> TaskState {
        match self.handle.await {
            Ok(state) => state,
            Err(err) => TaskState::Failed(format!("task panicked: {err}")),
        }
    }
}

struct Inner {
    session: Arc<Session>,
    runner: Arc<dyn CommandRunner>,
    events: EventSender,
    registry: Arc<TaskRegistry>,
    spawner: TaskSpawner,
    cmdline_tools_url: String,
}

#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(
        session: Arc<Session>,
        runner: Arc<dyn CommandRunner>,
        events: EventSender,
        spawner: TaskSpawner,
    ) -> Self {
        let cmdline_tools_url = cmdline_tools_url(session.paths().host());
        Self {
            inner: Arc::new(Inner {
                registry: TaskRegistry::new(events.clone()),
                session,
                runner,
                events,
                spawner,
                cmdline_tools_url,
            }),
        }
    }

    pub fn with_cmdline_tools_url(self, url: impl Into<String>) -> Self {
        let inner = Inner {
            session: Arc::clone(&self.inner.session),
            runner: Arc::clone(&self.inner.runner),
            events: self.inner.events.clone(),
            registry: Arc::clone(&self.inner.registry),
            spawner: self.inner.spawner.clone(),
            cmdline_tools_url: url.into(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    pub fn events(&self) -> &EventSender {
        &self.inner.events
    }

    pub fn spawner(&self) -> &TaskSpawner {
        &self.inner.spawner
    }

    pub fn task_state(&self, kind: TaskKind) -> TaskState {
        self.inner.registry.state(kind)
    }

    pub fn task_states(&self) -> Vec<(TaskKind, TaskState)> {
        self.inner.registry.snapshot()
    }

    pub fn install(&self) -> Result<TaskTicket, TaskError> {
        let url = self.inner.cmdline_tools_url.clone();
        self.launch(TaskKind::Install, move |ctx| run_install_task(ctx, url))
    }

    pub fn create_device(&self) -> Result<TaskTicket, TaskError> {
        self.launch(TaskKind::CreateDevice, run_create_device_task)
    }

    pub fn start_device(&self) -> Result<TaskTicket, TaskError> {
        self.launch(TaskKind::Start, run_start_task)
    }

    pub fn stop_device(&self) -> Result<TaskTicket, TaskError> {
        self.launch(TaskKind::Stop, run_stop_task)
    }

    pub fn open_app(&self) -> Result<TaskTicket, TaskError> {
        self.launch(TaskKind::OpenApp, run_open_app_task)
    }

    pub fn list_devices(&self) -> Result<TaskTicket, TaskError> {
        self.launch(TaskKind::ListDevices, run_list_devices_task)
    }

    pub fn teleport(&self, request: TeleportRequest) -> JoinHandle<TeleportReport> {
        self.inner.spawner.spawn(self.teleport_job(request))
    }

    pub(crate) fn teleport_job(
        &self,
        request: TeleportRequest,
    ) -> impl Future<Output = TeleportReport> + Send + 'static {
        let session = Arc::clone(&self.inner.session);
        let adb = adb_client(&session, Arc::clone(&self.inner.runner));
        let events = self.inner.events.clone();
        async move {
            telemetry::event("teleport", &[]);
            let dispatcher = GeoDispatcher::new(DeviceTracker::new(adb));
            let default = session.default_identity();
            let report = dispatcher.teleport(&request, default.as_deref()).await;
            events.log("teleport", report.summary());
            report
        }
    }

    pub fn refresh_availability(&self) -> Availability {
        let availability = self.inner.session.availability();
        self.inner.events.availability(availability);
        availability
    }

    fn context(&self, kind: TaskKind) -> TaskContext {
        TaskContext {
            kind,
            session: Arc::clone(&self.inner.session),
            runner: Arc::clone(&self.inner.runner),
            events: self.inner.events.clone(),
        }
    }

    fn launch<F, Fut>(&self, kind: TaskKind, body: F) -> Result<TaskTicket, TaskError>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let guard = self.inner.registry.try_begin(kind)?;
        let ctx = self.context(kind);
        let fut = body(ctx.clone());
        let controller = self.clone();
        info!("task {kind} started");
        telemetry::event("task.start", &[("task", kind.label())]);

        let handle = self.inner.spawner.spawn(async move {
            let result = fut.await;
            if kind.refreshes_availability() {
                controller.refresh_availability();
            }
            let state = match result {
                Ok(()) => TaskState::Succeeded,
                Err(err) => {
                    warn!("task {kind} failed: {err}");
                    ctx.publish_log(format!("[ERROR] {err}"));
                    TaskState::Failed(err.to_string())
                }
            };
            let outcome = if matches!(state, TaskState::Succeeded) {
                "succeeded"
            } else {
                "failed"
            };
            telemetry::event(
                "task.finish",
                &[("task", kind.label()), ("result", outcome)],
            );
            guard.finish(state)
        });
        Ok(TaskTicket { kind, handle })
    }
}
