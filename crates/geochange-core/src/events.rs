use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use geochange_targets::DeviceState;
use geochange_toolchain::Availability;
use tokio::sync::mpsc;

use crate::tasks::{TaskKind, TaskState};

#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    Log {
        source: &'static str,
        line: String,
    },
    TaskState {
        kind: TaskKind,
        state: TaskState,
    },
    Progress {
        kind: TaskKind,
        step: usize,
        total: usize,
        label: String,
    },
    Availability(Availability),
    DeviceState {
        serial: String,
        state: DeviceState,
    },
    DevicesListed {
        serials: Vec<String>,
        default: Option<String>,
    },
    BookmarksChanged {
        json: String,
    },
}

/// Unbounded queue drained by a single consumer. A `Progress` or `Availability` replaces the
/// newest pending event when that event is the same kind of update; anything else is queued,
/// so the drained order is always the emission order.
pub struct EventQueue {
    queue: Mutex<VecDeque<AppEvent>>,
    notify: mpsc::Sender<()>,
}

#[derive(Clone)]
pub struct EventSender {
    inner: Arc<EventQueue>,
}

impl EventQueue {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        let (notify, notify_rx) = mpsc::channel(1);
        (
            Arc::new(Self {
                queue: Mutex::new(VecDeque::new()),
                notify,
            }),
            notify_rx,
        )
    }

    pub fn sender(self: &Arc<Self>) -> EventSender {
        EventSender {
            inner: Arc::clone(self),
        }
    }

    pub fn drain(&self) -> Vec<AppEvent> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    fn push(&self, event: AppEvent) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let was_empty = queue.is_empty();

        if let Some(last) = queue.back_mut().filter(|last| supersedes(&event, last)) {
            *last = event;
            return;
        }

        queue.push_back(event);
        if was_empty {
            let _ = self.notify.try_send(());
        }
    }
}

fn supersedes(new: &AppEvent, old: &AppEvent) -> bool {
    match (new, old) {
        (AppEvent::Progress { kind: a, .. }, AppEvent::Progress { kind: b, .. }) => a == b,
        (AppEvent::Availability(_), AppEvent::Availability(_)) => true,
        _ => false,
    }
}

impl EventSender {
    pub fn send(&self, event: AppEvent) {
        self.inner.push(event);
    }

    pub fn log(&self, source: &'static str, line: impl Into<String>) {
        self.send(AppEvent::Log {
            source,
            line: line.into(),
        });
    }

    pub fn task_state(&self, kind: TaskKind, state: TaskState) {
        self.send(AppEvent::TaskState { kind, state });
    }

    pub fn progress(&self, kind: TaskKind, step: usize, total: usize, label: impl Into<String>) {
        self.send(AppEvent::Progress {
            kind,
            step,
            total,
            label: label.into(),
        });
    }

    pub fn availability(&self, availability: Availability) {
        self.send(AppEvent::Availability(availability));
    }

    pub fn device_state(&self, serial: &str, state: DeviceState) {
        self.send(AppEvent::DeviceState {
            serial: serial.to_string(),
            state,
        });
    }
}
