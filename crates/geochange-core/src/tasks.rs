use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;

use crate::error::TaskError;
use crate::events::EventSender;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Install,
    CreateDevice,
    Start,
    Stop,
    OpenApp,
    ListDevices,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Install,
        TaskKind::CreateDevice,
        TaskKind::Start,
        TaskKind::Stop,
        TaskKind::OpenApp,
        TaskKind::ListDevices,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Install => "install",
            TaskKind::CreateDevice => "create-device",
            TaskKind::Start => "start",
            TaskKind::Stop => "stop",
            TaskKind::OpenApp => "open-app",
            TaskKind::ListDevices => "list-devices",
        }
    }

    pub fn refreshes_availability(self) -> bool {
        matches!(self, TaskKind::Install | TaskKind::CreateDevice)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed(String),
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed(_))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Idle => f.write_str("idle"),
            TaskState::Running => f.write_str("running"),
            TaskState::Succeeded => f.write_str("succeeded"),
            TaskState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

pub struct TaskRegistry {
    states: Mutex<HashMap<TaskKind, TaskState>>,
    events: EventSender,
}

impl TaskRegistry {
    pub fn new(events: EventSender) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn state(&self, kind: TaskKind) -> TaskState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<(TaskKind, TaskState)> {
        TaskKind::ALL
            .into_iter()
            .map(|kind| (kind, self.state(kind)))
            .collect()
    }

    pub fn try_begin(self: &Arc<Self>, kind: TaskKind) -> Result<TaskGuard, TaskError> {
        {
            let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = states.entry(kind).or_default();
            if slot.is_running() {
                return Err(TaskError::Busy(kind));
            }
            *slot = TaskState::Running;
        }
        self.events.task_state(kind, TaskState::Running);
        Ok(TaskGuard {
            registry: Arc::clone(self),
            kind,
            finished: false,
        })
    }

    fn set(&self, kind: TaskKind, state: TaskState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, state.clone());
        self.events.task_state(kind, state);
    }
}

/// Holds a task kind in `Running`. Dropping it without [`TaskGuard::finish`] (a panicked or
/// aborted task) records a failure so the kind can be started again.
pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    kind: TaskKind,
    finished: bool,
}

impl TaskGuard {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn finish(mut self, state: TaskState) -> TaskState {
        self.finished = true;
        self.registry.set(self.kind, state.clone());
        state
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.registry
                .set(self.kind, TaskState::Failed("task aborted".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AppEvent, EventQueue};

    #[test]
    fn duplicate_kind_is_rejected_until_finished() {
        let (queue, _notify) = EventQueue::new();
        let registry = TaskRegistry::new(queue.sender());

        let guard = registry.try_begin(TaskKind::Install).unwrap();
        assert!(matches!(
            registry.try_begin(TaskKind::Install),
            Err(TaskError::Busy(TaskKind::Install))
        ));
        let other = registry.try_begin(TaskKind::Start).unwrap();

        guard.finish(TaskState::Succeeded);
        assert_eq!(registry.state(TaskKind::Install), TaskState::Succeeded);
        let again = registry.try_begin(TaskKind::Install).unwrap();
        again.finish(TaskState::Failed("boom".into()));
        other.finish(TaskState::Succeeded);

        let states: Vec<_> = queue
            .drain()
            .into_iter()
            .filter_map(|ev| match ev {
                AppEvent::TaskState {
                    kind: TaskKind::Install,
                    state,
                } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                TaskState::Running,
                TaskState::Succeeded,
                TaskState::Running,
                TaskState::Failed("boom".into())
            ]
        );
    }

    #[test]
    fn dropped_guard_marks_failure() {
        let (queue, _notify) = EventQueue::new();
        let registry = TaskRegistry::new(queue.sender());
        drop(registry.try_begin(TaskKind::Stop).unwrap());
        assert_eq!(
            registry.state(TaskKind::Stop),
            TaskState::Failed("task aborted".into())
        );
        assert!(registry.try_begin(TaskKind::Stop).is_ok());
    }

    #[test]
    fn snapshot_covers_every_kind() {
        let (queue, _notify) = EventQueue::new();
        let registry = TaskRegistry::new(queue.sender());
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 6);
        assert!(snapshot.iter().all(|(_, state)| *state == TaskState::Idle));
    }
}
