use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};

const PENDING_EVENTS: usize = 256;
const ROTATE_AT: u64 = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct TelemetryOptions {
    pub app: &'static str,
    pub version: &'static str,
    pub dir: PathBuf,
    pub usage: bool,
    pub crashes: bool,
}

struct Sink {
    app: &'static str,
    version: &'static str,
    run_id: String,
    events: Option<SyncSender<String>>,
}

static SINK: OnceLock<Sink> = OnceLock::new();

pub fn install(options: TelemetryOptions) -> bool {
    if SINK.get().is_some() {
        return false;
    }
    let run_id = format!("{:x}-{:x}", unix_millis(), std::process::id());

    let events = options.usage.then(|| {
        let (tx, rx) = sync_channel::<String>(PENDING_EVENTS);
        let mut log = EventLog::new(options.dir.join("events.jsonl"), ROTATE_AT);
        let spawned = std::thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || {
                for line in rx {
                    if let Err(err) = log.append(&line) {
                        eprintln!("telemetry: {err}");
                    }
                }
            });
        spawned.ok().map(|_| tx)
    });

    if options.crashes {
        let dir = options.dir.join("crashes");
        let (app, version, id) = (options.app, options.version, run_id.clone());
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = write_crash(&dir, &crash_record(app, version, &id, info));
            previous(info);
        }));
    }

    SINK.set(Sink {
        app: options.app,
        version: options.version,
        run_id,
        events: events.flatten(),
    })
    .is_ok()
}

pub fn event(name: &str, properties: &[(&str, &str)]) {
    let Some(sink) = SINK.get() else { return };
    let Some(events) = sink.events.as_ref() else {
        return;
    };
    let props: Map<String, Value> = properties
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), Value::from(*value)))
        .collect();
    let line = json!({
        "event": name,
        "at": unix_millis(),
        "app": sink.app,
        "version": sink.version,
        "run": sink.run_id,
        "props": props,
    });
    let _ = events.try_send(line.to_string());
}

struct EventLog {
    path: PathBuf,
    limit: u64,
    file: Option<File>,
    size: u64,
}

impl EventLog {
    fn new(path: PathBuf, limit: u64) -> Self {
        Self {
            path,
            limit,
            file: None,
            size: 0,
        }
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        if self.file.is_some() && self.size >= self.limit {
            self.file = None;
            let mut rotated = self.path.clone().into_os_string();
            rotated.push(".1");
            fs::rename(&self.path, rotated)?;
        }
        if self.file.is_none() {
            if let Some(dir) = self.path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.size = file.metadata()?.len();
            self.file = Some(file);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        self.size += line.len() as u64 + 1;
        Ok(())
    }
}

fn crash_record(app: &str, version: &str, run_id: &str, info: &PanicHookInfo<'_>) -> Value {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".into());
    json!({
        "at": unix_millis(),
        "app": app,
        "version": version,
        "run": run_id,
        "message": message,
        "location": info.location().map(|loc| format!("{}:{}", loc.file(), loc.line())),
        "backtrace": std::backtrace::Backtrace::force_capture().to_string(),
    })
}

fn write_crash(dir: &Path, record: &Value) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("crash-{}-{}.json", unix_millis(), std::process::id()));
    let body = serde_json::to_vec_pretty(record).map_err(io::Error::other)?;
    fs::write(&path, body)?;
    Ok(path)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_rotates_once_over_the_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let path = dir.join("events.jsonl");
        let mut log = EventLog::new(path.clone(), 20);

        log.append("{\"n\":1234567890}").unwrap();
        log.append("{\"n\":2}").unwrap();
        log.append("{\"n\":3}").unwrap();

        let rotated = fs::read_to_string(dir.join("events.jsonl.1")).unwrap();
        assert_eq!(rotated.lines().count(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"n\":3}\n");
    }

    #[test]
    fn event_log_counts_existing_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("events.jsonl");
        fs::write(&path, "x".repeat(30)).unwrap();

        let mut log = EventLog::new(path.clone(), 20);
        log.append("a").unwrap();
        log.append("b").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "b\n");
    }

    #[test]
    fn crash_files_are_pretty_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_crash(&tmp.path().join("crashes"), &json!({ "message": "boom" })).unwrap();
        let back: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["message"], "boom");
    }
}
