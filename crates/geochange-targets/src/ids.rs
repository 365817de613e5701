pub const DEFAULT_SERIAL: &str = "emulator-5554";

const EMULATOR_PREFIX: &str = "emulator-";

pub(crate) fn normalize_adb_addr(addr: &str) -> String {
    let addr = addr.trim();
    let lower = addr.to_ascii_lowercase();
    for prefix in ["localhost:", "127.0.0.1:", "0.0.0.0:", "[::1]:", "[::]:"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return format!("localhost:{rest}");
        }
    }
    addr.to_string()
}

pub fn normalize_target_id(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains(':') {
        return normalize_adb_addr(trimmed);
    }
    trimmed.to_string()
}

pub fn is_emulator_serial(serial: &str) -> bool {
    serial.starts_with(EMULATOR_PREFIX)
}

pub fn select_default_serial<'a, I>(serials: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    serials.into_iter().find(|serial| is_emulator_serial(serial))
}

/// Explicit identity, else the session default, else [`DEFAULT_SERIAL`]. Blank values count
/// as absent.
pub fn resolve_target(explicit: Option<&str>, session_default: Option<&str>) -> String {
    [explicit, session_default]
        .into_iter()
        .flatten()
        .map(normalize_target_id)
        .find(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_SERIAL.to_string())
}
