use std::{path::PathBuf, time::Duration};

use crate::env::ProcessEnvironment;

#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Option<ProcessEnvironment>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: ProcessEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    pub fn has_args(&self, pattern: &[&str]) -> bool {
        if pattern.is_empty() {
            return true;
        }
        self.args
            .windows(pattern.len())
            .any(|window| window.iter().zip(pattern).all(|(a, b)| a == b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("/sdk/platform-tools/adb").args(["-s", "emulator-5554", "get-state"]);
        assert_eq!(spec.display(), "/sdk/platform-tools/adb -s emulator-5554 get-state");
        assert_eq!(spec.program_name(), "adb");
    }

    #[test]
    fn has_args_matches_contiguous_runs_only() {
        let spec = CommandSpec::new("adb").args(["-s", "x", "emu", "geo", "fix"]);
        assert!(spec.has_args(&["emu", "geo"]));
        assert!(!spec.has_args(&["emu", "fix"]));
        assert!(spec.has_args(&[]));
    }
}
