use std::{fmt, io, path::Path, process::Output};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CaptureOutput {
    pub fn from_output(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn first_non_empty(&self) -> Option<&str> {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .find(|text| !text.is_empty())
    }

    pub fn log(&self) -> String {
        format_output(&self.stdout, &self.stderr)
    }

    pub fn status_label(&self) -> String {
        if self.timed_out {
            "timed out".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exit {code}"),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

pub fn format_output(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    let mut out = String::new();

    if !stdout.is_empty() {
        out.push_str("stdout:\n");
        out.push_str(stdout);
        out.push('\n');
    }
    if !stderr.is_empty() {
        out.push_str("stderr:\n");
        out.push_str(stderr);
        out.push('\n');
    }

    out
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessFailure {
    NotFound { program: String },
    Io(String),
}

impl ProcessFailure {
    pub fn from_spawn(program: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            ProcessFailure::NotFound {
                program: program.display().to_string(),
            }
        } else {
            ProcessFailure::Io(format!("{}: {err}", program.display()))
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessFailure::NotFound { .. })
    }
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessFailure::NotFound { program } => write!(f, "{program} not found"),
            ProcessFailure::Io(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ProcessFailure {}
