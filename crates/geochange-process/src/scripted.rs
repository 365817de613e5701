use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    output::{CaptureOutput, ProcessFailure},
    runner::{bounded, CommandRunner},
    spec::CommandSpec,
    stream::{LineStream, StreamExit},
};

#[derive(Clone, Debug)]
pub enum Reply {
    Output {
        code: i32,
        stdout: String,
        stderr: String,
        delay: Duration,
    },
    Lines {
        lines: Vec<String>,
        code: i32,
    },
    Fail(ProcessFailure),
}

impl Reply {
    pub fn stdout(text: &str) -> Self {
        Reply::Output {
            code: 0,
            stdout: text.to_string(),
            stderr: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn exit(code: i32) -> Self {
        Reply::Output {
            code,
            stdout: String::new(),
            stderr: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(delay: Duration, text: &str) -> Self {
        Reply::Output {
            code: 0,
            stdout: text.to_string(),
            stderr: String::new(),
            delay,
        }
    }

    pub fn lines(lines: &[&str], code: i32) -> Self {
        Reply::Lines {
            lines: lines.iter().map(|line| line.to_string()).collect(),
            code,
        }
    }
}

struct Rule {
    pattern: Vec<String>,
    reply: Reply,
}

/// In-memory stand-in for the SDK tools. Rules are matched in insertion order; commands
/// that match nothing succeed silently. Every invocation is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &[&str], reply: Reply) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                pattern: pattern.iter().map(|part| part.to_string()).collect(),
                reply,
            });
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn arg_lists(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|spec| spec.args).collect()
    }

    pub fn was_called_with(&self, pattern: &[&str]) -> bool {
        self.calls().iter().any(|spec| spec.has_args(pattern))
    }

    fn reply_for(&self, spec: &CommandSpec) -> Option<Reply> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());
        let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        rules.iter().find_map(|rule| {
            let pattern: Vec<&str> = rule.pattern.iter().map(String::as_str).collect();
            spec.has_args(&pattern).then(|| rule.reply.clone())
        })
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn capture(&self, spec: &CommandSpec) -> Result<CaptureOutput, ProcessFailure> {
        let reply = self.reply_for(spec).unwrap_or_else(|| Reply::exit(0));
        let answer = async move {
            match reply {
                Reply::Output {
                    code,
                    stdout,
                    stderr,
                    delay,
                } => {
                    tokio::time::sleep(delay).await;
                    Ok(CaptureOutput {
                        exit_code: Some(code),
                        stdout,
                        stderr,
                        timed_out: false,
                    })
                }
                Reply::Lines { lines, code } => Ok(CaptureOutput {
                    exit_code: Some(code),
                    stdout: lines.join("\n"),
                    stderr: String::new(),
                    timed_out: false,
                }),
                Reply::Fail(failure) => Err(failure),
            }
        };
        bounded(spec.timeout, answer).await
    }

    async fn stream(&self, spec: &CommandSpec) -> Result<LineStream, ProcessFailure> {
        let reply = self.reply_for(spec).unwrap_or_else(|| Reply::exit(0));
        let (sink, stream) = LineStream::channel();
        match reply {
            Reply::Lines { lines, code } => {
                for line in lines {
                    sink.line(line);
                }
                sink.exit(StreamExit::code(code));
            }
            Reply::Output { code, stdout, .. } => {
                for line in stdout.lines() {
                    sink.line(line);
                }
                sink.exit(StreamExit::code(code));
            }
            Reply::Fail(failure) => return Err(failure),
        }
        Ok(stream)
    }

    async fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32, ProcessFailure> {
        match self.reply_for(spec) {
            Some(Reply::Fail(failure)) => Err(failure),
            _ => Ok(4242),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_matching_rule_wins_and_calls_are_recorded() {
        let runner = ScriptedRunner::new()
            .on(&["get-state"], Reply::stdout("device\n"))
            .on(&["-s"], Reply::exit(9));

        let spec = CommandSpec::new("adb").args(["-s", "emulator-5554", "get-state"]);
        let out = runner.capture(&spec).await.unwrap();
        assert_eq!(out.stdout, "device\n");
        assert!(runner.was_called_with(&["emulator-5554", "get-state"]));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_reply_honours_spec_timeout() {
        let runner = ScriptedRunner::new().on(
            &["wait-for-device"],
            Reply::delayed(Duration::from_secs(10), ""),
        );
        let spec = CommandSpec::new("adb")
            .arg("wait-for-device")
            .timeout(Duration::from_secs(2));
        let out = runner.capture(&spec).await.unwrap();
        assert!(out.timed_out);
    }
}
