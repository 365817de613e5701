use std::{future::Future, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::Command,
};
use tracing::{debug, warn};

use crate::{
    output::{CaptureOutput, ProcessFailure},
    spec::CommandSpec,
    stream::{LineSink, LineStream, StreamExit},
};

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn capture(&self, spec: &CommandSpec) -> Result<CaptureOutput, ProcessFailure>;

    async fn stream(&self, spec: &CommandSpec) -> Result<LineStream, ProcessFailure>;

    async fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32, ProcessFailure>;
}

/// Applies an optional time limit to a capture. Dropping the inner future on expiry is what
/// terminates the child, so it must own a `kill_on_drop` handle.
pub async fn bounded<F>(limit: Option<Duration>, fut: F) -> Result<CaptureOutput, ProcessFailure>
where
    F: Future<Output = Result<CaptureOutput, ProcessFailure>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Ok(CaptureOutput::timed_out()),
        },
        None => fut.await,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if let Some(env) = spec.env.as_ref() {
        cmd.env_clear();
        cmd.envs(env.iter());
    }
    cmd.stdin(if spec.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd
}

async fn forward_lines<R>(reader: Option<R>, sink: LineSink)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !sink.line(line.trim_end_matches('\r')) {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!("output reader stopped: {err}");
                break;
            }
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn capture(&self, spec: &CommandSpec) -> Result<CaptureOutput, ProcessFailure> {
        let mut cmd = build_command(spec);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|err| ProcessFailure::from_spawn(&spec.program, err))?;

        let stdin = child.stdin.take();
        let payload = spec.stdin.clone();
        let program = spec.program.clone();
        let run = async move {
            if let (Some(mut pipe), Some(payload)) = (stdin, payload) {
                // The child may exit before reading everything; that is not an error here.
                let _ = pipe.write_all(payload.as_bytes()).await;
                drop(pipe);
            }
            child
                .wait_with_output()
                .await
                .map(CaptureOutput::from_output)
                .map_err(|err| ProcessFailure::Io(format!("{}: {err}", program.display())))
        };
        let output = bounded(spec.timeout, run).await?;
        if output.timed_out {
            warn!("{} timed out", spec.display());
        }
        Ok(output)
    }

    async fn stream(&self, spec: &CommandSpec) -> Result<LineStream, ProcessFailure> {
        let mut cmd = build_command(spec);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|err| ProcessFailure::from_spawn(&spec.program, err))?;

        if let (Some(mut pipe), Some(payload)) = (child.stdin.take(), spec.stdin.clone()) {
            tokio::spawn(async move {
                let _ = pipe.write_all(payload.as_bytes()).await;
            });
        }

        let (sink, stream) = LineStream::channel();
        let stdout_task = tokio::spawn(forward_lines(child.stdout.take(), sink.clone()));
        let stderr_task = tokio::spawn(forward_lines(child.stderr.take(), sink.clone()));
        let limit = spec.timeout;

        tokio::spawn(async move {
            let status = match limit {
                Some(limit) => {
                    let waited = tokio::time::timeout(limit, child.wait()).await;
                    match waited {
                        Ok(status) => status,
                        Err(_) => {
                            let _ = child.kill().await;
                            let _ = stdout_task.await;
                            let _ = stderr_task.await;
                            sink.exit(StreamExit {
                                code: None,
                                error: Some(format!("timed out after {}s", limit.as_secs())),
                            });
                            return;
                        }
                    }
                }
                None => child.wait().await,
            };
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            let exit = match status {
                Ok(status) => StreamExit {
                    code: status.code(),
                    error: None,
                },
                Err(err) => StreamExit {
                    code: None,
                    error: Some(err.to_string()),
                },
            };
            sink.exit(exit);
        });

        Ok(stream)
    }

    async fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32, ProcessFailure> {
        let mut cmd = build_command(spec);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        #[cfg(unix)]
        unsafe {
            // New session: the emulator must outlive this process and ignore its terminal.
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        #[cfg(windows)]
        {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }
        let child = cmd
            .spawn()
            .map_err(|err| ProcessFailure::from_spawn(&spec.program, err))?;
        Ok(child.id().unwrap_or_default())
    }
}
