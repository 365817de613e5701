mod env;
mod output;
mod runner;
#[cfg(any(test, feature = "test-support"))]
mod scripted;
mod spec;
mod stream;

pub use env::ProcessEnvironment;
pub use output::{format_output, CaptureOutput, ProcessFailure};
pub use runner::{bounded, CommandRunner, SystemRunner};
#[cfg(any(test, feature = "test-support"))]
pub use scripted::{Reply, ScriptedRunner};
pub use spec::CommandSpec;
pub use stream::{LineSink, LineStream, StreamExit};
