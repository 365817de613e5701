mod app;
mod cli;

use clap::Parser;
use geochange_core::{config::config_path, AppConfig};
use tracing::info;

use crate::app::App;
use crate::cli::{Cli, Cmd, ConfigCmd};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    geochange_util::init_tracing()?;
    geochange_util::init_app_telemetry("geochange", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load();
    if let Some(root) = cli.sdk_root {
        config.sdk_root = root;
    }
    if let Some(name) = cli.avd_name {
        config.avd_name = name;
    }
    if let Cmd::Config { cmd } = cli.cmd {
        return config_command(cmd);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("geochange-worker")
        .enable_all()
        .build()?;
    info!(
        "runtime with {} workers, {} parallel tasks",
        config.worker_threads, config.max_parallel_tasks
    );

    let target = cli.target;
    let cmd = cli.cmd;
    runtime.block_on(async move {
        let mut app = App::new(&config, target);
        match cmd {
            Cmd::Console => app.console().await,
            cmd => app.execute(cmd, true).await,
        }
    })
}

pub(crate) fn config_command(cmd: ConfigCmd) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCmd::Show => {
            let cfg = AppConfig::load();
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            println!("# {}", config_path().display());
        }
        ConfigCmd::Get { key } => println!("{}", AppConfig::load().get(&key)?),
        ConfigCmd::Set { key, value } => {
            // Environment overrides are not written back.
            let path = config_path();
            let mut saved = AppConfig::load_with(&path, |_| None);
            saved.set(&key, &value)?;
            saved.save_to(&path)?;
            println!("{key} = {}", saved.get(&key)?);
        }
    }
    Ok(())
}
