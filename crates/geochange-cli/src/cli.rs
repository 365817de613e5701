use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "geochange",
    version,
    about = "Android emulator manager and location spoofer"
)]
pub struct Cli {
    /// Android SDK root (overrides config and GEOCHANGE_SDK_ROOT)
    #[arg(long, global = true)]
    pub sdk_root: Option<String>,
    /// AVD to create and start
    #[arg(long, global = true)]
    pub avd_name: Option<String>,
    /// Device identity to act on instead of the remembered one
    #[arg(long, global = true)]
    pub target: Option<String>,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Install command-line tools, platform tools, emulator and system image
    Install,
    /// Create the AVD
    CreateAvd,
    /// Boot the emulator and wait for it to come online
    Start,
    /// Kill the emulator and wait for it to disconnect
    Stop,
    /// Launch the Play Store on the device
    OpenPlayStore,
    /// List attached devices and remember the first emulator
    Devices,
    /// Show toolchain and AVD status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Move the device to the given coordinates
    Teleport {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Saved locations
    Locations {
        #[command(subcommand)]
        cmd: LocationsCmd,
    },
    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
    /// Read commands from stdin while events keep printing
    Console,
}

#[derive(Debug, Subcommand)]
pub enum LocationsCmd {
    List,
    Save {
        name: String,
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lon: f64,
    },
    Delete {
        name: String,
    },
    /// Teleport to a saved location
    Goto {
        name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    Show,
    Get { key: String },
    Set { key: String, value: String },
}

#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub cmd: ConsoleCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConsoleCmd {
    #[command(flatten)]
    Run(Cmd),
    /// Leave the console
    #[command(alias = "exit")]
    Quit,
}

pub fn split_line(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    words.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        words.push(current);
    }
    words
}
