mod artifacts;
mod locator;
pub mod sdk;

pub use artifacts::{
    cached_archive_path, download_archive, extract_zip, finalize_cmdline_tools,
    install_cmdline_tools, InstallError,
};
pub use locator::{
    cmdline_tools_url, Availability, HostOs, ToolchainPaths, CMDLINE_TOOLS_BUILD,
    DEFAULT_AVD_NAME, DEVICE_PROFILE, REQUIRED_PACKAGES, SYSTEM_IMAGE,
};
