use std::path::{Path, PathBuf};

use geochange_process::ProcessEnvironment;

pub const SYSTEM_IMAGE: &str = "system-images;android-34;google_apis_playstore;x86_64";
pub const DEFAULT_AVD_NAME: &str = "GeoChangePlay";
pub const DEVICE_PROFILE: &str = "pixel_6";
pub const CMDLINE_TOOLS_BUILD: &str = "11076708";

pub const REQUIRED_PACKAGES: [&str; 3] = ["platform-tools", "emulator", SYSTEM_IMAGE];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostOs::Windows
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Linux
        }
    }

    pub fn archive_tag(self) -> &'static str {
        match self {
            HostOs::Windows => "win",
            HostOs::MacOs => "mac",
            HostOs::Linux => "linux",
        }
    }

    fn executable(self, name: &str) -> String {
        match self {
            HostOs::Windows => format!("{name}.exe"),
            _ => name.to_string(),
        }
    }

    fn script(self, name: &str) -> String {
        match self {
            HostOs::Windows => format!("{name}.bat"),
            _ => name.to_string(),
        }
    }
}

pub fn cmdline_tools_url(host: HostOs) -> String {
    format!(
        "https://dl.google.com/android/repository/commandlinetools-{}-{}_latest.zip",
        host.archive_tag(),
        CMDLINE_TOOLS_BUILD
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolchainPaths {
    root: PathBuf,
    sdk_root: PathBuf,
    avd_home: PathBuf,
    host: HostOs,
}

impl ToolchainPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            sdk_root: root.join("sdk"),
            avd_home: root.join("avd"),
            root,
            host: HostOs::current(),
        }
    }

    pub fn with_sdk_root(mut self, sdk_root: impl Into<PathBuf>) -> Self {
        self.sdk_root = sdk_root.into();
        self
    }

    pub fn with_avd_home(mut self, avd_home: impl Into<PathBuf>) -> Self {
        self.avd_home = avd_home.into();
        self
    }

    pub fn with_host(mut self, host: HostOs) -> Self {
        self.host = host;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sdk_root(&self) -> &Path {
        &self.sdk_root
    }

    pub fn avd_home(&self) -> &Path {
        &self.avd_home
    }

    pub fn host(&self) -> HostOs {
        self.host
    }

    pub fn download_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn cmdline_tools_dir(&self) -> PathBuf {
        self.sdk_root.join("cmdline-tools").join("latest")
    }

    pub fn platform_tools_dir(&self) -> PathBuf {
        self.sdk_root.join("platform-tools")
    }

    pub fn emulator_dir(&self) -> PathBuf {
        self.sdk_root.join("emulator")
    }

    pub fn managed_adb(&self) -> PathBuf {
        self.platform_tools_dir().join(self.host.executable("adb"))
    }

    pub fn managed_emulator(&self) -> PathBuf {
        self.emulator_dir().join(self.host.executable("emulator"))
    }

    pub fn adb(&self) -> PathBuf {
        managed_or_bare(self.managed_adb(), "adb")
    }

    pub fn emulator(&self) -> PathBuf {
        managed_or_bare(self.managed_emulator(), "emulator")
    }

    pub fn sdkmanager(&self) -> PathBuf {
        self.cmdline_tools_dir()
            .join("bin")
            .join(self.host.script("sdkmanager"))
    }

    pub fn avdmanager(&self) -> PathBuf {
        self.cmdline_tools_dir()
            .join("bin")
            .join(self.host.script("avdmanager"))
    }

    pub fn avd_dir(&self, avd_name: &str) -> PathBuf {
        self.avd_home.join(format!("{avd_name}.avd"))
    }

    pub fn binary_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.platform_tools_dir(),
            self.emulator_dir(),
            self.cmdline_tools_dir().join("bin"),
        ]
    }

    pub fn environment(&self) -> ProcessEnvironment {
        self.environment_from(ProcessEnvironment::ambient())
    }

    pub fn environment_from(&self, mut env: ProcessEnvironment) -> ProcessEnvironment {
        let sdk = self.sdk_root.display().to_string();
        env.set("ANDROID_SDK_ROOT", sdk.clone());
        env.set("ANDROID_HOME", sdk);
        env.set("ANDROID_AVD_HOME", self.avd_home.display().to_string());
        env.prepend_path(&self.binary_dirs());
        env
    }

    pub fn cmdline_tools_installed(&self) -> bool {
        self.sdkmanager().is_file()
    }

    pub fn emulator_installed(&self) -> bool {
        self.managed_emulator().is_file()
    }

    pub fn avd_exists(&self, avd_name: &str) -> bool {
        self.avd_dir(avd_name).is_dir()
    }

    pub fn availability(&self, avd_name: &str) -> Availability {
        Availability::from_presence(self.emulator_installed(), self.avd_exists(avd_name))
    }
}

fn managed_or_bare(managed: PathBuf, bare: &str) -> PathBuf {
    if managed.is_file() {
        managed
    } else {
        PathBuf::from(bare)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Availability {
    pub install_enabled: bool,
    pub create_enabled: bool,
}

impl Availability {
    pub fn from_presence(sdk_installed: bool, avd_exists: bool) -> Self {
        Self {
            install_enabled: !sdk_installed,
            create_enabled: sdk_installed && !avd_exists,
        }
    }
}
