use std::time::Duration;

use geochange_process::{CommandSpec, ProcessEnvironment};

use crate::locator::{ToolchainPaths, DEVICE_PROFILE, SYSTEM_IMAGE};

pub const LICENSE_TIMEOUT: Duration = Duration::from_secs(240);
const LICENSE_ANSWERS: usize = 50;

fn sdk_root_arg(paths: &ToolchainPaths) -> String {
    format!("--sdk_root={}", paths.sdk_root().display())
}

fn sdkmanager(paths: &ToolchainPaths, env: &ProcessEnvironment) -> CommandSpec {
    CommandSpec::new(paths.sdkmanager())
        .arg(sdk_root_arg(paths))
        .env(env.clone())
}

pub fn update(paths: &ToolchainPaths, env: &ProcessEnvironment) -> CommandSpec {
    sdkmanager(paths, env).arg("--update")
}

pub fn accept_licenses(paths: &ToolchainPaths, env: &ProcessEnvironment) -> CommandSpec {
    sdkmanager(paths, env)
        .arg("--licenses")
        .stdin("y\n".repeat(LICENSE_ANSWERS))
        .timeout(LICENSE_TIMEOUT)
}

pub fn install_package(
    paths: &ToolchainPaths,
    env: &ProcessEnvironment,
    package: &str,
) -> CommandSpec {
    sdkmanager(paths, env).arg(package)
}

// `avdmanager` asks whether to write a custom hardware profile; the answer is always no.
pub fn create_avd(paths: &ToolchainPaths, env: &ProcessEnvironment, avd_name: &str) -> CommandSpec {
    CommandSpec::new(paths.avdmanager())
        .args(["--verbose", "create", "avd", "-n", avd_name, "-k", SYSTEM_IMAGE])
        .args(["--device", DEVICE_PROFILE])
        .stdin("no\n")
        .env(env.clone())
}

pub fn launch_emulator(
    paths: &ToolchainPaths,
    env: &ProcessEnvironment,
    avd_name: &str,
) -> CommandSpec {
    CommandSpec::new(paths.emulator())
        .args(["-avd", avd_name, "-netdelay", "none", "-netspeed", "full", "-gpu", "host"])
        .env(env.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::HostOs;

    fn fixture() -> (ToolchainPaths, ProcessEnvironment) {
        let paths = ToolchainPaths::new("/g").with_host(HostOs::Linux);
        let env = paths.environment_from(ProcessEnvironment::empty());
        (paths, env)
    }

    #[test]
    fn licenses_are_fed_and_bounded() {
        let (paths, env) = fixture();
        let spec = accept_licenses(&paths, &env);
        assert_eq!(spec.args, vec!["--sdk_root=/g/sdk", "--licenses"]);
        let stdin = spec.stdin.unwrap();
        assert_eq!(stdin.lines().count(), 50);
        assert!(stdin.lines().all(|line| line == "y"));
        assert_eq!(spec.timeout, Some(Duration::from_secs(240)));
    }

    #[test]
    fn create_avd_uses_pixel_profile_and_declines_custom_hardware() {
        let (paths, env) = fixture();
        let spec = create_avd(&paths, &env, "GeoChangePlay");
        assert!(spec.has_args(&["create", "avd", "-n", "GeoChangePlay", "-k", SYSTEM_IMAGE]));
        assert!(spec.has_args(&["--device", "pixel_6"]));
        assert_eq!(spec.stdin.as_deref(), Some("no\n"));
        assert!(spec.program.ends_with("cmdline-tools/latest/bin/avdmanager"));
    }

    #[test]
    fn emulator_launch_flags() {
        let (paths, env) = fixture();
        let spec = launch_emulator(&paths, &env, "GeoChangePlay");
        assert_eq!(
            spec.args,
            vec!["-avd", "GeoChangePlay", "-netdelay", "none", "-netspeed", "full", "-gpu", "host"]
        );
        assert!(spec.env.is_some());
    }

    #[test]
    fn package_install_targets_sdk_root() {
        let (paths, env) = fixture();
        let spec = install_package(&paths, &env, "platform-tools");
        assert_eq!(spec.args, vec!["--sdk_root=/g/sdk", "platform-tools"]);
        assert_eq!(update(&paths, &env).args, vec!["--sdk_root=/g/sdk", "--update"]);
    }
}
