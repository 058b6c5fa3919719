//! Guards for tests that need a Docker daemon.

use std::process::{Command, Stdio};

/// Whether `docker info` succeeds on this machine.
pub fn docker_available() -> bool {
    Command::new("docker")
        .arg("info")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Return early from a test when no Docker daemon is reachable.
#[macro_export]
macro_rules! require_docker {
    () => {
        if !$crate::docker::docker_available() {
            eprintln!("skipping: docker daemon not available");
            return;
        }
    };
}
