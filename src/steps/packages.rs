//! OS packages through apt

use crate::host::{self, Host};
use declarative::{Applied, ErrorKind, Step, StepError};

/// Classify apt-get's failure output
pub fn classify_apt(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("unable to locate package") || lower.contains("has no installation candidate")
    {
        ErrorKind::PackageUnavailable
    } else if host::mentions_permission_problem(message) {
        ErrorKind::PermissionDenied
    } else {
        ErrorKind::CommandFailed
    }
}

/// Ensure every listed package is installed
#[derive(Debug, Clone)]
pub struct OsPackages {
    packages: Vec<String>,
}

impl OsPackages {
    pub fn new(packages: Vec<String>) -> Self {
        Self { packages }
    }

    fn missing(&self, host: &Host<'_>) -> Result<Vec<&str>, StepError> {
        let probe = host.probe();
        let mut missing = Vec::new();
        for name in &self.packages {
            if !probe.package_installed(name)? {
                missing.push(name.as_str());
            }
        }
        Ok(missing)
    }
}

impl Step<Host<'_>> for OsPackages {
    fn name(&self) -> &str {
        "os-packages"
    }

    fn description(&self) -> String {
        format!("Install OS packages ({})", self.packages.join(", "))
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        Ok(self.missing(host)?.is_empty())
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        let missing = self.missing(host).unwrap_or_else(|e| {
            log::warn!("Could not list installed packages ({e}), installing all");
            self.packages.iter().map(String::as_str).collect()
        });
        if missing.is_empty() {
            return Ok(Applied::Changed);
        }

        log::info!("Installing {}", missing.join(" "));
        host.command_ok("apt-get", &["update", "-q"], classify_apt)?;

        let mut args = vec!["install", "-y", "-q", "--no-install-recommends"];
        args.extend(missing);
        host.command_ok("apt-get", &args, classify_apt)?;
        Ok(Applied::Changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::{FakeRunner, host_in};
    use tempfile::TempDir;

    fn step() -> OsPackages {
        OsPackages::new(vec!["i2c-tools".to_string(), "gpsd".to_string()])
    }

    #[test]
    fn test_classify_apt() {
        assert_eq!(
            classify_apt("E: Unable to locate package gpsdx"),
            ErrorKind::PackageUnavailable
        );
        assert_eq!(
            classify_apt("E: Package 'gpsd' has no installation candidate"),
            ErrorKind::PackageUnavailable
        );
        assert_eq!(
            classify_apt("E: Could not open lock file /var/lib/dpkg/lock-frontend"),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            classify_apt("E: Sub-process /usr/bin/dpkg returned an error code (1)"),
            ErrorKind::CommandFailed
        );
    }

    #[test]
    fn test_installs_only_missing_packages() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.install_package("i2c-tools");
        let host = host_in(&runner, tmp.path());

        assert!(!step().check(&host).unwrap());
        step().apply(&host).unwrap();

        let calls = runner.calls();
        assert!(calls.contains(&"apt-get update -q".to_string()));
        assert!(calls.contains(&"apt-get install -y -q --no-install-recommends gpsd".to_string()));
        assert!(step().check(&host).unwrap());
    }

    #[test]
    fn test_empty_list_is_satisfied() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let host = host_in(&runner, tmp.path());

        assert!(OsPackages::new(Vec::new()).check(&host).unwrap());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_unknown_package_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.fail_when("apt-get install", "E: Unable to locate package gpsd");
        let host = host_in(&runner, tmp.path());

        let err = step().apply(&host).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PackageUnavailable);
        assert_eq!(err.detail, "E: Unable to locate package gpsd");
    }

    #[test]
    fn test_probe_failure_installs_everything() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.unavailable("dpkg-query");
        let host = host_in(&runner, tmp.path());

        assert_eq!(step().check(&host).unwrap_err().kind, ErrorKind::ProbeFailed);
        step().apply(&host).unwrap();
        assert!(
            runner
                .calls()
                .contains(&"apt-get install -y -q --no-install-recommends i2c-tools gpsd".to_string())
        );
    }
}
