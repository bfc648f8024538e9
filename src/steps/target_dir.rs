//! Application files in the target directory

use crate::fsutil;
use crate::host::Host;
use declarative::{Applied, ErrorKind, Step, StepError};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Names never copied from the source tree
pub const DEFAULT_EXCLUDE: &[&str] = &[".git", "__pycache__", "venv", ".venv"];

/// Mirror the source files into the target directory, owned by the invoking user
///
/// Prior contents are replaced as a whole: a copy is staged next to the
/// target and swapped in, so an interrupted run leaves either the old tree
/// or the new one. Entries named in `carry` (the venv) survive the swap.
#[derive(Debug, Clone)]
pub struct TargetDir {
    source: PathBuf,
    target: PathBuf,
    exclude: Vec<String>,
    carry: Vec<String>,
}

impl TargetDir {
    /// `target` is a host path and is resolved against the host root
    pub fn new(source: PathBuf, target: PathBuf, exclude: Vec<String>) -> Self {
        Self {
            source,
            target,
            exclude,
            carry: Vec::new(),
        }
    }

    /// Keep these entries of the existing target across a replacement
    pub fn carrying(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.carry.extend(names);
        self
    }

    fn io_error(&self, e: &io::Error, what: &str) -> StepError {
        StepError::from_io(e, ErrorKind::Io, what)
    }

    fn stage(&self, host: &Host<'_>, parent: &Path) -> Result<tempfile::TempDir, StepError> {
        let staged = tempfile::Builder::new()
            .prefix(".provision-")
            .tempdir_in(parent)
            .map_err(|e| self.io_error(&e, &format!("cannot stage in {}", parent.display())))?;

        let copied = fsutil::copy_tree(&self.source, staged.path(), &self.exclude)
            .map_err(|e| self.io_error(&e, "cannot copy application files"))?;
        log::debug!("Staged {copied} files in {}", staged.path().display());

        fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o755))
            .map_err(|e| self.io_error(&e, "cannot set directory mode"))?;
        let owner = host.owner();
        fsutil::chown_tree(staged.path(), owner.uid, owner.gid)
            .map_err(|e| self.io_error(&e, &format!("cannot hand files to {owner}")))?;
        Ok(staged)
    }
}

impl Step<Host<'_>> for TargetDir {
    fn name(&self) -> &str {
        "target-dir"
    }

    fn description(&self) -> String {
        format!(
            "Copy {} to {}",
            self.source.display(),
            self.target.display()
        )
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        if !self.source.is_dir() {
            return Err(StepError::new(
                ErrorKind::Io,
                format!("source directory {} does not exist", self.source.display()),
            ));
        }

        let target = host.paths().resolve(&self.target);
        if !target.is_dir() {
            return Ok(false);
        }

        let owner = host.owner();
        let read_err = |e: io::Error| self.io_error(&e, &format!("cannot inspect {}", target.display()));
        if !fsutil::owned_by(&target, owner.uid, owner.gid).map_err(read_err)? {
            log::info!("{} is not owned by {owner}", target.display());
            return Ok(false);
        }
        fsutil::tree_matches(&self.source, &target, &self.exclude).map_err(read_err)
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        let target = host.paths().resolve(&self.target);
        let parent = target
            .parent()
            .ok_or_else(|| StepError::new(ErrorKind::Io, "target directory has no parent"))?;
        fs::create_dir_all(parent)
            .map_err(|e| self.io_error(&e, &format!("cannot create {}", parent.display())))?;

        // dropped on every exit path, removing the staged copy if it was not swapped in
        let staged = self.stage(host, parent)?;

        let carry: Vec<&str> = self.carry.iter().map(String::as_str).collect();
        fsutil::replace_dir(staged.path(), &target, &carry)
            .map_err(|e| self.io_error(&e, &format!("cannot replace {}", target.display())))?;

        log::info!("Installed application files in {}", target.display());
        Ok(Applied::Changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::{FakeRunner, host_in};
    use tempfile::TempDir;

    fn exclude() -> Vec<String> {
        DEFAULT_EXCLUDE.iter().map(ToString::to_string).collect()
    }

    fn source(tmp: &TempDir) -> PathBuf {
        let src = tmp.path().join("checkout");
        fs::create_dir_all(src.join("fonts")).unwrap();
        fs::create_dir_all(src.join("__pycache__")).unwrap();
        fs::write(src.join("pihud-ip.py"), "print('ip')\n").unwrap();
        fs::write(src.join("fonts/small.ttf"), "font").unwrap();
        fs::write(src.join("__pycache__/x.pyc"), "cache").unwrap();
        src
    }

    #[test]
    fn test_copies_into_missing_target() {
        let tmp = TempDir::new().unwrap();
        let src = source(&tmp);
        let runner = FakeRunner::new();
        let host = host_in(&runner, &tmp.path().join("root"));
        let step = TargetDir::new(src, PathBuf::from("/opt/pihud"), exclude());

        assert!(!step.check(&host).unwrap());
        step.apply(&host).unwrap();

        let target = tmp.path().join("root/opt/pihud");
        assert!(target.join("pihud-ip.py").is_file());
        assert!(target.join("fonts/small.ttf").is_file());
        assert!(!target.join("__pycache__").exists());
        assert_eq!(
            fs::metadata(&target).unwrap().permissions().mode() & 0o777,
            0o755
        );
        assert!(step.check(&host).unwrap());
    }

    #[test]
    fn test_replaces_stale_contents_and_keeps_venv() {
        let tmp = TempDir::new().unwrap();
        let src = source(&tmp);
        let runner = FakeRunner::new();
        let host = host_in(&runner, &tmp.path().join("root"));
        let target = tmp.path().join("root/opt/pihud");
        fs::create_dir_all(target.join("venv/bin")).unwrap();
        fs::write(target.join("venv/bin/python"), "").unwrap();
        fs::write(target.join("pihud-ip.py"), "old\n").unwrap();
        fs::write(target.join("leftover.py"), "old\n").unwrap();

        let step = TargetDir::new(src, PathBuf::from("/opt/pihud"), exclude())
            .carrying(["venv".to_string()]);
        assert!(!step.check(&host).unwrap());
        step.apply(&host).unwrap();

        assert_eq!(
            fs::read_to_string(target.join("pihud-ip.py")).unwrap(),
            "print('ip')\n"
        );
        assert!(!target.join("leftover.py").exists());
        assert!(target.join("venv/bin/python").is_file());
        assert!(step.check(&host).unwrap());
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let host = host_in(&runner, tmp.path());
        let step = TargetDir::new(tmp.path().join("nope"), PathBuf::from("/opt/pihud"), exclude());

        let err = step.check(&host).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(err.kind.is_fatal());
    }
}
