//! Filesystem helpers for provisioning steps
//!
//! Writes go through a temporary file in the destination directory followed
//! by a rename, so a reader (the service manager, the firmware) sees either
//! the old file or the new one, never a partial write.

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Scoped write-then-rename
///
/// The temporary file lives next to `path` so the final rename stays on one
/// filesystem. If anything fails the temporary file is removed and `path`
/// is left exactly as it was.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let parent = parent_of(path)?;
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".provision-")
        .tempfile_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().set_permissions(fs::Permissions::from_mode(mode))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Read a file, treating "does not exist" as empty
pub fn read_or_empty(path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

fn parent_of(path: &Path) -> io::Result<&Path> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no parent directory", path.display()),
            )
        })
}

/// Content digest of a file
pub fn digest_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    let mut file = fs::File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}

fn excluded(name: &OsStr, exclude: &[String]) -> bool {
    exclude.iter().any(|e| OsStr::new(e) == name)
}

/// Files and directories under `source`, relative, skipping excluded names
fn source_entries(source: &Path, exclude: &[String]) -> io::Result<Vec<(PathBuf, bool)>> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !excluded(e.file_name(), exclude));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            .to_path_buf();
        entries.push((rel, entry.file_type().is_dir()));
    }
    Ok(entries)
}

/// Does `target` contain every file of `source` with identical content?
///
/// Extra entries in `target` (such as the venv) are ignored.
pub fn tree_matches(source: &Path, target: &Path, exclude: &[String]) -> io::Result<bool> {
    if !target.is_dir() {
        return Ok(false);
    }

    for (rel, is_dir) in source_entries(source, exclude)? {
        let dst = target.join(&rel);
        if is_dir {
            if !dst.is_dir() {
                return Ok(false);
            }
        } else if !dst.is_file() || digest_file(&source.join(&rel))? != digest_file(&dst)? {
            log::debug!("{} differs from source", dst.display());
            return Ok(false);
        }
    }
    Ok(true)
}

/// Copy `source` into the existing directory `dest`, skipping excluded names
///
/// Symlinks are followed and copied as regular files.
pub fn copy_tree(source: &Path, dest: &Path, exclude: &[String]) -> io::Result<usize> {
    let mut copied = 0;
    for (rel, is_dir) in source_entries(source, exclude)? {
        let dst = dest.join(&rel);
        if is_dir {
            fs::create_dir_all(&dst)?;
        } else {
            fs::copy(source.join(&rel), &dst)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Change ownership of `path` and everything below it
///
/// Symlinks themselves are re-owned, never their targets.
pub fn chown_tree(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(io::Error::from)?;
        let meta = entry.path().symlink_metadata()?;
        if meta.uid() != uid || meta.gid() != gid {
            std::os::unix::fs::lchown(entry.path(), Some(uid), Some(gid))?;
        }
    }
    Ok(())
}

/// Whether `path` is owned by `uid:gid`
pub fn owned_by(path: &Path, uid: u32, gid: u32) -> io::Result<bool> {
    let meta = fs::metadata(path)?;
    Ok(meta.uid() == uid && meta.gid() == gid)
}

/// Replace `target` with the fully prepared directory `staged`
///
/// Both must share a parent. The old target is renamed aside, the staged
/// directory renamed into place, then the old one removed. Entries named in
/// `carry` (e.g. a venv) are moved from the old target into the new one
/// unless the staged copy already has them. If anything fails once the old
/// target has been moved, it is kept on disk and the error names where.
pub fn replace_dir(staged: &Path, target: &Path, carry: &[&str]) -> io::Result<()> {
    let parent = parent_of(target)?;

    if !target.exists() {
        return fs::rename(staged, target);
    }

    let aside = tempfile::Builder::new()
        .prefix(".provision-old-")
        .tempdir_in(parent)?;
    let old = aside.path().join("old");
    fs::rename(target, &old)?;

    if let Err(e) = fs::rename(staged, target) {
        // put the previous contents back before reporting
        if let Err(restore) = fs::rename(&old, target) {
            let kept = aside.keep();
            return Err(io::Error::new(
                restore.kind(),
                format!(
                    "{e}; restoring failed ({restore}), previous contents are in {}",
                    kept.join("old").display()
                ),
            ));
        }
        return Err(e);
    }

    for name in carry {
        let from = old.join(name);
        let to = target.join(name);
        if from.exists() && !to.exists() {
            if let Err(e) = fs::rename(&from, &to) {
                let kept = aside.keep();
                return Err(io::Error::new(
                    e.kind(),
                    format!(
                        "cannot carry {name} into {}: {e}; it is still in {}",
                        target.display(),
                        kept.join("old").join(name).display()
                    ),
                ));
            }
        }
    }

    // `aside` removes the previous contents when dropped
    drop(aside);
    Ok(())
}
