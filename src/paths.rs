//! Configuration file lookup and path expansion
//!
//! # Environment Variables
//!
//! - `PROVISION_CONFIG` - Config file to use when `--config` is not given
//!
//! # Lookup Priority
//!
//! 1. `--config FILE`
//! 2. `PROVISION_CONFIG` environment variable
//! 3. `/etc/provision/provision.toml`, if it exists
//! 4. Built-in defaults (no file)

use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const ENV_CONFIG: &str = "PROVISION_CONFIG";

/// System-wide config file
pub const SYSTEM_CONFIG: &str = "/etc/provision/provision.toml";

/// Find the config file to load, if any
pub fn config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    lookup(
        explicit,
        std::env::var(ENV_CONFIG).ok(),
        Path::new(SYSTEM_CONFIG),
    )
}

fn lookup(explicit: Option<&Path>, env: Option<String>, system: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        log::debug!("Using config from --config: {}", path.display());
        return Some(path.to_path_buf());
    }

    if let Some(value) = env.filter(|v| !v.is_empty()) {
        let path = expand(&value);
        log::debug!("Using config from {}: {}", ENV_CONFIG, path.display());
        return Some(path);
    }

    if system.is_file() {
        log::debug!("Using system config: {}", system.display());
        return Some(system.to_path_buf());
    }

    log::debug!("No config file, using built-in defaults");
    None
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_wins() {
        let found = lookup(
            Some(Path::new("/tmp/a.toml")),
            Some("/tmp/b.toml".to_string()),
            Path::new("/nonexistent"),
        );
        assert_eq!(found, Some(PathBuf::from("/tmp/a.toml")));
    }

    #[test]
    fn test_env_before_system() {
        let tmp = TempDir::new().unwrap();
        let system = tmp.path().join("provision.toml");
        std::fs::write(&system, "").unwrap();

        let found = lookup(None, Some("/tmp/b.toml".to_string()), &system);
        assert_eq!(found, Some(PathBuf::from("/tmp/b.toml")));

        let found = lookup(None, Some(String::new()), &system);
        assert_eq!(found, Some(system));
    }

    #[test]
    fn test_no_file_means_defaults() {
        assert_eq!(lookup(None, None, Path::new("/nonexistent/provision.toml")), None);
    }

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap();
        assert_eq!(expand("~/pihud"), PathBuf::from(home).join("pihud"));
        assert_eq!(expand("/opt/pihud"), PathBuf::from("/opt/pihud"));
    }

    #[test]
    fn test_expand_unknown_variable_kept() {
        assert_eq!(
            expand("/opt/$PROVISION_TEST_SURELY_UNSET/x"),
            PathBuf::from("/opt/$PROVISION_TEST_SURELY_UNSET/x")
        );
    }
}
