//! Invoking user's identity
//!
//! Provisioning runs under sudo, but the copied files and the venv belong to
//! the user who invoked it. sudo exports that user as `SUDO_USER`,
//! `SUDO_UID` and `SUDO_GID`; without sudo the process's own ids are used.

use std::fmt;

/// Environment variable set by sudo with the invoking user's name
pub const ENV_SUDO_USER: &str = "SUDO_USER";
/// Environment variable set by sudo with the invoking user's uid
pub const ENV_SUDO_UID: &str = "SUDO_UID";
/// Environment variable set by sudo with the invoking user's gid
pub const ENV_SUDO_GID: &str = "SUDO_GID";

/// Owner applied to installed files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub name: Option<String>,
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    /// Identity of whoever invoked the tool
    pub fn invoking() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), current_ids())
    }

    /// The process's own identity, ignoring sudo
    #[cfg(test)]
    pub fn current() -> Self {
        let (uid, gid) = current_ids();
        Self {
            name: std::env::var("USER").ok(),
            uid,
            gid,
        }
    }

    fn from_lookup(env: impl Fn(&str) -> Option<String>, fallback: (u32, u32)) -> Self {
        let sudo_ids = env(ENV_SUDO_UID)
            .and_then(|u| u.parse::<u32>().ok())
            .zip(env(ENV_SUDO_GID).and_then(|g| g.parse::<u32>().ok()));

        match sudo_ids {
            Some((uid, gid)) => Self {
                name: env(ENV_SUDO_USER),
                uid,
                gid,
            },
            None => Self {
                name: env("USER"),
                uid: fallback.0,
                gid: fallback.1,
            },
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({}:{})", self.uid, self.gid),
            None => write!(f, "{}:{}", self.uid, self.gid),
        }
    }
}

/// Whether the process runs with root privileges
pub fn is_root() -> bool {
    current_euid() == 0
}

#[allow(unsafe_code)]
fn current_ids() -> (u32, u32) {
    // SAFETY: getuid/getgid take no arguments, cannot fail and touch no memory
    unsafe { (libc::getuid(), libc::getgid()) }
}

#[allow(unsafe_code)]
fn current_euid() -> u32 {
    // SAFETY: geteuid takes no arguments and cannot fail
    unsafe { libc::geteuid() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_sudo_identity_wins() {
        let owner = Owner::from_lookup(
            lookup(&[
                ("SUDO_USER", "pi"),
                ("SUDO_UID", "1000"),
                ("SUDO_GID", "1000"),
                ("USER", "root"),
            ]),
            (0, 0),
        );
        assert_eq!(
            owner,
            Owner {
                name: Some("pi".into()),
                uid: 1000,
                gid: 1000
            }
        );
        assert_eq!(owner.to_string(), "pi (1000:1000)");
    }

    #[test]
    fn test_falls_back_to_process_ids() {
        let owner = Owner::from_lookup(lookup(&[("USER", "alice")]), (501, 20));
        assert_eq!(owner.uid, 501);
        assert_eq!(owner.gid, 20);
        assert_eq!(owner.name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_malformed_sudo_ids_are_ignored() {
        let owner = Owner::from_lookup(
            lookup(&[("SUDO_UID", "abc"), ("SUDO_GID", "1000")]),
            (7, 8),
        );
        assert_eq!((owner.uid, owner.gid), (7, 8));
        assert_eq!(owner.to_string(), "7:8");
    }
}
