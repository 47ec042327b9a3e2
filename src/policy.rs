//! File and command allow-list policy.
//!
//! Providers consult the policy at construction time. A rejected path or
//! command produces a [`crate::SondeError::Skipped`], which means "not
//! collected this run" rather than an error.

use glob::Pattern;
use tracing::debug;

/// Decides which files may be read and which commands may run.
pub trait CollectionPolicy: Send + Sync {
    /// True if the file at `path` (a `/`-rooted logical path) may be
    /// collected.
    fn allow_file(&self, path: &str) -> bool;

    /// True if `cmd` may be executed.
    fn allow_command(&self, cmd: &str) -> bool;
}

impl std::fmt::Debug for dyn CollectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CollectionPolicy")
    }
}

/// The default policy: everything is allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl CollectionPolicy for AllowAll {
    fn allow_file(&self, _path: &str) -> bool {
        true
    }

    fn allow_command(&self, _cmd: &str) -> bool {
        true
    }
}

/// A deny-list policy built from user configuration.
///
/// File entries are glob patterns matched against the logical path; command
/// entries deny a command when they equal its full text or its leading
/// program word.
#[derive(Debug, Default)]
pub struct DenyPolicy {
    files: Vec<Pattern>,
    commands: Vec<String>,
}

impl DenyPolicy {
    /// Build a policy from denied file patterns and denied commands.
    /// Invalid glob patterns are dropped with a log line rather than
    /// failing the run.
    pub fn new<F, C>(files: F, commands: C) -> Self
    where
        F: IntoIterator<Item = String>,
        C: IntoIterator<Item = String>,
    {
        let files = files
            .into_iter()
            .filter_map(|raw| match Pattern::new(&raw) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    debug!(pattern = %raw, %err, "ignoring invalid deny pattern");
                    None
                }
            })
            .collect();
        Self {
            files,
            commands: commands.into_iter().collect(),
        }
    }
}

impl CollectionPolicy for DenyPolicy {
    fn allow_file(&self, path: &str) -> bool {
        !self.files.iter().any(|pattern| pattern.matches(path))
    }

    fn allow_command(&self, cmd: &str) -> bool {
        !self.commands.iter().any(|denied| {
            cmd == denied || cmd.strip_prefix(denied.as_str()).is_some_and(|rest| rest.starts_with(' '))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.allow_file("/etc/shadow"));
        assert!(AllowAll.allow_command("rm -rf /"));
    }

    #[test]
    fn test_deny_files_by_glob() {
        let policy = DenyPolicy::new(vec!["/etc/ssh/*".to_string()], vec![]);
        assert!(!policy.allow_file("/etc/ssh/sshd_config"));
        assert!(policy.allow_file("/etc/hosts"));
    }

    #[test]
    fn test_deny_commands_by_program() {
        let policy = DenyPolicy::new(vec![], vec!["dmidecode".to_string()]);
        assert!(!policy.allow_command("dmidecode"));
        assert!(!policy.allow_command("dmidecode -t system"));
        assert!(policy.allow_command("dmidecode2"));
        assert!(policy.allow_command("uptime"));
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        let policy = DenyPolicy::new(vec!["[".to_string()], vec![]);
        assert!(policy.allow_file("/anything"));
    }
}
