//! Command-string mangling.
//!
//! Maps a command line to a bounded, filesystem-safe relative file name. The
//! collection agent uses the same algorithm to name the file it captures a
//! command's output into, and this engine uses it to predict which file in
//! an archive holds that output. The two must agree bit for bit, so the
//! steps below are a frozen contract:
//!
//! 1. Strip a leading `/usr/bin/`, `/bin/`, `/usr/sbin/`, or `/sbin/`.
//! 2. Replace every maximal run of characters outside `[A-Za-z0-9_.\-/]`
//!    with a single underscore.
//! 3. Replace every remaining `/` with `.`.
//! 4. Trim leading and trailing space, `.`, `_`, and `-`.
//! 5. Truncate to at most `name_max` characters (255 by default).

use regex::Regex;
use std::sync::LazyLock;

/// Default cap on the mangled name length.
pub const NAME_MAX: usize = 255;

/// Directory inside an archive where command output files live.
pub const COMMAND_DIR: &str = "sonde_commands";

static BIN_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(usr/|)(bin|sbin)/").unwrap());

static UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-/]+").unwrap());

/// Mangle `command` into a file name, capped at [`NAME_MAX`] characters.
pub fn mangle_command(command: &str) -> String {
    mangle_command_with_limit(command, NAME_MAX)
}

/// Mangle `command` into a file name of at most `name_max` characters.
pub fn mangle_command_with_limit(command: &str, name_max: usize) -> String {
    let stripped = BIN_PREFIX.replace(command, "");
    let safe = UNSAFE_RUN.replace_all(&stripped, "_");
    let dotted = safe.replace('/', ".");
    let trimmed = dotted.trim_matches([' ', '.', '_', '-']);
    // Every remaining character is ASCII after step 2, so a char-count
    // truncation and a byte truncation agree.
    trimmed.chars().take(name_max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_bin_prefix_and_dots_slashes() {
        assert_eq!(
            mangle_command("/usr/bin/foo -x /etc/bar"),
            "foo_-x_.etc.bar"
        );
    }

    #[test]
    fn test_all_bin_prefixes() {
        assert_eq!(mangle_command("/usr/bin/ls"), "ls");
        assert_eq!(mangle_command("/bin/ls"), "ls");
        assert_eq!(mangle_command("/usr/sbin/ip link"), "ip_link");
        assert_eq!(mangle_command("/sbin/ip link"), "ip_link");
        // Only a leading prefix is stripped.
        assert_eq!(mangle_command("echo /bin/ls"), "echo_.bin.ls");
    }

    #[test]
    fn test_pipe_and_flags_collapse_to_underscores() {
        assert_eq!(
            mangle_command("ps aux | grep sshd"),
            "ps_aux_grep_sshd"
        );
    }

    #[test]
    fn test_prefixed_path_only() {
        assert_eq!(mangle_command("/usr/bin/"), "");
        assert_eq!(mangle_command("/bin/true"), "true");
    }

    #[test]
    fn test_truncates_to_name_max() {
        let long = format!("/usr/bin/x {}", "a".repeat(400));
        let mangled = mangle_command(&long);
        assert_eq!(mangled.len(), NAME_MAX);
        assert!(mangled.starts_with("x_aaa"));
        assert_eq!(mangle_command_with_limit(&long, 10).len(), 10);
    }

    #[test]
    fn test_trims_edge_punctuation() {
        assert_eq!(mangle_command("  ls -la  "), "ls_-la");
        assert_eq!(mangle_command("./script.sh"), "script.sh");
    }

    #[test]
    fn test_deterministic() {
        let cmd = "journalctl --since 'yesterday' | tail -n 100";
        assert_eq!(mangle_command(cmd), mangle_command(cmd));
    }
}
