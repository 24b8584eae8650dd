// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Live detection from `croc --help` output.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::{Capabilities, CapabilityStrategy, Flag};
use crate::binary::BinaryInfo;

/// Help invocations: top level plus the subcommands whose flags we gate.
const HELP_INVOCATIONS: &[&[&str]] = &[&["--help"], &["send", "--help"], &["relay", "--help"]];

/// Per-flag presence patterns, matched against the combined help text.
static FLAG_PATTERNS: LazyLock<Vec<(Flag, Regex)>> = LazyLock::new(|| {
    Flag::ALL
        .iter()
        .map(|flag| {
            let pattern = match flag {
                // Secret-in-env arrived together with classic mode
                Flag::SecretEnv => r"(?m)CROC_SECRET|(?:^|[\s,\[])--classic(?:[\s,=\]]|$)".to_string(),
                other => format!(
                    r"(?m)(?:^|[\s,\[]){}(?:[\s,=\]]|$)",
                    regex::escape(other.token())
                ),
            };
            (*flag, Regex::new(&pattern).expect("flag pattern is valid"))
        })
        .collect()
});

/// Test every known flag against help text. Absent means `false`.
pub fn capabilities_from_help(help: &str) -> Capabilities {
    FLAG_PATTERNS
        .iter()
        .map(|(flag, re)| (*flag, re.is_match(help)))
        .collect()
}

/// Runs the binary's help commands and inspects the output.
#[derive(Debug, Clone)]
pub struct HelpProbe {
    timeout: Duration,
}

impl Default for HelpProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

impl HelpProbe {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// stdout and stderr of one invocation; empty on any failure.
    async fn help_text(&self, binary: &Path, args: &[&str]) -> String {
        let run = tokio::process::Command::new(binary)
            .args(args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => format!(
                "{}\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ),
            Ok(Err(e)) => {
                tracing::debug!("Help probe {:?} failed: {}", args, e);
                String::new()
            }
            Err(_) => {
                tracing::debug!("Help probe {:?} timed out after {:?}", args, self.timeout);
                String::new()
            }
        }
    }
}

#[async_trait]
impl CapabilityStrategy for HelpProbe {
    fn name(&self) -> &'static str {
        "help-probe"
    }

    async fn detect(&self, binary: &BinaryInfo) -> Capabilities {
        let mut combined = String::new();
        for args in HELP_INVOCATIONS {
            combined.push_str(&self.help_text(&binary.path, args).await);
            combined.push('\n');
        }

        if combined.trim().is_empty() {
            tracing::warn!(
                "CAPABILITY_PROBE_EMPTY | path={} (assuming every flag is supported)",
                binary.path.display()
            );
            return Capabilities::unknown();
        }

        let caps = capabilities_from_help(&combined);
        let unsupported: Vec<&str> = caps
            .iter()
            .filter(|(_, v)| !v)
            .map(|(f, _)| f.token())
            .collect();
        tracing::info!(
            "CAPABILITIES_DETECTED | path={} unsupported={:?}",
            binary.path.display(),
            unsupported
        );
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELP_V10: &str = r#"
GLOBAL OPTIONS:
   --internal-dns            use a built-in DNS stub resolver rather than the host operating system (default: false)
   --classic                 toggle between the classic mode (insecure due to local attack vector) and new mode (secure) (default: false)
   --remember                save these settings to reuse next time (default: false)
   --debug                   toggle debug mode (default: false)
   --yes                     automatically agree to all prompts (default: false)
   --stdout                  redirect file to stdout (default: false)
   --no-compress             disable compression (default: false)
   --ask                     make sure sender and recipient are prompted (default: false)
   --local                   force to use only local connections (default: false)
   --ignore-stdin            ignore piped stdin (default: false)
   --overwrite               do not prompt to overwrite or resume (default: false)
   --testing                 flag for testing purposes (default: false)
   --curve value             choose an encryption curve (p521, p256, p384, siec) (default: "p256")
   --ip value                set sender ip if known e.g. 10.0.0.1:9009, [::1]:9009
   --relay value             address of the relay (default: "croc.schollz.com:9009") [$CROC_RELAY]
   --relay6 value            ipv6 address of the relay (default: "[::1]:9009") [$CROC_RELAY6]
   --out value               specify an output folder to receive the file (default: ".")
   --pass value              password for the relay (default: "pass123") [$CROC_PASS]
   --socks5 value            add a socks5 proxy [$SOCKS5_PROXY]
   --throttleUpload value    Throttle the upload speed e.g. 500k

OPTIONS (send):
   --zip                     zip folder before sending (default: false)
   --code value, -c value    codephrase used to connect to relay
   --text value, -t value    send some text
   --exclude value           exclude files if they contain any of the comma separated strings
"#;

    #[test]
    fn test_full_help_supports_everything() {
        let caps = capabilities_from_help(HELP_V10);
        for flag in Flag::ALL {
            assert_eq!(caps.get(flag), Some(true), "{} should be detected", flag);
        }
    }

    #[test]
    fn test_absent_flags_are_false() {
        let old = "GLOBAL OPTIONS:\n   --relay value  address\n   --yes  agree\n   --out value  folder\n";
        let caps = capabilities_from_help(old);
        assert_eq!(caps.get(Flag::Relay), Some(true));
        assert_eq!(caps.get(Flag::Relay6), Some(false));
        assert_eq!(caps.get(Flag::InternalDns), Some(false));
        assert_eq!(caps.get(Flag::SecretEnv), Some(false));
        assert!(!caps.supports(Flag::Curve));
    }

    #[test]
    fn test_relay_does_not_match_relay6_alone() {
        let caps = capabilities_from_help("   --relay6 value   ipv6 relay\n");
        assert_eq!(caps.get(Flag::Relay6), Some(true));
        assert_eq!(caps.get(Flag::Relay), Some(false));
    }

    #[test]
    fn test_secret_env_from_env_var_mention() {
        let caps = capabilities_from_help("set CROC_SECRET to pass the code\n");
        assert_eq!(caps.get(Flag::SecretEnv), Some(true));
        assert_eq!(caps.get(Flag::Classic), Some(false));
    }

    #[tokio::test]
    async fn test_missing_binary_leaves_everything_unknown() {
        let probe = HelpProbe::with_timeout(Duration::from_millis(500));
        let info = BinaryInfo {
            path: "/nonexistent/croc-does-not-exist".into(),
            version: None,
        };
        let caps = probe.detect(&info).await;
        assert!(caps.is_empty());
        assert!(caps.supports(Flag::Relay));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_runs_subcommand_help() {
        use tempfile::TempDir;
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("croc");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             if [ \"$1\" = send ]; then echo '   --code value   codephrase'; \
             elif [ \"$1\" = relay ]; then exit 3; \
             else echo '   --relay value   relay'; fi\n",
        )
        .unwrap();
        crate::binary::archive::set_executable(&script).unwrap();

        let caps = HelpProbe::default()
            .detect(&BinaryInfo {
                path: script,
                version: None,
            })
            .await;
        assert_eq!(caps.get(Flag::Relay), Some(true));
        assert_eq!(caps.get(Flag::Code), Some(true));
        assert_eq!(caps.get(Flag::Curve), Some(false));
    }
}
