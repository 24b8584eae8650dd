// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Version string normalization.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ProvisionError;

static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z.-]+))?(?:\+[0-9A-Za-z.-]+)?$")
        .expect("semver regex is valid")
});

/// Loose match used on `croc --version` output, e.g. `croc version v10.2.1`.
static VERSION_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)").expect("version-in-text regex is valid")
});

/// Strip an optional `v` prefix and validate `MAJOR.MINOR.PATCH[-pre][+build]`.
///
/// ```
/// use crocdeck::binary::normalize_version;
///
/// assert_eq!(normalize_version("v10.2.1").unwrap(), "10.2.1");
/// assert!(normalize_version("10.2").is_err());
/// ```
pub fn normalize_version(raw: &str) -> Result<String, ProvisionError> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if SEMVER.is_match(stripped) {
        Ok(stripped.to_string())
    } else {
        Err(ProvisionError::InvalidVersion(raw.to_string()))
    }
}

/// Release tag for a normalized version.
pub fn tag_for(version: &str) -> String {
    format!("v{}", version)
}

/// `MAJOR.MINOR` of a normalized version.
pub fn major_minor(version: &str) -> Option<String> {
    let caps = SEMVER.captures(version)?;
    Some(format!("{}.{}", &caps[1], &caps[2]))
}

/// First version-looking token in free text.
pub fn extract_version(text: &str) -> Option<String> {
    VERSION_IN_TEXT
        .captures(text)
        .map(|caps| caps[1].to_string())
}

/// Compare two normalized versions numerically. Pre-releases sort before
/// the matching release; pre-release tags compare lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (Some(ca), Some(cb)) = (SEMVER.captures(a), SEMVER.captures(b)) else {
        return a.cmp(b);
    };
    for i in 1..=3 {
        let x: u64 = ca[i].parse().unwrap_or(0);
        let y: u64 = cb[i].parse().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    match (ca.get(4), cb.get(4)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.as_str().cmp(y.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_prefix_and_whitespace() {
        assert_eq!(normalize_version("10.2.1").unwrap(), "10.2.1");
        assert_eq!(normalize_version("v10.2.1").unwrap(), "10.2.1");
        assert_eq!(normalize_version(" V9.6.17 ").unwrap(), "9.6.17");
        assert_eq!(normalize_version("v10.0.0-beta.1").unwrap(), "10.0.0-beta.1");
        assert_eq!(normalize_version("10.0.0+build.5").unwrap(), "10.0.0+build.5");
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        for bad in ["", "v", "10", "10.2", "10.2.x", "vv10.2.1", "10.2.1.4", "latest"] {
            assert!(
                matches!(normalize_version(bad), Err(ProvisionError::InvalidVersion(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("croc version v10.2.1").as_deref(), Some("10.2.1"));
        assert_eq!(extract_version("croc v9.6.17-05a1b2c").as_deref(), Some("9.6.17-05a1b2c"));
        assert_eq!(extract_version("no version here"), None);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("10.2.1", "10.10.0"), Ordering::Less);
        assert_eq!(compare_versions("10.2.1", "10.2.1"), Ordering::Equal);
        assert_eq!(compare_versions("10.2.1-rc1", "10.2.1"), Ordering::Less);
    }

    #[test]
    fn test_major_minor_and_tag() {
        assert_eq!(major_minor("10.2.1").as_deref(), Some("10.2"));
        assert_eq!(tag_for("10.2.1"), "v10.2.1");
    }
}
