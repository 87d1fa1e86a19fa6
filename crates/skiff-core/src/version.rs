//! Version ordering for package upgrades
//!
//! Versions are compared as semver, with two deviations from the standard:
//! - A leading `v` is accepted and missing minor/patch components are zero-filled
//! - Build metadata is NOT ignored: when two versions have equal precedence, the
//!   metadata segment decides (numerically if both are integers)

use semver::{Version, VersionReq};
use std::cmp::Ordering;

use crate::error::{CoreError, Result};

/// Parse a version string leniently (`v1.2`, `1.2.3+4`, ...)
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let raw = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

    if let Ok(version) = Version::parse(raw) {
        return Ok(version);
    }

    // Zero-fill "1" and "1.2" style cores, keeping any pre-release/build suffix
    let split = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    let numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));

    if numeric && parts.len() < 3 {
        let padded = format!("{}{}{}", core, ".0".repeat(3 - parts.len()), suffix);
        if let Ok(version) = Version::parse(&padded) {
            return Ok(version);
        }
    }

    Version::parse(raw).map_err(|e| CoreError::InvalidVersion {
        version: input.to_string(),
        message: e.to_string(),
    })
}

/// Check whether `latest` should replace `installed`.
///
/// If either side is not a valid version, this falls back to plain string
/// inequality, so two identical unparsable strings are never upgradable.
pub fn is_upgradable(installed: &str, latest: &str) -> bool {
    match (parse_version(installed), parse_version(latest)) {
        (Ok(installed_version), Ok(latest_version)) => {
            is_version_upgradable(&installed_version, &latest_version)
        }
        _ => installed != latest,
    }
}

/// Same as [`is_upgradable`] for already parsed versions
pub fn is_version_upgradable(installed: &Version, latest: &Version) -> bool {
    match cmp_precedence(latest, installed) {
        Ordering::Greater => true,
        Ordering::Equal => is_upgradable_metadata(installed.build.as_str(), latest.build.as_str()),
        Ordering::Less => false,
    }
}

/// Pick the higher of two version strings according to [`is_upgradable`].
///
/// Empty strings never win over a non-empty version.
pub fn max_version<'a>(current: &'a str, candidate: &'a str) -> &'a str {
    if candidate.is_empty() {
        return current;
    }
    if current.is_empty() || is_upgradable(current, candidate) {
        candidate
    } else {
        current
    }
}

// major.minor.patch + pre-release, build metadata excluded
fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

fn is_upgradable_metadata(installed: &str, latest: &str) -> bool {
    if installed == latest || latest.is_empty() {
        return false;
    }
    if installed.is_empty() {
        return true;
    }

    match (installed.parse::<u64>(), latest.parse::<u64>()) {
        (Ok(installed), Ok(latest)) => installed < latest,
        _ => true,
    }
}

/// Validate a version against a constraint expression such as `>=1.2.0, <2`.
///
/// On failure every unmet comparator is reported.
pub fn validate_constraint(version: &str, constraint: &str) -> Result<()> {
    let parsed = parse_version(version)?;
    let req = parse_constraint(constraint)?;

    if req.matches(&parsed) {
        return Ok(());
    }

    let mut unmet: Vec<String> = req
        .comparators
        .iter()
        .filter(|c| !c.matches(&parsed))
        .map(|c| c.to_string())
        .collect();

    // Pre-release exclusion makes the whole requirement fail even if each comparator matches
    if unmet.is_empty() {
        unmet.push(req.to_string());
    }

    Err(CoreError::ConstraintViolation {
        version: version.to_string(),
        constraint: constraint.to_string(),
        unmet,
    })
}

/// Parse a constraint expression, tolerating `v` prefixes on versions
pub fn parse_constraint(constraint: &str) -> Result<VersionReq> {
    let normalized = constraint
        .split(',')
        .map(|part| {
            let part = part.trim();
            let op_len = part
                .find(|c: char| c.is_ascii_alphanumeric() || c == '*')
                .unwrap_or(part.len());
            let (op, rest) = part.split_at(op_len);
            let rest = rest.strip_prefix(['v', 'V']).unwrap_or(rest);
            format!("{}{}", op.trim(), rest)
        })
        .collect::<Vec<_>>()
        .join(", ");

    VersionReq::parse(&normalized).map_err(|e| CoreError::InvalidConstraint {
        constraint: constraint.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_lenient() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_version("v2").unwrap(), Version::new(2, 0, 0));

        let with_meta = parse_version("v1.0.0+7").unwrap();
        assert_eq!(with_meta.build.as_str(), "7");

        let short_with_pre = parse_version("1.4-rc.1").unwrap();
        assert_eq!(short_with_pre.pre.as_str(), "rc.1");

        assert!(parse_version("not a version").is_err());
        assert!(parse_version("").is_err());
    }

    #[test]
    fn test_is_upgradable_matrix() {
        // installed -> latest -> expected
        let cases = [
            ("v1.0.0", "v1.0.0", false),
            ("v1.0.0", "v1.0.0+1", true),
            ("v1.0.0", "v1.0.0+a", true),
            ("v1.0.0", "not a version", true),
            ("v1.0.0+1", "v1.0.0", false),
            ("v1.0.0+1", "v1.0.0+1", false),
            ("v1.0.0+1", "v1.0.0+2", true),
            ("v1.0.0+1", "v1.0.0+a", true),
            ("v1.0.0+a", "v1.0.0", false),
            ("v1.0.0+a", "v1.0.0+1", true),
            ("v1.0.0+a", "v1.0.0+a", false),
            ("v1.0.0+a", "v1.0.0+b", true),
            ("v1.0.0+b", "v1.0.0+a", true),
            ("not a version", "v1.0.0", true),
            ("not a version", "v1.0.0+1", true),
            ("not a version", "not a version", false),
        ];

        for (installed, latest, expected) in cases {
            assert_eq!(
                is_upgradable(installed, latest),
                expected,
                "is_upgradable({:?}, {:?})",
                installed,
                latest
            );
        }
    }

    #[test]
    fn test_is_upgradable_core_versions() {
        assert!(is_upgradable("v1.0.0", "v1.2.0"));
        assert!(is_upgradable("1.9.0", "1.10.0"));
        assert!(!is_upgradable("v1.2.0", "v1.0.0"));
        assert!(is_upgradable("v1.0.0-rc.1", "v1.0.0"));
        assert!(!is_upgradable("v1.0.0", "v1.0.0-rc.1"));

        // Metadata only breaks ties; a lower core version never wins
        assert!(!is_upgradable("v1.1.0", "v1.0.0+9"));
        assert!(!is_upgradable("v1.0.0+10", "v1.0.0+9"));
    }

    #[test]
    fn test_max_version() {
        assert_eq!(max_version("", "v1.0.0"), "v1.0.0");
        assert_eq!(max_version("v1.0.0", ""), "v1.0.0");
        assert_eq!(max_version("v1.0.0", "v1.2.0"), "v1.2.0");
        assert_eq!(max_version("v1.2.0", "v1.0.0"), "v1.2.0");
        assert_eq!(max_version("v1.0.0+1", "v1.0.0+2"), "v1.0.0+2");
    }

    #[test]
    fn test_validate_constraint() {
        assert!(validate_constraint("v1.4.0", ">=1.2.0").is_ok());
        assert!(validate_constraint("1.4.0", ">= v1.2.0, < v2.0.0").is_ok());

        match validate_constraint("v2.1.0", ">=1.2.0, <2.0.0") {
            Err(CoreError::ConstraintViolation { unmet, .. }) => {
                assert_eq!(unmet, vec!["<2.0.0".to_string()]);
            }
            other => panic!("Expected constraint violation, got {:?}", other),
        }

        assert!(matches!(
            validate_constraint("1.0.0", "not a constraint"),
            Err(CoreError::InvalidConstraint { .. })
        ));
        assert!(matches!(
            validate_constraint("garbage", ">=1.0.0"),
            Err(CoreError::InvalidVersion { .. })
        ));
    }
}
