use std::fmt;
use std::str::FromStr;

pub use semver::Version;

use crate::domain::tag::TagPattern;
use crate::error::{ConductorError, Result};

/// Which semantic-version component a release run increments.
///
/// Applies uniformly to every package released in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BumpPolicy {
    Patch,
    #[default]
    Minor,
    Major,
}

impl FromStr for BumpPolicy {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "patch" => Ok(BumpPolicy::Patch),
            "minor" => Ok(BumpPolicy::Minor),
            "major" => Ok(BumpPolicy::Major),
            other => Err(ConductorError::config(format!(
                "Unknown bump policy '{}': expected patch, minor or major",
                other
            ))),
        }
    }
}

impl fmt::Display for BumpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpPolicy::Patch => write!(f, "patch"),
            BumpPolicy::Minor => write!(f, "minor"),
            BumpPolicy::Major => write!(f, "major"),
        }
    }
}

/// Computes the version that follows `current` under `policy`.
///
/// - **Patch**: patch += 1
/// - **Minor**: minor += 1, patch = 0
/// - **Major**: major += 1, minor = 0, patch = 0
///
/// A component already at `u64::MAX` is a `VersionParse` error.
pub fn resolve_next_version(current: &Version, policy: BumpPolicy) -> Result<Version> {
    let bumped = match policy {
        BumpPolicy::Patch => current
            .patch
            .checked_add(1)
            .map(|patch| Version::new(current.major, current.minor, patch)),
        BumpPolicy::Minor => current
            .minor
            .checked_add(1)
            .map(|minor| Version::new(current.major, minor, 0)),
        BumpPolicy::Major => current
            .major
            .checked_add(1)
            .map(|major| Version::new(major, 0, 0)),
    };
    bumped.ok_or_else(|| {
        ConductorError::version_parse(current.to_string(), format!("{} bump overflows", policy))
    })
}

/// The version assumed for a repository that has never been tagged
pub fn initial_version() -> Version {
    Version::new(0, 0, 0)
}

/// Parses a version string strictly as `major.minor.patch`.
///
/// A leading `v`/`V` is dropped and pre-release or build suffixes are
/// stripped before parsing, so `v1.2.3-rc.1+abc` yields `1.2.3`.
pub fn parse_version(raw: &str) -> Result<Version> {
    let clean = raw.trim_start_matches(&['v', 'V'][..]);
    let core = clean.split(&['-', '+'][..]).next().unwrap_or_default();

    let parsed = Version::parse(core)
        .map_err(|e| ConductorError::version_parse(raw, format!("expected X.Y.Z ({})", e)))?;

    Ok(Version::new(parsed.major, parsed.minor, parsed.patch))
}

/// Whether a tag is meant to carry a version under `pattern`.
///
/// Tags outside the pattern, and tags whose version part does not start
/// with a digit (after an optional `v`), are ordinary tags.
fn is_version_tag(tag: &str, pattern: &TagPattern) -> bool {
    pattern
        .version_part(tag)
        .map(|part| part.trim_start_matches(&['v', 'V'][..]))
        .and_then(|part| part.chars().next())
        .is_some_and(|c| c.is_ascii_digit())
}

/// Finds the latest version tag among `tags`.
///
/// Returns the tag name and its version, the highest version winning and
/// ties going to the lexically smallest tag name. A version-looking tag
/// that fails strict parsing is an error rather than being skipped.
pub fn latest_version<'a, I>(tags: I, pattern: &TagPattern) -> Result<Option<(String, Version)>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut latest: Option<(String, Version)> = None;

    for tag in tags {
        if !is_version_tag(tag, pattern) {
            continue;
        }
        let part = pattern.version_part(tag).unwrap_or(tag);
        let version = parse_version(part).map_err(|e| match e {
            ConductorError::VersionParse { reason, .. } => ConductorError::version_parse(tag, reason),
            other => other,
        })?;

        let replace = match &latest {
            None => true,
            Some((best_tag, best)) => version > *best || (version == *best && tag < best_tag.as_str()),
        };
        if replace {
            latest = Some((tag.to_string(), version));
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_patch_changes_only_patch() {
        let v = Version::new(1, 2, 3);
        assert_eq!(resolve_next_version(&v, BumpPolicy::Patch).unwrap(), Version::new(1, 2, 4));
    }

    #[test]
    fn test_bump_minor_zeroes_patch() {
        let v = Version::new(1, 2, 3);
        assert_eq!(resolve_next_version(&v, BumpPolicy::Minor).unwrap(), Version::new(1, 3, 0));
    }

    #[test]
    fn test_bump_major_zeroes_minor_and_patch() {
        let v = Version::new(1, 2, 3);
        assert_eq!(resolve_next_version(&v, BumpPolicy::Major).unwrap(), Version::new(2, 0, 0));
    }

    #[test]
    fn test_default_policy_from_untagged_repo() {
        let next = resolve_next_version(&initial_version(), BumpPolicy::default()).unwrap();
        assert_eq!(next, Version::new(0, 1, 0));
    }

    #[test]
    fn test_bump_is_deterministic() {
        let v = Version::new(0, 3, 1);
        for policy in [BumpPolicy::Patch, BumpPolicy::Minor, BumpPolicy::Major] {
            assert_eq!(
                resolve_next_version(&v, policy).unwrap(),
                resolve_next_version(&v, policy).unwrap()
            );
        }
    }

    #[test]
    fn test_bump_overflow_is_version_error() {
        let v = Version::new(1, u64::MAX, u64::MAX);
        let err = resolve_next_version(&v, BumpPolicy::Patch).unwrap_err();
        assert!(matches!(err, ConductorError::VersionParse { .. }));
        assert_eq!(err.exit_code(), 4);
        assert!(resolve_next_version(&v, BumpPolicy::Minor).is_err());
        assert_eq!(
            resolve_next_version(&v, BumpPolicy::Major).unwrap(),
            Version::new(2, 0, 0)
        );
    }

    #[test]
    fn test_parse_version_variants() {
        assert_eq!(parse_version("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("V0.1.0").unwrap(), Version::new(0, 1, 0));
    }

    #[test]
    fn test_parse_version_strips_prerelease_and_build() {
        assert_eq!(parse_version("1.2.3-rc.1").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2.3+build.5").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("v2.0.0-beta+exp").unwrap(), Version::new(2, 0, 0));
    }

    #[test]
    fn test_parse_version_rejects_malformed() {
        for raw in ["1.2", "1.2.3.4", "1.x.3", "", "v"] {
            let err = parse_version(raw).unwrap_err();
            assert!(
                matches!(err, ConductorError::VersionParse { .. }),
                "'{}' should be a version parse error, got {:?}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_bump_policy_from_str() {
        assert_eq!("patch".parse::<BumpPolicy>().unwrap(), BumpPolicy::Patch);
        assert_eq!("Minor".parse::<BumpPolicy>().unwrap(), BumpPolicy::Minor);
        assert_eq!("MAJOR".parse::<BumpPolicy>().unwrap(), BumpPolicy::Major);
        assert!("huge".parse::<BumpPolicy>().is_err());
    }

    #[test]
    fn test_latest_version_ignores_plain_tags() {
        let tags = ["0.7.2", "test_tag", "0.10.0", "0.2.3"];
        let latest = latest_version(tags, &TagPattern::default()).unwrap();
        assert_eq!(latest, Some(("0.10.0".to_string(), Version::new(0, 10, 0))));
    }

    #[test]
    fn test_latest_version_none_without_version_tags() {
        let latest = latest_version(["docs", "nightly"], &TagPattern::default()).unwrap();
        assert_eq!(latest, None);
    }

    #[test]
    fn test_latest_version_rejects_malformed_version_tag() {
        let err = latest_version(["0.1.0", "0.2"], &TagPattern::default()).unwrap_err();
        match err {
            ConductorError::VersionParse { tag, .. } => assert_eq!(tag, "0.2"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_latest_version_respects_pattern() {
        let pattern = TagPattern::new("release-{version}").unwrap();
        let tags = ["release-1.0.0", "9.9.9", "release-1.1.0-rc.1"];
        let latest = latest_version(tags, &pattern).unwrap();
        assert_eq!(latest, Some(("release-1.1.0-rc.1".to_string(), Version::new(1, 1, 0))));
    }

    #[test]
    fn test_latest_version_tie_prefers_smallest_name() {
        let latest = latest_version(["v1.0.0", "1.0.0"], &TagPattern::default()).unwrap();
        assert_eq!(latest.map(|(tag, _)| tag), Some("1.0.0".to_string()));
    }
}
