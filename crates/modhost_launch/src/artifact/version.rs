//! Four-part artifact versions, version ranges and the closest-match distance

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Errors raised while parsing versions or ranges
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid version range '{0}'")]
    InvalidRange(String),
}

/// An artifact version `major.minor.micro[.qualifier]`
///
/// Ordering compares the numeric fields first and the qualifier lexically
/// only when all numeric fields tie. An empty qualifier sorts first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    /// Snapshot-like qualifiers mark a version as unstable. Ordering is unaffected.
    pub fn is_unstable(&self) -> bool {
        self.qualifier.to_ascii_uppercase().contains("SNAPSHOT")
    }

    /// The weighted numeric value used by [`distance`]
    fn weight(&self) -> i64 {
        100 * i64::from(self.major) + 10 * i64::from(self.minor) + i64::from(self.micro)
    }

    /// File-name form, e.g. `1.0.0-SNAPSHOT` instead of `1.0.0.SNAPSHOT`
    pub fn to_file_string(&self) -> String {
        let s = self.to_string();
        if s.contains(".SNAPSHOT") {
            s.replace(".SNAPSHOT", "-SNAPSHOT")
        } else {
            s
        }
    }
}

/// Distance between two versions for closest-match selection.
///
/// `|100*major + 10*minor + micro - (100*major' + 10*minor' + micro')|`.
/// The qualifier does not take part, so `1.0.0` and `1.0.0.SNAPSHOT` are at
/// distance zero.
pub fn distance(v1: &Version, v2: &Version) -> u64 {
    (v1.weight() - v2.weight()).unsigned_abs()
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionError::InvalidVersion(s.to_string()));
        }

        // Maven style `1.0.0-SNAPSHOT` carries the qualifier after a hyphen
        let (numeric, hyphen_qualifier) = match trimmed.split_once('-') {
            Some((n, q)) => (n, Some(q)),
            None => (trimmed, None),
        };

        let mut parts = numeric.splitn(4, '.');
        let mut numbers = [0u32; 3];
        let mut qualifier = String::new();

        for (i, slot) in numbers.iter_mut().enumerate() {
            match parts.next() {
                Some(p) => {
                    *slot = p
                        .parse()
                        .map_err(|_| VersionError::InvalidVersion(s.to_string()))?;
                }
                None if i == 0 => return Err(VersionError::InvalidVersion(s.to_string())),
                None => break,
            }
        }
        if let Some(q) = parts.next() {
            qualifier = q.to_string();
        }
        if let Some(q) = hyphen_qualifier {
            if !qualifier.is_empty() {
                return Err(VersionError::InvalidVersion(s.to_string()));
            }
            qualifier = q.to_string();
        }
        if qualifier.is_empty() && trimmed.ends_with('-') {
            return Err(VersionError::InvalidVersion(s.to_string()));
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            micro: numbers[2],
            qualifier,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One side of a version range
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// A Maven style version range such as `[1.0,2.0)`, `[1.0,)` or `[1.2]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl VersionRange {
    /// Whether a version string looks like a range rather than a concrete version
    pub fn is_range(s: &str) -> bool {
        let s = s.trim();
        s.starts_with('[') || s.starts_with('(')
    }

    pub fn contains(&self, v: &Version) -> bool {
        if let Some(lower) = &self.lower {
            if v < &lower.version || (!lower.inclusive && v == &lower.version) {
                return false;
            }
        }
        if let Some(upper) = &self.upper {
            if v > &upper.version || (!upper.inclusive && v == &upper.version) {
                return false;
            }
        }
        true
    }

    /// Highest version among `candidates` that lies in the range
    pub fn highest<'a, I>(&self, candidates: I) -> Option<Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates
            .into_iter()
            .filter(|v| self.contains(v))
            .max()
            .cloned()
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidRange(s.to_string());
        let t = s.trim();
        if t.len() < 2 {
            return Err(invalid());
        }

        let lower_inclusive = match t.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => return Err(invalid()),
        };
        let upper_inclusive = match t.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid()),
        };
        let inner = &t[1..t.len() - 1];

        let parse_bound = |raw: &str, inclusive: bool| -> Result<Option<Bound>, VersionError> {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(None);
            }
            let version = raw.parse().map_err(|_| invalid())?;
            Ok(Some(Bound { version, inclusive }))
        };

        match inner.split_once(',') {
            Some((lo, hi)) => Ok(Self {
                lower: parse_bound(lo, lower_inclusive)?,
                upper: parse_bound(hi, upper_inclusive)?,
            }),
            None => {
                // `[1.2]` pins exactly one version
                if !(lower_inclusive && upper_inclusive) {
                    return Err(invalid());
                }
                let exact = parse_bound(inner, true)?.ok_or_else(invalid)?;
                Ok(Self {
                    lower: Some(exact.clone()),
                    upper: Some(exact),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_full_and_partial() {
        assert_eq!(v("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("2"), Version::new(2, 0, 0));
        assert_eq!(v("1.4"), Version::new(1, 4, 0));
        assert_eq!(v("1.0.0.beta"), Version::new(1, 0, 0).with_qualifier("beta"));
        assert_eq!(
            v("1.0.0-SNAPSHOT"),
            Version::new(1, 0, 0).with_qualifier("SNAPSHOT")
        );
        assert!("".parse::<Version>().is_err());
        assert!("a.b".parse::<Version>().is_err());
        assert!("1.0.0-".parse::<Version>().is_err());
    }

    #[test]
    fn test_ordering_numeric_then_qualifier() {
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("1.0.0.b") > v("1.0.0.a"));
        assert!(v("1.0.0.a") > v("1.0.0"));
        assert!(v("2.0.0") > v("1.99.99.zzz"));
    }

    #[test]
    fn test_snapshot_is_unstable_and_renders_for_files() {
        let snap = v("1.0.0-SNAPSHOT");
        assert!(snap.is_unstable());
        assert_eq!(snap.to_string(), "1.0.0.SNAPSHOT");
        assert_eq!(snap.to_file_string(), "1.0.0-SNAPSHOT");
        assert!(!v("1.0.0").is_unstable());
    }

    #[test]
    fn test_distance_is_symmetric() {
        let versions = ["0.0.1", "1.0.0", "1.0.1", "2.0.0", "3.4.5.q", "10.0.0"];
        for a in versions {
            for b in versions {
                assert_eq!(distance(&v(a), &v(b)), distance(&v(b), &v(a)));
            }
        }
    }

    #[test]
    fn test_distance_ignores_qualifier() {
        assert_eq!(distance(&v("1.2.0"), &v("1.2.0.SNAPSHOT")), 0);
        assert_eq!(distance(&v("1.0.0"), &v("1.0.1")), 1);
        assert_eq!(distance(&v("1.0.0"), &v("2.0.0")), 100);
        assert_eq!(distance(&v("1.1.0"), &v("1.2.0")), 10);
    }

    #[test]
    fn test_range_contains() {
        let r: VersionRange = "[1.0,2.0)".parse().unwrap();
        assert!(r.contains(&v("1.0.0")));
        assert!(r.contains(&v("1.9.9")));
        assert!(!r.contains(&v("2.0.0")));
        assert!(!r.contains(&v("0.9.0")));

        let open: VersionRange = "[1.5,)".parse().unwrap();
        assert!(open.contains(&v("99.0.0")));
        assert!(!open.contains(&v("1.4.0")));

        let exact: VersionRange = "[1.2]".parse().unwrap();
        assert!(exact.contains(&v("1.2.0")));
        assert!(!exact.contains(&v("1.2.1")));
    }

    #[test]
    fn test_range_highest() {
        let r: VersionRange = "(,2.0]".parse().unwrap();
        let candidates = [v("1.0.0"), v("2.0.0"), v("2.0.1"), v("1.5.0")];
        assert_eq!(r.highest(candidates.iter()), Some(v("2.0.0")));
        assert!(VersionRange::is_range("[1,2)"));
        assert!(!VersionRange::is_range("1.2.0"));
        assert!("1.0".parse::<VersionRange>().is_err());
        assert!("(1.0)".parse::<VersionRange>().is_err());
    }
}
