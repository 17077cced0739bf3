//! Dotted-numeric versions and inclusive version windows.

use std::cmp::Ordering;
use std::fmt;

use super::error::CatalogError;

/// Dotted-numeric version, compared segment by segment.
///
/// Comparison pads the shorter version with zero segments, so `1` and
/// `1.0` are equal and `1.2.10` sorts after `1.2.9`. Equality follows the
/// same rule; the original string is kept only for display.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    segments: Vec<u64>,
}

impl Version {
    /// Parses a dotted-numeric version string.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidVersion`] when the string is empty
    /// or any segment is not an unsigned integer.
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        if raw.is_empty() {
            return Err(CatalogError::InvalidVersion {
                raw: raw.to_string(),
                reason: "version must not be empty".to_string(),
            });
        }
        let segments = raw
            .split('.')
            .map(|segment| {
                segment.parse::<u64>().map_err(|_| CatalogError::InvalidVersion {
                    raw: raw.to_string(),
                    reason: format!("segment '{segment}' is not a number"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The version string as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {},
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

/// Inclusive version window. `None` ends are unbounded; the default
/// window admits every version.
#[derive(Debug, Clone, Default)]
pub struct VersionRange {
    start: Option<Version>,
    end: Option<Version>,
}

impl VersionRange {
    /// Window between two parsed versions.
    #[must_use]
    pub fn new(start: Option<Version>, end: Option<Version>) -> Self {
        Self { start, end }
    }

    /// Parses both optional bounds.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidVersion`] when either bound fails to
    /// parse.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, CatalogError> {
        Ok(Self {
            start: start.map(Version::parse).transpose()?,
            end: end.map(Version::parse).transpose()?,
        })
    }

    /// Whether `version` falls inside the window, both ends inclusive.
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        let after_start = self.start.as_ref().map_or(true, |start| version >= start);
        let before_end = self.end.as_ref().map_or(true, |end| version <= end);
        after_start && before_end
    }
}
