//! Operating system version contract
//!
//! A contract is the `MAJOR.MINOR` of the target operating system. It decides
//! which fields and defaults the base document generator emits.

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionContract {
    pub major: u64,
    pub minor: u64,
}

impl VersionContract {
    /// Contract used when neither the command line nor the project names one
    pub const CURRENT: VersionContract = VersionContract { major: 1, minor: 9 };

    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Parse `v1.7`, `1.7` or a full version like `v1.7.4`
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let invalid = |message: &str| CoreError::InvalidVersion {
            input: input.to_string(),
            message: message.to_string(),
        };

        if stripped.is_empty() {
            return Err(invalid("empty version"));
        }

        let parsed = match stripped.matches('.').count() {
            1 => semver::Version::parse(&format!("{stripped}.0")),
            _ => semver::Version::parse(stripped),
        }
        .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self::new(parsed.major, parsed.minor))
    }

    /// Whether this contract is at least `major.minor`
    pub fn at_least(&self, major: u64, minor: u64) -> bool {
        *self >= Self::new(major, minor)
    }

    /// Kubernetes version bundled with this operating system release
    pub fn default_kubernetes_version(&self) -> &'static str {
        match (self.major, self.minor) {
            (1, m) if m >= 9 => "1.32.0",
            (1, 8) => "1.31.1",
            (1, 7) => "1.30.3",
            (1, 6) => "1.29.3",
            _ => "1.28.0",
        }
    }
}

impl Default for VersionContract {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for VersionContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

impl FromStr for VersionContract {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(VersionContract::parse("v1.7").unwrap(), VersionContract::new(1, 7));
        assert_eq!(VersionContract::parse("1.8").unwrap(), VersionContract::new(1, 8));
        assert_eq!(VersionContract::parse("v1.6.4").unwrap(), VersionContract::new(1, 6));
        assert_eq!(
            VersionContract::parse("v1.9.0-beta.1").unwrap(),
            VersionContract::new(1, 9)
        );
    }

    #[test]
    fn test_parse_invalid() {
        for input in ["", "v", "latest", "1", "1.x"] {
            let err = VersionContract::parse(input).unwrap_err();
            assert!(matches!(err, CoreError::InvalidVersion { .. }), "{input}");
        }
    }

    #[test]
    fn test_at_least() {
        let v = VersionContract::new(1, 7);
        assert!(v.at_least(1, 6));
        assert!(v.at_least(1, 7));
        assert!(!v.at_least(1, 8));
        assert!(VersionContract::new(2, 0).at_least(1, 9));
    }

    #[test]
    fn test_display() {
        assert_eq!(VersionContract::new(1, 7).to_string(), "v1.7");
        assert_eq!(VersionContract::default(), VersionContract::CURRENT);
    }
}
