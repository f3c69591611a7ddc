//! Readiness of the environment-sourced stream configuration.

use serde::Serialize;

use super::source::{missing_vars, SourceConfig};

/// Overall readiness of the three required variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    /// All required variables are set.
    Configured,
    /// Some, but not all, are set.
    Partial,
    /// None are set.
    Missing,
}

impl Readiness {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Partial => "partial",
            Self::Missing => "missing",
        }
    }
}

/// Which required variables are missing and what that means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvStatus {
    pub configured: bool,
    pub missing: Vec<String>,
    pub readiness: Readiness,
}

impl EnvStatus {
    /// Inspect the process environment.
    #[must_use]
    pub fn check(source: &SourceConfig) -> Self {
        Self::from_lookup(source, |name| std::env::var(name).ok())
    }

    /// Inspect an arbitrary variable lookup.
    pub fn from_lookup<F>(source: &SourceConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing = missing_vars(source, lookup);
        let required = source.required_vars().len();

        let readiness = if missing.is_empty() {
            Readiness::Configured
        } else if missing.len() == required {
            Readiness::Missing
        } else {
            Readiness::Partial
        };

        Self {
            configured: missing.is_empty(),
            missing,
            readiness,
        }
    }

    /// Human-readable description of where package data comes from.
    #[must_use]
    pub fn source_description(&self) -> &'static str {
        if self.configured {
            "Reading from S2 StreamStore"
        } else {
            "Stream source not configured"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_present_is_configured() {
        let status = EnvStatus::from_lookup(&SourceConfig::default(), |_| Some("x".into()));
        assert!(status.configured);
        assert!(status.missing.is_empty());
        assert_eq!(status.readiness, Readiness::Configured);
    }

    #[test]
    fn test_none_present_is_missing() {
        let status = EnvStatus::from_lookup(&SourceConfig::default(), |_| None);
        assert!(!status.configured);
        assert_eq!(
            status.missing,
            vec!["S2_ACCESS_TOKEN", "S2_BASIN", "S2_STREAM"]
        );
        assert_eq!(status.readiness, Readiness::Missing);
    }

    #[test]
    fn test_some_present_is_partial() {
        let status = EnvStatus::from_lookup(&SourceConfig::default(), |name| {
            (name == "S2_BASIN").then(|| "basin".to_string())
        });
        assert_eq!(status.missing, vec!["S2_ACCESS_TOKEN", "S2_STREAM"]);
        assert_eq!(status.readiness, Readiness::Partial);
    }

    #[test]
    fn test_readiness_serializes_lowercase() {
        let json = serde_json::to_string(&Readiness::Partial).unwrap();
        assert_eq!(json, r#""partial""#);
    }
}
