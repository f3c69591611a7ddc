//! Package-publish events carried on the stream.

use std::fmt;

use serde::{Deserialize, Serialize};

const ECOSYSTEM_PREFIX: &str = "ECOSYSTEM_";

/// Package identity within an ecosystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    /// Raw ecosystem tag as published, e.g. `ECOSYSTEM_NPM`.
    pub ecosystem: String,
    pub name: String,
}

/// A package version was published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageEvent {
    pub package: Package,
    pub version: String,
}

impl PackageEvent {
    pub fn new(ecosystem: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: Package {
                ecosystem: ecosystem.into(),
                name: name.into(),
            },
            version: version.into(),
        }
    }

    /// Deduplication key: `ecosystem:name:version`.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(format!(
            "{}:{}:{}",
            self.package.ecosystem, self.package.name, self.version
        ))
    }

    /// Display form of the ecosystem (`ECOSYSTEM_NPM` becomes `npm`).
    #[must_use]
    pub fn ecosystem(&self) -> String {
        normalize_ecosystem(&self.package.ecosystem)
    }
}

/// Strip the `ECOSYSTEM_` tag prefix and lowercase.
#[must_use]
pub fn normalize_ecosystem(raw: &str) -> String {
    raw.strip_prefix(ECOSYSTEM_PREFIX)
        .unwrap_or(raw)
        .to_ascii_lowercase()
}

/// Content fingerprint used by the consumer's dedup cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
