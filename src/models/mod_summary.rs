use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Last-known summary of a tracked mod.
///
/// Identity is `id`; every other field may change between polls. Optional
/// fields that are missing from persisted state deserialize as `None`, and
/// unknown fields are ignored so older and newer state files stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSummary {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_url: Option<String>,

    /// Host platform version the current release supports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
}

impl ModSummary {
    /// Create a summary with only identity and display name known
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            catalog_url: None,
            compatibility_version: None,
            package_version: None,
        }
    }

    pub fn with_package_version(mut self, version: impl Into<String>) -> Self {
        self.package_version = Some(version.into());
        self
    }

    pub fn with_compatibility_version(mut self, version: impl Into<String>) -> Self {
        self.compatibility_version = Some(version.into());
        self
    }

    pub fn with_catalog_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_url = Some(url.into());
        self
    }

    /// Name for log lines and notifications, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// One entry of a mod's version list as reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: Option<String>,
    pub version: Option<String>,
    pub compatibility_constraint: Option<String>,
}

/// Canonical tracked-set ordering: numeric ids ascending, then any
/// non-numeric ids lexicographically.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
