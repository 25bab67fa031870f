use super::ModSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record of one detected version transition.
///
/// `mod_summary` is the summary as it looked *after* the change was applied,
/// so the entry stays meaningful even if the mod is later renamed or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "mod")]
    pub mod_summary: ModSummary,

    pub detected_at: DateTime<Utc>,

    #[serde(default)]
    pub previous_package_version: Option<String>,

    #[serde(default)]
    pub new_package_version: Option<String>,

    #[serde(default)]
    pub previous_compatibility_version: Option<String>,

    #[serde(default)]
    pub new_compatibility_version: Option<String>,
}

impl HistoryEntry {
    /// Build an entry from the stored and updated summaries of one mod
    pub fn from_transition(before: &ModSummary, after: &ModSummary, detected_at: DateTime<Utc>) -> Self {
        Self {
            mod_summary: after.clone(),
            detected_at,
            previous_package_version: before.package_version.clone(),
            new_package_version: after.package_version.clone(),
            previous_compatibility_version: before.compatibility_version.clone(),
            new_compatibility_version: after.compatibility_version.clone(),
        }
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_summary.id
    }

    pub fn package_changed(&self) -> bool {
        self.previous_package_version != self.new_package_version
    }

    pub fn compatibility_changed(&self) -> bool {
        self.previous_compatibility_version != self.new_compatibility_version
    }

    /// One-line description, e.g. `SAIN: 3.1.0 -> 3.2.0 (SPT ~3.9 -> ~3.10)`
    pub fn describe(&self) -> String {
        let mut text = format!("{}:", self.mod_summary.display_name());

        if self.package_changed() {
            text.push_str(&format!(
                " {} -> {}",
                self.previous_package_version.as_deref().unwrap_or("?"),
                self.new_package_version.as_deref().unwrap_or("?")
            ));
        }

        if self.compatibility_changed() {
            text.push_str(&format!(
                " (SPT {} -> {})",
                self.previous_compatibility_version.as_deref().unwrap_or("?"),
                self.new_compatibility_version.as_deref().unwrap_or("?")
            ));
        }

        text
    }
}
