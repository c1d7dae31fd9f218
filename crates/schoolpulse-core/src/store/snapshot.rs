use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::section::{SchoolStats, Section};

/// Where the current section values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum DataSource {
    Network,
    Cache,
    Fallback,
}

/// Read-only view of the public content handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ContentSnapshot {
    /// A load cycle is running (including the minimum display wait).
    pub loading: bool,
    /// True until the very first load cycle settles.
    pub initial_load: bool,
    pub section_loading: BTreeMap<Section, bool>,
    /// Set only when the primary fetch and the fallback both failed.
    pub error: Option<String>,
    /// Consecutive failed loads since the last successful one.
    pub retry_count: u32,
    pub sections: BTreeMap<Section, Option<Value>>,
    pub source: Option<DataSource>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for ContentSnapshot {
    fn default() -> Self {
        Self {
            loading: false,
            initial_load: true,
            section_loading: Section::ALL.iter().map(|&s| (s, true)).collect(),
            error: None,
            retry_count: 0,
            sections: Section::ALL.iter().map(|&s| (s, None)).collect(),
            source: None,
            last_updated: None,
        }
    }
}

impl ContentSnapshot {
    pub fn section(&self, section: Section) -> Option<&Value> {
        self.sections.get(&section).and_then(Option::as_ref)
    }

    pub fn is_section_loading(&self, section: Section) -> bool {
        self.section_loading.get(&section).copied().unwrap_or(true)
    }

    pub fn all_sections_loaded(&self) -> bool {
        Section::ALL.iter().all(|&s| !self.is_section_loading(s))
    }

    /// Typed stats, or zeroes if the section is absent or malformed.
    pub fn stats(&self) -> SchoolStats {
        self.section(Section::Stats)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    /// Mark `section` loaded. A missing value keeps what was there before,
    /// or the section's placeholder if nothing was.
    pub(crate) fn reveal(&mut self, section: Section, value: Option<Value>) {
        let slot = self.sections.entry(section).or_insert(None);
        match value {
            Some(value) => *slot = Some(value),
            None => {
                if slot.is_none() {
                    *slot = Some(section.default_value());
                }
            }
        }
        self.section_loading.insert(section, false);
    }

    pub(crate) fn fill(&mut self, section: Section, value: Value) {
        self.sections.insert(section, Some(value));
        self.section_loading.insert(section, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_snapshot_is_loading_everything() {
        let snapshot = ContentSnapshot::default();
        assert!(snapshot.initial_load);
        assert!(!snapshot.loading);
        assert!(Section::ALL.iter().all(|&s| snapshot.is_section_loading(s)));
        assert!(Section::ALL.iter().all(|&s| snapshot.section(s).is_none()));
        assert_eq!(snapshot.stats(), SchoolStats::default());
    }

    #[test]
    fn test_reveal_keeps_previous_value_when_missing() {
        let mut snapshot = ContentSnapshot::default();
        snapshot.reveal(Section::Teachers, Some(json!([{"name": "Ada"}])));
        snapshot.reveal(Section::Teachers, None);
        assert_eq!(snapshot.section(Section::Teachers), Some(&json!([{"name": "Ada"}])));

        snapshot.reveal(Section::Gallery, None);
        assert_eq!(snapshot.section(Section::Gallery), Some(&json!([])));
        assert!(!snapshot.is_section_loading(Section::Gallery));
        assert!(!snapshot.all_sections_loaded());
    }

    #[test]
    fn test_serializes_camel_case_for_the_ui() {
        let mut snapshot = ContentSnapshot::default();
        snapshot.fill(Section::AboutUs, json!({"mission": "Learn"}));
        let value = serde_json::to_value(&snapshot).expect("serialize");

        assert_eq!(value["initialLoad"], json!(true));
        assert_eq!(value["sectionLoading"]["aboutUs"], json!(false));
        assert_eq!(value["sections"]["aboutUs"]["mission"], json!("Learn"));
        assert_eq!(value["retryCount"], json!(0));
        assert!(value["error"].is_null());
    }

    #[test]
    fn test_stats_tolerates_partial_objects() {
        let mut snapshot = ContentSnapshot::default();
        snapshot.fill(Section::Stats, json!({"totalStudents": 850}));
        let stats = snapshot.stats();
        assert_eq!(stats.total_students, 850);
        assert_eq!(stats.total_teachers, 0);
    }
}
