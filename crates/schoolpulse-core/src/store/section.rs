use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One named slice of the public content snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Settings,
    Teachers,
    Events,
    Gallery,
    Testimonials,
    Stats,
    AboutUs,
    Admissions,
    Academics,
}

impl Section {
    /// Every section, in the order they are revealed after a full fetch.
    pub const ALL: [Section; 9] = [
        Section::Settings,
        Section::Teachers,
        Section::Events,
        Section::Gallery,
        Section::Testimonials,
        Section::Stats,
        Section::AboutUs,
        Section::Admissions,
        Section::Academics,
    ];

    /// Sections the landing-page fallback endpoint can fill.
    pub const FALLBACK: [Section; 5] = [
        Section::Settings,
        Section::Teachers,
        Section::Events,
        Section::Testimonials,
        Section::Stats,
    ];

    /// Key of this section in the full content payload.
    pub fn key(self) -> &'static str {
        match self {
            Section::Settings => "settings",
            Section::Teachers => "teachers",
            Section::Events => "events",
            Section::Gallery => "gallery",
            Section::Testimonials => "testimonials",
            Section::Stats => "stats",
            Section::AboutUs => "aboutUs",
            Section::Admissions => "admissions",
            Section::Academics => "academics",
        }
    }

    /// Key of this section in the landing payload, if the fallback carries it.
    pub fn fallback_key(self) -> Option<&'static str> {
        match self {
            Section::Events => Some("eventsNotices"),
            Section::Settings | Section::Teachers | Section::Testimonials | Section::Stats => {
                Some(self.key())
            }
            Section::Gallery | Section::AboutUs | Section::Admissions | Section::Academics => None,
        }
    }

    pub fn is_list(self) -> bool {
        matches!(
            self,
            Section::Teachers | Section::Events | Section::Gallery | Section::Testimonials
        )
    }

    /// Placeholder used when a payload has nothing for this section.
    pub fn default_value(self) -> Value {
        match self {
            Section::Stats => SchoolStats::default().to_value(),
            s if s.is_list() => json!([]),
            _ => json!({}),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Headline numbers shown on the landing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolStats {
    pub total_students: u64,
    pub total_teachers: u64,
    pub years_of_excellence: u64,
    pub success_rate: f64,
}

impl SchoolStats {
    pub fn to_value(&self) -> Value {
        json!({
            "totalStudents": self.total_students,
            "totalTeachers": self.total_teachers,
            "yearsOfExcellence": self.years_of_excellence,
            "successRate": self.success_rate,
        })
    }
}

fn present(payload: &Value, key: &str) -> Option<Value> {
    payload.get(key).filter(|value| !value.is_null()).cloned()
}

/// Stats from `stats`, then `settings.stats`.
fn stats_in(payload: &Value) -> Option<Value> {
    present(payload, "stats").or_else(|| {
        payload
            .pointer("/settings/stats")
            .filter(|value| !value.is_null())
            .cloned()
    })
}

/// Stats come from `stats`, then `settings.stats`, then zeroed defaults.
pub fn derive_stats(payload: &Value) -> Value {
    stats_in(payload).unwrap_or_else(|| Section::Stats.default_value())
}

/// Value for `section` in a full content payload, if it carries one.
pub(crate) fn from_primary(payload: &Value, section: Section) -> Option<Value> {
    match section {
        Section::Stats => Some(derive_stats(payload)),
        _ => present(payload, section.key()),
    }
}

/// Value for `section` in a landing payload, if it carries one.
///
/// Missing stats stay missing here instead of being zeroed.
pub(crate) fn from_fallback(payload: &Value, section: Section) -> Option<Value> {
    match section {
        Section::Stats => stats_in(payload),
        _ => section
            .fallback_key()
            .and_then(|key| present(payload, key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_round_trip_through_serde() {
        for section in Section::ALL {
            let encoded = serde_json::to_value(section).expect("serialize");
            assert_eq!(encoded, Value::String(section.key().to_string()));
        }
        assert_eq!(Section::AboutUs.to_string(), "aboutUs");
    }

    #[test]
    fn test_fallback_sections_have_keys() {
        for section in Section::FALLBACK {
            assert!(section.fallback_key().is_some(), "{} has no fallback key", section);
        }
        assert_eq!(Section::Events.fallback_key(), Some("eventsNotices"));
        assert_eq!(Section::Gallery.fallback_key(), None);
    }

    #[test]
    fn test_default_values_by_shape() {
        assert_eq!(Section::Teachers.default_value(), json!([]));
        assert_eq!(Section::AboutUs.default_value(), json!({}));
        assert_eq!(
            Section::Stats.default_value()["totalStudents"],
            json!(0)
        );
    }

    #[test]
    fn test_derive_stats_prefers_top_level() {
        let payload = json!({
            "stats": {"totalStudents": 900},
            "settings": {"stats": {"totalStudents": 1}}
        });
        assert_eq!(derive_stats(&payload), json!({"totalStudents": 900}));
    }

    #[test]
    fn test_derive_stats_falls_back_to_settings_then_defaults() {
        let nested = json!({"stats": null, "settings": {"stats": {"totalTeachers": 12}}});
        assert_eq!(derive_stats(&nested), json!({"totalTeachers": 12}));

        let bare = json!({"settings": {"schoolName": "Riverside"}});
        let stats: SchoolStats = serde_json::from_value(derive_stats(&bare)).expect("stats");
        assert_eq!(stats, SchoolStats::default());
    }

    #[test]
    fn test_null_sections_count_as_missing() {
        let payload = json!({"teachers": null, "gallery": [1]});
        assert_eq!(from_primary(&payload, Section::Teachers), None);
        assert_eq!(from_primary(&payload, Section::Gallery), Some(json!([1])));
        // The landing payload never fills the gallery, even if present
        assert_eq!(from_fallback(&payload, Section::Gallery), None);
    }

    #[test]
    fn test_fallback_stats_are_never_defaulted() {
        let bare = json!({"settings": {"schoolName": "Riverside"}});
        assert_eq!(from_fallback(&bare, Section::Stats), None);
        assert_eq!(from_primary(&bare, Section::Stats), Some(Section::Stats.default_value()));

        let nested = json!({"settings": {"stats": {"totalStudents": 640}}});
        assert_eq!(
            from_fallback(&nested, Section::Stats),
            Some(json!({"totalStudents": 640}))
        );
    }
}
