use crate::{Calendar, DocDirection};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Prefix used for incoming documents when none is configured.
pub const DEFAULT_INCOMING_PREFIX: &str = "IN";

/// Prefix used for outgoing documents when none is configured.
pub const DEFAULT_OUTGOING_PREFIX: &str = "OUT";

/// Read-only numbering settings of one organization.
///
/// Passed into every derivation explicitly. Nothing in `tally` keeps
/// configuration in global state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct NumberingConfig {
    /// Calendar of the year embedded in student, staff and admission codes.
    pub registration_calendar: Calendar,
    /// Calendar of the year embedded in course admission codes.
    pub course_calendar: Calendar,
    pub documents: DocumentSettings,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            registration_calendar: Calendar::Gregorian,
            course_calendar: Calendar::Jalali,
            documents: DocumentSettings::default(),
        }
    }
}

impl NumberingConfig {
    pub fn with_registration_calendar(mut self, calendar: Calendar) -> Self {
        self.registration_calendar = calendar;
        self
    }

    pub fn with_course_calendar(mut self, calendar: Calendar) -> Self {
        self.course_calendar = calendar;
        self
    }

    pub fn with_documents(mut self, documents: DocumentSettings) -> Self {
        self.documents = documents;
        self
    }
}

/// Document numbering settings, per organization or per school.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct DocumentSettings {
    pub incoming_prefix: Option<String>,
    pub outgoing_prefix: Option<String>,
    /// Calendar of the four-digit year in document numbers.
    pub year_mode: Calendar,
    /// Start a fresh counter every year. When `false` a single counter runs
    /// across years; the year still appears in the rendered number.
    pub reset_yearly: bool,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            incoming_prefix: None,
            outgoing_prefix: None,
            year_mode: Calendar::Gregorian,
            reset_yearly: true,
        }
    }
}

impl DocumentSettings {
    pub fn with_prefix(mut self, direction: DocDirection, prefix: impl Into<String>) -> Self {
        let prefix = Some(prefix.into());
        match direction {
            DocDirection::Incoming => self.incoming_prefix = prefix,
            DocDirection::Outgoing => self.outgoing_prefix = prefix,
        }
        self
    }

    pub fn with_year_mode(mut self, year_mode: Calendar) -> Self {
        self.year_mode = year_mode;
        self
    }

    pub fn with_reset_yearly(mut self, reset_yearly: bool) -> Self {
        self.reset_yearly = reset_yearly;
        self
    }

    /// The trimmed configured prefix for `direction`, or the built-in default
    /// when it is unset or blank.
    pub fn prefix_for(&self, direction: DocDirection) -> &str {
        let (configured, fallback) = match direction {
            DocDirection::Incoming => (&self.incoming_prefix, DEFAULT_INCOMING_PREFIX),
            DocDirection::Outgoing => (&self.outgoing_prefix, DEFAULT_OUTGOING_PREFIX),
        };
        configured
            .as_deref()
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NumberingConfig::default();
        assert_eq!(config.registration_calendar, Calendar::Gregorian);
        assert_eq!(config.course_calendar, Calendar::Jalali);
        assert_eq!(config.documents.year_mode, Calendar::Gregorian);
        assert!(config.documents.reset_yearly);
    }

    #[test]
    fn prefixes_fall_back_when_unset_or_blank() {
        let settings = DocumentSettings::default();
        assert_eq!(settings.prefix_for(DocDirection::Incoming), "IN");
        assert_eq!(settings.prefix_for(DocDirection::Outgoing), "OUT");

        let settings = settings
            .with_prefix(DocDirection::Incoming, "  ")
            .with_prefix(DocDirection::Outgoing, " LTR ");
        assert_eq!(settings.prefix_for(DocDirection::Incoming), "IN");
        assert_eq!(settings.prefix_for(DocDirection::Outgoing), "LTR");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_partial_settings() {
        let config: NumberingConfig = serde_json::from_str(
            r#"{"course_calendar":"shamsi","documents":{"outgoing_prefix":"OUTG","reset_yearly":false}}"#,
        )
        .unwrap();
        assert_eq!(config.registration_calendar, Calendar::Gregorian);
        assert_eq!(config.course_calendar, Calendar::Jalali);
        assert_eq!(config.documents.prefix_for(DocDirection::Outgoing), "OUTG");
        assert!(!config.documents.reset_yearly);
    }
}
