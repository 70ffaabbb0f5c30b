use crate::{CodeFormat, Error, NumberingConfig, PeriodToken, Result, ScopeKey, Tokens};
use chrono::NaiveDate;
use core::fmt;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Category used when a course name yields too few usable characters.
pub const FALLBACK_CATEGORY: &str = "GEN";

const CATEGORY_LEN: usize = 3;

/// The logical sequence families codes are issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Family {
    Students,
    Staff,
    Admissions,
    CourseAdmissions,
    Documents,
}

impl Family {
    /// Leading token of every scope key in this family.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Staff => "staff",
            Self::Admissions => "admissions",
            Self::CourseAdmissions => "course_admissions",
            Self::Documents => "documents",
        }
    }

    /// The built-in format codes of this family are rendered with.
    pub fn format(self) -> &'static CodeFormat {
        match self {
            Self::Students => &CodeFormat::STUDENTS,
            Self::Staff => &CodeFormat::STAFF,
            Self::Admissions => &CodeFormat::ADMISSIONS,
            Self::CourseAdmissions => &CodeFormat::COURSE_ADMISSIONS,
            Self::Documents => &CodeFormat::DOCUMENTS,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a registered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DocDirection {
    Incoming,
    Outgoing,
}

impl DocDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for DocDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for DocDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incoming" | "in" => Ok(Self::Incoming),
            "outgoing" | "out" => Ok(Self::Outgoing),
            other => Err(Error::invalid(format!("unknown document direction `{other}`"))),
        }
    }
}

/// What a caller is about to create, and the facts its code depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "family", rename_all = "snake_case"))]
pub enum CodeContext {
    Student,
    Staff,
    Admission,
    CourseAdmission {
        school_id: String,
        course_name: String,
        /// Picks the period. Today's date is used when absent.
        start_date: Option<NaiveDate>,
    },
    Document {
        school_id: Option<String>,
        direction: DocDirection,
        /// Overrides the calendar year, e.g. with an academic-year key.
        period: Option<String>,
    },
}

impl CodeContext {
    pub fn family(&self) -> Family {
        match self {
            Self::Student => Family::Students,
            Self::Staff => Family::Staff,
            Self::Admission => Family::Admissions,
            Self::CourseAdmission { .. } => Family::CourseAdmissions,
            Self::Document { .. } => Family::Documents,
        }
    }
}

/// Everything needed to allocate and render one code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub family: Family,
    pub scope_key: ScopeKey,
    pub tokens: Tokens,
}

impl Derivation {
    /// Renders `value` with the family's built-in format.
    pub fn render(&self, value: u64) -> String {
        self.family.format().render(value, &self.tokens)
    }
}

/// Computes the scope key and display tokens for `context`.
///
/// Pure: the result depends only on the arguments, and no store is touched.
///
/// | family             | scope key tokens                              |
/// |--------------------|-----------------------------------------------|
/// | students, staff, admissions | family                               |
/// | course admissions  | family, school, period, category              |
/// | documents          | family, school or empty, direction, prefix, period (only when resetting yearly) |
///
/// # Errors
///
/// [`Error::InvalidInput`] for a blank school id on a course admission or a
/// blank document period override.
pub fn derive(
    context: &CodeContext,
    config: &NumberingConfig,
    today: NaiveDate,
) -> Result<Derivation> {
    let family = context.family();
    let (scope_key, tokens) = match context {
        CodeContext::Student | CodeContext::Staff | CodeContext::Admission => {
            let year = config.registration_calendar.year_of(today);
            let tokens = Tokens::default().with_period(PeriodToken::two_digit(year));
            (ScopeKey::from_tokens([family.as_str()])?, tokens)
        }
        CodeContext::CourseAdmission {
            school_id,
            course_name,
            start_date,
        } => {
            let school_id = school_id.trim();
            if school_id.is_empty() {
                return Err(Error::invalid("course admissions require a school id"));
            }
            let year = config.course_calendar.year_of(start_date.unwrap_or(today));
            let period = PeriodToken::two_digit(year);
            let category = category_code(course_name);
            let scope_key = ScopeKey::from_tokens([
                family.as_str(),
                school_id,
                period.as_str(),
                category.as_str(),
            ])?;
            let tokens = Tokens::default()
                .with_category(category)
                .with_period(period);
            (scope_key, tokens)
        }
        CodeContext::Document {
            school_id,
            direction,
            period,
        } => {
            let settings = &config.documents;
            let school_id = school_id.as_deref().map(str::trim).unwrap_or_default();
            let prefix = settings.prefix_for(*direction);
            let period = match period {
                Some(period) => PeriodToken::custom(period)?,
                None => PeriodToken::four_digit(settings.year_mode.year_of(today)),
            };
            let mut key = vec![family.as_str(), school_id, direction.as_str(), prefix];
            if settings.reset_yearly {
                key.push(period.as_str());
            }
            let scope_key = ScopeKey::from_tokens(key)?;
            let tokens = Tokens::default().with_prefix(prefix).with_period(period);
            (scope_key, tokens)
        }
    };

    Ok(Derivation {
        family,
        scope_key,
        tokens,
    })
}

/// Short category code of a course: its first three ASCII letters or digits,
/// upper-cased, or [`FALLBACK_CATEGORY`] when it has fewer than three.
pub fn category_code(name: &str) -> String {
    let code: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(CATEGORY_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if code.len() < CATEGORY_LEN {
        FALLBACK_CATEGORY.to_owned()
    } else {
        code
    }
}
