use crate::PeriodToken;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Derived tokens a code is rendered from, alongside the allocated number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tokens {
    pub prefix: Option<String>,
    pub category: Option<String>,
    pub period: Option<PeriodToken>,
}

impl Tokens {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_period(mut self, period: PeriodToken) -> Self {
        self.period = Some(period);
        self
    }
}

/// One slot of a [`CodeFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Literal(&'static str),
    Prefix,
    Category,
    Period,
    /// The allocated number, zero padded to the format's width.
    Number,
}

/// A static template turning a number and its tokens into a code.
///
/// Segments are joined with the separator. A segment whose token is absent
/// or empty is skipped together with its separator, and each token is trimmed
/// of surrounding whitespace and separators, so a rendered code never starts,
/// ends or doubles up on a separator.
///
/// Rendering is total. Numbers wider than the padding are written in full.
///
/// ```
/// use tally::{CodeFormat, PeriodToken, Segment, Tokens};
///
/// const INVOICES: CodeFormat =
///     CodeFormat::new('-', 4, &[Segment::Literal("INV"), Segment::Period, Segment::Number]);
///
/// let tokens = Tokens::default().with_period(PeriodToken::four_digit(2025));
/// assert_eq!(INVOICES.render(12, &tokens), "INV-2025-0012");
/// assert_eq!(INVOICES.render(12, &Tokens::default()), "INV-0012");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFormat {
    pub separator: char,
    pub width: usize,
    pub segments: &'static [Segment],
}

impl CodeFormat {
    /// `ST-25-000007`
    pub const STUDENTS: Self = Self::new(
        '-',
        6,
        &[Segment::Literal("ST"), Segment::Period, Segment::Number],
    );

    /// `STF-25-000007`
    pub const STAFF: Self = Self::new(
        '-',
        6,
        &[Segment::Literal("STF"), Segment::Period, Segment::Number],
    );

    /// `ADM-25-000007`
    pub const ADMISSIONS: Self = Self::new(
        '-',
        6,
        &[Segment::Literal("ADM"), Segment::Period, Segment::Number],
    );

    /// `CS-PHY-25-001`
    pub const COURSE_ADMISSIONS: Self = Self::new(
        '-',
        3,
        &[
            Segment::Literal("CS"),
            Segment::Category,
            Segment::Period,
            Segment::Number,
        ],
    );

    /// `IN/2025/00042`
    pub const DOCUMENTS: Self = Self::new(
        '/',
        5,
        &[Segment::Prefix, Segment::Period, Segment::Number],
    );

    pub const fn new(separator: char, width: usize, segments: &'static [Segment]) -> Self {
        Self {
            separator,
            width,
            segments,
        }
    }

    pub fn render(&self, value: u64, tokens: &Tokens) -> String {
        let number = format!("{value:0width$}", width = self.width);
        let mut code = String::with_capacity(number.len() + 16);
        for segment in self.segments {
            let part = match segment {
                Segment::Literal(text) => *text,
                Segment::Prefix => tokens.prefix.as_deref().unwrap_or_default(),
                Segment::Category => tokens.category.as_deref().unwrap_or_default(),
                Segment::Period => tokens.period.as_ref().map_or("", PeriodToken::as_str),
                Segment::Number => number.as_str(),
            };
            let part = part.trim_matches(|c: char| c == self.separator || c.is_whitespace());
            if part.is_empty() {
                continue;
            }
            if !code.is_empty() {
                code.push(self.separator);
            }
            code.push_str(part);
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category_code;

    fn period(token: &str) -> Tokens {
        Tokens::default().with_period(PeriodToken::custom(token).unwrap())
    }

    #[test]
    fn registration_codes() {
        assert_eq!(CodeFormat::STUDENTS.render(7, &period("25")), "ST-25-000007");
        assert_eq!(CodeFormat::STAFF.render(1, &period("25")), "STF-25-000001");
        assert_eq!(
            CodeFormat::ADMISSIONS.render(123_456, &period("24")),
            "ADM-24-123456"
        );
    }

    #[test]
    fn course_admission_codes() {
        let tokens = period("25").with_category(category_code("Physics Lab"));
        assert_eq!(
            CodeFormat::COURSE_ADMISSIONS.render(1, &tokens),
            "CS-PHY-25-001"
        );

        let tokens = period("25").with_category(category_code("A1"));
        assert_eq!(
            CodeFormat::COURSE_ADMISSIONS.render(17, &tokens),
            "CS-GEN-25-017"
        );
    }

    #[test]
    fn document_codes() {
        let tokens = period("2025").with_prefix("IN");
        assert_eq!(CodeFormat::DOCUMENTS.render(42, &tokens), "IN/2025/00042");
    }

    #[test]
    fn absent_tokens_leave_no_dangling_separators() {
        assert_eq!(
            CodeFormat::DOCUMENTS.render(42, &Tokens::default()),
            "00042"
        );
        assert_eq!(
            CodeFormat::DOCUMENTS.render(42, &Tokens::default().with_prefix("IN")),
            "IN/00042"
        );
        assert_eq!(
            CodeFormat::COURSE_ADMISSIONS.render(3, &Tokens::default().with_category("")),
            "CS-003"
        );
    }

    #[test]
    fn tokens_are_trimmed_of_separators() {
        let tokens = period("2025").with_prefix("/OUT/ ");
        assert_eq!(CodeFormat::DOCUMENTS.render(1, &tokens), "OUT/2025/00001");

        let tokens = period("2025").with_prefix("//");
        assert_eq!(CodeFormat::DOCUMENTS.render(1, &tokens), "2025/00001");
    }

    #[test]
    fn wide_numbers_are_not_truncated() {
        assert_eq!(
            CodeFormat::COURSE_ADMISSIONS.render(12_345, &period("25").with_category("ART")),
            "CS-ART-25-12345"
        );
        assert_eq!(
            CodeFormat::STUDENTS.render(u64::MAX, &period("25")),
            format!("ST-25-{}", u64::MAX)
        );
        assert_eq!(CodeFormat::STUDENTS.render(0, &period("25")), "ST-25-000000");
    }
}
