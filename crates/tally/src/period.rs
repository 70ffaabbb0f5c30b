use crate::{Error, Result};
use chrono::{Datelike, NaiveDate, Utc};
use core::{fmt, str::FromStr};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A source for "today", used to pick period tokens.
///
/// Injected rather than read from the system clock so tests and batch jobs
/// can pin the period.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use tally::PeriodSource;
///
/// struct NewYearsDay;
/// impl PeriodSource for NewYearsDay {
///     fn today(&self) -> NaiveDate {
///         NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
///     }
/// }
///
/// assert_eq!(NewYearsDay.today().to_string(), "2025-01-01");
/// ```
pub trait PeriodSource {
    /// Returns the current Gregorian date.
    fn today(&self) -> NaiveDate;
}

impl<P: PeriodSource + ?Sized> PeriodSource for &P {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}

impl<P: PeriodSource + ?Sized> PeriodSource for Arc<P> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}

/// Reads today's date from the UTC wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPeriodSource;

impl PeriodSource for SystemPeriodSource {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Always returns the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPeriod(NaiveDate);

impl FixedPeriod {
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl PeriodSource for FixedPeriod {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Calendars a period token can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Calendar {
    #[default]
    Gregorian,
    /// Solar Hijri (Hijri Shamsi). The year starts at the March equinox.
    #[cfg_attr(feature = "serde", serde(alias = "hijri_shamsi", alias = "shamsi"))]
    Jalali,
    /// Lunar Hijri (Hijri Qamari), tabular arithmetic variant.
    #[cfg_attr(feature = "serde", serde(alias = "qamari", alias = "islamic"))]
    HijriQamari,
}

impl Calendar {
    /// The year `date` falls in, in this calendar.
    pub fn year_of(self, date: NaiveDate) -> i32 {
        match self {
            Self::Gregorian => date.year(),
            Self::Jalali => jalali_year(date),
            Self::HijriQamari => hijri_qamari_year(date),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gregorian => "gregorian",
            Self::Jalali => "jalali",
            Self::HijriQamari => "hijri_qamari",
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Calendar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gregorian" => Ok(Self::Gregorian),
            "jalali" | "shamsi" | "hijri_shamsi" | "solar" | "afghan" => Ok(Self::Jalali),
            "qamari" | "hijri_qamari" | "islamic" => Ok(Self::HijriQamari),
            other => Err(Error::invalid(format!("unknown calendar `{other}`"))),
        }
    }
}

/// Day count of the Gregorian months preceding `month` (1-based) in a common
/// year.
const DAYS_BEFORE_MONTH: [i64; 13] = [0, 0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

fn jalali_year(date: NaiveDate) -> i32 {
    let gy = i64::from(date.year());
    let gm = i64::from(date.month());
    let gd = i64::from(date.day());

    // Leap days up to and including the current year are only counted once
    // February is over.
    let gy2 = if gm > 2 { gy + 1 } else { gy };
    let mut days = 355_666 + 365 * gy + (gy2 + 3).div_euclid(4) - (gy2 + 99).div_euclid(100)
        + (gy2 + 399).div_euclid(400)
        + gd
        + DAYS_BEFORE_MONTH[gm as usize];

    let mut jy = -1595 + 33 * days.div_euclid(12_053);
    days = days.rem_euclid(12_053);
    jy += 4 * days.div_euclid(1461);
    days = days.rem_euclid(1461);
    if days > 365 {
        jy += (days - 1).div_euclid(365);
    }
    jy as i32
}

/// Julian day number at noon of a proleptic Gregorian date.
fn julian_day(date: NaiveDate) -> i64 {
    let (mut year, mut month) = (i64::from(date.year()), i64::from(date.month()));
    if month <= 2 {
        year -= 1;
        month += 12;
    }
    let a = year / 100;
    let b = 2 - a + a / 4;
    // 365.25 * (year + 4716) and 30.6001 * (month + 1), truncated.
    (1461 * (year + 4716)) / 4 + (306_001 * (month + 1)) / 10_000 + i64::from(date.day()) + b - 1524
}

fn hijri_qamari_year(date: NaiveDate) -> i32 {
    let mut l = julian_day(date) - 1_948_440 + 10_632;
    let n = (l - 1) / 10_631;
    l = l - 10_631 * n + 354;
    let j = ((10_985 - l) / 5316) * ((50 * l) / 17_719) + (l / 5670) * ((43 * l) / 15_238);
    (30 * n + j - 30) as i32
}

/// A rendered period, embedded in scope keys and codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct PeriodToken(String);

impl PeriodToken {
    /// Last two digits of `year`, zero padded (`2025` → `"25"`).
    pub fn two_digit(year: i32) -> Self {
        Self(format!("{:02}", year.rem_euclid(100)))
    }

    /// `year` zero padded to at least four digits.
    pub fn four_digit(year: i32) -> Self {
        Self(format!("{year:04}"))
    }

    /// A caller-supplied token, such as an academic-year key.
    ///
    /// Surrounding whitespace is trimmed; a blank token is rejected.
    pub fn custom(token: impl AsRef<str>) -> Result<Self> {
        let token = token.as_ref().trim();
        if token.is_empty() {
            return Err(Error::invalid("period token must not be blank"));
        }
        Ok(Self(token.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeriodToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn jalali_year_turns_at_nowruz() {
        assert_eq!(Calendar::Jalali.year_of(date(2025, 3, 20)), 1403);
        assert_eq!(Calendar::Jalali.year_of(date(2025, 3, 21)), 1404);
        assert_eq!(Calendar::Jalali.year_of(date(2024, 3, 19)), 1402);
        assert_eq!(Calendar::Jalali.year_of(date(2024, 3, 20)), 1403);
        assert_eq!(Calendar::Jalali.year_of(date(2025, 1, 1)), 1403);
        assert_eq!(Calendar::Jalali.year_of(date(2025, 12, 31)), 1404);
    }

    #[test]
    fn hijri_qamari_year() {
        assert_eq!(Calendar::HijriQamari.year_of(date(2025, 6, 15)), 1446);
        assert_eq!(Calendar::HijriQamari.year_of(date(2025, 8, 1)), 1447);
    }

    #[test]
    fn gregorian_year_is_the_date_year() {
        assert_eq!(Calendar::Gregorian.year_of(date(2025, 6, 15)), 2025);
    }

    #[test]
    fn calendar_aliases_parse() {
        assert_eq!("Gregorian".parse::<Calendar>().unwrap(), Calendar::Gregorian);
        for alias in ["jalali", "shamsi", "hijri_shamsi", "solar", "afghan"] {
            assert_eq!(alias.parse::<Calendar>().unwrap(), Calendar::Jalali);
        }
        for alias in ["qamari", "hijri_qamari", "islamic"] {
            assert_eq!(alias.parse::<Calendar>().unwrap(), Calendar::HijriQamari);
        }
        assert!(matches!(
            "julian".parse::<Calendar>(),
            Err(Error::InvalidInput { .. })
        ));
    }

    #[test]
    fn period_tokens() {
        assert_eq!(PeriodToken::two_digit(2025).as_str(), "25");
        assert_eq!(PeriodToken::two_digit(1404).as_str(), "04");
        assert_eq!(PeriodToken::two_digit(2000).as_str(), "00");
        assert_eq!(PeriodToken::four_digit(2025).as_str(), "2025");
        assert_eq!(PeriodToken::four_digit(999).as_str(), "0999");
        assert_eq!(PeriodToken::custom(" 1404-05 ").unwrap().as_str(), "1404-05");
        assert!(PeriodToken::custom("  ").is_err());
    }

    #[test]
    fn fixed_period_is_stable() {
        let fixed = FixedPeriod::new(date(2025, 6, 1));
        assert_eq!(fixed.today(), fixed.today());
        let shared = Arc::new(fixed);
        assert_eq!(shared.today(), date(2025, 6, 1));
    }
}
