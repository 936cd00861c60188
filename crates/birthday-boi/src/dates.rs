//! Timezone-aware local-date resolution and birth-date validation.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::warn;

/// A calendar date as observed in some timezone at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

/// Resolves the calendar date for `instant` as observed in `timezone`.
///
/// Timezone identifiers come straight from users and are not validated at
/// input time. An unrecognized identifier falls back to UTC with a warning;
/// this function never fails.
pub fn local_date(timezone: &str, instant: DateTime<Utc>) -> LocalDate {
    let tz = match timezone.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone, "Unknown timezone identifier, falling back to UTC");
            Tz::UTC
        }
    };

    let date = instant.with_timezone(&tz).date_naive();
    LocalDate {
        day: date.day(),
        month: date.month(),
        year: date.year(),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("the month must be between 1 and 12")]
    MonthOutOfRange,
    #[error("the month {month} only has {max_day} days")]
    DayOutOfRange { month: u32, max_day: u32 },
    #[error("{year}-{month:02}-{day:02} is not a real calendar date")]
    NotACalendarDate { day: u32, month: u32, year: i32 },
    #[error("the year must be between 1900 and {max}")]
    YearOutOfRange { max: i32 },
}

/// Checks that `(day, month, year?)` denotes a real calendar date.
///
/// With a year the check is leap-aware. Without a year only the day/month
/// combination is checked, against a non-leap reference, so February 29 is
/// rejected unless a (leap) year is given.
pub fn validate_birth_date(
    day: u32,
    month: u32,
    year: Option<i32>,
    today: NaiveDate,
) -> Result<(), DateError> {
    if !(1..=12).contains(&month) {
        return Err(DateError::MonthOutOfRange);
    }

    match year {
        Some(year) => {
            if !(1900..=today.year()).contains(&year) {
                return Err(DateError::YearOutOfRange { max: today.year() });
            }
            if NaiveDate::from_ymd_opt(year, month, day).is_none() {
                return Err(DateError::NotACalendarDate { day, month, year });
            }
        }
        None => {
            let max_day = days_in_month(month, NON_LEAP_REFERENCE_YEAR);
            if day < 1 || day > max_day {
                return Err(DateError::DayOutOfRange { month, max_day });
            }
        }
    }

    Ok(())
}

/// Reference year for day/month validation when no birth year is given.
const NON_LEAP_REFERENCE_YEAR: i32 = 2023;

fn days_in_month(month: u32, year: i32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn utc_date_passes_through() {
        let date = local_date("UTC", instant("2024-06-15T10:00:00Z"));
        assert_eq!(
            date,
            LocalDate {
                day: 15,
                month: 6,
                year: 2024
            }
        );
    }

    #[test]
    fn los_angeles_lags_utc() {
        // 04:00 UTC on June 15 is still June 14 in Los Angeles (UTC-7).
        let date = local_date("America/Los_Angeles", instant("2024-06-15T04:00:00Z"));
        assert_eq!(date.day, 14);
        assert_eq!(date.month, 6);

        // By 08:00 UTC it is 01:00 on June 15 local time.
        let date = local_date("America/Los_Angeles", instant("2024-06-15T08:00:00Z"));
        assert_eq!(date.day, 15);
        assert_eq!(date.month, 6);
    }

    #[test]
    fn tokyo_leads_utc() {
        let date = local_date("Asia/Tokyo", instant("2024-06-14T16:00:00Z"));
        assert_eq!(date.day, 15);
        assert_eq!(date.month, 6);
    }

    #[test]
    fn invalid_zone_falls_back_to_utc() {
        let now = instant("2024-06-15T10:00:00Z");
        assert_eq!(local_date("Not/AZone", now), local_date("UTC", now));
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(
            local_date("Pacific/Auckland", now),
            local_date("Pacific/Auckland", now)
        );
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn accepts_ordinary_dates() {
        assert_eq!(validate_birth_date(15, 6, None, today()), Ok(()));
        assert_eq!(validate_birth_date(15, 6, Some(1990), today()), Ok(()));
        assert_eq!(validate_birth_date(31, 12, None, today()), Ok(()));
    }

    #[test]
    fn leap_day_needs_a_leap_year() {
        assert_eq!(validate_birth_date(29, 2, Some(2000), today()), Ok(()));
        assert_eq!(
            validate_birth_date(29, 2, Some(1999), today()),
            Err(DateError::NotACalendarDate {
                day: 29,
                month: 2,
                year: 1999
            })
        );
        // Without a year, February 29 is rejected outright.
        assert_eq!(
            validate_birth_date(29, 2, None, today()),
            Err(DateError::DayOutOfRange {
                month: 2,
                max_day: 28
            })
        );
    }

    #[test]
    fn rejects_day_past_end_of_month() {
        assert_eq!(
            validate_birth_date(31, 6, None, today()),
            Err(DateError::DayOutOfRange {
                month: 6,
                max_day: 30
            })
        );
        assert_eq!(
            validate_birth_date(31, 6, Some(1990), today()),
            Err(DateError::NotACalendarDate {
                day: 31,
                month: 6,
                year: 1990
            })
        );
    }

    #[test]
    fn rejects_out_of_range_year() {
        assert_eq!(
            validate_birth_date(1, 1, Some(1899), today()),
            Err(DateError::YearOutOfRange { max: 2024 })
        );
        assert_eq!(
            validate_birth_date(1, 1, Some(2025), today()),
            Err(DateError::YearOutOfRange { max: 2024 })
        );
    }

    #[test]
    fn rejects_month_out_of_range() {
        assert_eq!(
            validate_birth_date(1, 13, None, today()),
            Err(DateError::MonthOutOfRange)
        );
        assert_eq!(
            validate_birth_date(1, 0, None, today()),
            Err(DateError::MonthOutOfRange)
        );
    }
}
