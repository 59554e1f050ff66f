//! Conversion between spreadsheet date serials and `chrono` date-times
//!
//! Serials count days since the workbook's epoch; the fractional part is the
//! time of day. The 1900 system keeps the fictitious 1900-02-29 (serial 60),
//! which has no calendar equivalent and therefore does not convert.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

const MS_PER_DAY: i64 = 86_400_000;

/// Last serial Excel accepts (9999-12-31 in the 1900 system)
const MAX_SERIAL_1900: f64 = 2_958_466.0;

/// Date epoch of a workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSystem {
    /// Serial 1 is 1900-01-01 (with the 1900 leap-year bug)
    #[default]
    Excel1900,
    /// Serial 0 is 1904-01-01
    Excel1904,
}

impl DateSystem {
    /// Convert a serial to a date-time, rounding to the millisecond
    ///
    /// Returns `None` for negative, non-finite or out-of-range serials and for
    /// serial 60 in the 1900 system.
    pub fn to_datetime(self, serial: f64) -> Option<NaiveDateTime> {
        let limit = match self {
            DateSystem::Excel1900 => MAX_SERIAL_1900,
            DateSystem::Excel1904 => MAX_SERIAL_1900 - 1462.0,
        };
        if !serial.is_finite() || serial < 0.0 || serial >= limit {
            return None;
        }

        let total_ms = (serial * MS_PER_DAY as f64).round() as i64;
        let days = total_ms.div_euclid(MS_PER_DAY);
        let ms = total_ms.rem_euclid(MS_PER_DAY);

        let date = match self {
            DateSystem::Excel1900 => match days {
                60 => return None,
                0..=59 => ymd(1899, 12, 31)? + Duration::days(days),
                _ => ymd(1899, 12, 30)? + Duration::days(days),
            },
            DateSystem::Excel1904 => ymd(1904, 1, 1)? + Duration::days(days),
        };

        Some(date + Duration::milliseconds(ms))
    }

    /// Convert a date-time to a serial
    pub fn to_serial(self, dt: NaiveDateTime) -> f64 {
        let date = dt.date();
        let days = match self {
            DateSystem::Excel1900 => {
                let leap_bug_cutoff =
                    NaiveDate::from_ymd_opt(1900, 3, 1).unwrap_or(NaiveDate::MIN);
                let base = if date < leap_bug_cutoff {
                    NaiveDate::from_ymd_opt(1899, 12, 31)
                } else {
                    NaiveDate::from_ymd_opt(1899, 12, 30)
                };
                base.map(|b| (date - b).num_days()).unwrap_or_default()
            }
            DateSystem::Excel1904 => NaiveDate::from_ymd_opt(1904, 1, 1)
                .map(|b| (date - b).num_days())
                .unwrap_or_default(),
        };

        let time = dt.time();
        let ms = time.num_seconds_from_midnight() as i64 * 1000
            + (time.nanosecond() as f64 / 1_000_000.0).round() as i64;

        days as f64 + ms as f64 / MS_PER_DAY as f64
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_known_serials_1900() {
        let sys = DateSystem::Excel1900;
        assert_eq!(sys.to_datetime(1.0), Some(dt(1900, 1, 1, 0, 0, 0)));
        assert_eq!(sys.to_datetime(59.0), Some(dt(1900, 2, 28, 0, 0, 0)));
        assert_eq!(sys.to_datetime(60.0), None);
        assert_eq!(sys.to_datetime(61.0), Some(dt(1900, 3, 1, 0, 0, 0)));
        assert_eq!(sys.to_datetime(45292.5), Some(dt(2024, 1, 1, 12, 0, 0)));
        assert_eq!(sys.to_serial(dt(2024, 1, 1, 12, 0, 0)), 45292.5);
        assert_eq!(sys.to_serial(dt(1900, 1, 1, 0, 0, 0)), 1.0);
    }

    #[test]
    fn test_known_serials_1904() {
        let sys = DateSystem::Excel1904;
        assert_eq!(sys.to_datetime(0.0), Some(dt(1904, 1, 1, 0, 0, 0)));
        assert_eq!(sys.to_datetime(43830.0), Some(dt(2024, 1, 1, 0, 0, 0)));
        assert_eq!(sys.to_serial(dt(2024, 1, 1, 0, 0, 0)), 43830.0);
    }

    #[test]
    fn test_rejects_invalid_serials() {
        let sys = DateSystem::Excel1900;
        assert_eq!(sys.to_datetime(-1.0), None);
        assert_eq!(sys.to_datetime(f64::NAN), None);
        assert_eq!(sys.to_datetime(f64::INFINITY), None);
        assert_eq!(sys.to_datetime(3_000_000.0), None);
    }

    #[test]
    fn test_rounds_to_millisecond() {
        let sys = DateSystem::Excel1900;
        // One nanosecond short of midnight rounds up to the next day
        let almost = 45292.0 + (MS_PER_DAY as f64 - 0.000001) / MS_PER_DAY as f64;
        assert_eq!(sys.to_datetime(almost), Some(dt(2024, 1, 2, 0, 0, 0)));
    }

    proptest! {
        #[test]
        fn prop_serial_inverts_1900(days in 61i64..2_958_465, ms in 0i64..MS_PER_DAY) {
            let sys = DateSystem::Excel1900;
            let base = dt(1899, 12, 30, 0, 0, 0);
            let value = base + Duration::days(days) + Duration::milliseconds(ms);
            prop_assert_eq!(sys.to_datetime(sys.to_serial(value)), Some(value));
        }

        #[test]
        fn prop_serial_inverts_1904(days in 0i64..2_957_000, ms in 0i64..MS_PER_DAY) {
            let sys = DateSystem::Excel1904;
            let base = dt(1904, 1, 1, 0, 0, 0);
            let value = base + Duration::days(days) + Duration::milliseconds(ms);
            prop_assert_eq!(sys.to_datetime(sys.to_serial(value)), Some(value));
        }
    }
}
