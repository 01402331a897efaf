use self::week::WeekFields;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

pub(crate) mod week;

/// The calendar fields an expression can constrain, smallest unit
/// first. Each one reads, bounds and adjusts on a local date-time
/// through [`Adapter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Second,
    Minute,
    Hour,
    DayOfWeek,
    WeekOfMonth,
    WeekOfYear,
    DayOfMonth,
    DayOfQuarter,
    QuarterOfYear,
    DayOfYear,
    Month,
    Year,
}

impl FieldKey {
    /// Time-agnostic ISO domain, used to validate expressions and to
    /// size them during board selection. Runtime bounds at a concrete
    /// date come from [`Adapter::bounds`] and are usually narrower.
    pub(crate) const fn iso_bounds(self) -> (i32, i32) {
        match self {
            FieldKey::Second | FieldKey::Minute => (0, 59),
            FieldKey::Hour => (0, 23),
            FieldKey::DayOfWeek => (1, 7),
            FieldKey::WeekOfMonth => (0, 6),
            FieldKey::WeekOfYear => (0, 54),
            FieldKey::DayOfMonth => (1, 31),
            FieldKey::DayOfQuarter => (1, 92),
            FieldKey::QuarterOfYear => (1, 4),
            FieldKey::DayOfYear => (1, 366),
            FieldKey::Month => (1, 12),
            FieldKey::Year => (1, 9999),
        }
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            FieldKey::Second => "second",
            FieldKey::Minute => "minute",
            FieldKey::Hour => "hour",
            FieldKey::DayOfWeek => "day-of-week",
            FieldKey::WeekOfMonth => "week-of-month",
            FieldKey::WeekOfYear => "week-of-year",
            FieldKey::DayOfMonth => "day-of-month",
            FieldKey::DayOfQuarter => "day-of-quarter",
            FieldKey::QuarterOfYear => "quarter-of-year",
            FieldKey::DayOfYear => "day-of-year",
            FieldKey::Month => "month",
            FieldKey::Year => "year",
        }
    }
}

/// Calendar primitives for one normalized expression. Every read,
/// bounds query and adjustment the engine performs on a local
/// date-time goes through here; zone conversion never does.
///
/// `week_key` is the week field sitting on the board, if any. It
/// drives the two week repairs: day-of-week bounds restricted to the
/// current week bucket, and week adjustment that snaps the day of
/// week so the result stays inside the bucket's month or year.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Adapter {
    pub week_fields: WeekFields,
    pub week_key: Option<FieldKey>,
}

impl Adapter {
    pub fn read(&self, key: FieldKey, t: NaiveDateTime) -> i32 {
        match key {
            FieldKey::Second => t.second() as i32,
            FieldKey::Minute => t.minute() as i32,
            FieldKey::Hour => t.hour() as i32,
            FieldKey::DayOfWeek => self.week_fields.day_of_week(t.date()),
            FieldKey::WeekOfMonth => self.week_fields.week_of_month(t.date()),
            FieldKey::WeekOfYear => self.week_fields.week_of_year(t.date()),
            FieldKey::DayOfMonth => t.day() as i32,
            FieldKey::DayOfQuarter => {
                t.ordinal() as i32 - quarter_start(t.year(), quarter(t)).ordinal() as i32 + 1
            }
            FieldKey::QuarterOfYear => quarter(t),
            FieldKey::DayOfYear => t.ordinal() as i32,
            FieldKey::Month => t.month() as i32,
            FieldKey::Year => t.year(),
        }
    }

    pub fn bounds(&self, key: FieldKey, t: NaiveDateTime) -> (i32, i32) {
        match key {
            FieldKey::Second | FieldKey::Minute => (0, 59),
            FieldKey::Hour => (0, 23),
            FieldKey::DayOfWeek => self.day_of_week_bounds(t),
            FieldKey::WeekOfMonth => {
                let (first, last) = month_span(t);
                (
                    self.week_fields.week_of_month(first),
                    self.week_fields.week_of_month(last),
                )
            }
            FieldKey::WeekOfYear => {
                let (first, last) = year_span(t);
                (
                    self.week_fields.week_of_year(first),
                    self.week_fields.week_of_year(last),
                )
            }
            FieldKey::DayOfMonth => (1, days_in_month(t.year(), t.month()) as i32),
            FieldKey::DayOfQuarter => (1, days_in_quarter(t.year(), quarter(t))),
            FieldKey::QuarterOfYear => (1, 4),
            FieldKey::DayOfYear => (1, if is_leap_year(t.year()) { 366 } else { 365 }),
            FieldKey::Month => (1, 12),
            FieldKey::Year => FieldKey::Year.iso_bounds(),
        }
    }

    /// Sets `key` to `v` on `t`. `v` must come from the field's
    /// clipped domain at `t`; under that contract every branch is
    /// total. Setting a coarse field (month, quarter, year) clamps
    /// the day of month into the target month, which is fine because
    /// the engine always rebuilds the smaller fields right after.
    pub fn adjust(&self, key: FieldKey, v: i32, t: NaiveDateTime) -> NaiveDateTime {
        match key {
            FieldKey::Second => t.with_second(v as u32).unwrap(),
            FieldKey::Minute => t.with_minute(v as u32).unwrap(),
            FieldKey::Hour => t.with_hour(v as u32).unwrap(),
            FieldKey::DayOfWeek => t + Duration::days((v - self.read(key, t)) as i64),
            FieldKey::WeekOfMonth | FieldKey::WeekOfYear => self.week_adjust(key, v, t),
            FieldKey::DayOfMonth => t.with_day(v as u32).unwrap(),
            FieldKey::DayOfQuarter => {
                let day = quarter_start(t.year(), quarter(t)) + Duration::days((v - 1) as i64);
                day.and_time(t.time())
            }
            FieldKey::QuarterOfYear => {
                let month_in_quarter = t.month0() % 3;
                with_month_clamped(t, (v as u32 - 1) * 3 + month_in_quarter + 1)
            }
            FieldKey::DayOfYear => t.with_ordinal(v as u32).unwrap(),
            FieldKey::Month => with_month_clamped(t, v as u32),
            FieldKey::Year => with_year_clamped(t, v),
        }
    }

    // The day-of-week range within the current week bucket,
    // restricted to the bucket's month or year. Without the
    // restriction, iterating days of a border week would slip into
    // the neighboring month/year and desynchronize the week field
    // above it.
    fn day_of_week_bounds(&self, t: NaiveDateTime) -> (i32, i32) {
        let (first, last) = match self.week_key {
            Some(FieldKey::WeekOfMonth) => month_span(t),
            Some(FieldKey::WeekOfYear) => year_span(t),
            _ => return (1, 7),
        };
        let week_key = self.week_key.unwrap();
        let w = self.read(week_key, t);
        let (wmin, wmax) = self.bounds(week_key, t);
        if w == wmin {
            (self.week_fields.day_of_week(first), 7)
        } else if w == wmax {
            (1, self.week_fields.day_of_week(last))
        } else {
            (1, 7)
        }
    }

    // Moves to week `v` of the current bucket, then snaps the day of
    // week to whichever end keeps the date inside the bucket: the
    // first week may start in the previous month/year (snap to 7),
    // the last may end in the next one (snap to 1). Mid-bucket weeks
    // are full, so the snap just picks the travel-direction end.
    fn week_adjust(&self, key: FieldKey, v: i32, t: NaiveDateTime) -> NaiveDateTime {
        let from = self.read(key, t);
        let (wmin, wmax) = self.bounds(key, t);
        let shifted = t + Duration::weeks((v - from) as i64);
        let snap_to = if v == wmin {
            7
        } else if v == wmax {
            1
        } else if v > from {
            1
        } else {
            7
        };
        let dow = self.week_fields.day_of_week(shifted.date());
        shifted + Duration::days((snap_to - dow) as i64)
    }
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

pub(crate) fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn quarter(t: NaiveDateTime) -> i32 {
    (t.month0() / 3) as i32 + 1
}

fn quarter_start(year: i32, quarter: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, (quarter as u32 - 1) * 3 + 1, 1).unwrap()
}

fn days_in_quarter(year: i32, quarter: i32) -> i32 {
    let first = (quarter as u32 - 1) * 3 + 1;
    (first..first + 3).map(|m| days_in_month(year, m) as i32).sum()
}

fn month_span(t: NaiveDateTime) -> (NaiveDate, NaiveDate) {
    let first = NaiveDate::from_ymd_opt(t.year(), t.month(), 1).unwrap();
    let last = NaiveDate::from_ymd_opt(t.year(), t.month(), days_in_month(t.year(), t.month()))
        .unwrap();
    (first, last)
}

fn year_span(t: NaiveDateTime) -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(t.year(), 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(t.year(), 12, 31).unwrap(),
    )
}

fn with_month_clamped(t: NaiveDateTime, month: u32) -> NaiveDateTime {
    let day = t.day().min(days_in_month(t.year(), month));
    NaiveDate::from_ymd_opt(t.year(), month, day)
        .unwrap()
        .and_time(t.time())
}

fn with_year_clamped(t: NaiveDateTime, year: i32) -> NaiveDateTime {
    let day = t.day().min(days_in_month(year, t.month()));
    NaiveDate::from_ymd_opt(year, t.month(), day)
        .unwrap()
        .and_time(t.time())
}

#[cfg(test)]
mod test {
    use super::week::WeekFields;
    use super::{days_in_month, is_leap_year, Adapter, FieldKey};
    use chrono::NaiveDate;

    fn iso(week_key: Option<FieldKey>) -> Adapter {
        Adapter {
            week_fields: WeekFields::ISO,
            week_key,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn leap_years_and_month_lengths() {
        assert!(is_leap_year(2024));
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(2021));
        assert!(!is_leap_year(1900));
        assert_eq!(29, days_in_month(2024, 2));
        assert_eq!(28, days_in_month(2021, 2));
        assert_eq!(30, days_in_month(2021, 11));
    }

    #[test]
    fn quarter_read_and_bounds() {
        let a = iso(None);
        let t = at(2021, 5, 15, 0, 0, 0);
        assert_eq!(2, a.read(FieldKey::QuarterOfYear, t));
        assert_eq!(45, a.read(FieldKey::DayOfQuarter, t));
        assert_eq!((1, 91), a.bounds(FieldKey::DayOfQuarter, t));
        // Q1 of a leap year picks up the extra day.
        assert_eq!((1, 91), a.bounds(FieldKey::DayOfQuarter, at(2024, 2, 1, 0, 0, 0)));
        assert_eq!((1, 90), a.bounds(FieldKey::DayOfQuarter, at(2021, 2, 1, 0, 0, 0)));
    }

    #[test]
    fn quarter_adjust_keeps_the_month_offset() {
        let a = iso(None);
        let t = at(2021, 5, 15, 6, 30, 0);
        let q3 = a.adjust(FieldKey::QuarterOfYear, 3, t);
        assert_eq!(at(2021, 8, 15, 6, 30, 0), q3);
        let day = a.adjust(FieldKey::DayOfQuarter, 1, q3);
        assert_eq!(at(2021, 7, 1, 6, 30, 0), day);
    }

    #[test]
    fn month_adjust_clamps_the_day() {
        let a = iso(None);
        let t = at(2021, 1, 31, 12, 0, 0);
        assert_eq!(at(2021, 2, 28, 12, 0, 0), a.adjust(FieldKey::Month, 2, t));
        assert_eq!(at(2024, 2, 29, 0, 0, 0), a.adjust(FieldKey::Month, 2, at(2024, 1, 29, 0, 0, 0)));
    }

    #[test]
    fn year_adjust_clamps_leap_day() {
        let a = iso(None);
        let t = at(2024, 2, 29, 8, 0, 0);
        assert_eq!(at(2021, 2, 28, 8, 0, 0), a.adjust(FieldKey::Year, 2021, t));
    }

    #[test]
    fn day_of_week_read_and_adjust() {
        let a = iso(None);
        // 2021-06-16 is a Wednesday.
        let t = at(2021, 6, 16, 11, 15, 30);
        assert_eq!(3, a.read(FieldKey::DayOfWeek, t));
        assert_eq!(at(2021, 6, 14, 11, 15, 30), a.adjust(FieldKey::DayOfWeek, 1, t));
        assert_eq!(at(2021, 6, 20, 11, 15, 30), a.adjust(FieldKey::DayOfWeek, 7, t));
    }

    #[test]
    fn day_of_week_bounds_without_a_week_field() {
        let a = iso(None);
        assert_eq!((1, 7), a.bounds(FieldKey::DayOfWeek, at(2021, 10, 1, 0, 0, 0)));
    }

    #[test]
    fn day_of_week_bounds_clip_border_weeks_of_the_month() {
        let a = iso(Some(FieldKey::WeekOfMonth));
        // October 2021 opens on a Friday: its week-0 days run Fri..Sun.
        assert_eq!((5, 7), a.bounds(FieldKey::DayOfWeek, at(2021, 10, 1, 0, 0, 0)));
        // August 2021 closes on a Tuesday.
        assert_eq!((1, 2), a.bounds(FieldKey::DayOfWeek, at(2021, 8, 31, 0, 0, 0)));
        // A mid-month week is unrestricted.
        assert_eq!((1, 7), a.bounds(FieldKey::DayOfWeek, at(2021, 10, 13, 0, 0, 0)));
    }

    #[test]
    fn day_of_week_bounds_clip_border_weeks_of_the_year() {
        let a = iso(Some(FieldKey::WeekOfYear));
        // 2022 opens on a Saturday.
        assert_eq!((6, 7), a.bounds(FieldKey::DayOfWeek, at(2022, 1, 1, 0, 0, 0)));
        // 2021 closes on a Friday.
        assert_eq!((1, 5), a.bounds(FieldKey::DayOfWeek, at(2021, 12, 31, 0, 0, 0)));
    }

    #[test]
    fn week_adjust_mid_bucket_snaps_toward_travel() {
        let a = iso(Some(FieldKey::WeekOfMonth));
        // Wed Jun 16 2021 sits in week 3 of June; week 4 starts Mon Jun 21.
        let t = at(2021, 6, 16, 0, 0, 0);
        assert_eq!(at(2021, 6, 21, 0, 0, 0), a.adjust(FieldKey::WeekOfMonth, 4, t));
        // Moving backward lands on the Sunday closing week 2.
        assert_eq!(at(2021, 6, 13, 0, 0, 0), a.adjust(FieldKey::WeekOfMonth, 2, t));
    }

    #[test]
    fn week_adjust_border_weeks_stay_inside_the_month() {
        let a = iso(Some(FieldKey::WeekOfMonth));
        let t = at(2021, 6, 16, 0, 0, 0);
        // Week 1 of June 2021 would open on Mon May 31: snapping to 7
        // keeps the result on Sun Jun 6.
        assert_eq!(at(2021, 6, 6, 0, 0, 0), a.adjust(FieldKey::WeekOfMonth, 1, t));
        // Week 5 closes on Sun Jul 4: snapping to 1 keeps Mon Jun 28.
        assert_eq!(at(2021, 6, 28, 0, 0, 0), a.adjust(FieldKey::WeekOfMonth, 5, t));
    }

    #[test]
    fn week_of_year_adjust_across_the_year() {
        let a = iso(Some(FieldKey::WeekOfYear));
        // Week 0 of 2022 is Jan 1..2; snapping to 7 lands on Sun Jan 2.
        let t = at(2022, 6, 15, 0, 0, 0);
        assert_eq!(at(2022, 1, 2, 0, 0, 0), a.adjust(FieldKey::WeekOfYear, 0, t));
    }
}
