use chrono::{Datelike, NaiveDate, Weekday};
use fxhash::FxHashMap;
use icu_calendar::types::IsoWeekday;
use icu_calendar::week::WeekCalculator;
use icu_locid::Locale;
use std::sync::{Mutex, OnceLock};

/// The locale-dependent definition of a week: which day opens it,
/// and how many days of a partial opening week it takes for that
/// week to count as week 1 of its month or year.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WeekFields {
    pub first_day: Weekday,
    pub min_days: u8,
}

impl WeekFields {
    /// ISO-8601 weeks: Monday start, four-day rule.
    pub const ISO: WeekFields = WeekFields {
        first_day: Weekday::Mon,
        min_days: 4,
    };

    /// Sunday start, any day qualifies the first week.
    pub const SUNDAY_START: WeekFields = WeekFields {
        first_day: Weekday::Sun,
        min_days: 1,
    };

    /// CLDR week data for a BCP-47 locale, e.g. `en-US` gives
    /// Sunday/1 and `en-BE` gives Monday/4. Resolutions are cached
    /// per process; a locale without week data falls back to ISO.
    pub fn for_locale(locale: &Locale) -> WeekFields {
        static CACHE: OnceLock<Mutex<FxHashMap<String, WeekFields>>> = OnceLock::new();
        let cache = CACHE.get_or_init(Default::default);
        let key = locale.to_string();
        if let Some(wf) = cache.lock().unwrap().get(&key) {
            return *wf;
        }
        let wf = match WeekCalculator::try_new(&locale.clone().into()) {
            Ok(calc) => WeekFields {
                first_day: from_iso_weekday(calc.first_weekday),
                min_days: calc.min_week_days,
            },
            Err(_) => WeekFields::ISO,
        };
        cache.lock().unwrap().insert(key, wf);
        wf
    }

    /// The locale-relative day of week of `date`, in `1..=7` with
    /// 1 being `first_day`.
    pub fn day_of_week(&self, date: NaiveDate) -> i32 {
        self.weekday_number(date.weekday())
    }

    /// Maps a weekday name onto the same `1..=7` scale.
    pub fn weekday_number(&self, weekday: Weekday) -> i32 {
        let base = self.first_day.num_days_from_monday() as i32;
        (weekday.num_days_from_monday() as i32 - base).rem_euclid(7) + 1
    }

    /// Week of the month `date` falls in. Days of a leading partial
    /// week that is too short to qualify land in week 0.
    pub fn week_of_month(&self, date: NaiveDate) -> i32 {
        self.week_number(date.day() as i32, self.day_of_week(date))
    }

    /// Week of the year `date` falls in. Unlike ISO week-of-year,
    /// boundary days are never attributed to the neighboring year:
    /// every date belongs to a week bucket of its own year, which is
    /// what keeps week iteration inside one year at a time.
    pub fn week_of_year(&self, date: NaiveDate) -> i32 {
        self.week_number(date.ordinal() as i32, self.day_of_week(date))
    }

    // `day` is 1-based within its bucket (month or year), `dow` the
    // locale-relative day of week of that same date.
    fn week_number(&self, day: i32, dow: i32) -> i32 {
        let week_start = (day - dow).rem_euclid(7);
        let offset = if week_start + 1 > self.min_days as i32 {
            7 - week_start
        } else {
            -week_start
        };
        (7 + offset + day - 1) / 7
    }
}

fn from_iso_weekday(weekday: IsoWeekday) -> Weekday {
    match weekday {
        IsoWeekday::Monday => Weekday::Mon,
        IsoWeekday::Tuesday => Weekday::Tue,
        IsoWeekday::Wednesday => Weekday::Wed,
        IsoWeekday::Thursday => Weekday::Thu,
        IsoWeekday::Friday => Weekday::Fri,
        IsoWeekday::Saturday => Weekday::Sat,
        IsoWeekday::Sunday => Weekday::Sun,
    }
}
