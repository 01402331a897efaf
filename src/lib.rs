//! Bidirectional cron-like iteration over the instants matching a
//! calendar recurrence expression.
//!
//! An [`Expression`] constrains any subset of twelve calendar fields
//! (second through year, including day-of-week, week-of-month/year,
//! day-of-quarter and day-of-year). [`Cronit::new`] pins it to a
//! starting instant in some time zone; [`Cronit::next`] and
//! [`Cronit::prev`] then walk the matching instants in either
//! direction, each returning a fresh immutable value.
//!
//! Internally the expression is laid out on a *board*, a chain of
//! fields iterated like an odometer with carry, while the fields that
//! don't fit the chain become a residual *mask* filter. Fields
//! combine with AND semantics throughout: `day-of-month -1` together
//! with `day-of-week thu` means last Thursdays, not "last day or
//! Thursday".
//!
//! Daylight saving time never produces errors or duplicates: wall
//! times swallowed by a spring-forward gap fire once at the gap's
//! exit (tagged [`Cause::Gap`]), and ambiguous fall-back times
//! resolve to their earlier instant.
//!
//! ```
//! use cronit::{Cronit, Expression, FieldExpr};
//! use chrono::{TimeZone, Utc};
//!
//! let every_six_hours = Expression::builder()
//!     .with_hour(FieldExpr::every(6))
//!     .build();
//! let seed = Utc.with_ymd_and_hms(2021, 6, 16, 11, 15, 30).unwrap();
//! let c = Cronit::new(&every_six_hours, seed).unwrap();
//! let first = c.next().unwrap();
//! assert_eq!(
//!     &Utc.with_ymd_and_hms(2021, 6, 16, 12, 0, 0).unwrap(),
//!     first.current(),
//! );
//! ```
//!
//! Weekday numbering and week bucketing follow the expression's week
//! fields: ISO by default, or resolved from a BCP-47 locale tag
//! (`en-US` weeks start on Sunday), or spelled out explicitly.

pub use self::cronit::{Cause, Cronit, CronitIter};
pub use self::expr::{Builder, Error, Expression, FieldExpr, WeekFieldsSpec};
pub use self::field::week::WeekFields;
pub use self::field::FieldKey;
pub use icu_locid::Locale;

mod board;
mod cronit;
mod expr;
mod field;
mod scalar;
