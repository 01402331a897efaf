use crate::field::week::WeekFields;
use crate::field::FieldKey;
use chrono::{Month, Weekday};
use std::fmt;

/// One field's constraint inside an [`Expression`].
///
/// Negative integers count from the end of the field's domain at the
/// date under consideration: `-1` is the last value (last day of the
/// month, last second of the minute), `-7` the seventh-from-last.
/// They stay symbolic until the expression is clipped against a
/// concrete date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldExpr {
    /// The field's full span, i.e. `*`.
    All,
    /// An arithmetic progression; unset endpoints fall back to the
    /// field's domain, an unset step is 1.
    Range {
        min: Option<i32>,
        max: Option<i32>,
        step: Option<i32>,
    },
    /// An enumeration; items may themselves be values, weekday or
    /// month keywords, ranges, or nested enumerations.
    Enum(Vec<FieldExpr>),
    /// A single value.
    Int(i32),
    /// A weekday keyword, valid on the day-of-week field only. Its
    /// number depends on the resolved week fields: with ISO weeks
    /// `Mon` is 1, with Sunday-start weeks `Sun` is.
    Day(Weekday),
    /// A month keyword, valid on the month field only; always `1..=12`.
    MonthName(Month),
}

impl FieldExpr {
    /// Every `step`-th value across the whole field, starting at the
    /// field's minimum.
    pub fn every(step: i32) -> Self {
        FieldExpr::Range {
            min: None,
            max: None,
            step: Some(step),
        }
    }

    /// All values from `min` through `max`.
    pub fn span(min: i32, max: i32) -> Self {
        FieldExpr::Range {
            min: Some(min),
            max: Some(max),
            step: None,
        }
    }

    /// All values from `min` through `max`, `step` apart.
    pub fn range(min: i32, max: i32, step: i32) -> Self {
        FieldExpr::Range {
            min: Some(min),
            max: Some(max),
            step: Some(step),
        }
    }
}

impl From<i32> for FieldExpr {
    fn from(value: i32) -> Self {
        FieldExpr::Int(value)
    }
}

impl From<Weekday> for FieldExpr {
    fn from(value: Weekday) -> Self {
        FieldExpr::Day(value)
    }
}

impl From<Month> for FieldExpr {
    fn from(value: Month) -> Self {
        FieldExpr::MonthName(value)
    }
}

impl<T: Into<FieldExpr>, const N: usize> From<[T; N]> for FieldExpr {
    fn from(value: [T; N]) -> Self {
        FieldExpr::Enum(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldExpr>> From<Vec<T>> for FieldExpr {
    fn from(value: Vec<T>) -> Self {
        FieldExpr::Enum(value.into_iter().map(Into::into).collect())
    }
}

/// How the expression defines its weeks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeekFieldsSpec {
    /// Monday start, four-day rule.
    Iso,
    /// Sunday start, one-day rule.
    SundayStart,
    /// Spelled out directly.
    Explicit(WeekFields),
}

/// A calendar recurrence expression: per-field constraints plus the
/// locale options that give weekday keywords and week numbering their
/// meaning. Build one with [`Expression::builder`]; validation
/// happens when the expression is handed to [`Cronit::new`].
///
/// [`Cronit::new`]: crate::Cronit::new
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expression {
    fields: Vec<(FieldKey, FieldExpr)>,
    locale: Option<String>,
    week_fields: Option<WeekFieldsSpec>,
}

impl Expression {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub(crate) fn fields(&self) -> &[(FieldKey, FieldExpr)] {
        &self.fields
    }

    pub(crate) fn locale_tag(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub(crate) fn week_fields_spec(&self) -> Option<WeekFieldsSpec> {
        self.week_fields
    }
}

/// Builder for [`Expression`]. Each `with_*` method pins one field;
/// setting the same field twice keeps the last value.
#[derive(Debug, Default)]
pub struct Builder {
    fields: Vec<(FieldKey, FieldExpr)>,
    locale: Option<String>,
    week_fields: Option<WeekFieldsSpec>,
}

impl Builder {
    pub fn with_second(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::Second, expr)
    }

    pub fn with_minute(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::Minute, expr)
    }

    pub fn with_hour(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::Hour, expr)
    }

    pub fn with_day_of_week(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::DayOfWeek, expr)
    }

    pub fn with_week_of_month(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::WeekOfMonth, expr)
    }

    pub fn with_week_of_year(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::WeekOfYear, expr)
    }

    pub fn with_day_of_month(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::DayOfMonth, expr)
    }

    pub fn with_day_of_quarter(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::DayOfQuarter, expr)
    }

    pub fn with_quarter_of_year(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::QuarterOfYear, expr)
    }

    pub fn with_day_of_year(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::DayOfYear, expr)
    }

    pub fn with_month(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::Month, expr)
    }

    pub fn with_year(&mut self, expr: impl Into<FieldExpr>) -> &mut Self {
        self.with(FieldKey::Year, expr)
    }

    pub fn with(&mut self, key: FieldKey, expr: impl Into<FieldExpr>) -> &mut Self {
        let expr = expr.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = expr;
        } else {
            self.fields.push((key, expr));
        }
        self
    }

    /// BCP-47 language tag, e.g. `"en-US"`. Drives week numbering and
    /// weekday keyword values unless `with_week_fields` overrides it.
    pub fn with_locale(&mut self, tag: &str) -> &mut Self {
        self.locale = Some(tag.to_owned());
        self
    }

    pub fn with_week_fields(&mut self, spec: WeekFieldsSpec) -> &mut Self {
        self.week_fields = Some(spec);
        self
    }

    pub fn build(&mut self) -> Expression {
        Expression {
            fields: std::mem::take(&mut self.fields),
            locale: self.locale.take(),
            week_fields: self.week_fields.take(),
        }
    }
}

/// Why an expression was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An enumeration item can never fall inside the field's domain.
    InvalidEnumeration { field: FieldKey, expr: String },
    /// A keyword value used on a field it doesn't belong to.
    InvalidField { field: FieldKey, expr: String },
    /// Same, for an item nested inside an enumeration.
    InvalidSubField { field: FieldKey, expr: String },
    /// A range whose endpoints can never produce a value.
    RangeInvalidField { field: FieldKey, expr: String },
    RangeStepMustBePositive { field: FieldKey, step: i32 },
    /// The locale option isn't a parseable BCP-47 tag.
    InvalidLocale { tag: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidEnumeration { field, expr } => {
                write!(f, "invalid enumeration for {}: {}", field.name(), expr)
            }
            Error::InvalidField { field, expr } => {
                write!(f, "invalid value for {}: {}", field.name(), expr)
            }
            Error::InvalidSubField { field, expr } => {
                write!(f, "invalid enumeration item for {}: {}", field.name(), expr)
            }
            Error::RangeInvalidField { field, expr } => {
                write!(f, "invalid range for {}: {}", field.name(), expr)
            }
            Error::RangeStepMustBePositive { field, step } => {
                write!(f, "range step for {} must be positive, got {}", field.name(), step)
            }
            Error::InvalidLocale { tag } => write!(f, "invalid locale tag: {:?}", tag),
        }
    }
}

impl std::error::Error for Error {}

/// A field constraint after keyword resolution: nested enumerations
/// are flattened, weekday/month names are numbers, negatives are
/// still symbolic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Norm {
    Range {
        min: Option<i32>,
        max: Option<i32>,
        step: i32,
    },
    Enum(Vec<NormItem>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NormItem {
    Int(i32),
    Range {
        min: Option<i32>,
        max: Option<i32>,
        step: i32,
    },
}

impl Norm {
    /// The full-span range a missing field defaults to once some
    /// smaller field has been pinned by the client.
    pub(crate) fn full() -> Norm {
        Norm::Range {
            min: None,
            max: None,
            step: 1,
        }
    }

    /// The single-first-value enumeration a missing field defaults to
    /// below every client-pinned field.
    pub(crate) fn first_value() -> Norm {
        Norm::Enum(Vec::new())
    }

    pub(crate) fn is_full_range(&self) -> bool {
        matches!(
            self,
            Norm::Range {
                min: None,
                max: None,
                step: 1
            }
        )
    }
}

/// A constraint clipped against a concrete domain `[min, max]`:
/// negatives resolved, range endpoints clamped, enumeration items
/// expanded/sorted/deduplicated and out-of-domain values dropped. A
/// clipped domain may well be empty for a particular date; the engine
/// treats that as "no value here, carry upward".
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Clipped {
    Range { min: i32, max: i32, step: i32 },
    Enum(Vec<i32>),
}

fn resolve(v: i32, max: i32) -> i32 {
    if v < 0 {
        max + 1 + v
    } else {
        v
    }
}

pub(crate) fn clip(norm: &Norm, dmin: i32, dmax: i32) -> Clipped {
    match norm {
        Norm::Range { min, max, step } => Clipped::Range {
            min: resolve(min.unwrap_or(dmin), dmax).max(dmin),
            max: resolve(max.unwrap_or(dmax), dmax).min(dmax),
            step: *step,
        },
        Norm::Enum(items) if items.is_empty() => Clipped::Enum(vec![dmin]),
        Norm::Enum(items) => {
            let mut values = Vec::new();
            for item in items {
                match *item {
                    NormItem::Int(v) => {
                        let v = resolve(v, dmax);
                        if (dmin..=dmax).contains(&v) {
                            values.push(v);
                        }
                    }
                    NormItem::Range { min, max, step } => {
                        let lo = resolve(min.unwrap_or(dmin), dmax).max(dmin);
                        let hi = resolve(max.unwrap_or(dmax), dmax).min(dmax);
                        values.extend((lo..=hi).step_by(step as usize));
                    }
                }
            }
            values.sort_unstable();
            values.dedup();
            Clipped::Enum(values)
        }
    }
}

/// Membership of `v` in the constraint, against the domain at some
/// date. This is what a mask field evaluates on every candidate.
pub(crate) fn member(norm: &Norm, v: i32, dmin: i32, dmax: i32) -> bool {
    match clip(norm, dmin, dmax) {
        Clipped::Range { min, max, step } => v >= min && v <= max && (v - min) % step == 0,
        Clipped::Enum(values) => values.binary_search(&v).is_ok(),
    }
}

/// Number of values the constraint selects out of a domain; the board
/// tie-break minimizes the sum of these.
pub(crate) fn cardinality(norm: &Norm, dmin: i32, dmax: i32) -> i64 {
    match clip(norm, dmin, dmax) {
        Clipped::Range { min, max, step } => {
            if max < min {
                0
            } else {
                ((max - min) / step) as i64 + 1
            }
        }
        Clipped::Enum(values) => values.len() as i64,
    }
}

/// Desugars one field's [`FieldExpr`] into a [`Norm`], resolving
/// weekday/month keywords through the week fields and rejecting
/// everything that can never match.
pub(crate) fn normalize(
    week_fields: WeekFields,
    field: FieldKey,
    expr: &FieldExpr,
) -> Result<Norm, Error> {
    let norm = match expr {
        FieldExpr::All => Norm::full(),
        FieldExpr::Range { min, max, step } => Norm::Range {
            min: *min,
            max: *max,
            step: checked_step(field, *step)?,
        },
        FieldExpr::Int(v) => Norm::Enum(vec![NormItem::Int(*v)]),
        FieldExpr::Day(d) => {
            if field != FieldKey::DayOfWeek {
                return Err(Error::InvalidField {
                    field,
                    expr: format!("{:?}", expr),
                });
            }
            Norm::Enum(vec![NormItem::Int(week_fields.weekday_number(*d))])
        }
        FieldExpr::MonthName(m) => {
            if field != FieldKey::Month {
                return Err(Error::InvalidField {
                    field,
                    expr: format!("{:?}", expr),
                });
            }
            Norm::Enum(vec![NormItem::Int(m.number_from_month() as i32)])
        }
        FieldExpr::Enum(items) => {
            let mut flat = Vec::with_capacity(items.len());
            flatten_items(week_fields, field, items, &mut flat)?;
            Norm::Enum(flat)
        }
    };
    validate(field, &norm, expr)?;
    Ok(norm)
}

fn flatten_items(
    week_fields: WeekFields,
    field: FieldKey,
    items: &[FieldExpr],
    out: &mut Vec<NormItem>,
) -> Result<(), Error> {
    for item in items {
        match item {
            FieldExpr::Int(v) => out.push(NormItem::Int(*v)),
            FieldExpr::Day(d) => {
                if field != FieldKey::DayOfWeek {
                    return Err(Error::InvalidSubField {
                        field,
                        expr: format!("{:?}", item),
                    });
                }
                out.push(NormItem::Int(week_fields.weekday_number(*d)));
            }
            FieldExpr::MonthName(m) => {
                if field != FieldKey::Month {
                    return Err(Error::InvalidSubField {
                        field,
                        expr: format!("{:?}", item),
                    });
                }
                out.push(NormItem::Int(m.number_from_month() as i32));
            }
            FieldExpr::All => out.push(NormItem::Range {
                min: None,
                max: None,
                step: 1,
            }),
            FieldExpr::Range { min, max, step } => out.push(NormItem::Range {
                min: *min,
                max: *max,
                step: checked_step(field, *step)?,
            }),
            FieldExpr::Enum(inner) => flatten_items(week_fields, field, inner, out)?,
        }
    }
    Ok(())
}

fn checked_step(field: FieldKey, step: Option<i32>) -> Result<i32, Error> {
    let step = step.unwrap_or(1);
    if step <= 0 {
        return Err(Error::RangeStepMustBePositive { field, step });
    }
    Ok(step)
}

// Rejects constraints that are empty against the field's static ISO
// domain: those can never match at any date. Date-dependent empties
// (say, day 30 of February) survive and get skipped at run time.
fn validate(field: FieldKey, norm: &Norm, expr: &FieldExpr) -> Result<(), Error> {
    let (dmin, dmax) = field.iso_bounds();
    let range_ok = |min: &Option<i32>, max: &Option<i32>| {
        let lo = resolve(min.unwrap_or(dmin), dmax).max(dmin);
        let hi = resolve(max.unwrap_or(dmax), dmax).min(dmax);
        lo <= hi
    };
    match norm {
        Norm::Range { min, max, .. } => {
            if !range_ok(min, max) {
                return Err(Error::RangeInvalidField {
                    field,
                    expr: format!("{:?}", expr),
                });
            }
        }
        Norm::Enum(items) => {
            for item in items {
                match item {
                    NormItem::Int(v) => {
                        if !(dmin..=dmax).contains(&resolve(*v, dmax)) {
                            return Err(Error::InvalidEnumeration {
                                field,
                                expr: format!("{:?}", expr),
                            });
                        }
                    }
                    NormItem::Range { min, max, .. } => {
                        if !range_ok(min, max) {
                            return Err(Error::RangeInvalidField {
                                field,
                                expr: format!("{:?}", expr),
                            });
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{
        cardinality, clip, member, normalize, Clipped, Error, Expression, FieldExpr, Norm, NormItem,
    };
    use crate::field::week::WeekFields;
    use crate::field::FieldKey;
    use chrono::{Month, Weekday};

    fn norm(field: FieldKey, expr: FieldExpr) -> Result<Norm, Error> {
        normalize(WeekFields::ISO, field, &expr)
    }

    #[test]
    fn all_desugars_to_the_full_range() {
        assert_eq!(
            Norm::Range { min: None, max: None, step: 1 },
            norm(FieldKey::Hour, FieldExpr::All).unwrap()
        );
    }

    #[test]
    fn bare_int_desugars_to_a_singleton_enum() {
        assert_eq!(
            Norm::Enum(vec![NormItem::Int(28)]),
            norm(FieldKey::DayOfMonth, 28.into()).unwrap()
        );
    }

    #[test]
    fn weekday_keywords_follow_the_week_fields() {
        let iso = normalize(WeekFields::ISO, FieldKey::DayOfWeek, &Weekday::Wed.into()).unwrap();
        assert_eq!(Norm::Enum(vec![NormItem::Int(3)]), iso);
        let sun = normalize(
            WeekFields::SUNDAY_START,
            FieldKey::DayOfWeek,
            &Weekday::Wed.into(),
        )
        .unwrap();
        assert_eq!(Norm::Enum(vec![NormItem::Int(4)]), sun);
    }

    #[test]
    fn month_keywords_are_locale_independent() {
        assert_eq!(
            Norm::Enum(vec![NormItem::Int(10)]),
            norm(FieldKey::Month, Month::October.into()).unwrap()
        );
    }

    #[test]
    fn keywords_on_the_wrong_field_are_rejected() {
        assert!(matches!(
            norm(FieldKey::Hour, Weekday::Mon.into()),
            Err(Error::InvalidField { field: FieldKey::Hour, .. })
        ));
        assert!(matches!(
            norm(FieldKey::DayOfWeek, FieldExpr::from([Month::May])),
            Err(Error::InvalidSubField { .. })
        ));
    }

    #[test]
    fn nested_enums_flatten() {
        let e = FieldExpr::Enum(vec![
            FieldExpr::Int(1),
            FieldExpr::Enum(vec![FieldExpr::Int(5), FieldExpr::span(10, 12)]),
        ]);
        assert_eq!(
            Norm::Enum(vec![
                NormItem::Int(1),
                NormItem::Int(5),
                NormItem::Range { min: Some(10), max: Some(12), step: 1 },
            ]),
            norm(FieldKey::Hour, e).unwrap()
        );
    }

    #[test]
    fn non_positive_steps_are_rejected() {
        assert_eq!(
            Err(Error::RangeStepMustBePositive { field: FieldKey::Minute, step: 0 }),
            norm(FieldKey::Minute, FieldExpr::every(0))
        );
        assert!(norm(FieldKey::Minute, FieldExpr::range(0, 30, -5)).is_err());
    }

    #[test]
    fn statically_impossible_expressions_are_rejected() {
        assert!(matches!(
            norm(FieldKey::Minute, FieldExpr::span(50, 40)),
            Err(Error::RangeInvalidField { .. })
        ));
        assert!(matches!(
            norm(FieldKey::Hour, 99.into()),
            Err(Error::InvalidEnumeration { .. })
        ));
        assert!(matches!(
            norm(FieldKey::DayOfMonth, (-40).into()),
            Err(Error::InvalidEnumeration { .. })
        ));
    }

    #[test]
    fn date_dependent_empties_survive_validation() {
        // Day 30..31 exists in most months, just not February.
        let n = norm(FieldKey::DayOfMonth, FieldExpr::span(30, 31)).unwrap();
        assert_eq!(Clipped::Enum(vec![]), clip_enum_probe(&n, 1, 28));
        assert_eq!(
            Clipped::Range { min: 30, max: 31, step: 1 },
            clip(&n, 1, 31)
        );
    }

    fn clip_enum_probe(n: &Norm, dmin: i32, dmax: i32) -> Clipped {
        // Ranges clip to an inverted pair rather than an enum; fold
        // both empty shapes into one for the assert above.
        match clip(n, dmin, dmax) {
            Clipped::Range { min, max, .. } if max < min => Clipped::Enum(vec![]),
            other => other,
        }
    }

    #[test]
    fn negatives_resolve_against_the_domain_end() {
        let n = norm(FieldKey::DayOfMonth, (-1).into()).unwrap();
        assert_eq!(Clipped::Enum(vec![28]), clip(&n, 1, 28));
        assert_eq!(Clipped::Enum(vec![29]), clip(&n, 1, 29));

        let span = norm(FieldKey::DayOfMonth, FieldExpr::span(-7, -1)).unwrap();
        assert_eq!(
            Clipped::Range { min: 24, max: 30, step: 1 },
            clip(&span, 1, 30)
        );
    }

    #[test]
    fn empty_enum_defaults_to_the_domain_minimum() {
        assert_eq!(Clipped::Enum(vec![0]), clip(&Norm::first_value(), 0, 59));
        assert_eq!(Clipped::Enum(vec![1]), clip(&Norm::first_value(), 1, 31));
    }

    #[test]
    fn enum_items_expand_sorted_and_deduplicated() {
        let n = norm(
            FieldKey::Hour,
            FieldExpr::Enum(vec![
                FieldExpr::Int(14),
                FieldExpr::span(3, 5),
                FieldExpr::Int(4),
                FieldExpr::Int(30),
            ]),
        )
        .unwrap();
        assert_eq!(Clipped::Enum(vec![3, 4, 5, 14]), clip(&n, 0, 23));
    }

    #[test]
    fn membership_respects_the_step() {
        let n = norm(FieldKey::Minute, FieldExpr::every(15)).unwrap();
        assert!(member(&n, 45, 0, 59));
        assert!(!member(&n, 40, 0, 59));

        let e = norm(FieldKey::Hour, FieldExpr::from([1, 2, 4])).unwrap();
        assert!(member(&e, 4, 0, 23));
        assert!(!member(&e, 3, 0, 23));
    }

    #[test]
    fn cardinality_counts_the_clipped_domain() {
        let n = norm(FieldKey::Minute, FieldExpr::every(15)).unwrap();
        assert_eq!(4, cardinality(&n, 0, 59));
        let e = norm(FieldKey::DayOfWeek, FieldExpr::from([Weekday::Mon, Weekday::Wed])).unwrap();
        assert_eq!(2, cardinality(&e, 1, 7));
        let empty = norm(FieldKey::DayOfMonth, FieldExpr::span(30, 31)).unwrap();
        assert_eq!(0, cardinality(&empty, 1, 28));
    }

    #[test]
    fn builder_keeps_the_last_binding_per_field() {
        let a = Expression::builder()
            .with_hour(3)
            .with_hour(FieldExpr::every(6))
            .build();
        let b = Expression::builder().with_hour(FieldExpr::every(6)).build();
        assert_eq!(a, b);
    }
}
