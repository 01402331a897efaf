use crate::board::{self, Plan};
use crate::expr::{clip, member, Clipped, Error, Expression, Norm, WeekFieldsSpec};
use crate::field::week::WeekFields;
use crate::field::{Adapter, FieldKey};
use crate::scalar::{EnumIter, RangeIter, Scalar};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone};
use icu_locid::Locale;
use std::sync::Arc;


/// Why a [`Cronit`]'s time point doesn't satisfy its expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cause {
    /// The client seeded the iterator with a non-matching instant;
    /// the first `next`/`prev` realigns.
    Init,
    /// The instant is the exit of a DST gap that swallowed one or
    /// more scheduled points. It counts as a valid fire.
    Gap,
}

// The heavy, immutable half of a Cronit: board, per-slot
// constraints, mask, resolved locale. Shared by reference between
// every value an iteration produces.
#[derive(Debug)]
struct Context {
    board: &'static [FieldKey],
    exprs: Vec<Norm>,
    mask: Vec<(FieldKey, Norm)>,
    adapter: Adapter,
    locale: Option<Locale>,
    #[allow(dead_code)] // kept as plan metadata, nothing consumes it
    top_recurrence: FieldKey,
}

impl Context {
    fn build(expr: &Expression) -> Result<Context, Error> {
        let locale = expr
            .locale_tag()
            .map(|tag| {
                tag.parse::<Locale>().map_err(|_| Error::InvalidLocale {
                    tag: tag.to_owned(),
                })
            })
            .transpose()?;
        let week_fields = match expr.week_fields_spec() {
            Some(WeekFieldsSpec::Iso) => WeekFields::ISO,
            Some(WeekFieldsSpec::SundayStart) => WeekFields::SUNDAY_START,
            Some(WeekFieldsSpec::Explicit(wf)) => wf,
            None => locale
                .as_ref()
                .map(WeekFields::for_locale)
                .unwrap_or(WeekFields::ISO),
        };
        let mut fields = Vec::with_capacity(expr.fields().len());
        for (key, field_expr) in expr.fields() {
            fields.push((*key, crate::expr::normalize(week_fields, *key, field_expr)?));
        }
        let Plan {
            board,
            exprs,
            mask,
            top_recurrence,
        } = board::plan(fields);
        let week_key = board
            .iter()
            .copied()
            .find(|k| matches!(k, FieldKey::WeekOfMonth | FieldKey::WeekOfYear));
        Ok(Context {
            board,
            exprs,
            mask,
            adapter: Adapter {
                week_fields,
                week_key,
            },
            locale,
            top_recurrence,
        })
    }

    fn mask_holds(&self, t: NaiveDateTime) -> bool {
        self.mask.iter().all(|(key, norm)| {
            let (dmin, dmax) = self.adapter.bounds(*key, t);
            member(norm, self.adapter.read(*key, t), dmin, dmax)
        })
    }
}

/// One calendar field coupled to a scalar cursor over its clipped
/// domain at some date.
#[derive(Clone, Debug)]
struct FieldIter {
    key: FieldKey,
    slot: usize,
    scalar: Scalar,
}

impl FieldIter {
    /// Recomputes the field's bounds at `t`, clips the constraint
    /// and seeds the cursor at the field's current value.
    fn reset(ctx: &Context, slot: usize, t: NaiveDateTime) -> FieldIter {
        let key = ctx.board[slot];
        let (dmin, dmax) = ctx.adapter.bounds(key, t);
        let seed = ctx.adapter.read(key, t);
        let scalar = match clip(&ctx.exprs[slot], dmin, dmax) {
            Clipped::Range { min, max, step } => Scalar::Range(RangeIter::init(min, max, step, seed)),
            Clipped::Enum(values) => Scalar::Enum(EnumIter::init(values.into(), seed)),
        };
        FieldIter { key, slot, scalar }
    }

    fn step(&self, ctx: &Context, dir: Dir, t: NaiveDateTime) -> Option<(FieldIter, NaiveDateTime)> {
        let scalar = match dir {
            Dir::Next => self.scalar.next(),
            Dir::Prev => self.scalar.prev(),
        }?;
        let t = ctx.adapter.adjust(self.key, scalar.current(), t);
        Some((
            FieldIter {
                key: self.key,
                slot: self.slot,
                scalar,
            },
            t,
        ))
    }

    fn init_step(
        &self,
        ctx: &Context,
        dir: Dir,
        t: NaiveDateTime,
    ) -> Option<(FieldIter, NaiveDateTime)> {
        let scalar = match dir {
            Dir::Next => self.scalar.first(),
            Dir::Prev => self.scalar.last(),
        }?;
        let t = ctx.adapter.adjust(self.key, scalar.current(), t);
        Some((
            FieldIter {
                key: self.key,
                slot: self.slot,
                scalar,
            },
            t,
        ))
    }

    fn aligned(&self) -> bool {
        self.scalar.aligned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dir {
    Next,
    Prev,
}

// The odometer: drives the board's field iterators as a
// carry-propagating counter over one advance of the Cronit.
struct Stepper<'c> {
    ctx: &'c Context,
    iters: Vec<FieldIter>,
    dir: Dir,
}

impl Stepper<'_> {
    /// Advances field `i`; a carry moves one slot up, a success
    /// rebuilds everything below on the new date. Running off the
    /// top of the board means the sequence is over.
    fn rec_step(&mut self, i: usize, t: NaiveDateTime) -> Option<NaiveDateTime> {
        if i >= self.ctx.board.len() {
            return None;
        }
        match self.iters[i].step(self.ctx, self.dir, t) {
            Some((it, t)) => {
                self.iters[i] = it;
                self.rec_init(i, t)
            }
            None => self.rec_step(i + 1, t),
        }
    }

    /// Rebuilds every field below `i` on `t`, highest first, setting
    /// each to its first (going forward) or last (going backward)
    /// value. A field whose clipped domain is empty at `t` bounces
    /// the walk back up through `rec_step`.
    fn rec_init(&mut self, i: usize, mut t: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut j = i;
        while j > 0 {
            j -= 1;
            let it = FieldIter::reset(self.ctx, j, t);
            match it.init_step(self.ctx, self.dir, t) {
                Some((it, t2)) => {
                    self.iters[j] = it;
                    t = t2;
                }
                None => {
                    self.iters[j] = it;
                    return self.rec_step(j, t);
                }
            }
        }
        Some(t)
    }

    /// One realignment pass for a state seeded off the expression:
    /// from the top of the board down, every misaligned field gets a
    /// single step, which also rebuilds everything below it.
    fn rec_align(&mut self, mut t: NaiveDateTime) -> Option<NaiveDateTime> {
        for i in (0..self.ctx.board.len()).rev() {
            if !self.iters[i].aligned() {
                t = self.rec_step(i, t)?;
            }
        }
        Some(t)
    }

    fn reset_all(&mut self, t: NaiveDateTime) {
        for j in 0..self.ctx.board.len() {
            self.iters[j] = FieldIter::reset(self.ctx, j, t);
        }
    }

    fn all_aligned(&self) -> bool {
        self.iters.iter().all(FieldIter::aligned)
    }
}

// Local boundaries of a DST gap: the first valid local second past
// it and the last valid one before it.
struct GapInfo {
    first_after: NaiveDateTime,
    last_before: NaiveDateTime,
}

// `t` must sit inside a gap. Bisects for the boundary on each side;
// zone databases keep transitions well under this window.
fn gap_info<Tz: TimeZone>(tz: &Tz, t: NaiveDateTime) -> GapInfo {
    const WINDOW: i64 = 48 * 3600;
    let valid = |offset: i64| {
        !matches!(
            tz.from_local_datetime(&(t + Duration::seconds(offset))),
            LocalResult::None
        )
    };
    let bisect = |sign: i64| {
        let (mut lo, mut hi) = (0, WINDOW);
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if valid(sign * mid) {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        hi
    };
    GapInfo {
        first_after: t + Duration::seconds(bisect(1)),
        last_before: t - Duration::seconds(bisect(-1)),
    }
}

// Local to zoned with the deterministic overlap rule: an ambiguous
// wall time takes the earlier of its two instants.
fn to_zoned<Tz: TimeZone>(tz: &Tz, t: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&t) {
        LocalResult::Single(z) => Some(z),
        LocalResult::Ambiguous(early, _) => Some(early),
        LocalResult::None => None,
    }
}

/// A bidirectional iterator over the instants matching a calendar
/// recurrence expression, pinned to a time zone.
///
/// A `Cronit` is an immutable value: [`next`] and [`prev`] hand back
/// a fresh one and any number of them can be advanced independently.
/// The wide, shared parts of the state sit behind an `Arc`, so the
/// per-step copy is a handful of scalar cursors and one instant.
///
/// [`next`]: Cronit::next
/// [`prev`]: Cronit::prev
#[derive(Clone, Debug)]
pub struct Cronit<Tz: TimeZone> {
    ctx: Arc<Context>,
    iters: Vec<FieldIter>,
    current: DateTime<Tz>,
    cause: Option<Cause>,
}

impl<Tz: TimeZone> Cronit<Tz> {
    /// Builds an iterator for `expr` seeded at `time`.
    ///
    /// The seed doesn't have to match the expression: a non-matching
    /// one comes back tagged [`Cause::Init`] and realigns on the
    /// first advance. A seed sitting exactly on the exit of a DST
    /// gap that swallowed a scheduled instant is recognized and
    /// tagged [`Cause::Gap`] instead, which still counts as valid.
    pub fn new(expr: &Expression, time: DateTime<Tz>) -> Result<Self, Error> {
        let ctx = Arc::new(Context::build(expr)?);
        let t = time.naive_local();
        let iters = (0..ctx.board.len())
            .map(|slot| FieldIter::reset(&ctx, slot, t))
            .collect::<Vec<_>>();
        let aligned = iters.iter().all(FieldIter::aligned) && ctx.mask_holds(t);
        let cronit = Cronit {
            ctx,
            iters,
            current: time,
            cause: (!aligned).then(|| Cause::Init),
        };
        if aligned || !cronit.at_gap_exit() {
            return Ok(cronit);
        }
        // The seed is the first instant past a gap. It stands in for
        // the swallowed points exactly when stepping back and forth
        // lands on it again.
        let round_trip = cronit
            .prev()
            .and_then(|back| back.next())
            .map(|fwd| fwd.current == cronit.current);
        Ok(Cronit {
            cause: if round_trip == Some(true) {
                Some(Cause::Gap)
            } else {
                Some(Cause::Init)
            },
            ..cronit
        })
    }

    /// The instant after `current` matching the expression, or the
    /// collapsed firing at a gap exit. `None` once the year domain
    /// is exhausted.
    pub fn next(&self) -> Option<Self> {
        self.advance(Dir::Next)
    }

    /// The matching instant before `current`; mirror of [`next`].
    ///
    /// [`next`]: Cronit::next
    pub fn prev(&self) -> Option<Self> {
        self.advance(Dir::Prev)
    }

    pub fn current(&self) -> &DateTime<Tz> {
        &self.current
    }

    /// `true` when `current` satisfies the expression or is a
    /// gap-collapsed firing.
    pub fn is_valid(&self) -> bool {
        !matches!(self.cause, Some(Cause::Init))
    }

    pub fn is_unaligned(&self) -> bool {
        self.cause.is_some()
    }

    pub fn unaligned_cause(&self) -> Option<Cause> {
        self.cause
    }

    /// The expression's locale option, when one was set.
    pub fn locale(&self) -> Option<&Locale> {
        self.ctx.locale.as_ref()
    }

    /// The resolved week definition in effect.
    pub fn week_fields(&self) -> WeekFields {
        self.ctx.adapter.week_fields
    }

    /// Forward stream of matching instants, starting strictly after
    /// this one.
    pub fn iter(&self) -> CronitIter<Tz> {
        CronitIter {
            state: Some(self.clone()),
            dir: Dir::Next,
        }
    }

    /// Backward stream of matching instants, starting strictly
    /// before this one.
    pub fn iter_back(&self) -> CronitIter<Tz> {
        CronitIter {
            state: Some(self.clone()),
            dir: Dir::Prev,
        }
    }

    fn advance(&self, dir: Dir) -> Option<Self> {
        let tz = self.current.timezone();
        let mut stepper = Stepper {
            ctx: self.ctx.as_ref(),
            iters: self.iters.clone(),
            dir,
        };
        let mut t = self.current.naive_local();
        // Both Init and Gap states hold cursors that don't satisfy
        // the expression yet, so their first pass realigns.
        let mut realign = self.cause.is_some();
        loop {
            t = if realign {
                stepper.rec_align(t)?
            } else {
                stepper.rec_step(0, t)?
            };
            realign = false;
            match tz.from_local_datetime(&t) {
                LocalResult::None => {
                    let gap = gap_info(&tz, t);
                    let exit = to_zoned(&tz, gap.first_after)?;
                    if exit == self.current {
                        // Already fired at this gap's exit: hop across
                        // the gap and keep looking on the other side.
                        t = match dir {
                            Dir::Next => gap.first_after,
                            Dir::Prev => gap.last_before,
                        };
                        stepper.reset_all(t);
                        if stepper.all_aligned() && self.ctx.mask_holds(t) {
                            if let Some(z) = to_zoned(&tz, t) {
                                if z != self.current {
                                    return Some(self.emit(stepper.iters, z, None));
                                }
                            }
                        } else {
                            realign = true;
                        }
                        continue;
                    }
                    // First landing in this gap: collapse onto its
                    // exit. The exit is the one firing for everything
                    // the gap swallowed.
                    log::trace!(
                        target: "cronit::step",
                        "local time {} is in a DST gap, collapsing onto {}",
                        t,
                        gap.first_after
                    );
                    stepper.reset_all(gap.first_after);
                    let aligned =
                        stepper.all_aligned() && self.ctx.mask_holds(gap.first_after);
                    return Some(self.emit(
                        stepper.iters,
                        exit,
                        (!aligned).then(|| Cause::Gap),
                    ));
                }
                LocalResult::Ambiguous(early, _) => {
                    if self.ctx.mask_holds(t) {
                        return Some(self.emit(stepper.iters, early, None));
                    }
                }
                LocalResult::Single(z) => {
                    if self.ctx.mask_holds(t) {
                        return Some(self.emit(stepper.iters, z, None));
                    }
                }
            }
            log::trace!(target: "cronit::step", "mask rejects {}, stepping on", t);
        }
    }

    // Did a gap end exactly where this cronit sits?
    fn at_gap_exit(&self) -> bool {
        let tz = self.current.timezone();
        let t = self.current.naive_local();
        let just_before = t - Duration::seconds(1);
        matches!(tz.from_local_datetime(&just_before), LocalResult::None)
            && gap_info(&tz, just_before).first_after == t
    }

    fn emit(&self, iters: Vec<FieldIter>, current: DateTime<Tz>, cause: Option<Cause>) -> Self {
        Cronit {
            ctx: self.ctx.clone(),
            iters,
            current,
            cause,
        }
    }
}

/// Owned iterator over matching instants; see [`Cronit::iter`] and
/// [`Cronit::iter_back`].
pub struct CronitIter<Tz: TimeZone> {
    state: Option<Cronit<Tz>>,
    dir: Dir,
}

impl<Tz: TimeZone> Iterator for CronitIter<Tz> {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.state.take()?;
        let stepped = state.advance(self.dir)?;
        let current = stepped.current.clone();
        self.state = Some(stepped);
        Some(current)
    }
}
