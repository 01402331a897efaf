use std::sync::Arc;

/// A bidirectional cursor over the arithmetic progression
/// `min, min+step, ..` capped at `max` (which gets aligned
/// down onto the step grid on construction).
///
/// The cursor keeps its two neighbors precomputed so that
/// `next` and `prev` are a plain window shift. `current` is
/// allowed to sit off-grid or out of the domain only right
/// after `init`, which is how a freshly seeded iterator
/// reports that the seed doesn't match the expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeIter {
    min: i32,
    max: i32,
    step: i32,
    current: i32,
    prev: Option<i32>,
    next: Option<i32>,
    init_aligned: Option<bool>,
}

/// A bidirectional cursor over a sorted, deduplicated set of
/// values. Same neighbor/window contract as [`RangeIter`].
///
/// The backing vector is shared, so cloning a cursor per step
/// stays cheap no matter how wide the enumeration is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumIter {
    values: Arc<[i32]>,
    current: i32,
    prev: Option<i32>,
    next: Option<i32>,
    init_aligned: Option<bool>,
}

/// The two scalar iterator shapes an expression field clips down to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scalar {
    Range(RangeIter),
    Enum(EnumIter),
}

impl RangeIter {
    /// Seeds a cursor at `v` over `[min, max]` with the given step.
    ///
    /// An inverted domain (`min > max`, the runtime-empty case) is
    /// accepted and produces a cursor with no neighbors, so `first`
    /// and `last` report exhaustion instead of panicking.
    pub fn init(min: i32, max: i32, step: i32, v: i32) -> Self {
        debug_assert!(step > 0);
        let max = if max >= min {
            max - (max - min).rem_euclid(step)
        } else {
            max
        };
        if min > max {
            return Self {
                min,
                max,
                step,
                current: v,
                prev: None,
                next: None,
                init_aligned: Some(false),
            };
        }
        let (prev, next, aligned) = if v < min {
            (None, Some(min), false)
        } else if v > max {
            (Some(max), None, false)
        } else {
            let p = v - (v - min).rem_euclid(step);
            let aligned = p == v;
            let prev = if aligned {
                (p - step >= min).then(|| p - step)
            } else {
                Some(p)
            };
            (prev, (p + step <= max).then(|| p + step), aligned)
        };
        Self {
            min,
            max,
            step,
            current: v,
            prev,
            next,
            init_aligned: Some(aligned),
        }
    }

    pub fn first(&self) -> Option<Self> {
        (self.min <= self.max).then(|| self.at(self.min))
    }

    pub fn last(&self) -> Option<Self> {
        (self.min <= self.max).then(|| self.at(self.max))
    }

    pub fn next(&self) -> Option<Self> {
        self.next.map(|c| self.at(c))
    }

    pub fn prev(&self) -> Option<Self> {
        self.prev.map(|c| self.at(c))
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn aligned(&self) -> bool {
        self.init_aligned.unwrap_or(true)
    }

    // A cursor sitting on the grid point `c`, neighbors clamped
    // into the domain. Clears the init alignment marker.
    fn at(&self, c: i32) -> Self {
        Self {
            min: self.min,
            max: self.max,
            step: self.step,
            current: c,
            prev: (c - self.step >= self.min).then(|| c - self.step),
            next: (c + self.step <= self.max).then(|| c + self.step),
            init_aligned: None,
        }
    }
}

impl EnumIter {
    /// Seeds a cursor at `v`; the neighbors come from the values
    /// surrounding `v` in the sorted backing set. Alignment means
    /// `v` itself is a member.
    pub fn init(values: Arc<[i32]>, v: i32) -> Self {
        let (prev, next, aligned) = match values.binary_search(&v) {
            Ok(i) => (
                i.checked_sub(1).map(|j| values[j]),
                values.get(i + 1).copied(),
                true,
            ),
            Err(i) => (
                i.checked_sub(1).map(|j| values[j]),
                values.get(i).copied(),
                false,
            ),
        };
        Self {
            values,
            current: v,
            prev,
            next,
            init_aligned: Some(aligned),
        }
    }

    pub fn first(&self) -> Option<Self> {
        self.values.first().copied().map(|c| self.at(c))
    }

    pub fn last(&self) -> Option<Self> {
        self.values.last().copied().map(|c| self.at(c))
    }

    pub fn next(&self) -> Option<Self> {
        self.next.map(|c| self.at(c))
    }

    pub fn prev(&self) -> Option<Self> {
        self.prev.map(|c| self.at(c))
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn aligned(&self) -> bool {
        self.init_aligned.unwrap_or(true)
    }

    fn at(&self, c: i32) -> Self {
        // `c` always comes from the set itself here.
        let i = self.values.binary_search(&c).unwrap();
        Self {
            values: self.values.clone(),
            current: c,
            prev: i.checked_sub(1).map(|j| self.values[j]),
            next: self.values.get(i + 1).copied(),
            init_aligned: None,
        }
    }
}

impl Scalar {
    pub fn first(&self) -> Option<Self> {
        match self {
            Scalar::Range(r) => r.first().map(Scalar::Range),
            Scalar::Enum(e) => e.first().map(Scalar::Enum),
        }
    }

    pub fn last(&self) -> Option<Self> {
        match self {
            Scalar::Range(r) => r.last().map(Scalar::Range),
            Scalar::Enum(e) => e.last().map(Scalar::Enum),
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            Scalar::Range(r) => r.next().map(Scalar::Range),
            Scalar::Enum(e) => e.next().map(Scalar::Enum),
        }
    }

    pub fn prev(&self) -> Option<Self> {
        match self {
            Scalar::Range(r) => r.prev().map(Scalar::Range),
            Scalar::Enum(e) => e.prev().map(Scalar::Enum),
        }
    }

    pub fn current(&self) -> i32 {
        match self {
            Scalar::Range(r) => r.current(),
            Scalar::Enum(e) => e.current(),
        }
    }

    pub fn aligned(&self) -> bool {
        match self {
            Scalar::Range(r) => r.aligned(),
            Scalar::Enum(e) => e.aligned(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{EnumIter, RangeIter};
    use std::sync::Arc;

    fn set(values: &[i32]) -> Arc<[i32]> {
        values.to_vec().into()
    }

    #[test]
    fn range_init_on_grid_is_aligned() {
        let r = RangeIter::init(0, 59, 15, 30);
        assert!(r.aligned());
        assert_eq!(30, r.current());
        assert_eq!(45, r.next().unwrap().current());
        assert_eq!(15, r.prev().unwrap().current());
    }

    #[test]
    fn range_init_off_grid_neighbors_straddle_the_seed() {
        let r = RangeIter::init(0, 59, 15, 31);
        assert!(!r.aligned());
        assert_eq!(30, r.prev().unwrap().current());
        assert_eq!(45, r.next().unwrap().current());
    }

    #[test]
    fn range_init_below_min() {
        let r = RangeIter::init(10, 20, 2, 3);
        assert!(!r.aligned());
        assert!(r.prev().is_none());
        assert_eq!(10, r.next().unwrap().current());
    }

    #[test]
    fn range_init_above_max_snaps_prev_onto_the_grid() {
        // max aligns down to 18 before it becomes the neighbor
        let r = RangeIter::init(10, 19, 2, 25);
        assert!(!r.aligned());
        assert!(r.next().is_none());
        assert_eq!(18, r.prev().unwrap().current());
    }

    #[test]
    fn range_first_and_last_respect_the_grid() {
        let r = RangeIter::init(3, 12, 4, 3);
        assert_eq!(3, r.first().unwrap().current());
        assert_eq!(11, r.last().unwrap().current());
    }

    #[test]
    fn range_exhausts_at_both_ends() {
        let r = RangeIter::init(0, 10, 5, 0);
        assert!(r.prev().is_none());
        let top = r.next().unwrap().next().unwrap();
        assert_eq!(10, top.current());
        assert!(top.next().is_none());
    }

    #[test]
    fn empty_range_has_no_first_or_last() {
        let r = RangeIter::init(30, 28, 1, 15);
        assert!(!r.aligned());
        assert!(r.first().is_none());
        assert!(r.last().is_none());
        assert!(r.next().is_none());
        assert!(r.prev().is_none());
    }

    #[test]
    fn advancing_clears_the_init_marker() {
        let r = RangeIter::init(0, 59, 15, 31);
        assert!(!r.aligned());
        assert!(r.next().unwrap().aligned());
        assert!(r.first().unwrap().aligned());
    }

    #[test]
    fn enum_init_member_is_aligned() {
        let e = EnumIter::init(set(&[1, 3, 7]), 3);
        assert!(e.aligned());
        assert_eq!(1, e.prev().unwrap().current());
        assert_eq!(7, e.next().unwrap().current());
    }

    #[test]
    fn enum_init_non_member() {
        let e = EnumIter::init(set(&[1, 3, 7]), 4);
        assert!(!e.aligned());
        assert_eq!(3, e.prev().unwrap().current());
        assert_eq!(7, e.next().unwrap().current());
    }

    #[test]
    fn enum_init_outside_either_end() {
        let low = EnumIter::init(set(&[5, 9]), 2);
        assert!(low.prev().is_none());
        assert_eq!(5, low.next().unwrap().current());

        let high = EnumIter::init(set(&[5, 9]), 12);
        assert!(high.next().is_none());
        assert_eq!(9, high.prev().unwrap().current());
    }

    #[test]
    fn enum_traversal_round_trip() {
        let e = EnumIter::init(set(&[2, 4, 6]), 2);
        let up = e.next().unwrap().next().unwrap();
        assert_eq!(6, up.current());
        assert!(up.next().is_none());
        assert_eq!(2, up.prev().unwrap().prev().unwrap().current());
    }

    #[test]
    fn empty_enum_is_exhausted_everywhere() {
        let e = EnumIter::init(set(&[]), 10);
        assert!(!e.aligned());
        assert!(e.first().is_none());
        assert!(e.last().is_none());
        assert!(e.next().is_none());
        assert!(e.prev().is_none());
    }

    #[test]
    fn single_value_enum_first_equals_last() {
        let e = EnumIter::init(set(&[0]), 30);
        assert_eq!(0, e.first().unwrap().current());
        assert_eq!(0, e.last().unwrap().current());
        assert!(e.first().unwrap().next().is_none());
    }
}
