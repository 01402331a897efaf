use crate::expr::{cardinality, Norm};
use crate::field::FieldKey;

/// The five total chains a board can be. Smallest unit first, each
/// field's upper range next to it, every chain closed off by the
/// year. Joint iteration over one of these is well-founded: a carry
/// always propagates to the field one slot up.
pub(crate) const BOARDS: [&[FieldKey]; 5] = [
    &[
        FieldKey::Second,
        FieldKey::Minute,
        FieldKey::Hour,
        FieldKey::DayOfYear,
        FieldKey::Year,
    ],
    &[
        FieldKey::Second,
        FieldKey::Minute,
        FieldKey::Hour,
        FieldKey::DayOfQuarter,
        FieldKey::QuarterOfYear,
        FieldKey::Year,
    ],
    &[
        FieldKey::Second,
        FieldKey::Minute,
        FieldKey::Hour,
        FieldKey::DayOfMonth,
        FieldKey::Month,
        FieldKey::Year,
    ],
    &[
        FieldKey::Second,
        FieldKey::Minute,
        FieldKey::Hour,
        FieldKey::DayOfWeek,
        FieldKey::WeekOfYear,
        FieldKey::Year,
    ],
    &[
        FieldKey::Second,
        FieldKey::Minute,
        FieldKey::Hour,
        FieldKey::DayOfWeek,
        FieldKey::WeekOfMonth,
        FieldKey::Month,
        FieldKey::Year,
    ],
];

/// The normalized iteration plan for one expression: the chosen
/// board with a constraint per slot, and the residual mask fields
/// evaluated as an AND-filter on every candidate.
#[derive(Clone, Debug)]
pub(crate) struct Plan {
    pub board: &'static [FieldKey],
    pub exprs: Vec<Norm>,
    pub mask: Vec<(FieldKey, Norm)>,
    pub top_recurrence: FieldKey,
}

/// Picks the board covering the most expression fields; ties go to
/// the board whose covered constraints select the fewest values
/// (sized against the static ISO domains), then to list order.
pub(crate) fn board_for(fields: &[(FieldKey, Norm)]) -> &'static [FieldKey] {
    let mut best = BOARDS[0];
    let mut best_count = usize::MAX;
    let mut best_size = i64::MAX;
    for board in BOARDS {
        let covered = fields.iter().filter(|(k, _)| board.contains(k));
        let count = covered.clone().count();
        let size: i64 = covered
            .map(|(k, n)| {
                let (dmin, dmax) = k.iso_bounds();
                cardinality(n, dmin, dmax)
            })
            .sum();
        // Count runs inverted so that one comparison covers both the
        // maximization and the tie-break minimization.
        let count = fields.len() - count;
        if (count, size) < (best_count, best_size) {
            best = board;
            best_count = count;
            best_size = size;
        }
    }
    best
}

/// Chooses the board and fills in every slot the client left open:
/// below the smallest client-pinned field a missing slot freezes to
/// its first value, above one it spans its whole domain.
pub(crate) fn plan(fields: Vec<(FieldKey, Norm)>) -> Plan {
    let board = board_for(&fields);
    let mut exprs = Vec::with_capacity(board.len());
    let mut seen_client = false;
    for key in board {
        match fields.iter().find(|(k, _)| k == key) {
            Some((_, n)) => {
                seen_client = true;
                exprs.push(n.clone());
            }
            None if seen_client => exprs.push(Norm::full()),
            None => exprs.push(Norm::first_value()),
        }
    }
    let mask = fields
        .iter()
        .filter(|(k, _)| !board.contains(k))
        .cloned()
        .collect();
    let top_recurrence = fields
        .iter()
        .filter(|(_, n)| n.is_full_range())
        .map(|(k, _)| *k)
        .min()
        .unwrap_or(FieldKey::Year);
    Plan {
        board,
        exprs,
        mask,
        top_recurrence,
    }
}
