//! Difference Bound Matrix engine for timed-automata clock constraints.
//!
//! A DBM is a square matrix over an ordered clock list `[0, c1, …, cn]`
//! (index 0 is the constant-zero reference clock). Entry `M[i][j] = (bound,
//! rel)` represents the constraint `ci − cj ⋈ bound`. A DBM is canonical
//! when closed under `(i,k) ⊕ (k,j) ⊑ (i,j)` for all `k` (`spec.md` §3/§4.2)
//! — every public operation here restores canonical form before returning.
//!
//! No Python reference implementation for the DBM itself was present in the
//! retrieved source pack; this module is grounded directly in `spec.md`
//! §3/§4.2's algebra, laid out as a dense row-major matrix in the style of
//! the teacher's array-oriented bytecode runtime types.

use std::cmp::Ordering;

use thiserror::Error;

/// A finite integer bound, or one of the two infinities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Finite(i64),
    PosInfinity,
    NegInfinity,
}

impl Bound {
    fn add(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::NegInfinity, _) | (_, Bound::NegInfinity) => Bound::NegInfinity,
            (Bound::PosInfinity, _) | (_, Bound::PosInfinity) => Bound::PosInfinity,
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a + b),
        }
    }

    fn neg(self) -> Bound {
        match self {
            Bound::Finite(v) => Bound::Finite(-v),
            Bound::PosInfinity => Bound::NegInfinity,
            Bound::NegInfinity => Bound::PosInfinity,
        }
    }
}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bound {
    fn cmp(&self, other: &Self) -> Ordering {
        use Bound::*;
        match (self, other) {
            (NegInfinity, NegInfinity) | (PosInfinity, PosInfinity) => Ordering::Equal,
            (NegInfinity, _) => Ordering::Less,
            (_, NegInfinity) => Ordering::Greater,
            (PosInfinity, _) => Ordering::Greater,
            (_, PosInfinity) => Ordering::Less,
            (Finite(a), Finite(b)) => a.cmp(b),
        }
    }
}

/// Strictness of a bound's relation: `<` or `≤`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rel {
    Lt,
    Le,
}

/// One entry of the DBM: `ci - cj ⋈ bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DBMEntry {
    pub bound: Bound,
    pub rel: Rel,
}

impl DBMEntry {
    pub const ZERO: DBMEntry = DBMEntry { bound: Bound::Finite(0), rel: Rel::Le };
    pub const INFINITY: DBMEntry = DBMEntry { bound: Bound::PosInfinity, rel: Rel::Lt };

    pub fn new(bound: i64, rel: Rel) -> Self {
        Self { bound: Bound::Finite(bound), rel }
    }

    /// `⊕`: the tightened bound obtained by chaining two constraints
    /// `ci - ck ⋈1 a` and `ck - cj ⋈2 b` into `ci - cj ⋈ (a+b)`, where `⋈` is
    /// strict iff either input was strict.
    fn add(self, other: DBMEntry) -> DBMEntry {
        let bound = self.bound.add(other.bound);
        let rel = if self.rel == Rel::Lt || other.rel == Rel::Lt { Rel::Lt } else { Rel::Le };
        DBMEntry { bound, rel }
    }

    /// `⊑`: `self` is at least as tight (restrictive) as `other` — smaller
    /// bound, or equal bound with `self` strict where `other` is not.
    pub fn tighter_or_equal(self, other: DBMEntry) -> bool {
        match self.bound.cmp(&other.bound) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.rel == Rel::Lt || other.rel == Rel::Le,
        }
    }

    /// The tighter of `self`/`other` (used by `intersect`/closure).
    fn min(self, other: DBMEntry) -> DBMEntry {
        if self.tighter_or_equal(other) { self } else { other }
    }

    /// The looser of `self`/`other` (used by `union`).
    fn max(self, other: DBMEntry) -> DBMEntry {
        if self.tighter_or_equal(other) { other } else { self }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DBMError {
    #[error("DBM has a negative cycle after closure")]
    EmptyAfterClose,
    #[error("inclusion check violated")]
    InclusionViolated,
    #[error("unknown clock {0:?}")]
    UnknownClock(String),
}

/// A Difference Bound Matrix over an ordered clock list, index 0 reserved
/// for the constant-zero reference clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Dbm {
    clocks: Vec<String>,
    matrix: Vec<Vec<DBMEntry>>,
}

impl Dbm {
    /// Builds the "zero" DBM (all clocks equal zero) over `clocks`, with the
    /// reference clock `T0_REF` prepended unless `add_ref_clock` is false
    /// (the trace reifier already has a reference-clock row/column in the
    /// ingested matrix and passes `false`).
    pub fn zero(clocks: &[String], add_ref_clock: bool) -> Self {
        let mut all = Vec::with_capacity(clocks.len() + 1);
        if add_ref_clock {
            all.push("T0_REF".to_string());
        }
        all.extend_from_slice(clocks);
        let n = all.len();
        let matrix = vec![vec![DBMEntry::ZERO; n]; n];
        Self { clocks: all, matrix }
    }

    /// Builds the unconstrained ("infinite") DBM: all clocks independently
    /// range over `[0, ∞)`.
    pub fn unconstrained(clocks: &[String], add_ref_clock: bool) -> Self {
        let mut dbm = Self::zero(clocks, add_ref_clock);
        let n = dbm.matrix.len();
        for i in 1..n {
            dbm.matrix[i][0] = DBMEntry::INFINITY;
        }
        dbm
    }

    pub fn clocks(&self) -> &[String] {
        &self.clocks
    }

    pub fn idx(&self, clock: &str) -> Result<usize, DBMError> {
        self.clocks
            .iter()
            .position(|c| c == clock)
            .ok_or_else(|| DBMError::UnknownClock(clock.to_string()))
    }

    pub fn get(&self, i: usize, j: usize) -> DBMEntry {
        self.matrix[i][j]
    }

    pub fn set(&mut self, i: usize, j: usize, entry: DBMEntry) {
        self.matrix[i][j] = entry;
    }

    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    pub fn is_empty_clocks(&self) -> bool {
        self.matrix.is_empty()
    }

    /// Restores canonical form via all-pairs shortest path closure
    /// (Floyd–Warshall over the `⊕`/`⊑` semiring).
    pub fn close(&mut self) -> Result<(), DBMError> {
        let n = self.matrix.len();
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    let via_k = self.matrix[i][k].add(self.matrix[k][j]);
                    self.matrix[i][j] = self.matrix[i][j].min(via_k);
                }
            }
        }
        if self.is_empty() {
            return Err(DBMError::EmptyAfterClose);
        }
        Ok(())
    }

    /// Negative-cycle check: any `M[i][i]` strictly tighter than `(0, ≤)`.
    pub fn is_empty(&self) -> bool {
        self.matrix.iter().enumerate().any(|(i, row)| row[i].tighter_or_equal(DBMEntry::ZERO) && row[i] != DBMEntry::ZERO)
    }

    /// Per-entry min (stricter bound) of `self` and `other`, then close.
    /// Assumes both operands share the same clock set.
    pub fn intersect(&self, other: &Dbm) -> Result<Dbm, DBMError> {
        debug_assert_eq!(self.clocks, other.clocks);
        let n = self.matrix.len();
        let mut matrix = vec![vec![DBMEntry::ZERO; n]; n];
        for i in 0..n {
            for j in 0..n {
                matrix[i][j] = self.matrix[i][j].min(other.matrix[i][j]);
            }
        }
        let mut result = Dbm { clocks: self.clocks.clone(), matrix };
        result.close()?;
        Ok(result)
    }

    /// Smallest canonical DBM including both `self` and `other`: per-entry
    /// max (the looser bound), then close. Per `spec.md` §3, used only to
    /// merge clock regions between states sharing locations/variables — not
    /// a general zone-union (zones aren't closed under union in general).
    pub fn union(&self, other: &Dbm) -> Result<Dbm, DBMError> {
        debug_assert_eq!(self.clocks, other.clocks);
        let n = self.matrix.len();
        let mut matrix = vec![vec![DBMEntry::ZERO; n]; n];
        for i in 0..n {
            for j in 0..n {
                matrix[i][j] = self.matrix[i][j].max(other.matrix[i][j]);
            }
        }
        let mut result = Dbm { clocks: self.clocks.clone(), matrix };
        result.close()?;
        Ok(result)
    }

    /// Lets time elapse: `M[i][0] = (+∞,<)` for every `i≠0`; `M[0][j]` is
    /// untouched. Already canonical afterward if the input was canonical.
    pub fn delay_future(&mut self) {
        let n = self.matrix.len();
        for i in 1..n {
            self.matrix[i][0] = DBMEntry::INFINITY;
        }
    }

    /// Resets clock `c` to zero: `M[idx(c)][j] = M[0][j]`,
    /// `M[i][idx(c)] = M[i][0]`; re-closes.
    pub fn reset(&mut self, clock: &str) -> Result<(), DBMError> {
        let idx = self.idx(clock)?;
        let n = self.matrix.len();
        for j in 0..n {
            self.matrix[idx][j] = self.matrix[0][j];
        }
        for i in 0..n {
            self.matrix[i][idx] = self.matrix[i][0];
        }
        self.close()
    }

    /// Tightens `M[idx(c1)][idx(c2)]` to `constraint` (if stricter) and
    /// re-closes — `conjugate(c1 - c2 ⋈ v)`.
    pub fn conjugate(&mut self, c1: &str, c2: &str, constraint: DBMEntry) -> Result<(), DBMError> {
        let i = self.idx(c1)?;
        let j = self.idx(c2)?;
        self.matrix[i][j] = self.matrix[i][j].min(constraint);
        self.close()
    }

    /// `get_interval(c)`: `(lower, lower_inclusive, upper, upper_inclusive)`
    /// from `M[0][idx(c)]` (negated, lower bound) and `M[idx(c)][0]` (upper
    /// bound).
    pub fn get_interval(&self, clock: &str) -> Result<(Bound, bool, Bound, bool), DBMError> {
        let idx = self.idx(clock)?;
        let lower_entry = self.matrix[0][idx];
        let upper_entry = self.matrix[idx][0];
        let lower = lower_entry.bound.neg();
        let lower_incl = lower_entry.rel == Rel::Le;
        let upper = upper_entry.bound;
        let upper_incl = upper_entry.rel == Rel::Le;
        Ok((lower, lower_incl, upper, upper_incl))
    }

    /// `self.includes(other)`: per-entry `other[i][j] ⊑ self[i][j]` — every
    /// constraint of `other` is at least as tight as the corresponding
    /// constraint of `self`, i.e. `self` is a (weak) superset of `other`.
    pub fn includes(&self, other: &Dbm) -> bool {
        if self.clocks != other.clocks {
            return false;
        }
        let n = self.matrix.len();
        for i in 0..n {
            for j in 0..n {
                if !other.matrix[i][j].tighter_or_equal(self.matrix[i][j]) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clocks() -> Vec<String> {
        vec!["c".to_string()]
    }

    #[test]
    fn conjugate_then_delay_future_gives_open_upper_bound() {
        let mut dbm = Dbm::zero(&clocks(), true);
        dbm.conjugate("c", "T0_REF", DBMEntry::new(5, Rel::Le)).unwrap();
        dbm.delay_future();
        let (lower, lower_incl, upper, upper_incl) = dbm.get_interval("c").unwrap();
        assert_eq!(lower, Bound::Finite(5));
        assert!(lower_incl);
        assert_eq!(upper, Bound::PosInfinity);
        assert!(upper_incl);
    }

    #[test]
    fn intersect_is_commutative_up_to_canonical_form() {
        let mut a = Dbm::unconstrained(&clocks(), true);
        a.conjugate("c", "T0_REF", DBMEntry::new(10, Rel::Le)).unwrap();
        let mut b = Dbm::unconstrained(&clocks(), true);
        b.conjugate("c", "T0_REF", DBMEntry::new(5, Rel::Le)).unwrap();

        let ab = a.intersect(&b).unwrap();
        let ba = b.intersect(&a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn intersect_is_included_in_both_operands() {
        let mut a = Dbm::unconstrained(&clocks(), true);
        a.conjugate("c", "T0_REF", DBMEntry::new(10, Rel::Le)).unwrap();
        let mut b = Dbm::unconstrained(&clocks(), true);
        b.conjugate("c", "T0_REF", DBMEntry::new(5, Rel::Le)).unwrap();

        let ab = a.intersect(&b).unwrap();
        assert!(a.includes(&ab));
        assert!(b.includes(&ab));
    }

    #[test]
    fn includes_is_reflexive_and_antisymmetric() {
        let mut a = Dbm::unconstrained(&clocks(), true);
        a.conjugate("c", "T0_REF", DBMEntry::new(10, Rel::Le)).unwrap();
        assert!(a.includes(&a));

        let b = a.clone();
        assert!(a.includes(&b) && b.includes(&a));
    }

    #[test]
    fn reset_sets_clock_to_zero() {
        let mut dbm = Dbm::unconstrained(&clocks(), true);
        dbm.conjugate("c", "T0_REF", DBMEntry::new(10, Rel::Le)).unwrap();
        dbm.delay_future();
        dbm.reset("c").unwrap();
        let (lower, _, upper, _) = dbm.get_interval("c").unwrap();
        assert_eq!(lower, Bound::Finite(0));
        assert_eq!(upper, Bound::Finite(0));
    }

    #[test]
    fn empty_after_close_on_contradictory_constraints() {
        let mut dbm = Dbm::unconstrained(&clocks(), true);
        dbm.conjugate("c", "T0_REF", DBMEntry::new(5, Rel::Le)).unwrap();
        // c - T0_REF <= 5 and T0_REF - c <= -10 implies c >= 10, contradiction.
        let err = dbm.conjugate("T0_REF", "c", DBMEntry::new(-10, Rel::Le));
        assert_eq!(err, Err(DBMError::EmptyAfterClose));
    }

    #[test]
    fn scenario_6_from_spec() {
        let mut dbm = Dbm::zero(&clocks(), true);
        dbm.conjugate("c", "T0_REF", DBMEntry::new(5, Rel::Le)).unwrap();
        dbm.delay_future();
        let (lower, lower_incl, upper, upper_incl) = dbm.get_interval("c").unwrap();
        assert_eq!(lower, Bound::Finite(5));
        assert!(lower_incl);
        assert_eq!(upper, Bound::PosInfinity);
        assert!(upper_incl);
    }
}
