//! Matcher model construction: the extended form (§4.5) and the raw form
//! (§4.6). Both take a preprocessed model and an observation sequence and
//! produce a model whose reachability of a designated location decides
//! observation compatibility.

pub mod extended;
pub mod raw;

pub use extended::ExtendedMatcherModelTransformer;
pub use raw::RawMatcherModelTransformer;

/// Feature flags controlling extended matcher construction (`spec.md` §4.5
/// inputs).
#[derive(Debug, Clone, Copy, Default)]
pub struct MatcherFlags {
    pub support_location_matching: bool,
    pub support_committed_matching: bool,
    pub support_shifted_matching: bool,
    pub support_partial_matching: bool,
}

/// `NOB` sentinel for a missing observed value in an `OBS_*` const array
/// (§4.5 "Emit observation arrays").
pub const NOB: i64 = i64::MIN;

/// Unnamed-location numeric id sentinel (§4.5 "Active location tracking").
pub const UNNAMED_LOC: i64 = -1;
