// Reconciliation steps applied to one catalog entry: matching, image choice,
// and normalization into an output row.

pub mod image;
pub mod matcher;
pub mod normalize;

pub use image::select_image;
pub use matcher::{match_candidate, MatchOutcome, MatchRule};
pub use normalize::{normalize, NormalizeOptions};
