//! Duplicate retention: decide which report in a detection event survives,
//! delete the rest, and reclaim the images they owned.

pub mod assets;
pub mod key;
pub mod scheduler;
pub mod selector;
pub mod sweep;

pub use assets::{reclaim, AssetError, AssetStore, LocalAssetStore, ReclaimOutcome};
pub use key::{build_key, time_bucket, GroupKey};
pub use selector::{select_duplicates, Selection};
