// =============================================================================
// Signal Pipeline (C7-C9)
// =============================================================================
//
// Feature computation (indicators + SMC + regime), the refresh-trigger
// engine, and the prediction refresh service that composes them. Shared
// types (`Candle`, `FeatureSnapshot`, `PredictionState`, ...) live in
// `types.rs` since every subsystem below imports from there.
// =============================================================================

pub mod features;
pub mod indicators;
pub mod refresh;
pub mod regime;
pub mod smc;
pub mod trigger;
pub mod types;

pub use features::compute_feature_snapshot;
pub use types::{
    prediction_unique_key, Candle, FeatureSnapshot, PredictionState, Signal, TriggerDebounceState,
};
