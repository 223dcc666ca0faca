// =============================================================================
// Composite Strategy Subsystem (C11, C12)
// =============================================================================
//
// `dag` is the graph normalizer/validator/executor (C11); `local` holds the
// built-in TS-equivalent handlers (C12's `regime_gate`/`signal_filter`);
// `sidecar` is the bounded Python-sidecar dispatch client with circuit
// breaker, shadow mode and fallback resolution (also C12).
// =============================================================================

pub mod dag;
pub mod local;
pub mod sidecar;

pub use dag::{run_composite_strategy, CompositeGraph, CompositeRunResult};
pub use local::{LocalStrategyRegistry, StrategyContext, StrategyOutcome};
