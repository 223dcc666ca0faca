// =============================================================================
// AI Subsystem (C6, C10)
// =============================================================================
//
// `guard` is the cache+limiter every AI-backed compute wraps itself in;
// `quality_gate` is the call-admission controller the composite DAG runner
// (C11) and prediction refresh service (C9) consult before ever reaching
// the guard. Process-wide lifetimes, explicitly owned and passed in rather
// than module-level globals (§9 design note).
// =============================================================================

pub mod guard;
pub mod quality_gate;
pub mod types;

pub use guard::AiGuard;
pub use quality_gate::evaluate_ai_quality_gate;
pub use types::AiQualityGateRollingState;
