// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for Prometheus metric keys
pub const GATE_EVALUATION: &str = "gate.evaluation";
pub const GATE_STORE_ERROR: &str = "gate.store_error";
pub const TOKEN_ISSUED: &str = "token.issued";
pub const TOKEN_REFUSED: &str = "token.refused";
pub const SESSION_PHASE: &str = "session.phase";
pub const SESSION_ENDING_SOON: &str = "session.ending_soon";
pub const HTTP_RATE_LIMITED: &str = "http.rate_limited";
