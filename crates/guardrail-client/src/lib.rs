//! # Guardrail Client
//!
//! Client-side resilience layer:
//!
//! - [`FetchController`] owns one asynchronous data-producing operation,
//!   cancelling superseded attempts and retrying failures with exponential backoff.
//! - [`RateLimitGate`] asks the arbiter before running a guarded operation and
//!   fails open when the arbiter is unreachable.
//!
//! A gated, retried fetch composes the two: the gate decides once, the
//! controller inside the guarded operation owns the retry policy.

pub mod fetch;
pub mod gate;

pub use fetch::{AsyncDataState, FetchController, FetchControllerBuilder, FetchPhase, RetryPolicy};
pub use gate::{GateOptions, GateOutcome, GateVerdict, RateLimitGate};
