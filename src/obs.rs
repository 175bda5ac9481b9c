//! Optional observability helpers for gateway flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit structured spans named `ksef_gateway.flow` with the
//!   `flow` and `stage` fields, plus `warn` events for every scheduled retry.
//! - Enable `metrics` to increment the `ksef_gateway_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, and `ksef_gateway_retry_total`
//!   labeled by `reason`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Gateway operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Cached-or-refreshed access token acquisition.
	EnsureToken,
	/// Diagnostic challenge + exchange that bypasses the cache.
	Login,
	/// Authenticated business call forwarded upstream.
	Forward,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::EnsureToken => "ensure_token",
			FlowKind::Login => "login",
			FlowKind::Forward => "forward",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a gateway helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Why the resilient transport scheduled another attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryReason {
	/// Connection-level failure.
	Network,
	/// Upstream answered `429 Too Many Requests`.
	RateLimited,
	/// Upstream answered another status configured as retryable.
	Status,
}
impl RetryReason {
	/// Classifies a retryable HTTP status.
	pub const fn for_status(status: u16) -> Self {
		if status == 429 { RetryReason::RateLimited } else { RetryReason::Status }
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RetryReason::Network => "network",
			RetryReason::RateLimited => "rate_limited",
			RetryReason::Status => "status",
		}
	}
}
impl Display for RetryReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
