// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, RetryReason},
	store::CacheStatus,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by gateway flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("ksef_gateway.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs and counts a retry that is about to sleep for `delay`.
pub fn record_retry(reason: RetryReason, attempt: u32, delay: StdDuration) {
	obs::record_retry_metric(reason);

	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			reason = reason.as_str(),
			attempt,
			delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
			"Upstream call failed transiently; retrying."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, delay);
	}
}

/// Logs why a refresh is starting.
pub fn record_refresh_started(status: CacheStatus) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(cache = status.as_str(), "Refreshing access token.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = status;
	}
}

/// Logs a stored credential without exposing the token.
pub fn record_refreshed(expires_at: Option<OffsetDateTime>) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(expires_at = ?expires_at, "Access token refreshed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = expires_at;
	}
}
