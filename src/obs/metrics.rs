// self
use crate::obs::{FlowKind, FlowOutcome, RetryReason};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"ksef_gateway_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a scheduled retry via the global metrics recorder (when enabled).
pub fn record_retry_metric(reason: RetryReason) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("ksef_gateway_retry_total", "reason" => reason.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = reason;
	}
}
