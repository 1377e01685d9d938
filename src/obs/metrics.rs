// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter incremented for every gateway or session flow outcome.
pub const FLOW_COUNTER: &str = "bearer_gateway_flow_total";

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(FLOW_COUNTER, "flow" => kind.as_str(), "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records the terminal outcome of a flow from its result and returns that outcome.
pub fn record_flow_result<T, E>(kind: FlowKind, result: &Result<T, E>) -> FlowOutcome {
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	record_flow_outcome(kind, outcome);

	outcome
}
