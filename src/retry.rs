//! Retry/backoff policy wrapped around every upstream call.
//!
//! [`ResilientTransport`] gives each attempt its own timeout, retries connection-level failures
//! and retryable statuses (only `429` by default) with exponential backoff, and otherwise hands
//! the response back untouched. Once retries run out the last response is returned as-is, or the
//! last network failure surfaces as [`TransientError::RetriesExhausted`].

// self
use crate::{
	_prelude::*,
	error::{TransientError, TransportError},
	http::{self, HttpRequest, HttpResponse, HttpTransport},
	obs::{self, RetryReason},
};

/// Backoff and timeout settings for upstream calls.
///
/// The delay before retry `n` (zero-based) is `base_delay * multiplier^n`, without jitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Retries after the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry.
	pub base_delay: StdDuration,
	/// Growth factor applied per retry.
	pub multiplier: u32,
	/// HTTP statuses treated as transient.
	pub retry_statuses: Vec<u16>,
	/// Upper bound for a single attempt.
	pub timeout: StdDuration,
}
impl RetryPolicy {
	/// Default number of retries.
	pub const DEFAULT_MAX_RETRIES: u32 = 3;
	/// Default delay before the first retry.
	pub const DEFAULT_BASE_DELAY: StdDuration = StdDuration::from_secs(1);
	/// Default backoff growth factor.
	pub const DEFAULT_MULTIPLIER: u32 = 2;
	/// Default per-attempt timeout.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);
	/// `429 Too Many Requests`.
	pub const RATE_LIMITED: u16 = 429;

	/// Policy that performs a single attempt.
	pub fn no_retry() -> Self {
		Self { max_retries: 0, ..Self::default() }
	}

	/// Overrides the retry count.
	pub fn with_max_retries(mut self, retries: u32) -> Self {
		self.max_retries = retries;

		self
	}

	/// Overrides the delay before the first retry.
	pub fn with_base_delay(mut self, delay: StdDuration) -> Self {
		self.base_delay = delay;

		self
	}

	/// Overrides the backoff growth factor.
	pub fn with_multiplier(mut self, multiplier: u32) -> Self {
		self.multiplier = multiplier;

		self
	}

	/// Replaces the set of retryable statuses.
	pub fn with_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
		self.retry_statuses = statuses.into_iter().collect();

		self
	}

	/// Overrides the per-attempt timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Delay slept before retry number `retry` (zero-based).
	pub fn delay_for(&self, retry: u32) -> StdDuration {
		self.base_delay.saturating_mul(self.multiplier.saturating_pow(retry))
	}

	/// Returns `true` if `status` should be retried.
	pub fn retries_status(&self, status: u16) -> bool {
		self.retry_statuses.contains(&status)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: Self::DEFAULT_MAX_RETRIES,
			base_delay: Self::DEFAULT_BASE_DELAY,
			multiplier: Self::DEFAULT_MULTIPLIER,
			retry_statuses: vec![Self::RATE_LIMITED],
			timeout: Self::DEFAULT_TIMEOUT,
		}
	}
}

/// [`HttpTransport`] decorator applying a [`RetryPolicy`].
pub struct ResilientTransport<C>
where
	C: ?Sized + HttpTransport,
{
	inner: Arc<C>,
	policy: RetryPolicy,
}
impl<C> ResilientTransport<C>
where
	C: ?Sized + HttpTransport,
{
	/// Wraps `inner` with `policy`.
	pub fn new(inner: impl Into<Arc<C>>, policy: RetryPolicy) -> Self {
		Self { inner: inner.into(), policy }
	}

	/// Active policy.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Underlying single-attempt transport.
	pub fn inner(&self) -> &Arc<C> {
		&self.inner
	}

	/// Sends `request`, retrying transient failures per the policy.
	pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
		let mut retry = 0;

		loop {
			let attempt = tokio::time::timeout(
				self.policy.timeout,
				self.inner.execute(http::duplicate_request(&request)),
			)
			.await;
			let reason = match attempt {
				Err(_) => {
					let timeout = self.policy.timeout;

					return Err(TransportError::Timeout { timeout }.into());
				},
				Ok(Err(err)) if err.is_transient() => {
					if retry >= self.policy.max_retries {
						let attempts = retry + 1;

						return Err(
							TransientError::RetriesExhausted { attempts, source: err }.into()
						);
					}

					RetryReason::Network
				},
				Ok(Err(err)) => return Err(err.into()),
				Ok(Ok(response)) => {
					let status = response.status().as_u16();

					if !self.policy.retries_status(status) || retry >= self.policy.max_retries {
						return Ok(response);
					}

					RetryReason::for_status(status)
				},
			};
			let delay = self.policy.delay_for(retry);

			retry += 1;

			obs::record_retry(reason, retry, delay);
			tokio::time::sleep(delay).await;
		}
	}
}
impl<C> Clone for ResilientTransport<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone(), policy: self.policy.clone() }
	}
}
impl<C> Debug for ResilientTransport<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResilientTransport").field("policy", &self.policy).finish()
	}
}
