//! Access-token lifecycle: cache check, challenge + token exchange, single-flight refresh.
//!
//! [`CredentialManager::ensure_token`] answers from the [`CredentialStore`] whenever the cached
//! token is outside its safety margin. Otherwise the caller takes the refresh guard, re-checks
//! the store (another caller may have refreshed while it waited), and only then calls
//! `auth/challenge` followed by `auth/token`. Callers that queued behind a failed refresh get a
//! clone of that failure instead of starting a second exchange, so at most one exchange is ever
//! in flight and a hung upstream is reported once to everyone waiting on it.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{AuthStage, ConfigError, MalformedResponseError, TransportError, UpstreamAuthError},
	http::{self, HttpResponse, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	retry::ResilientTransport,
	store::CredentialStore,
	upstream::{self, ApiRoot, ChallengeResponse, TokenRequest, TokenResponse},
};

/// Raw result of a diagnostic login (see [`CredentialManager::login`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginOutcome {
	/// Status returned by `auth/token`.
	pub status: u16,
	/// Body returned by `auth/token`, verbatim.
	pub body: String,
}

/// Orchestrates token acquisition against one upstream API root.
pub struct CredentialManager<C>
where
	C: ?Sized + HttpTransport,
{
	transport: ResilientTransport<C>,
	store: Arc<CredentialStore>,
	api: ApiRoot,
	technical_token: Option<TokenSecret>,
	expiry_fallback: Duration,
	/// Shared counters for token acquisition outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	gate: Arc<RefreshGate>,
}
impl<C> CredentialManager<C>
where
	C: ?Sized + HttpTransport,
{
	/// Expiry assumed when the token response carries no usable `expiresAt`.
	pub const DEFAULT_EXPIRY_FALLBACK: Duration = Duration::minutes(30);

	/// Creates a manager writing into `store` and calling the endpoints under `api`.
	pub fn new(
		transport: ResilientTransport<C>,
		store: Arc<CredentialStore>,
		api: ApiRoot,
	) -> Self {
		Self {
			transport,
			store,
			api,
			technical_token: None,
			expiry_fallback: Self::DEFAULT_EXPIRY_FALLBACK,
			refresh_metrics: Default::default(),
			gate: Default::default(),
		}
	}

	/// Sets the technical secret exchanged for access tokens; blank values clear it.
	pub fn with_technical_token(mut self, token: impl Into<TokenSecret>) -> Self {
		let token = token.into();

		self.technical_token = if token.is_blank() { None } else { Some(token) };

		self
	}

	/// Overrides the expiry assumed for responses without a usable `expiresAt`.
	pub fn with_expiry_fallback(mut self, ttl: Duration) -> Self {
		self.expiry_fallback = ttl;

		self
	}

	/// Store the manager writes into.
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.store
	}

	/// Resolved upstream URLs.
	pub fn api(&self) -> &ApiRoot {
		&self.api
	}

	/// Transport used for the challenge and token calls.
	pub fn transport(&self) -> &ResilientTransport<C> {
		&self.transport
	}

	/// Returns `true` if the cached token is currently valid.
	pub fn is_token_valid(&self) -> bool {
		self.store.is_valid()
	}

	/// Returns the cached token, valid or not.
	pub fn current_token(&self) -> Option<TokenSecret> {
		self.store.get()
	}

	/// Returns a valid access token, refreshing it first if needed.
	pub async fn ensure_token(&self) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::EnsureToken;

		if let Some(token) = self.store.valid_token() {
			self.refresh_metrics.record_cache_hit();

			return Ok(token);
		}

		let span = FlowSpan::new(KIND, "ensure_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let observed = self.gate.generation();
				let _singleflight = self.gate.guard.lock().await;

				if let Some(token) = self.store.valid_token() {
					self.refresh_metrics.record_cache_hit();

					return Ok(token);
				}
				if let Some(err) = self.gate.failure_since(observed) {
					return Err(err);
				}

				obs::record_refresh_started(self.store.status());
				self.refresh_metrics.record_attempt();

				let outcome = self.refresh().await;

				match &outcome {
					Ok(_) => self.refresh_metrics.record_success(),
					Err(_) => self.refresh_metrics.record_failure(),
				}

				self.gate.complete(outcome.as_ref().err().cloned());

				outcome
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Runs a challenge + exchange and reports the raw token response without caching it.
	///
	/// The call still waits for (and blocks) any in-flight refresh so upstream never sees two
	/// exchanges at once.
	pub async fn login(&self) -> Result<LoginOutcome> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let secret = self.technical_token()?;
				let _singleflight = self.gate.guard.lock().await;
				let challenge = self.request_challenge().await?;
				let response = self.request_token(&challenge, secret).await?;

				Ok(LoginOutcome {
					status: response.status().as_u16(),
					body: http::body_text(&response),
				})
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn refresh(&self) -> Result<TokenSecret> {
		let secret = self.technical_token()?;
		let challenge = self.request_challenge().await?;
		let response = self.request_token(&challenge, secret).await?;

		ensure_success(AuthStage::Token, &response)?;

		let credential = upstream::parse_json::<TokenResponse>(AuthStage::Token, response.body())?
			.into_credential(OffsetDateTime::now_utc(), self.expiry_fallback)?;
		let token = credential.token.clone();

		obs::record_refreshed(credential.expires_at);
		self.store.save_credential(credential);

		Ok(token)
	}

	async fn request_challenge(&self) -> Result<ChallengeResponse> {
		let request = http::json_post(self.api.challenge_url(), b"{}".to_vec())?;
		let response = self.call(AuthStage::Challenge, request).await?;

		ensure_success(AuthStage::Challenge, &response)?;

		let challenge =
			upstream::parse_json::<ChallengeResponse>(AuthStage::Challenge, response.body())?;

		if challenge.challenge.trim().is_empty() {
			return Err(MalformedResponseError::InvalidField {
				stage: AuthStage::Challenge,
				field: "challenge",
			}
			.into());
		}

		Ok(challenge)
	}

	/// Sends the exchange request; the caller decides how to treat a non-success status.
	async fn request_token(
		&self,
		challenge: &ChallengeResponse,
		secret: &TokenSecret,
	) -> Result<HttpResponse> {
		let body = serde_json::to_vec(&TokenRequest::new(challenge, secret))
			.map_err(TransportError::request)?;
		let request = http::json_post(self.api.token_url(), body)?;

		self.call(AuthStage::Token, request).await
	}

	async fn call(&self, stage: AuthStage, request: http::HttpRequest) -> Result<HttpResponse> {
		self.transport.execute(request).await.map_err(|err| match err {
			Error::Transport(TransportError::Timeout { timeout }) =>
				UpstreamAuthError::timed_out(stage, timeout).into(),
			other => other,
		})
	}

	fn technical_token(&self) -> Result<&TokenSecret> {
		self.technical_token.as_ref().ok_or_else(|| ConfigError::MissingTechnicalToken.into())
	}
}
impl<C> Clone for CredentialManager<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			api: self.api.clone(),
			technical_token: self.technical_token.clone(),
			expiry_fallback: self.expiry_fallback,
			refresh_metrics: self.refresh_metrics.clone(),
			gate: self.gate.clone(),
		}
	}
}
impl<C> Debug for CredentialManager<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialManager")
			.field("api", &self.api.root().as_str())
			.field("technical_token_set", &self.technical_token.is_some())
			.field("expiry_fallback", &self.expiry_fallback)
			.field("transport", &self.transport)
			.finish()
	}
}

/// Serializes refreshes and remembers the last failure so queued callers can share it.
struct RefreshGate {
	guard: AsyncMutex<()>,
	generation: AtomicU64,
	last_failure: Mutex<Option<(u64, Error)>>,
}
impl RefreshGate {
	fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	/// Failure of a refresh that finished after `observed` was read, if any.
	fn failure_since(&self, observed: u64) -> Option<Error> {
		match &*self.last_failure.lock() {
			Some((generation, err)) if *generation > observed => Some(err.clone()),
			_ => None,
		}
	}

	/// Must be called while holding `guard`.
	fn complete(&self, failure: Option<Error>) {
		let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

		*self.last_failure.lock() = failure.map(|err| (generation, err));
	}
}
impl Default for RefreshGate {
	fn default() -> Self {
		Self {
			guard: AsyncMutex::new(()),
			generation: AtomicU64::new(0),
			last_failure: Mutex::new(None),
		}
	}
}

fn ensure_success(stage: AuthStage, response: &HttpResponse) -> Result<()> {
	let status = response.status();

	if status.is_success() {
		Ok(())
	} else {
		Err(UpstreamAuthError::rejected(stage, status.as_u16(), http::body_text(response)).into())
	}
}
