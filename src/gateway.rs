//! Gateway facade wiring configuration, credential lifecycle, decoration, and transport.

// crates.io
use ::http::{HeaderValue, Method, header::CONTENT_TYPE};
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	auth::TokenSecret,
	authorize::{BearerSource, RequestAuthorizer},
	config::GatewayConfig,
	error::TransportError,
	http::{HttpRequest, HttpResponse, HttpTransport},
	lifecycle::{CredentialManager, LoginOutcome, RefreshMetrics},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	retry::ResilientTransport,
	store::CredentialStore,
	upstream::ApiRoot,
};

/// Gateway backed by the crate's reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestGateway = Gateway<ReqwestHttpClient>;

/// Authenticated, retrying client for one upstream API root.
///
/// Cloning is cheap; clones share the credential store, the refresh guard, and the HTTP client.
pub struct Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	api: ApiRoot,
	manager: CredentialManager<C>,
	authorizer: RequestAuthorizer<C>,
	transport: ResilientTransport<C>,
}
impl<C> Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	/// Validates `config` and builds a gateway on top of `http_client`.
	pub fn with_http_client(
		config: &GatewayConfig,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self> {
		config.validate()?;

		let api = config.api_root()?;
		let transport = ResilientTransport::new(http_client, config.retry_policy());
		let store = Arc::new(config.credential_store());
		let technical_token = config.technical_secret().cloned();
		let mut manager = CredentialManager::new(transport.clone(), store, api.clone())
			.with_expiry_fallback(config.token.expiry_fallback());

		if let Some(secret) = &technical_token {
			manager = manager.with_technical_token(secret.clone());
		}

		let mut authorizer =
			RequestAuthorizer::new(manager.clone()).with_dynamic_auth(config.dynamic_auth);

		if let Some(secret) = technical_token {
			authorizer = authorizer.with_static_token(secret);
		}

		Ok(Self { api, manager, authorizer, transport })
	}

	/// Resolved upstream URLs.
	pub fn api(&self) -> &ApiRoot {
		&self.api
	}

	/// Shared credential store.
	pub fn store(&self) -> &Arc<CredentialStore> {
		self.manager.store()
	}

	/// Credential lifecycle manager.
	pub fn manager(&self) -> &CredentialManager<C> {
		&self.manager
	}

	/// Request decorator.
	pub fn authorizer(&self) -> &RequestAuthorizer<C> {
		&self.authorizer
	}

	/// Counters for token acquisition.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		&self.manager.refresh_metrics
	}

	/// Which credential business calls carry.
	pub fn bearer_source(&self) -> BearerSource {
		self.authorizer.bearer_source()
	}

	/// Returns a valid access token, refreshing it first if needed.
	pub async fn ensure_token(&self) -> Result<TokenSecret> {
		self.manager.ensure_token().await
	}

	/// Returns `true` if the cached token is currently valid.
	pub fn is_token_valid(&self) -> bool {
		self.manager.is_token_valid()
	}

	/// Returns the cached token, valid or not.
	pub fn current_token(&self) -> Option<TokenSecret> {
		self.manager.current_token()
	}

	/// Runs a diagnostic challenge + exchange; see [`CredentialManager::login`].
	pub async fn login(&self) -> Result<LoginOutcome> {
		self.manager.login().await
	}

	/// Decorates `request` without sending it.
	pub async fn authorize(&self, request: HttpRequest) -> Result<HttpRequest> {
		self.authorizer.authorize(request).await
	}

	/// Authorizes and sends a business request.
	///
	/// Any upstream status is returned as a response; only authentication, transport, and
	/// exhausted-retry failures are errors.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		const KIND: FlowKind = FlowKind::Forward;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request = self.authorizer.authorize(request).await?;

				self.transport.execute(request).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// `GET` a path below the API root.
	pub async fn get(&self, path: &str) -> Result<HttpResponse> {
		let request = self.request(Method::GET, path, None, Vec::new())?;

		self.send(request).await
	}

	/// `POST` a body to a path below the API root.
	pub async fn post(
		&self,
		path: &str,
		content_type: &str,
		body: impl Into<Vec<u8>>,
	) -> Result<HttpResponse> {
		let request = self.request(Method::POST, path, Some(content_type), body.into())?;

		self.send(request).await
	}

	fn request(
		&self,
		method: Method,
		path: &str,
		content_type: Option<&str>,
		body: Vec<u8>,
	) -> Result<HttpRequest> {
		let url = self.api.join(path)?;
		let mut builder = ::http::Request::builder().method(method).uri(url.as_str());

		if let Some(content_type) = content_type {
			builder = builder.header(
				CONTENT_TYPE,
				HeaderValue::from_str(content_type).map_err(TransportError::request)?,
			);
		}

		let request = builder.body(body).map_err(TransportError::from)?;

		Ok(request)
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient> {
	/// Builds a gateway with a reqwest client that never follows redirects.
	pub fn new(config: &GatewayConfig) -> Result<Self> {
		Self::with_http_client(config, ReqwestHttpClient::without_redirects()?)
	}
}
impl<C> Clone for Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			api: self.api.clone(),
			manager: self.manager.clone(),
			authorizer: self.authorizer.clone(),
			transport: self.transport.clone(),
		}
	}
}
impl<C> Debug for Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("api", &self.api.root().as_str())
			.field("authorizer", &self.authorizer)
			.field("transport", &self.transport)
			.finish()
	}
}
