//! Gateway-level error types shared by the store, transport, and credential lifecycle.
//!
//! Every error is cheap to clone so a single failed refresh can be handed to each caller that
//! was waiting on it.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Challenge or token exchange did not succeed.
	#[error(transparent)]
	UpstreamAuth(#[from] UpstreamAuthError),
	/// Network failure that persisted after every retry.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Upstream answered with a body that does not match the expected shape.
	#[error(transparent)]
	MalformedResponse(#[from] MalformedResponseError),
	/// Non-transient transport failure (request construction, per-call timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Returns `true` when the caller should re-authenticate (fix credentials or configuration)
	/// rather than simply retrying later.
	pub fn is_auth_failure(&self) -> bool {
		match self {
			Self::UpstreamAuth(err) => !err.is_retryable(),
			Self::Config(ConfigError::MissingTechnicalToken) => true,
			_ => false,
		}
	}

	/// Returns `true` when retrying the same operation later may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::UpstreamAuth(err) => err.is_retryable(),
			Self::Transient(_) => true,
			Self::Transport(err) => matches!(err, TransportError::Timeout { .. }),
			_ => false,
		}
	}
}

/// Step of the challenge/token exchange that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStage {
	/// `POST auth/challenge`.
	Challenge,
	/// `POST auth/token`.
	Token,
	/// Either call exceeded its per-call timeout.
	Timeout,
}
impl AuthStage {
	/// Returns a stable label suitable for log fields and error messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthStage::Challenge => "challenge",
			AuthStage::Token => "token",
			AuthStage::Timeout => "timeout",
		}
	}
}
impl Display for AuthStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Challenge or token exchange returned a non-success status, or timed out.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Upstream {stage} step failed ({}): {body}.", status_label(.status))]
pub struct UpstreamAuthError {
	/// Step that failed.
	pub stage: AuthStage,
	/// HTTP status returned by upstream, absent for timeouts.
	pub status: Option<u16>,
	/// Raw response body, or a description of the timeout.
	pub body: String,
}
impl UpstreamAuthError {
	/// Builds an error for a non-success response at `stage`.
	pub fn rejected(stage: AuthStage, status: u16, body: impl Into<String>) -> Self {
		Self { stage, status: Some(status), body: body.into() }
	}

	/// Builds an error for an exchange step that exceeded its timeout.
	pub fn timed_out(step: AuthStage, timeout: StdDuration) -> Self {
		Self {
			stage: AuthStage::Timeout,
			status: None,
			body: format!("{step} call did not complete within {timeout:?}"),
		}
	}

	/// Rate limiting, server errors, and timeouts are worth retrying later.
	pub fn is_retryable(&self) -> bool {
		match self.status {
			None => matches!(self.stage, AuthStage::Timeout),
			Some(status) => status == 429 || status >= 500,
		}
	}
}

fn status_label(status: &Option<u16>) -> String {
	match status {
		Some(code) => format!("HTTP {code}"),
		None => "no response".into(),
	}
}

/// Configuration and validation failures raised by the gateway.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// Upstream base URL cannot be parsed or uses an unsupported scheme.
	#[error("Base URL `{value}` is invalid: {reason}.")]
	InvalidBaseUrl {
		/// Offending value.
		value: String,
		/// Why the value was rejected.
		reason: String,
	},
	/// Business path cannot be joined onto the API root.
	#[error("Path `{path}` cannot be joined onto the API root: {reason}.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Why the path was rejected.
		reason: String,
	},
	/// Dynamic authentication requires a technical secret.
	#[error("A technical token is required to exchange challenges for access tokens.")]
	MissingTechnicalToken,
	/// A configuration value is out of range.
	#[error("Configuration field `{field}` is invalid: {reason}.")]
	InvalidField {
		/// Field name as it appears in the configuration file.
		field: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// Configuration file could not be read.
	#[error("Configuration file `{path}` could not be read.")]
	Read {
		/// File that was being read.
		path: String,
		/// Underlying I/O failure.
		#[source]
		source: Arc<std::io::Error>,
	},
	/// Configuration file is not valid TOML for [`crate::config::GatewayConfig`].
	#[error("Configuration could not be parsed.")]
	Parse {
		/// Underlying TOML failure.
		#[source]
		source: Arc<toml::de::Error>,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
impl From<toml::de::Error> for ConfigError {
	fn from(e: toml::de::Error) -> Self {
		Self::Parse { source: Arc::new(e) }
	}
}

/// Failures that were retried and kept happening.
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Every attempt failed at the network level.
	#[error("Upstream call failed after {attempts} attempts.")]
	RetriesExhausted {
		/// Number of attempts made, including the first one.
		attempts: u32,
		/// Failure reported by the final attempt.
		#[source]
		source: TransportError,
	},
}

/// Upstream body could not be interpreted.
#[derive(Clone, Debug, ThisError)]
pub enum MalformedResponseError {
	/// Body is not JSON of the expected shape.
	#[error("Upstream {stage} response is not valid JSON at `{path}`.")]
	Json {
		/// Step whose response failed to parse.
		stage: AuthStage,
		/// JSON path where parsing stopped.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_json::Error>,
	},
	/// A required field is present but empty or unusable.
	#[error("Upstream {stage} response has an unusable `{field}` field.")]
	InvalidField {
		/// Step whose response was rejected.
		stage: AuthStage,
		/// Wire name of the field.
		field: &'static str,
	},
}

/// Transport-level failures (network, request construction, timeouts).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Request could not be constructed or handed to the HTTP client.
	#[error("Request to the upstream API could not be built.")]
	Request {
		/// Underlying construction failure.
		#[source]
		source: SharedError,
	},
	/// Upstream did not answer within the per-call timeout.
	#[error("Upstream API did not respond within {timeout:?}.")]
	Timeout {
		/// Configured per-call timeout.
		timeout: StdDuration,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}

	/// Wraps a request construction error.
	pub fn request(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Request { source: Arc::new(src) }
	}

	/// Network failures are retried; construction errors and timeouts are not.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Network { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() { Self::request(e) } else { Self::network(e) }
	}
}
impl From<::http::Error> for TransportError {
	fn from(e: ::http::Error) -> Self {
		Self::request(e)
	}
}
