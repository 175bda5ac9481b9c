//! Gateway configuration: defaults, builder helpers, and TOML loading.
//!
//! Precedence: explicit builder calls > environment (`KSEF_TECHNICAL_TOKEN`) > file > defaults.
//! The technical token can be kept out of the file entirely by supplying it through the
//! environment.
//!
//! ```toml
//! base_url = "https://ksef-test.mf.gov.pl"
//! technical_token = "..."
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//! timeout_ms = 30000
//!
//! [token]
//! safety_margin_secs = 120
//! ```

// std
use std::path::Path;
// crates.io
use serde::Deserializer;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	retry::RetryPolicy,
	store::CredentialStore,
	upstream::{ApiRoot, DEFAULT_API_PATH},
};

/// Environment variable that overrides `technical_token`.
pub const TECHNICAL_TOKEN_ENV: &str = "KSEF_TECHNICAL_TOKEN";
/// Upper bound for `token.safety_margin_secs` and `token.expiry_fallback_secs` (one year).
pub const MAX_TOKEN_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Root configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct GatewayConfig {
	/// Upstream base URL, without the API prefix.
	pub base_url: String,
	/// API prefix appended to `base_url`.
	#[serde(default = "default_api_path")]
	pub api_path: String,
	/// Long-lived technical secret; empty disables both the exchange and the static fallback.
	#[serde(default)]
	pub technical_token: Option<TokenSecret>,
	/// Attach tokens obtained through the challenge/token exchange to business calls.
	#[serde(default = "default_dynamic_auth")]
	pub dynamic_auth: bool,
	/// Retry/backoff settings.
	#[serde(default)]
	pub retry: RetryConfig,
	/// Access-token cache settings.
	#[serde(default)]
	pub token: TokenConfig,
}
impl GatewayConfig {
	/// Creates a configuration for `base_url` with every other setting at its default.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			api_path: default_api_path(),
			technical_token: None,
			dynamic_auth: default_dynamic_auth(),
			retry: RetryConfig::default(),
			token: TokenConfig::default(),
		}
	}

	/// Parses and validates a TOML document.
	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(raw)?;

		config.validate()?;

		Ok(config)
	}

	/// Loads a TOML file, then overlays the process environment.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
			path: path.display().to_string(),
			source: Arc::new(err),
		})?;
		let config: Self = toml::from_str(&raw)?;
		let config = config.with_env_overrides(|key| std::env::var(key).ok());

		config.validate()?;

		Ok(config)
	}

	/// Applies overrides resolved through `lookup` (normally the process environment).
	pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
		if let Some(token) = lookup(TECHNICAL_TOKEN_ENV) {
			self.technical_token = Some(TokenSecret::new(token.trim()));
		}

		self
	}

	/// Sets the technical secret.
	pub fn with_technical_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.technical_token = Some(token.into());

		self
	}

	/// Overrides the API prefix.
	pub fn with_api_path(mut self, api_path: impl Into<String>) -> Self {
		self.api_path = api_path.into();

		self
	}

	/// Enables or disables the dynamic token path.
	pub fn with_dynamic_auth(mut self, enabled: bool) -> Self {
		self.dynamic_auth = enabled;

		self
	}

	/// Replaces the retry settings.
	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry = RetryConfig::from(&policy);

		self
	}

	/// Replaces the token cache settings.
	pub fn with_token_config(mut self, token: TokenConfig) -> Self {
		self.token = token;

		self
	}

	/// Checks every field that could make the gateway misbehave at runtime.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.api_root()?;

		if self.retry.timeout.is_zero() {
			return Err(ConfigError::InvalidField {
				field: "retry.timeout_ms",
				reason: "must be greater than 0".into(),
			});
		}
		if self.retry.multiplier == 0 {
			return Err(ConfigError::InvalidField {
				field: "retry.multiplier",
				reason: "must be greater than 0".into(),
			});
		}
		if self.token.expiry_fallback_secs == 0 {
			return Err(ConfigError::InvalidField {
				field: "token.expiry_fallback_secs",
				reason: "must be greater than 0".into(),
			});
		}
		if self.token.expiry_fallback_secs > MAX_TOKEN_WINDOW_SECS {
			return Err(ConfigError::InvalidField {
				field: "token.expiry_fallback_secs",
				reason: format!("must not exceed {MAX_TOKEN_WINDOW_SECS}"),
			});
		}
		if self.token.safety_margin_secs > MAX_TOKEN_WINDOW_SECS {
			return Err(ConfigError::InvalidField {
				field: "token.safety_margin_secs",
				reason: format!("must not exceed {MAX_TOKEN_WINDOW_SECS}"),
			});
		}
		if self.dynamic_auth && self.technical_secret().is_none() {
			return Err(ConfigError::MissingTechnicalToken);
		}
		if self
			.technical_secret()
			.is_some_and(|token| crate::authorize::bearer_value(token.expose()).is_none())
		{
			return Err(ConfigError::InvalidField {
				field: "technical_token",
				reason: "contains characters that are not valid in an HTTP header".into(),
			});
		}

		Ok(())
	}

	/// Resolves the upstream URLs.
	pub fn api_root(&self) -> Result<ApiRoot, ConfigError> {
		ApiRoot::new(&self.base_url, &self.api_path)
	}

	/// Technical secret, unless it is missing or blank.
	pub fn technical_secret(&self) -> Option<&TokenSecret> {
		self.technical_token.as_ref().filter(|token| !token.is_blank())
	}

	/// Retry policy described by the `retry` section.
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_retries: self.retry.max_retries,
			base_delay: self.retry.base_delay,
			multiplier: self.retry.multiplier,
			retry_statuses: self.retry.retry_statuses.clone(),
			timeout: self.retry.timeout,
		}
	}

	/// Builds an empty credential store with the configured safety margin.
	pub fn credential_store(&self) -> CredentialStore {
		CredentialStore::with_safety_margin(self.token.safety_margin())
	}
}

/// `[retry]` section.
///
/// Durations are written in milliseconds (`base_delay_ms`, `timeout_ms`) and held exactly, so a
/// policy passed through [`GatewayConfig::with_retry_policy`] comes back unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Retries after the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry.
	#[serde(rename = "base_delay_ms", deserialize_with = "deserialize_millis")]
	pub base_delay: StdDuration,
	/// Backoff growth factor.
	pub multiplier: u32,
	/// Statuses treated as transient.
	pub retry_statuses: Vec<u16>,
	/// Per-attempt timeout.
	#[serde(rename = "timeout_ms", deserialize_with = "deserialize_millis")]
	pub timeout: StdDuration,
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self::from(&RetryPolicy::default())
	}
}
impl From<&RetryPolicy> for RetryConfig {
	fn from(policy: &RetryPolicy) -> Self {
		Self {
			max_retries: policy.max_retries,
			base_delay: policy.base_delay,
			multiplier: policy.multiplier,
			retry_statuses: policy.retry_statuses.clone(),
			timeout: policy.timeout,
		}
	}
}

/// `[token]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
	/// Reserve before expiry during which the token is already considered stale, in seconds.
	pub safety_margin_secs: u64,
	/// Lifetime assumed when the token response has no usable expiry, in seconds.
	pub expiry_fallback_secs: u64,
}
impl TokenConfig {
	/// Safety margin as a [`Duration`].
	pub fn safety_margin(&self) -> Duration {
		Duration::seconds(i64::try_from(self.safety_margin_secs).unwrap_or(i64::MAX))
	}

	/// Expiry fallback as a [`Duration`].
	pub fn expiry_fallback(&self) -> Duration {
		Duration::seconds(i64::try_from(self.expiry_fallback_secs).unwrap_or(i64::MAX))
	}
}
impl Default for TokenConfig {
	fn default() -> Self {
		Self { safety_margin_secs: 120, expiry_fallback_secs: 30 * 60 }
	}
}

fn default_api_path() -> String {
	DEFAULT_API_PATH.into()
}

fn default_dynamic_auth() -> bool {
	true
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<StdDuration, D::Error>
where
	D: Deserializer<'de>,
{
	u64::deserialize(deserializer).map(StdDuration::from_millis)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn minimal_toml_uses_defaults() {
		let config = GatewayConfig::from_toml_str(
			r#"
base_url = "https://ksef-test.mf.gov.pl"
technical_token = "secret"
"#,
		)
		.expect("Minimal configuration should parse.");

		assert_eq!(config.api_path, "api/v2");
		assert!(config.dynamic_auth);
		assert_eq!(config.retry_policy(), RetryPolicy::default());
		assert_eq!(config.token.safety_margin(), Duration::minutes(2));
		assert_eq!(config.token.expiry_fallback(), Duration::minutes(30));
		assert_eq!(config.technical_secret().map(TokenSecret::expose), Some("secret"));
	}

	#[test]
	fn sections_override_defaults() {
		let config = GatewayConfig::from_toml_str(
			r#"
base_url = "http://localhost:9000"
api_path = "v3"
dynamic_auth = false

[retry]
max_retries = 5
base_delay_ms = 250
retry_statuses = [429, 503]
timeout_ms = 1500

[token]
safety_margin_secs = 30
"#,
		)
		.expect("Configuration with sections should parse.");
		let policy = config.retry_policy();

		assert_eq!(policy.max_retries, 5);
		assert_eq!(policy.delay_for(2), StdDuration::from_secs(1));
		assert!(policy.retries_status(503));
		assert_eq!(policy.timeout, StdDuration::from_millis(1500));
		assert_eq!(config.credential_store().safety_margin(), Duration::seconds(30));
		assert_eq!(
			config.api_root().expect("API root should resolve.").root().as_str(),
			"http://localhost:9000/v3/"
		);
	}

	#[test]
	fn dynamic_auth_requires_technical_token() {
		let err = GatewayConfig::from_toml_str("base_url = \"https://example.com\"")
			.expect_err("Dynamic auth without a technical token should be rejected.");

		assert!(matches!(err, ConfigError::MissingTechnicalToken));

		let blank = GatewayConfig::new("https://example.com").with_technical_token("   ");

		assert!(matches!(blank.validate(), Err(ConfigError::MissingTechnicalToken)));
		assert!(blank.with_dynamic_auth(false).validate().is_ok());
	}

	#[test]
	fn rejects_invalid_values() {
		let bad_url = GatewayConfig::new("ftp://example.com").with_technical_token("secret");

		assert!(matches!(bad_url.validate(), Err(ConfigError::InvalidBaseUrl { .. })));

		let mut zero_timeout = GatewayConfig::new("https://example.com").with_technical_token("s");

		zero_timeout.retry.timeout = StdDuration::ZERO;

		assert!(matches!(
			zero_timeout.validate(),
			Err(ConfigError::InvalidField { field: "retry.timeout_ms", .. })
		));
		assert!(matches!(
			GatewayConfig::from_toml_str("base_url = 42"),
			Err(ConfigError::Parse { .. })
		));
	}

	#[test]
	fn environment_overrides_file_token() {
		let config = GatewayConfig::new("https://example.com")
			.with_technical_token("from-file")
			.with_env_overrides(|key| (key == TECHNICAL_TOKEN_ENV).then(|| " from-env\n".into()));

		assert_eq!(config.technical_secret().map(TokenSecret::expose), Some("from-env"));

		let untouched = GatewayConfig::new("https://example.com")
			.with_technical_token("from-file")
			.with_env_overrides(|_| None);

		assert_eq!(untouched.technical_secret().map(TokenSecret::expose), Some("from-file"));
	}

	#[test]
	fn oversized_token_windows_are_rejected() {
		let base = GatewayConfig::new("https://example.com").with_technical_token("s");
		let margin = base.clone().with_token_config(TokenConfig {
			safety_margin_secs: u64::MAX,
			..Default::default()
		});
		let fallback = base.clone().with_token_config(TokenConfig {
			expiry_fallback_secs: MAX_TOKEN_WINDOW_SECS + 1,
			..Default::default()
		});

		assert!(matches!(
			margin.validate(),
			Err(ConfigError::InvalidField { field: "token.safety_margin_secs", .. })
		));
		assert!(matches!(
			fallback.validate(),
			Err(ConfigError::InvalidField { field: "token.expiry_fallback_secs", .. })
		));

		let store = margin.credential_store();

		store.save("t", Some(OffsetDateTime::now_utc() + Duration::hours(1)));

		assert!(!store.is_valid());
	}

	#[test]
	fn retry_policy_round_trips_through_config() {
		let policy = RetryPolicy::default()
			.with_max_retries(1)
			.with_base_delay(StdDuration::from_micros(10_500))
			.with_timeout(StdDuration::from_millis(500));
		let config = GatewayConfig::new("https://example.com").with_retry_policy(policy.clone());

		assert_eq!(config.retry_policy(), policy);
		assert_eq!(config.retry_policy().timeout, StdDuration::from_millis(500));
	}
}
