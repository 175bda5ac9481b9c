//! Wire models and endpoint layout for the upstream challenge/token protocol.
//!
//! Only the fields the gateway relies on are modelled; everything else in the upstream payloads
//! is ignored.

// crates.io
use serde::de::DeserializeOwned;
use time::{
	PrimitiveDateTime,
	format_description::well_known::{Iso8601, Rfc3339},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
	authorize,
	error::{AuthStage, ConfigError, MalformedResponseError},
};

/// Challenge endpoint, relative to the API root.
pub const CHALLENGE_PATH: &str = "auth/challenge";
/// Token exchange endpoint, relative to the API root.
pub const TOKEN_PATH: &str = "auth/token";
/// API prefix appended to the configured base URL by default.
pub const DEFAULT_API_PATH: &str = "api/v2";

const LATEST_INSTANT: OffsetDateTime = PrimitiveDateTime::MAX.assume_utc();

/// Resolved upstream URLs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRoot {
	root: Url,
	challenge: Url,
	token: Url,
}
impl ApiRoot {
	/// Resolves `<base_url>/<api_path>/` and the authentication endpoints below it.
	pub fn new(base_url: &str, api_path: &str) -> Result<Self, ConfigError> {
		let invalid = |reason: String| ConfigError::InvalidBaseUrl {
			value: base_url.to_owned(),
			reason,
		};
		let base = base_url.trim().trim_end_matches('/');
		let prefix = api_path.trim().trim_matches('/');
		let joined =
			if prefix.is_empty() { format!("{base}/") } else { format!("{base}/{prefix}/") };
		let root = Url::parse(&joined).map_err(|err| invalid(err.to_string()))?;

		if !matches!(root.scheme(), "http" | "https") {
			return Err(invalid(format!("unsupported scheme `{}`", root.scheme())));
		}
		if root.cannot_be_a_base() || root.host_str().is_none() {
			return Err(invalid("a host is required".into()));
		}

		let challenge = Self::join_onto(&root, CHALLENGE_PATH)?;
		let token = Self::join_onto(&root, TOKEN_PATH)?;

		Ok(Self { root, challenge, token })
	}

	/// Root every relative path is joined onto (always ends with `/`).
	pub fn root(&self) -> &Url {
		&self.root
	}

	/// `POST auth/challenge` URL.
	pub fn challenge_url(&self) -> &Url {
		&self.challenge
	}

	/// `POST auth/token` URL.
	pub fn token_url(&self) -> &Url {
		&self.token
	}

	/// Joins a business path (leading `/` ignored) onto the API root.
	pub fn join(&self, path: &str) -> Result<Url, ConfigError> {
		Self::join_onto(&self.root, path)
	}

	fn join_onto(root: &Url, path: &str) -> Result<Url, ConfigError> {
		let invalid = |reason: String| ConfigError::InvalidPath { path: path.to_owned(), reason };
		let url = root.join(path.trim_start_matches('/')).map_err(|err| invalid(err.to_string()))?;

		// Absolute inputs replace the root instead of extending it.
		if url.origin() != root.origin() {
			let origin = url.origin().ascii_serialization();

			return Err(invalid(format!("origin `{origin}` differs from the API root")));
		}

		Ok(url)
	}
}

/// Response of `POST auth/challenge`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
	/// Nonce that authorizes the next token exchange.
	pub challenge: String,
	/// Upstream timestamp of the challenge; informational only.
	#[serde(default)]
	pub timestamp: String,
}

/// Body of `POST auth/token`; the technical secret travels under `token`.
#[derive(Serialize)]
pub struct TokenRequest<'a> {
	/// Challenge returned by the previous step.
	pub challenge: &'a str,
	/// Long-lived technical secret.
	pub token: &'a str,
}
impl<'a> TokenRequest<'a> {
	/// Pairs a challenge with the technical secret.
	pub fn new(challenge: &'a ChallengeResponse, secret: &'a TokenSecret) -> Self {
		Self { challenge: &challenge.challenge, token: secret.expose() }
	}
}
impl Debug for TokenRequest<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRequest")
			.field("challenge", &self.challenge)
			.field("token", &"<redacted>")
			.finish()
	}
}

/// Response of `POST auth/token`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
	/// Short-lived bearer token.
	pub access_token: String,
	/// Issue instant as reported by upstream.
	#[serde(default)]
	pub issued_at: Option<String>,
	/// Expiry instant as reported by upstream.
	#[serde(default)]
	pub expires_at: Option<String>,
}
impl TokenResponse {
	/// Converts the response into a [`Credential`].
	///
	/// A missing or unparseable `expiresAt` falls back to `now + fallback_ttl`, clamped to the
	/// latest representable instant; a missing or unparseable `issuedAt` falls back to `now`.
	pub fn into_credential(
		self,
		now: OffsetDateTime,
		fallback_ttl: Duration,
	) -> Result<Credential, MalformedResponseError> {
		if self.access_token.trim().is_empty()
			|| authorize::bearer_value(self.access_token.as_str()).is_none()
		{
			return Err(MalformedResponseError::InvalidField {
				stage: AuthStage::Token,
				field: "accessToken",
			});
		}

		let issued_at = self.issued_at.as_deref().and_then(parse_timestamp).unwrap_or(now);
		let expires_at = self
			.expires_at
			.as_deref()
			.and_then(parse_timestamp)
			.unwrap_or_else(|| now.checked_add(fallback_ttl).unwrap_or(LATEST_INSTANT));

		Ok(Credential::new(self.access_token, Some(expires_at)).with_issued_at(issued_at))
	}
}
impl Debug for TokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenResponse")
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Parses upstream timestamps: RFC 3339, ISO 8601 with an offset, or ISO 8601 without one
/// (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	if raw.is_empty() {
		return None;
	}
	if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Some(instant);
	}
	if let Ok(instant) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
		return Some(instant);
	}

	PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT).ok().map(PrimitiveDateTime::assume_utc)
}

/// Deserializes a JSON body, recording the path at which parsing failed.
pub(crate) fn parse_json<T>(stage: AuthStage, body: &[u8]) -> Result<T, MalformedResponseError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
		let path = err.path().to_string();

		MalformedResponseError::Json { stage, path, source: Arc::new(err.into_inner()) }
	})
}
