//! Bearer decoration for outbound business requests.
//!
//! There is exactly one place that writes `Authorization`: [`RequestAuthorizer::authorize`].
//! With dynamic authentication enabled it always goes through
//! [`CredentialManager::ensure_token`]; the statically configured technical token is only used
//! when dynamic authentication is switched off.

// crates.io
use ::http::{
	HeaderMap, HeaderValue,
	header::{ACCEPT, AUTHORIZATION},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::TransportError,
	http::{APPLICATION_JSON, HttpRequest, HttpTransport},
	lifecycle::CredentialManager,
};

/// Where the bearer credential attached to business requests comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BearerSource {
	/// Token obtained through the challenge/token exchange.
	Dynamic,
	/// Technical token from configuration, sent as-is.
	Static,
	/// No `Authorization` header is attached.
	Anonymous,
}

/// Attaches credentials and the JSON `Accept` header to outbound requests.
pub struct RequestAuthorizer<C>
where
	C: ?Sized + HttpTransport,
{
	manager: CredentialManager<C>,
	dynamic: bool,
	static_token: Option<TokenSecret>,
}
impl<C> RequestAuthorizer<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates an authorizer that uses the dynamic token from `manager`.
	pub fn new(manager: CredentialManager<C>) -> Self {
		Self { manager, dynamic: true, static_token: None }
	}

	/// Enables or disables the dynamic token path.
	pub fn with_dynamic_auth(mut self, enabled: bool) -> Self {
		self.dynamic = enabled;

		self
	}

	/// Sets the static fallback token; blank values clear it.
	pub fn with_static_token(mut self, token: impl Into<TokenSecret>) -> Self {
		let token = token.into();

		self.static_token = if token.is_blank() { None } else { Some(token) };

		self
	}

	/// Which credential [`Self::authorize`] will attach.
	pub fn bearer_source(&self) -> BearerSource {
		match (self.dynamic, &self.static_token) {
			(true, _) => BearerSource::Dynamic,
			(false, Some(_)) => BearerSource::Static,
			(false, None) => BearerSource::Anonymous,
		}
	}

	/// Manager used for the dynamic path.
	pub fn manager(&self) -> &CredentialManager<C> {
		&self.manager
	}

	/// Sets `Authorization` (replacing any existing value) and makes sure `Accept` includes
	/// `application/json`.
	pub async fn authorize(&self, mut request: HttpRequest) -> Result<HttpRequest> {
		let token = match self.bearer_source() {
			BearerSource::Dynamic => Some(self.manager.ensure_token().await?),
			BearerSource::Static => self.static_token.clone(),
			BearerSource::Anonymous => None,
		};

		if let Some(token) = token {
			set_bearer(request.headers_mut(), &token)?;
		}

		ensure_accept_json(request.headers_mut());

		Ok(request)
	}
}
impl<C> Clone for RequestAuthorizer<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			manager: self.manager.clone(),
			dynamic: self.dynamic,
			static_token: self.static_token.clone(),
		}
	}
}
impl<C> Debug for RequestAuthorizer<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestAuthorizer").field("source", &self.bearer_source()).finish()
	}
}

/// Builds a sensitive `Bearer <token>` header value, or `None` if the token contains bytes that
/// are not allowed in a header.
pub fn bearer_value(token: &str) -> Option<HeaderValue> {
	let mut value = HeaderValue::try_from(format!("Bearer {token}")).ok()?;

	value.set_sensitive(true);

	Some(value)
}

fn set_bearer(headers: &mut HeaderMap, token: &TokenSecret) -> Result<(), TransportError> {
	let value = bearer_value(token.expose()).ok_or_else(|| TransportError::Request {
		source: Arc::new(InvalidBearer),
	})?;

	headers.insert(AUTHORIZATION, value);

	Ok(())
}

fn ensure_accept_json(headers: &mut HeaderMap) {
	let present = headers.get_all(ACCEPT).iter().any(|value| {
		value.to_str().is_ok_and(|raw| {
			raw.split(',').any(|part| {
				part.split(';')
					.next()
					.is_some_and(|media| media.trim().eq_ignore_ascii_case(APPLICATION_JSON))
			})
		})
	});

	if !present {
		headers.append(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
	}
}

#[derive(Debug, ThisError)]
#[error("Bearer token contains characters that are not valid in an HTTP header.")]
struct InvalidBearer;

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn accept_is_appended_once() {
		let mut headers = HeaderMap::new();

		ensure_accept_json(&mut headers);
		ensure_accept_json(&mut headers);

		assert_eq!(headers.get_all(ACCEPT).iter().count(), 1);
		assert_eq!(headers[ACCEPT], APPLICATION_JSON);
	}

	#[test]
	fn accept_keeps_existing_media_types() {
		let mut headers = HeaderMap::new();

		headers.insert(ACCEPT, HeaderValue::from_static("application/xml"));
		ensure_accept_json(&mut headers);

		let values = headers
			.get_all(ACCEPT)
			.iter()
			.map(|value| value.to_str().expect("Accept header should be ASCII."))
			.collect::<Vec<_>>();

		assert_eq!(values, ["application/xml", APPLICATION_JSON]);

		let mut combined = HeaderMap::new();

		combined.insert(ACCEPT, HeaderValue::from_static("text/plain, Application/JSON; q=0.9"));
		ensure_accept_json(&mut combined);

		assert_eq!(combined.get_all(ACCEPT).iter().count(), 1);
	}

	#[test]
	fn bearer_replaces_existing_authorization() {
		let mut headers = HeaderMap::new();

		headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
		set_bearer(&mut headers, &TokenSecret::new("fresh"))
			.expect("Bearer value should be valid.");

		assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
		assert_eq!(headers[AUTHORIZATION], "Bearer fresh");
		assert!(headers[AUTHORIZATION].is_sensitive());
	}

	#[test]
	fn bearer_rejects_header_breaking_tokens() {
		assert!(bearer_value("line\nbreak").is_none());

		let err = set_bearer(&mut HeaderMap::new(), &TokenSecret::new("bad\r\n"))
			.expect_err("Tokens with control characters should be rejected.");

		assert!(matches!(err, TransportError::Request { .. }));
	}
}
