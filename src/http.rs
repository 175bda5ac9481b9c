//! Transport primitives for upstream calls.
//!
//! [`HttpTransport`] is the gateway's only dependency on an HTTP stack. Requests and responses
//! are plain [`::http`] values with buffered bodies, so the retry layer can replay a request
//! without knowing which client sends it and tests can script responses without sockets.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use ::http::{
	HeaderValue, Method,
	header::{ACCEPT, CONTENT_TYPE},
};
// self
use crate::{_prelude::*, error::TransportError};

/// Buffered outbound request.
pub type HttpRequest = ::http::Request<Vec<u8>>;
/// Buffered upstream response.
pub type HttpResponse = ::http::Response<Vec<u8>>;
/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// JSON media type used for `Accept` and `Content-Type`.
pub const APPLICATION_JSON: &str = "application/json";

/// Abstraction over HTTP clients able to execute one buffered request.
///
/// Implementations perform exactly one attempt: retries, timeouts, and authentication are
/// layered on top by [`crate::retry::ResilientTransport`] and [`crate::authorize`]. A non-2xx
/// status is a successful call from the transport's point of view and must be returned as a
/// response, not an error.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the full response body.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Builds a `POST` request carrying a JSON body with JSON `Accept`/`Content-Type` headers.
pub fn json_post(url: &Url, body: Vec<u8>) -> Result<HttpRequest, TransportError> {
	let request = ::http::Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(ACCEPT, HeaderValue::from_static(APPLICATION_JSON))
		.header(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))
		.body(body)?;

	Ok(request)
}

/// Copies a request so it can be replayed on a later attempt.
pub(crate) fn duplicate_request(request: &HttpRequest) -> HttpRequest {
	let mut copy = HttpRequest::new(request.body().clone());

	*copy.method_mut() = request.method().clone();
	*copy.uri_mut() = request.uri().clone();
	*copy.version_mut() = request.version();
	*copy.headers_mut() = request.headers().clone();

	copy
}

/// Lossy UTF-8 view of a response body, used for error reports.
pub(crate) fn body_text(response: &HttpResponse) -> String {
	String::from_utf8_lossy(response.body()).into_owned()
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Configure any custom client to disable redirect following: the authentication endpoints
/// answer directly and a redirect would replay the technical secret to another URI.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that never follows redirects.
	pub fn without_redirects() -> Result<Self, crate::error::ConfigError> {
		let client =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request)?;
			let response = client.execute(request).await?;
			let status = response.status();
			let version = response.version();
			let headers = response.headers().to_owned();
			let mut buffered = HttpResponse::new(response.bytes().await?.to_vec());

			*buffered.status_mut() = status;
			*buffered.version_mut() = version;
			*buffered.headers_mut() = headers;

			Ok(buffered)
		})
	}
}
