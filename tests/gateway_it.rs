// crates.io
use httpmock::prelude::*;
// self
use ksef_gateway::{
	_preludet::*,
	authorize::BearerSource,
	config::GatewayConfig,
	error::{ConfigError, UpstreamAuthError},
	gateway::Gateway,
	http::ReqwestHttpClient,
	retry::RetryPolicy,
};

const CHALLENGE_PATH: &str = "/api/v2/auth/challenge";
const TOKEN_PATH: &str = "/api/v2/auth/token";

async fn mock_exchange<'a>(
	server: &'a MockServer,
	access_token: &str,
) -> (httpmock::Mock<'a>, httpmock::Mock<'a>) {
	let token_body = format!(
		"{{\"accessToken\":\"{access_token}\",\"expiresAt\":\"2030-01-01T00:00:00Z\"}}"
	);
	let challenge = server
		.mock_async(|when, then| {
			when.method(POST).path(CHALLENGE_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"challenge\":\"gateway-challenge\",\"timestamp\":\"2025-01-01T00:00:00Z\"}",
			);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(&token_body);
		})
		.await;

	(challenge, token)
}

#[tokio::test]
async fn get_attaches_dynamic_bearer_and_json_accept() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(&test_config(&server.base_url()));
	let (challenge, token) = mock_exchange(&server, "dynamic-access").await;
	let business = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v2/invoices/query")
				.header("authorization", "Bearer dynamic-access")
				.header("accept", "application/json");
			then.status(200).header("content-type", "application/json").body("{\"invoices\":[]}");
		})
		.await;

	assert_eq!(gateway.bearer_source(), BearerSource::Dynamic);

	let first = gateway.get("/invoices/query").await.expect("Business call should succeed.");
	let second = gateway.get("invoices/query").await.expect("Second business call should succeed.");

	assert_eq!(first.status(), 200);
	assert_eq!(first.body(), b"{\"invoices\":[]}");
	assert_eq!(second.status(), 200);

	business.assert_calls_async(2).await;
	challenge.assert_calls_async(1).await;
	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn post_forwards_body_and_content_type() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(&test_config(&server.base_url()));
	let _exchange = mock_exchange(&server, "post-access").await;
	let business = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v2/invoices/send")
				.header("authorization", "Bearer post-access")
				.header("content-type", "application/xml")
				.body("<Faktura/>");
			then.status(202).body("{\"referenceNumber\":\"REF-1\"}");
		})
		.await;
	let response = gateway
		.post("invoices/send", "application/xml", "<Faktura/>")
		.await
		.expect("Invoice submission should be forwarded.");

	assert_eq!(response.status(), 202);
	assert_eq!(response.body(), b"{\"referenceNumber\":\"REF-1\"}");

	business.assert_async().await;
}

#[tokio::test]
async fn send_replaces_caller_supplied_authorization() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(&test_config(&server.base_url()));
	let _exchange = mock_exchange(&server, "fresh-access").await;
	let business = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v2/sessions")
				.header("authorization", "Bearer fresh-access");
			then.status(200);
		})
		.await;
	let request = ::http::Request::builder()
		.method(::http::Method::GET)
		.uri(server.url("/api/v2/sessions"))
		.header("authorization", "Bearer stale-access")
		.body(Vec::new())
		.expect("Request should build.");
	let response = gateway.send(request).await.expect("Decorated request should be sent.");

	assert_eq!(response.status(), 200);

	business.assert_async().await;
}

#[tokio::test]
async fn static_token_is_used_when_dynamic_auth_is_disabled() {
	let server = MockServer::start_async().await;
	let gateway =
		build_reqwest_test_gateway(&test_config(&server.base_url()).with_dynamic_auth(false));
	let (challenge, token) = mock_exchange(&server, "unused").await;
	let business = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v2/invoices/query")
				.header("authorization", format!("Bearer {TEST_TECHNICAL_TOKEN}"));
			then.status(200);
		})
		.await;

	assert_eq!(gateway.bearer_source(), BearerSource::Static);

	gateway.get("invoices/query").await.expect("Static-token call should succeed.");

	business.assert_async().await;
	challenge.assert_calls_async(0).await;
	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn anonymous_calls_carry_only_accept() {
	let server = MockServer::start_async().await;
	let config = GatewayConfig::new(server.base_url()).with_dynamic_auth(false);
	let gateway = build_reqwest_test_gateway(&config);
	let business = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v2/public/status")
				.header_missing("authorization")
				.header("accept", "application/json");
			then.status(200);
		})
		.await;

	assert_eq!(gateway.bearer_source(), BearerSource::Anonymous);

	gateway.get("public/status").await.expect("Anonymous call should succeed.");

	business.assert_async().await;
}

#[tokio::test]
async fn upstream_errors_pass_through_untouched() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(&test_config(&server.base_url()));
	let _exchange = mock_exchange(&server, "passthrough").await;
	let business = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v2/invoices/missing");
			then.status(500).header("x-request-id", "req-42").body("boom");
		})
		.await;
	let response =
		gateway.get("invoices/missing").await.expect("A 500 should be returned as a response.");

	assert_eq!(response.status(), 500);
	assert_eq!(response.headers()["x-request-id"], "req-42");
	assert_eq!(response.body(), b"boom");

	business.assert_calls_async(1).await;
}

#[tokio::test]
async fn rate_limited_business_call_is_retried_then_returned() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(&test_config(&server.base_url()));
	let _exchange = mock_exchange(&server, "throttled").await;
	let business = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v2/invoices/query");
			then.status(429).body("slow down");
		})
		.await;
	let response = gateway
		.get("invoices/query")
		.await
		.expect("Exhausted rate-limit retries should return the last response.");

	assert_eq!(response.status(), 429);

	business.assert_calls_async(RetryPolicy::DEFAULT_MAX_RETRIES as usize + 1).await;
}

#[tokio::test]
async fn failed_refresh_blocks_the_business_call() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(&test_config(&server.base_url()));
	let _challenge = server
		.mock_async(|when, then| {
			when.method(POST).path(CHALLENGE_PATH);
			then.status(503).body("maintenance");
		})
		.await;
	let business = server
		.mock_async(|when, then| {
			when.path("/api/v2/invoices/query");
			then.status(200);
		})
		.await;
	let err = gateway
		.get("invoices/query")
		.await
		.expect_err("A failed refresh should surface before the business call.");

	assert!(matches!(err, Error::UpstreamAuth(UpstreamAuthError { status: Some(503), .. })));
	assert!(err.is_retryable());

	business.assert_calls_async(0).await;
}

#[tokio::test]
async fn absolute_paths_to_other_hosts_are_rejected() {
	let server = MockServer::start_async().await;
	let elsewhere = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(&test_config(&server.base_url()));
	let (challenge, token) = mock_exchange(&server, "must-stay-home").await;
	let foreign = elsewhere
		.mock_async(|when, then| {
			when.path("/steal");
			then.status(200);
		})
		.await;
	let err = gateway
		.get(&elsewhere.url("/steal"))
		.await
		.expect_err("A path on another origin should not be sent.");

	assert!(matches!(err, Error::Config(ConfigError::InvalidPath { .. })));

	foreign.assert_calls_async(0).await;
	challenge.assert_calls_async(0).await;
	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn login_diagnostic_returns_token_response() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(&test_config(&server.base_url()));
	let (_challenge, token) = mock_exchange(&server, "diagnostic").await;
	let outcome = gateway.login().await.expect("Login should succeed.");

	assert_eq!(outcome.status, 200);
	assert!(outcome.body.contains("\"accessToken\":\"diagnostic\""));
	assert!(!gateway.is_token_valid());

	token.assert_calls_async(1).await;
}

#[test]
fn construction_rejects_invalid_configuration() {
	let missing = Gateway::<ReqwestHttpClient>::with_http_client(
		&GatewayConfig::new("https://ksef-test.mf.gov.pl"),
		test_reqwest_http_client(),
	);

	assert!(matches!(missing, Err(Error::Config(ConfigError::MissingTechnicalToken))));

	let bad_url = Gateway::<ReqwestHttpClient>::with_http_client(
		&GatewayConfig::new("not a url").with_technical_token(TEST_TECHNICAL_TOKEN),
		test_reqwest_http_client(),
	);

	assert!(matches!(bad_url, Err(Error::Config(ConfigError::InvalidBaseUrl { .. }))));
}
