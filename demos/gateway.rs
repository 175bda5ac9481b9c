//! Demonstrates the gateway against a mocked upstream: one challenge + token exchange, then
//! authenticated business calls that reuse the cached access token.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use ksef_gateway::{
	_preludet,
	config::GatewayConfig,
	gateway::{Gateway, ReqwestGateway},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let challenge_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/v2/auth/challenge");
			then.status(200).header("content-type", "application/json").body(
				"{\"challenge\":\"20250101-CR-DEMO\",\"timestamp\":\"2025-01-01T00:00:00Z\"}",
			);
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/v2/auth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"accessToken\":\"demo-access\",\"expiresAt\":\"2030-01-01T00:00:00Z\"}",
			);
		})
		.await;
	let invoices_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v2/invoices/query")
				.header("authorization", "Bearer demo-access");
			then.status(200).header("content-type", "application/json").body("{\"invoices\":[]}");
		})
		.await;
	let config = GatewayConfig::from_toml_str(&format!(
		"base_url = \"{}\"\ntechnical_token = \"demo-technical-token\"\n",
		server.base_url()
	))?;
	// The mock server terminates TLS with a self-signed certificate.
	let http_client = _preludet::test_reqwest_http_client();
	let gateway: ReqwestGateway = Gateway::with_http_client(&config, http_client)?;

	for _ in 0..3 {
		let response = gateway.get("invoices/query").await?;
		let body = String::from_utf8_lossy(response.body());

		println!("Upstream answered {} with {body}.", response.status());
	}

	println!("Cached token valid: {}.", gateway.is_token_valid());

	challenge_mock.assert_async().await;
	token_mock.assert_async().await;
	invoices_mock.assert_calls_async(3).await;

	Ok(())
}
