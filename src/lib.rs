//! Credential-caching gateway for the KSeF invoice-exchange API: single-flight challenge/token
//! refresh, bearer decoration, and a retry-aware transport in one crate.
//!
//! The crate is organised leaves first:
//!
//! - [`store`] keeps the one live access token and answers validity queries with a safety margin.
//! - [`lifecycle`] runs the challenge + token exchange, with at most one refresh in flight.
//! - [`retry`] wraps every outbound call with timeouts and exponential backoff.
//! - [`authorize`] attaches the bearer credential to business requests.
//! - [`gateway`] wires the pieces together from a [`config::GatewayConfig`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authorize;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod obs;
pub mod retry;
pub mod store;
pub mod upstream;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers shared by the integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::GatewayConfig,
		gateway::{Gateway, ReqwestGateway},
		http::ReqwestHttpClient,
		retry::RetryPolicy,
	};

	/// Technical secret configured by [`test_config`].
	pub const TEST_TECHNICAL_TOKEN: &str = "technical-secret";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Returns a configuration pointed at `base_url` with a short backoff so retrying tests stay
	/// fast against real sockets.
	pub fn test_config(base_url: &str) -> GatewayConfig {
		GatewayConfig::new(base_url)
			.with_technical_token(TEST_TECHNICAL_TOKEN)
			.with_retry_policy(
				RetryPolicy::default()
					.with_base_delay(StdDuration::from_millis(10))
					.with_timeout(StdDuration::from_secs(5)),
			)
	}

	/// Constructs a reqwest-backed [`Gateway`] for the provided configuration.
	pub fn build_reqwest_test_gateway(config: &GatewayConfig) -> ReqwestGateway {
		Gateway::with_http_client(config, test_reqwest_http_client())
			.expect("Test gateway configuration should be valid.")
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
