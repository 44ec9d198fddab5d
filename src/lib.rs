//! MeliDash marketplace core: OAuth credential lifecycle, a refresh-aware API executor, and a
//! webhook notification dispatcher for marketplace sellers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod webhook;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		client::ApiClient,
		config::MarketplaceConfig,
		flows::TokenManager,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
	};

	/// Token manager type alias used by reqwest-backed integration tests.
	pub type ReqwestTestManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;
	/// API client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ApiClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a configuration pointing both the authorization and API bases at `base`
	/// (usually an `httpmock` server URL).
	pub fn test_config(base: &str) -> MarketplaceConfig {
		MarketplaceConfig::builder("client-it", "secret-it")
			.redirect_uri(
				Url::parse("https://app.example.com/callback")
					.expect("Redirect URI fixture should parse."),
			)
			.auth_base(Url::parse(base).expect("Mock authorization base should parse."))
			.api_base(Url::parse(base).expect("Mock API base should parse."))
			.build()
			.expect("Test marketplace configuration should be valid.")
	}

	/// Constructs a [`TokenManager`] and an [`ApiClient`] sharing it, both backed by the
	/// reqwest transport used across integration tests.
	pub fn build_reqwest_test_client(
		config: MarketplaceConfig,
	) -> (ReqwestTestClient, Arc<ReqwestTestManager>) {
		let manager = Arc::new(TokenManager::with_http_client(
			config,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		));

		(ApiClient::new(manager.clone()), manager)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tower as _};
