#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
// self
use melidash::{
	_preludet::*,
	auth::{ConnectionState, TokenPair},
	error::TransportError,
	flows::TokenManager,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
};

fn rotated_body(access: &str, refresh: Option<&str>) -> String {
	let refresh = refresh.map(|value| format!(",\"refresh_token\":\"{value}\"")).unwrap_or_default();

	format!(
		"{{\"access_token\":\"{access}\",\"token_type\":\"bearer\",\"expires_in\":21600,\
		 \"user_id\":123456{refresh}}}"
	)
}

#[tokio::test]
async fn refresh_rotates_both_tokens() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "TG-refresh-1");
			then.status(200)
				.header("content-type", "application/json")
				.body(rotated_body("APP_USR-access-2", Some("TG-refresh-2")));
		})
		.await;
	let (_, manager) = build_reqwest_test_client(test_config(&server.base_url()));

	manager.set_tokens(TokenPair::new("APP_USR-access-1", "TG-refresh-1"));

	let pair = manager.refresh_access_token().await.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert_eq!(pair, TokenPair::new("APP_USR-access-2", "TG-refresh-2"));
	assert_eq!(manager.tokens(), Some(pair));
	assert_eq!(manager.refresh_metrics.attempts(), 1);
	assert_eq!(manager.refresh_metrics.successes(), 1);
}

#[tokio::test]
async fn refresh_keeps_previous_refresh_token_when_omitted() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").form_urlencoded_tuple("grant_type", "refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.body(rotated_body("APP_USR-access-2", None));
		})
		.await;
	let (_, manager) = build_reqwest_test_client(test_config(&server.base_url()));

	manager.set_tokens(TokenPair::new("APP_USR-access-1", "TG-refresh-1"));

	let pair = manager.refresh_access_token().await.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert_eq!(pair, TokenPair::new("APP_USR-access-2", "TG-refresh-1"));
}

#[tokio::test]
async fn refresh_without_refresh_token_makes_no_request() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(rotated_body("unused", Some("unused")));
		})
		.await;
	let (_, manager) = build_reqwest_test_client(test_config(&server.base_url()));
	let err = manager.refresh_access_token().await.expect_err("Nothing to refresh yet.");

	assert!(matches!(err, Error::MissingCredential));

	manager.set_tokens(TokenPair::access_only("APP_USR-access-only"));

	let err = manager.refresh_access_token().await.expect_err("Access-only pairs cannot refresh.");

	assert!(matches!(err, Error::MissingCredential));

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn concurrent_refreshes_share_one_request() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").form_urlencoded_tuple("grant_type", "refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(200))
				.body(rotated_body("APP_USR-access-2", Some("TG-refresh-2")));
		})
		.await;
	let (_, manager) = build_reqwest_test_client(test_config(&server.base_url()));

	manager.set_tokens(TokenPair::new("APP_USR-access-1", "TG-refresh-1"));

	let (first, second, third) = tokio::join!(
		manager.refresh_access_token(),
		manager.refresh_access_token(),
		manager.refresh_access_token()
	);
	let first = first.expect("First refresh should succeed.");

	assert_eq!(second.expect("Second refresh should reuse the first outcome."), first);
	assert_eq!(third.expect("Third refresh should reuse the first outcome."), first);

	mock.assert_calls_async(1).await;

	assert_eq!(manager.refresh_metrics.attempts(), 1);
	assert_eq!(manager.refresh_metrics.coalesced(), 2);
}

#[tokio::test]
async fn rejected_refresh_leaves_pair_untouched() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"Refresh token revoked\",\"status\":400}",
			);
		})
		.await;
	let (_, manager) = build_reqwest_test_client(test_config(&server.base_url()));

	manager.set_tokens(TokenPair::new("APP_USR-access-1", "TG-refresh-1"));

	let err = manager.refresh_access_token().await.expect_err("Revoked refresh must fail.");

	mock.assert_async().await;

	match err {
		Error::ExternalAuth { status, ref reason } => {
			assert_eq!(status, Some(400));
			assert_eq!(reason, "invalid_grant: Refresh token revoked");
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(manager.tokens(), Some(TokenPair::new("APP_USR-access-1", "TG-refresh-1")));
	assert_eq!(manager.state(), ConnectionState::Authenticated);
	assert_eq!(manager.refresh_metrics.failures(), 1);

	manager.clear();

	assert_eq!(manager.state(), ConnectionState::Unauthenticated);
	assert!(manager.tokens().is_none());
}

#[tokio::test]
async fn coalesced_waiters_see_a_timeout_as_a_transport_failure() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(600))
				.body(rotated_body("APP_USR-late", Some("TG-late")));
		})
		.await;
	let http_client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.timeout(std::time::Duration::from_millis(100))
		.build()
		.expect("Reqwest client should build.");
	let manager = TokenManager::with_http_client(
		test_config(&server.base_url()),
		ReqwestHttpClient::with_client(http_client),
		ReqwestTransportErrorMapper,
	);

	manager.set_tokens(TokenPair::new("APP_USR-access-1", "TG-refresh-1"));

	let (first, second) =
		tokio::join!(manager.refresh_access_token(), manager.refresh_access_token());

	for err in [first, second].map(|result| result.expect_err("Timed-out refresh must fail.")) {
		assert!(
			matches!(err, Error::Transport(TransportError::Timeout { .. })),
			"Unexpected error variant: {err:?}."
		);
		assert!(!err.requires_reauthentication());
	}

	assert_eq!(manager.tokens(), Some(TokenPair::new("APP_USR-access-1", "TG-refresh-1")));
	assert_eq!(manager.refresh_metrics.attempts(), 1);
	assert_eq!(manager.refresh_metrics.coalesced(), 1);

	tokio::time::sleep(std::time::Duration::from_millis(700)).await;

	mock.assert_calls_async(1).await;
}
