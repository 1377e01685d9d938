#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use bearer_gateway::{
	_preludet::*,
	auth::{Credentials, TokenSecret},
	config::GatewayConfig,
	gateway::{RETRY_EXHAUSTED, RefreshState},
	http::ApiRequest,
	session::SessionEvent,
	store::CredentialStore,
};

fn config(server: &MockServer) -> GatewayConfig {
	GatewayConfig::builder(
		Url::parse(&server.base_url()).expect("Mock server URL should parse successfully."),
	)
	.exempt("/public/status")
	.build()
	.expect("Gateway config should build successfully.")
}

fn seed(store: &dyn CredentialStore) {
	store
		.persist(&Credentials::new("access-old", Some("refresh-old".into())))
		.expect("Seeding credentials should succeed.");
}

fn record_terminations(gateway: &ReqwestTestGateway) -> Arc<Mutex<Vec<String>>> {
	let reasons = Arc::new(Mutex::new(Vec::new()));
	let sink = reasons.clone();

	gateway.events().subscribe(move |event| {
		if let SessionEvent::Terminated { reason } = event {
			sink.lock().push(reason.clone());
		}
	});

	reasons
}

#[tokio::test]
async fn concurrent_401s_trigger_one_refresh() {
	let server = MockServer::start_async().await;
	let (gateway, _session, store) = build_reqwest_test_session(config(&server));

	seed(&*store);

	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/articles").header("authorization", "Bearer access-old");
			then.status(401);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/articles").header("authorization", "Bearer access-new");
			then.status(200).header("content-type", "application/json").body("[]");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/refresh")
				.header_missing("authorization")
				.json_body(serde_json::json!({ "refreshToken": "refresh-old" }));
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(150))
				.body(r#"{"accessToken":"access-new","refreshToken":"refresh-new"}"#);
		})
		.await;
	let handles = (0..5)
		.map(|_| {
			let gateway = gateway.clone();

			tokio::spawn(async move { gateway.send(ApiRequest::get("/api/articles")).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let response = handle
			.await
			.expect("Request task should not panic.")
			.expect("Every request should succeed after the shared refresh.");

		assert_eq!(response.status, 200);
	}

	refresh.assert_calls_async(1).await;
	stale.assert_calls_async(5).await;
	fresh.assert_calls_async(5).await;

	assert_eq!(gateway.refresh_state(), RefreshState::Idle);
	assert_eq!(gateway.pending_retries(), 0);
	assert_eq!(gateway.refresh_metrics().attempts(), 1);

	let stored = store_view(&*store);

	assert_eq!(stored.access_token, TokenSecret::new("access-new"));
	assert_eq!(stored.refresh_token, Some(TokenSecret::new("refresh-new")));
}

#[tokio::test]
async fn repeated_401_forces_single_logout() {
	let server = MockServer::start_async().await;
	let (gateway, _session, store) = build_reqwest_test_session(config(&server));
	let reasons = record_terminations(&gateway);

	seed(&*store);

	let protected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/profile");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"accessToken":"access-new"}"#);
		})
		.await;
	let err = gateway
		.send(ApiRequest::get("/api/profile"))
		.await
		.expect_err("A second 401 should fail the request.");

	assert!(matches!(err, Error::Unauthorized { .. }));

	protected.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;

	assert_eq!(*reasons.lock(), vec![RETRY_EXHAUSTED.to_owned()]);
	assert!(store.is_empty(), "Forced logout should clear stored credentials.");
}

#[tokio::test]
async fn refresh_failure_terminates_and_fails_waiters() {
	let server = MockServer::start_async().await;
	let (gateway, _session, store) = build_reqwest_test_session(config(&server));
	let reasons = record_terminations(&gateway);

	seed(&*store);

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/articles");
			then.status(401);
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401)
				.delay(std::time::Duration::from_millis(100))
				.body(r#"{"error":"invalid_grant"}"#);
		})
		.await;
	let (first, second) = tokio::join!(
		gateway.send(ApiRequest::get("/api/articles")),
		gateway.send(ApiRequest::get("/api/articles").with_query("page", "2")),
	);

	assert!(first.expect_err("First caller should fail.").is_unauthorized());
	assert!(second.expect_err("Second caller should fail.").is_unauthorized());

	refresh.assert_calls_async(1).await;

	assert!(!reasons.lock().is_empty());
	assert!(store.is_empty());
}

#[tokio::test]
async fn exempt_paths_never_carry_credentials() {
	let server = MockServer::start_async().await;
	let (gateway, _session, store) = build_reqwest_test_session(config(&server));

	seed(&*store);

	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login").header_missing("authorization");
			then.status(401).body(r#"{"message":"Invalid email or password"}"#);
		})
		.await;
	let status = server
		.mock_async(|when, then| {
			when.method(GET).path("/public/status/").header_missing("authorization");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).body(r#"{"accessToken":"never"}"#);
		})
		.await;
	let response = gateway
		.send(ApiRequest::post("/auth/login").with_body(r#"{"email":"a@b.c"}"#))
		.await
		.expect("Exempt 401 should be returned unmodified.");

	assert_eq!(response.status, 401);
	assert_eq!(response.error_message().as_deref(), Some("Invalid email or password"));

	let response = gateway
		.send(ApiRequest::get("/public/status/"))
		.await
		.expect("Exempt 401 should be returned unmodified.");

	assert_eq!(response.status, 401);

	login.assert_async().await;
	status.assert_async().await;
	refresh.assert_calls_async(0).await;

	assert_eq!(store_view(&*store).access_token, TokenSecret::new("access-old"));
}

#[tokio::test]
async fn non_401_errors_pass_through() {
	let server = MockServer::start_async().await;
	let (gateway, _session, store) = build_reqwest_test_session(config(&server));

	seed(&*store);

	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/articles").header("authorization", "Bearer access-old");
			then.status(503).body(r#"{"message":"maintenance"}"#);
		})
		.await;
	let response = gateway
		.send(ApiRequest::get("/api/articles"))
		.await
		.expect("Non-401 statuses should resolve as responses.");

	assert_eq!(response.status, 503);

	mock.assert_async().await;

	assert_eq!(gateway.refresh_metrics().attempts(), 0);
}

#[tokio::test]
async fn unreachable_host_surfaces_network_error() {
	let config = GatewayConfig::builder(
		Url::parse("http://127.0.0.1:9").expect("Discard-port URL should parse successfully."),
	)
	.build()
	.expect("Gateway config should build successfully.");
	let (gateway, _session, store) = build_reqwest_test_session(config);

	seed(&*store);

	let err = gateway
		.send(ApiRequest::get("/api/articles"))
		.await
		.expect_err("Connection failures should surface.");

	assert!(matches!(err, Error::Network(_)));
	assert!(!store.is_empty(), "Network failures should not end the session.");
}

fn store_view(store: &dyn CredentialStore) -> Credentials {
	store
		.credentials()
		.expect("Credential lookup should succeed.")
		.expect("Credentials should be present.")
}
