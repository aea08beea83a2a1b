#![allow(clippy::unwrap_used)]
// Integration tests for registry + dispatcher using wiremock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use optwire_api::{
    ApiDescriptor, ApiFlavor, ApiRegistry, Error, RequestOptions, ResolutionState, TokenExchange,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ApiRegistry) {
    let server = MockServer::start().await;
    let registry = ApiRegistry::default();
    let root = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    registry.register("main", ApiDescriptor::new(root));
    (server, registry)
}

async fn mount_directory(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users_url": format!("{}/users", server.uri()),
            "groups": "groups",
            "version": 2
        })))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_users(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": [{"id": 1, "name": "Ann"}], "total": 1})),
        )
        .mount(server)
        .await;
}

// ── Directory resolution ────────────────────────────────────────────

#[tokio::test]
async fn test_directory_fetched_once_and_cached() {
    let (server, registry) = setup().await;
    mount_directory(&server, 1).await;
    mount_users(&server).await;

    let api = registry.get("main", None).unwrap();
    assert_eq!(api.client().resolution_state(), ResolutionState::Unresolved);

    let first = api.get(RequestOptions::target("users"), None).await.unwrap();
    assert_eq!(first.data["total"], 1);
    assert_eq!(api.client().resolution_state(), ResolutionState::Resolved);

    // A second handle for the same name shares the client and its cache.
    let again = registry.get("main", None).unwrap();
    assert!(Arc::ptr_eq(api.client(), again.client()));
    again
        .get(RequestOptions::target("users_url"), None)
        .await
        .unwrap();

    assert_eq!(
        api.client().resolved_url("groups").unwrap().as_str(),
        format!("{}/api/groups", server.uri())
    );
}

#[tokio::test]
async fn test_concurrent_calls_share_one_directory_fetch() {
    let (server, registry) = setup().await;
    mount_directory(&server, 1).await;
    mount_users(&server).await;

    let api = registry.get("main", None).unwrap();
    let (a, b, c) = tokio::join!(
        api.get(RequestOptions::target("users"), None).into_future(),
        api.get(RequestOptions::target("users"), None).into_future(),
        api.get(RequestOptions::target("users"), None).into_future(),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
}

#[tokio::test]
async fn test_failed_directory_fetch_is_retried() {
    let (server, registry) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_directory(&server, 1).await;
    mount_users(&server).await;

    let api = registry.get("main", None).unwrap();
    let result = api.get(RequestOptions::target("users"), None).await;
    assert!(
        matches!(result, Err(Error::DirectoryFetch { .. })),
        "expected DirectoryFetch error, got: {result:?}"
    );
    assert_eq!(api.client().resolution_state(), ResolutionState::Unresolved);

    api.get(RequestOptions::target("users"), None).await.unwrap();
    assert_eq!(api.client().resolution_state(), ResolutionState::Resolved);
}

#[tokio::test]
async fn test_plain_text_directory_is_not_cached() {
    let (server, registry) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_directory(&server, 1).await;
    mount_users(&server).await;

    let api = registry.get("main", None).unwrap();
    let result = api.get(RequestOptions::target("users"), None).await;
    match result {
        Err(err @ Error::DirectoryFetch { .. }) => assert!(err.is_transient()),
        other => panic!("expected DirectoryFetch error, got: {other:?}"),
    }
    assert_eq!(api.client().resolution_state(), ResolutionState::Unresolved);
    assert!(api.client().resolved_url("message").is_none());

    let reply = api.get(RequestOptions::target("users"), None).await.unwrap();
    assert_eq!(reply.data["total"], 1);
    assert_eq!(api.client().resolution_state(), ResolutionState::Resolved);
}

#[tokio::test]
async fn test_unknown_target_is_no_base_url() {
    let (server, registry) = setup().await;
    mount_directory(&server, 1).await;

    let api = registry.get("main", None).unwrap();
    let result = api.get(RequestOptions::target("invoices"), None).await;
    assert!(
        matches!(result, Err(Error::NoBaseUrl { ref target, .. }) if target == "invoices"),
        "expected NoBaseUrl error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_untargeted_call_goes_to_root_without_directory() {
    let (server, registry) = setup().await;
    mount_directory(&server, 1).await;

    let api = registry.get("main", None).unwrap();
    let response = api.get(RequestOptions::default(), None).await.unwrap();
    assert_eq!(response.data["version"], 2);
    assert_eq!(api.client().resolution_state(), ResolutionState::Unresolved);
}

// ── Request shaping ─────────────────────────────────────────────────

#[tokio::test]
async fn test_read_params_travel_as_query() {
    let (server, registry) = setup().await;
    mount_directory(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/users/search"))
        .and(query_param("limit", "25"))
        .and(query_param("offset", "0"))
        .and(query_param("name", "an"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
        .expect(1)
        .mount(&server)
        .await;

    let api = registry
        .get("main", Some(RequestOptions::target("users")))
        .unwrap();
    api.get(
        RequestOptions::default().with_path("search"),
        Some(json!({"limit": 25, "offset": 0, "name": "an"})),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_save_posts_to_id_path() {
    let (server, registry) = setup().await;
    mount_directory(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/users/42"))
        .and(body_json(json!({"id": 42, "name": "Bo"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("saved"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 43})))
        .expect(1)
        .mount(&server)
        .await;

    let api = registry
        .get("main", Some(RequestOptions::target("users")))
        .unwrap();
    let updated = api
        .save(RequestOptions::default(), json!({"id": 42, "name": "Bo"}))
        .await
        .unwrap();
    assert_eq!(updated.data, json!({"message": "saved"}));

    let created = api
        .save(RequestOptions::default(), json!({"name": "Cy"}))
        .await
        .unwrap();
    assert_eq!(created.data["id"], 43);
}

#[tokio::test]
async fn test_static_json_flavor_appends_suffix() {
    let server = MockServer::start().await;
    let registry = ApiRegistry::default();
    let root = Url::parse(&format!("{}/content", server.uri())).unwrap();
    registry.register(
        "static",
        ApiDescriptor::new(root).with_flavor(ApiFlavor::StaticJson),
    );

    Mock::given(method("GET"))
        .and(path("/content/pages/home.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "Home"})))
        .expect(1)
        .mount(&server)
        .await;

    let api = registry.get("static", None).unwrap();
    let page = api
        .get(RequestOptions::default().with_path("pages/home"), None)
        .await
        .unwrap();
    assert_eq!(page.data["title"], "Home");
}

// ── Outcome normalization ───────────────────────────────────────────

#[tokio::test]
async fn test_error_flag_on_200_fires_error_continuation() {
    let (server, registry) = setup().await;
    mount_directory(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"error": true, "message": "bad filter"})),
        )
        .mount(&server)
        .await;

    let successes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let (s, e) = (Arc::clone(&successes), Arc::clone(&errors));

    let api = registry.get("main", None).unwrap();
    let result = api
        .get(RequestOptions::target("users"), None)
        .success(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .error(move |err| {
            assert_eq!(err.status(), Some(200));
            e.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    assert!(matches!(result, Err(Error::Application { ref message, .. }) if message == "bad filter"));
    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_string_error_body_is_coerced() {
    let (server, registry) = setup().await;
    mount_directory(&server, 1).await;

    Mock::given(method("DELETE"))
        .and(path("/users/7"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let api = registry.get("main", None).unwrap();
    let err = api
        .delete(RequestOptions::target("users").with_path("7"), None)
        .await
        .unwrap_err();

    let response = err.response().unwrap();
    assert_eq!(response.status, 403);
    assert_eq!(
        response.data,
        json!({"error": true, "message": "Forbidden"})
    );
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_token_exchange_runs_once() {
    let server = MockServer::start().await;
    let registry = ApiRegistry::default();
    let root = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    let token_url = Url::parse(&format!("{}/_token", server.uri())).unwrap();
    registry.register(
        "secure",
        ApiDescriptor::new(root).with_authenticator(Arc::new(TokenExchange::new(
            token_url,
            json!({"username": "ann", "password": "pw"}),
        ))),
    );

    Mock::given(method("POST"))
        .and(path("/_token"))
        .and(body_json(json!({"username": "ann", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", "Bearer t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&server)
        .await;

    let api = registry.get("secure", None).unwrap();
    api.get(RequestOptions::default(), None).await.unwrap();
    api.get(RequestOptions::default(), None).await.unwrap();
}

#[tokio::test]
async fn test_failed_token_exchange_fails_the_call() {
    let server = MockServer::start().await;
    let registry = ApiRegistry::default();
    let root = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    let token_url = Url::parse(&format!("{}/_token", server.uri())).unwrap();
    registry.register(
        "secure",
        ApiDescriptor::new(root)
            .with_authenticator(Arc::new(TokenExchange::new(token_url, json!({})))),
    );

    Mock::given(method("POST"))
        .and(path("/_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let api = registry.get("secure", None).unwrap();
    let result = api.get(RequestOptions::default(), None).await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}
