//! HTTP transport against a fake API server.

use std::time::Duration;

use orp_cloudfront::{CloudFrontConfig, HttpPolicyApi, PolicyBody};
use orp_core::api::PolicyApi;
use orp_core::remote::{RemotePolicy, to_remote};
use orp_core::{
    CancellationToken, ETag, Forwarding, PlanAction, PolicyConfig, PolicyError, PolicyId,
    Reconciler,
};
use orp_testkit::fixtures::{fast_config, narrowed_draft, whitelist_draft};
use orp_testkit::init_test_tracing;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "/2020-05-31/origin-request-policy";

fn client(server: &MockServer) -> HttpPolicyApi {
    init_test_tracing();
    let config = CloudFrontConfig::with_endpoint(format!("{}/2020-05-31", server.uri()));
    HttpPolicyApi::new(&config).expect("client")
}

fn sample() -> PolicyConfig {
    PolicyConfig::new("p1")
        .with_comment("test comment")
        .with_cookies(Forwarding::whitelist(["test"]))
        .with_headers(Forwarding::whitelist(["test"]))
        .with_query_strings(Forwarding::whitelist(["test"]))
}

fn policy_body(id: &str, config: &PolicyConfig) -> Value {
    serde_json::to_value(PolicyBody {
        policy: RemotePolicy {
            id: PolicyId::new(id),
            last_modified_time: None,
            config: to_remote(config),
        },
    })
    .expect("encode")
}

fn policy_response(status: u16, id: &str, etag: &str, config: &PolicyConfig) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("ETag", etag)
        .set_body_json(policy_body(id, config))
}

fn error_response(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "Error": { "Code": code, "Message": message }
    }))
}

#[tokio::test]
async fn create_posts_wire_config_and_returns_id_and_etag() {
    let server = MockServer::start().await;
    let expected_body = json!({
        "OriginRequestPolicyConfig": {
            "Name": "p1",
            "Comment": "test comment",
            "CookiesConfig": {
                "CookieBehavior": "whitelist",
                "Cookies": { "Quantity": 1, "Items": ["test"] }
            },
            "HeadersConfig": {
                "HeaderBehavior": "whitelist",
                "Headers": { "Quantity": 1, "Items": ["test"] }
            },
            "QueryStringsConfig": {
                "QueryStringBehavior": "whitelist",
                "QueryStrings": { "Quantity": 1, "Items": ["test"] }
            }
        }
    });
    Mock::given(method("POST"))
        .and(path(ROOT))
        .and(body_json(expected_body))
        .respond_with(policy_response(201, "abc", "E1", &sample()))
        .expect(1)
        .mount(&server)
        .await;

    let (id, etag) = client(&server)
        .create_policy(&to_remote(&sample()))
        .await
        .expect("create");
    assert_eq!(id, PolicyId::new("abc"));
    assert_eq!(etag, ETag::new("E1"));
}

#[tokio::test]
async fn get_reads_policy_and_etag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/abc")))
        .respond_with(policy_response(200, "abc", "E7", &sample()))
        .mount(&server)
        .await;

    let envelope = client(&server)
        .get_policy(&PolicyId::new("abc"))
        .await
        .expect("get");
    assert_eq!(envelope.etag, ETag::new("E7"));
    let stored = envelope.into_stored().expect("decode");
    assert_eq!(stored.config, sample());
}

#[tokio::test]
async fn missing_policy_classifies_as_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/gone")))
        .respond_with(error_response(
            404,
            "NoSuchOriginRequestPolicy",
            "The origin request policy does not exist.",
        ))
        .mount(&server)
        .await;

    let id = PolicyId::new("gone");
    let err = client(&server).get_policy(&id).await.expect_err("missing");
    assert_eq!(err.status, Some(404));
    assert_eq!(err.code.as_deref(), Some("NoSuchOriginRequestPolicy"));
    assert_eq!(err.message, "The origin request policy does not exist.");
    assert!(PolicyError::from_api(Some(&id), err).is_not_found());
}

#[tokio::test]
async fn update_sends_if_match_and_returns_new_etag() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{ROOT}/abc")))
        .and(header("If-Match", "E1"))
        .respond_with(policy_response(200, "abc", "E2", &sample()))
        .expect(1)
        .mount(&server)
        .await;

    let etag = client(&server)
        .update_policy(&PolicyId::new("abc"), &ETag::new("E1"), &to_remote(&sample()))
        .await
        .expect("update");
    assert_eq!(etag, ETag::new("E2"));
}

#[tokio::test]
async fn stale_etag_classifies_as_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{ROOT}/abc")))
        .respond_with(error_response(
            412,
            "PreconditionFailed",
            "The If-Match version is missing or not valid.",
        ))
        .mount(&server)
        .await;

    let id = PolicyId::new("abc");
    let err = client(&server)
        .delete_policy(&id, &ETag::new("E0"))
        .await
        .expect_err("stale");
    assert!(matches!(
        PolicyError::from_api(Some(&id), err),
        PolicyError::Conflict { .. }
    ));
}

#[tokio::test]
async fn delete_sends_if_match() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{ROOT}/abc")))
        .and(header("If-Match", "E3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .delete_policy(&PolicyId::new("abc"), &ETag::new("E3"))
        .await
        .expect("delete");
}

#[tokio::test]
async fn throttling_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            error_response(429, "Throttling", "Rate exceeded").insert_header("Retry-After", "7"),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .get_policy(&PolicyId::new("abc"))
        .await
        .expect_err("throttled");
    assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    let classified = PolicyError::from_api(None, err);
    assert!(classified.is_retryable());
    assert_eq!(classified.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn plain_text_error_body_becomes_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_policy(&PolicyId::new("abc"))
        .await
        .expect_err("unavailable");
    assert_eq!(err.status, Some(503));
    assert_eq!(err.code, None);
    assert_eq!(err.message, "upstream unavailable");
}

#[tokio::test]
async fn success_without_etag_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(policy_body("abc", &sample())))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_policy(&PolicyId::new("abc"))
        .await
        .expect_err("no etag");
    assert_eq!(err.code.as_deref(), Some("MissingETag"));
    assert!(matches!(
        PolicyError::from_api(None, err),
        PolicyError::Fatal { .. }
    ));
}

#[tokio::test]
async fn undecodable_body_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "E1")
                .set_body_string("<xml/>"),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .get_policy(&PolicyId::new("abc"))
        .await
        .expect_err("bad body");
    assert_eq!(err.code.as_deref(), Some("MalformedResponse"));
    assert!(!PolicyError::from_api(None, err).is_retryable());
}

#[tokio::test]
async fn refused_connection_is_transient() {
    let server = MockServer::start().await;
    let api = client(&server);
    drop(server);

    let err = api
        .get_policy(&PolicyId::new("abc"))
        .await
        .expect_err("refused");
    assert_eq!(err.status, None);
    assert!(PolicyError::from_api(None, err).is_retryable());
}

#[tokio::test]
async fn reconciler_creates_updates_and_destroys_over_http() {
    let server = MockServer::start().await;
    let created = sample();
    let narrowed = Reconciler::new(client(&server))
        .validate(&narrowed_draft("p1"))
        .expect("valid");

    Mock::given(method("POST"))
        .and(path(ROOT))
        .respond_with(policy_response(201, "abc", "E1", &created))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{ROOT}/abc")))
        .and(header("If-Match", "E1"))
        .respond_with(policy_response(200, "abc", "E2", &narrowed))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{ROOT}/abc")))
        .and(header("If-Match", "E1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    // create read-back, update plan read, update read-back, destroy plan read
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/abc")))
        .respond_with(policy_response(200, "abc", "E1", &created))
        .up_to_n_times(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/abc")))
        .respond_with(error_response(404, "NoSuchOriginRequestPolicy", "gone"))
        .mount(&server)
        .await;

    let reconciler = Reconciler::with_config(client(&server), fast_config());
    let cancel = CancellationToken::new();

    let outcome = reconciler
        .converge(&whitelist_draft("p1"), None, &cancel)
        .await
        .expect("create");
    assert_eq!(outcome.action, PlanAction::Create);
    let id = outcome.policy.expect("stored").id;
    assert_eq!(id, PolicyId::new("abc"));

    let outcome = reconciler
        .converge(&narrowed_draft("p1"), Some(&id), &cancel)
        .await
        .expect("update");
    assert_eq!(outcome.action, PlanAction::Update);

    let outcome = reconciler.destroy(&id, &cancel).await.expect("destroy");
    assert_eq!(outcome.action, PlanAction::Delete);
}
