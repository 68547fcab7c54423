use fieldsync_transfer::{
    Credentials, DEFAULT_MAX_PAYLOAD_BYTES, HttpClient, HttpConfig, HttpRequest, HttpResponse,
    PullOptions, PushOptions, RemoteClient, RemoteServer, ReqwestHttpClient, TransferError,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Config defaults ─────────────────────────────────────────────

#[test]
fn http_config_default() {
    let cfg = HttpConfig::default();
    assert_eq!(cfg.timeout_secs, 60);
    assert_eq!(cfg.connect_timeout_secs, 10);
    assert_eq!(cfg.max_connections, 8);
    assert!(cfg.user_agent.starts_with("fieldsync/"));
}

#[test]
fn http_config_serde_fills_missing_fields() {
    let cfg: HttpConfig = serde_json::from_str(r#"{"max_connections": 2}"#).unwrap();
    assert_eq!(cfg.max_connections, 2);
    assert_eq!(cfg.timeout_secs, 60);
}

#[test]
fn max_connections_is_at_least_one() {
    assert_eq!(HttpConfig::default().with_max_connections(0).max_connections, 1);
}

#[test]
fn pull_and_push_option_defaults() {
    let pull = PullOptions::default();
    assert!(!pull.include_incomplete);
    assert_eq!(pull.max_entries_per_batch, 100);
    assert!(pull.resume_from.is_none());

    let push = PushOptions::default();
    assert!(!push.force_send_form);
    assert_eq!(push.max_payload_bytes, DEFAULT_MAX_PAYLOAD_BYTES);
    assert_eq!(DEFAULT_MAX_PAYLOAD_BYTES, 10 * 1024 * 1024);
}

// ── Response classification ─────────────────────────────────────

fn response(status: u16) -> HttpResponse {
    HttpResponse::new("http://server/x", status, b"body".to_vec())
}

#[test]
fn success_passes_through() {
    assert_eq!(response(201).into_success().unwrap().text(), "body");
}

#[test]
fn redirect_carries_location() {
    let mut redirect = response(302);
    redirect.location = Some("https://server/x".to_string());
    assert!(matches!(
        redirect.into_success(),
        Err(TransferError::Redirect { status: 302, location }) if location == "https://server/x"
    ));
}

#[test]
fn unauthorized_and_forbidden_are_auth_errors() {
    for status in [401, 403] {
        assert!(matches!(
            response(status).into_success(),
            Err(TransferError::Unauthorized { .. })
        ));
    }
}

#[test]
fn not_found_and_conflict_are_distinct() {
    assert!(matches!(response(404).into_error(), TransferError::NotFound(_)));
    let conflict = response(409).into_error();
    assert!(conflict.is_conflict());
}

#[test]
fn other_statuses_keep_the_body() {
    match response(500).into_error() {
        TransferError::Http { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "body");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn invalid_json_is_a_protocol_error() {
    assert!(matches!(
        response(200).json::<serde_json::Value>(),
        Err(TransferError::Protocol(_))
    ));
}

// ── Requests ────────────────────────────────────────────────────

#[test]
fn query_pairs_stay_separate_from_the_url() {
    let request = HttpRequest::get("http://server/view/submissionList")
        .with_query(&[("formId", "a b")])
        .with_query(&[("cursor", "<c/>")]);
    assert_eq!(request.url, "http://server/view/submissionList");
    assert_eq!(
        request.query,
        vec![
            ("formId".to_string(), "a b".to_string()),
            ("cursor".to_string(), "<c/>".to_string()),
        ]
    );
}

#[tokio::test]
async fn reqwest_client_encodes_query_values() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/formXml"))
        .and(query_param("existing", "1"))
        .and(query_param("formId", "a b&c"))
        .and(query_param("cursor", "<c/>"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReqwestHttpClient::new(HttpConfig::default()).unwrap();
    let response = client
        .execute(
            HttpRequest::get(format!("{}/formXml?existing=1", server.uri()))
                .with_query(&[("formId", "a b&c"), ("cursor", "<c/>")]),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 200);
}

#[test]
fn credentials_debug_hides_secrets() {
    let basic = format!("{:?}", Credentials::basic("me", "hunter2"));
    assert!(basic.contains("me"));
    assert!(!basic.contains("hunter2"));
    assert!(!format!("{:?}", Credentials::Bearer("tok".into())).contains("tok"));
}

#[tokio::test]
async fn reqwest_client_sends_openrosa_header_and_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/formList"))
        .and(query_param("verbose", "true"))
        .and(header("X-OpenRosa-Version", "1.0"))
        .and(header("authorization", "Basic bWU6c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReqwestHttpClient::new(HttpConfig::default()).unwrap();
    let response = client
        .execute(
            HttpRequest::get(format!("{}/formList", server.uri()))
                .with_query(&[("verbose", "true")])
                .with_credentials(Some(Credentials::basic("me", "secret"))),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn reqwest_client_does_not_follow_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "https://elsewhere/"))
        .mount(&server)
        .await;

    let client = ReqwestHttpClient::new(HttpConfig::default()).unwrap();
    let response = client
        .execute(HttpRequest::get(format!("{}/old", server.uri())))
        .await
        .unwrap();
    assert!(response.is_redirect());
    assert_eq!(response.location.as_deref(), Some("https://elsewhere/"));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let client = ReqwestHttpClient::new(HttpConfig::default().with_timeout_secs(2)).unwrap();
    let result = client
        .execute(HttpRequest::get("http://127.0.0.1:9/formList"))
        .await;
    assert!(matches!(result, Err(TransferError::Network(_))));
}

// ── Server descriptors ──────────────────────────────────────────

#[test]
fn server_urls_lose_trailing_slash() {
    let server = RemoteServer::aggregate("https://agg.example.org/ ", None);
    assert_eq!(server.base_url(), "https://agg.example.org");
    assert!(!server.is_central());
}

#[test]
fn invalid_url_is_rejected_before_any_request() {
    let http = Arc::new(ReqwestHttpClient::new(HttpConfig::default()).unwrap());
    let result = RemoteClient::new(RemoteServer::aggregate("ftp://x", None), http);
    assert!(matches!(result, Err(TransferError::Config(_))));
}

#[test]
fn central_requires_credentials() {
    let server = RemoteServer::central("https://c.example.org", 1, Credentials::basic("", ""));
    assert!(matches!(server.validate(), Err(TransferError::Config(_))));
    let server = RemoteServer::central("https://c.example.org", 1, Credentials::basic("me", "pw"));
    assert!(server.validate().is_ok());
    assert_eq!(server.to_string(), "central https://c.example.org project 1");
}
