use std::time::Duration;

use rest_core::{ApiResult, Client, ClientConfig, ErrorKind, RequestOptions};
use serde::{Deserialize, Serialize};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, Serialize, PartialEq)]
struct User {
    id: u64,
    name: String,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_client_fast_retry(base: &str) -> Client {
    let config = ClientConfig::new()
        .with_base_url(base)
        .with_bearer_token("test-token")
        .with_max_retries(2)
        .with_timeout(Duration::from_secs(5))
        .with_backoff(Duration::from_millis(10), Duration::from_millis(50));
    Client::with_config(config)
}

#[tokio::test]
async fn get_decodes_json() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/1"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("x-trace", "abc"))
        .and(query_param("expand", "profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1,
            "name": "Ada"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client_fast_retry(&server.uri());
    let result: ApiResult<User> = client
        .get(
            "/users/1",
            RequestOptions::new()
                .with_query("expand", "profile")
                .with_header("X-Trace", "abc"),
        )
        .await;

    assert_eq!(
        result.into_value(),
        Some(User {
            id: 1,
            name: "Ada".into()
        })
    );
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"id": 7, "name": "Grace"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 7,
            "name": "Grace"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client_fast_retry(&server.uri());
    let user = User {
        id: 7,
        name: "Grace".into(),
    };
    let created = client
        .post::<User>("/users", RequestOptions::new().with_json(&user))
        .await
        .into_result()
        .unwrap();
    assert_eq!(created, user);
}

#[tokio::test]
async fn put_and_patch_use_their_verbs() {
    let server = MockServer::start().await;

    for verb in ["PUT", "PATCH"] {
        Mock::given(method(verb))
            .and(path("/users/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "name": "Ada"
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = test_client_fast_retry(&server.uri());
    let body = serde_json::json!({"name": "Ada"});
    let put: ApiResult<User> = client
        .put("/users/1", RequestOptions::new().with_json(&body))
        .await;
    let patch: ApiResult<User> = client
        .patch("/users/1", RequestOptions::new().with_json(&body))
        .await;
    assert!(put.is_ok());
    assert!(patch.is_ok());
}

#[tokio::test]
async fn delete_with_no_content() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client_fast_retry(&server.uri());
    let result: ApiResult<()> = client.delete("/users/1", RequestOptions::new()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn retry_429_then_success() {
    init_tracing();
    let server = MockServer::start().await;

    // First request returns 429, second returns success
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after-ms", "20")
                .set_body_json(serde_json::json!({"message": "Rate limit exceeded"})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1,
            "name": "Ada"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client_fast_retry(&server.uri());
    let result: ApiResult<User> = client.get("/users/1", RequestOptions::new()).await;
    assert_eq!(result.value().map(|u| u.id), Some(1));
}

#[tokio::test]
async fn persistent_500_exhausts_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client_fast_retry(&server.uri());
    let error = client
        .get::<User>("/users/1", RequestOptions::new())
        .await
        .into_error()
        .unwrap();

    assert_eq!(error.kind(), ErrorKind::ServerError);
    assert_eq!(error.status(), Some(500));
    assert_eq!(error.attempts(), 3);
    assert_eq!(error.message(), "HTTP 500: Internal Server Error");
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"message": "user not found"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client_fast_retry(&server.uri());
    let error = client
        .get::<User>("/users/404", RequestOptions::new())
        .await
        .into_error()
        .unwrap();
    assert_eq!(error.kind(), ErrorKind::ClientError);
    assert_eq!(error.message(), "HTTP 404: user not found");
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id": "one"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client_fast_retry(&server.uri());
    let result: ApiResult<User> = client.get("/users/1", RequestOptions::new()).await;
    assert_eq!(result.kind(), Some(ErrorKind::DecodeError));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = test_client_fast_retry(&server.uri());
    let error = client
        .get::<()>(
            "/slow",
            RequestOptions::new()
                .with_timeout(Duration::from_millis(50))
                .with_max_retries(1),
        )
        .await
        .into_error()
        .unwrap();
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert_eq!(error.attempts(), 2);
}

#[tokio::test]
async fn refused_connection_is_network_unreachable() {
    let client = test_client_fast_retry("http://127.0.0.1:1");
    let error = client
        .get::<()>("/users/1", RequestOptions::new())
        .await
        .into_error()
        .unwrap();
    assert_eq!(error.kind(), ErrorKind::NetworkUnreachable);
    assert_eq!(error.attempts(), 3);
}
