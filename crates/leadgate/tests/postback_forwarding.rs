use std::time::Duration;

use leadgate::config::PostbackConfig;
use leadgate::workflows::admission::{
    HttpPostbackForwarder, PostbackGateway, PostbackOutcome, PostbackSetupError,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn postback_config(endpoint: Option<String>) -> PostbackConfig {
    PostbackConfig {
        endpoint,
        timeout: Duration::from_secs(2),
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
    }
}

async fn forwarder_for(server: &MockServer) -> HttpPostbackForwarder {
    let endpoint = format!("{}/postback?offer=42&clickid=stale", server.uri());
    HttpPostbackForwarder::new(&postback_config(Some(endpoint))).expect("valid endpoint")
}

#[tokio::test]
async fn delivers_click_id_as_query_parameter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/postback"))
        .and(query_param("clickid", "C-123"))
        .and(query_param("offer", "42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = forwarder_for(&server).await.forward("C-123").await;

    assert_eq!(
        outcome,
        PostbackOutcome::Delivered {
            status: 200,
            attempts: 1
        }
    );
}

#[tokio::test]
async fn server_errors_are_retried_until_the_policy_is_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/postback"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let outcome = forwarder_for(&server).await.forward("C-1").await;

    assert_eq!(
        outcome,
        PostbackOutcome::Failed {
            detail: "postback returned HTTP 503".to_string(),
            attempts: 3
        }
    );
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/postback"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/postback"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let outcome = forwarder_for(&server).await.forward("C-2").await;

    assert_eq!(
        outcome,
        PostbackOutcome::Delivered {
            status: 204,
            attempts: 2
        }
    );
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/postback"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = forwarder_for(&server).await.forward("C-3").await;

    assert_eq!(
        outcome,
        PostbackOutcome::Failed {
            detail: "postback returned HTTP 404".to_string(),
            attempts: 1
        }
    );
}

#[tokio::test]
async fn slow_partner_counts_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/postback"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let config = PostbackConfig {
        endpoint: Some(format!("{}/postback", server.uri())),
        timeout: Duration::from_millis(50),
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
    };
    let forwarder = HttpPostbackForwarder::new(&config).expect("valid endpoint");

    let outcome = forwarder.forward("C-4").await;

    assert_eq!(
        outcome,
        PostbackOutcome::Failed {
            detail: "postback timed out".to_string(),
            attempts: 2
        }
    );
}

#[tokio::test]
async fn missing_endpoint_means_no_postback_is_required() {
    let forwarder = HttpPostbackForwarder::new(&postback_config(None)).expect("client builds");

    let outcome = forwarder.forward("C-5").await;

    assert_eq!(outcome, PostbackOutcome::NotRequired);
    assert!(outcome.is_success());
}

#[test]
fn malformed_endpoint_is_rejected_at_startup() {
    let result = HttpPostbackForwarder::new(&postback_config(Some("not a url".to_string())));

    assert!(matches!(
        result,
        Err(PostbackSetupError::InvalidEndpoint { ref endpoint, .. }) if endpoint == "not a url"
    ));
}
