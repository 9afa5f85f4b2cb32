//! Startup and shutdown of the wired application against a mocked Web API.

use std::time::Duration;

use relay_cli::{RelayConfig, run, run_with_shutdown};
use relay_slack::SlackConfig;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

fn config(server: &MockServer) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.gateway.api_base_url = server.uri();
    config.gateway.reconnect_initial_ms = 10;
    config.gateway.reconnect_max_ms = 50;
    config
}

fn slack() -> SlackConfig {
    SlackConfig::new("xoxb-bot", "xapp-app")
}

#[tokio::test]
async fn test_rejected_credentials_stop_the_relay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "ok": false, "error": "invalid_auth" })),
        )
        .mount(&server)
        .await;

    let result = tokio::time::timeout(WAIT, run(config(&server), slack()))
        .await
        .unwrap();

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("invalid_auth"));
}

#[tokio::test]
async fn test_shutdown_while_slack_is_unavailable_is_clean() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "user_id": "UBOT",
            "team": "Acme"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/apps.connections.open"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let relay = tokio::spawn(run_with_shutdown(config(&server), slack(), async move {
        let _ = stop_rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(WAIT, relay).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_unparsable_agent_command_is_rejected() {
    let server = MockServer::start().await;
    let mut config = config(&server);
    config.agent.command = "runner 'unterminated".to_string();

    let result = run_with_shutdown(config, slack(), std::future::pending()).await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("Invalid agent command"));
}
