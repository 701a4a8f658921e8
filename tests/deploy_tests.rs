//! 部署客户端测试
//! 使用 wiremock 模拟运行时管理服务

use hopchain::{
    config::DeploySettings, ChainError, Compiler, DeployClient, RetryPolicy, RuntimeConfig,
};
use serde_json::json;
use std::time::Duration;
use tokio::test;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod test_utils;
use test_utils::{create_mock_server, deploy_settings, pool_of, selector_scenario};

fn fast_client(settings: &DeploySettings) -> DeployClient {
    let policy = RetryPolicy::new(settings.max_attempts as usize)
        .with_initial_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20));
    DeployClient::with_retry_policy(settings, policy).unwrap()
}

#[test]
async fn test_save_config_success() {
    let server = create_mock_server(json!({
        "status": "success",
        "message": "Config saved",
        "detail": "configuration ok\r\n\r\n  1 warning  \n"
    }))
    .await;

    let client = DeployClient::new(&deploy_settings(&server, 1)).unwrap();
    let response = client.save_config(&RuntimeConfig::default_config()).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.message.as_deref(), Some("Config saved"));
}

#[test]
async fn test_save_config_posts_config_json() {
    let config = hopchain::compile(&selector_scenario()).unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/save_config"))
        .and(body_json(serde_json::to_value(&config).unwrap()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = DeployClient::new(&deploy_settings(&server, 1)).unwrap();
    client.save_config(&config).await.unwrap();
}

#[test]
async fn test_save_config_rejected() {
    let server = create_mock_server(json!({
        "status": "error",
        "message": "Invalid JSON: expected value at line 1 column 1",
        "detail": "FATAL decode config\nline 2"
    }))
    .await;

    let client = DeployClient::new(&deploy_settings(&server, 3)).unwrap();
    let err = client
        .save_config(&RuntimeConfig::default_config())
        .await
        .unwrap_err();

    match err {
        ChainError::Deploy(message) => {
            assert_eq!(message, "Invalid JSON: expected value at line 1 column 1")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
async fn test_save_config_rejected_without_message() {
    let server = create_mock_server(json!({"status": "error"})).await;

    let client = DeployClient::new(&deploy_settings(&server, 1)).unwrap();
    let err = client
        .save_config(&RuntimeConfig::default_config())
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::Deploy(ref message) if message == "Config save failed"));
    assert!(!err.is_retryable());
}

#[test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/save_config"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = fast_client(&deploy_settings(&server, 3));
    let err = client
        .save_config(&RuntimeConfig::default_config())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Network(_)));
}

#[test]
async fn test_unreachable_server() {
    let settings = DeploySettings {
        base_url: "http://127.0.0.1:9/api".to_string(),
        timeout_secs: 2,
        max_attempts: 1,
    };
    let client = DeployClient::new(&settings).unwrap();
    let err = client
        .save_config(&RuntimeConfig::default_config())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[test]
async fn test_deploy_if_changed_skips_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/save_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(3)
        .mount(&server)
        .await;

    let mut client = DeployClient::new(&deploy_settings(&server, 1)).unwrap();
    let config = RuntimeConfig::default_config();

    assert!(client.deploy_if_changed(&config, false).await.unwrap());
    assert!(!client.deploy_if_changed(&config, false).await.unwrap());
    assert!(client.deploy_if_changed(&config, true).await.unwrap());

    let mut changed = config.clone();
    changed.log.level = "debug".to_string();
    assert!(client.deploy_if_changed(&changed, false).await.unwrap());
}

#[test]
async fn test_failed_deploy_is_not_remembered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/save_config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "error", "message": "sing-box check failed"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/save_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .mount(&server)
        .await;

    let mut client = DeployClient::new(&deploy_settings(&server, 1)).unwrap();
    let config = RuntimeConfig::default_config();

    assert!(client.deploy_if_changed(&config, false).await.is_err());
    assert!(client.deploy_if_changed(&config, false).await.unwrap());
    assert!(!client.deploy_if_changed(&config, false).await.unwrap());
}

#[test]
async fn test_compile_error_skips_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = DeployClient::new(&deploy_settings(&server, 1)).unwrap();
    let err = client
        .compile_and_deploy(&Compiler::default(), &pool_of(1), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Compile(_)));
    assert_eq!(err.code(), "RR_POOL_SIZE");
}

#[test]
async fn test_compile_and_deploy() {
    let server = create_mock_server(json!({"status": "success"})).await;

    let mut client = DeployClient::new(&deploy_settings(&server, 1)).unwrap();
    let compiler = Compiler::default();
    assert!(client
        .compile_and_deploy(&compiler, &pool_of(4), false)
        .await
        .unwrap());
    assert!(!client
        .compile_and_deploy(&compiler, &pool_of(4), false)
        .await
        .unwrap());
}
