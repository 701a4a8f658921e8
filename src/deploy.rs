//! 部署客户端
//!
//! 把编译好的运行时配置提交给运行时管理服务（`POST {base}/save_config`）。
//! 服务端校验配置后返回 `{status, message, detail}`；`detail` 是多行校验输出。

use crate::compiler::Compiler;
use crate::config::DeploySettings;
use crate::error::{ChainError, Result};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::runtime::RuntimeConfig;
use crate::types::Topology;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const SAVE_CONFIG_PATH: &str = "save_config";
const DEFAULT_FAILURE_MESSAGE: &str = "Config save failed";

/// 服务端响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl SaveResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// 逐行输出校验详情，成功时为 info，失败时为 error
    fn log_detail(&self) {
        let Some(detail) = &self.detail else {
            return;
        };
        for line in detail.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if self.is_success() {
                log::info!("{}", line);
            } else {
                log::error!("{}", line);
            }
        }
    }
}

/// 运行时管理服务客户端
#[derive(Debug, Clone)]
pub struct DeployClient {
    /// HTTP 客户端
    client: Client,
    /// API 基础地址（以 `/` 结尾）
    base_url: Url,
    /// 重试执行器
    retry_executor: RetryExecutor,
    /// 最近一次成功部署的配置签名
    last_signature: Option<String>,
}

impl DeployClient {
    /// 按部署设置创建客户端
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use hopchain::config::DeploySettings;
    /// # use hopchain::deploy::DeployClient;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = DeployClient::new(&DeploySettings::default())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(settings: &DeploySettings) -> Result<Self> {
        let retry_policy = RetryPolicy::new(settings.max_attempts.max(1) as usize)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(10));
        Self::with_retry_policy(settings, retry_policy)
    }

    /// 创建带自定义重试策略的客户端
    pub fn with_retry_policy(settings: &DeploySettings, retry_policy: RetryPolicy) -> Result<Self> {
        let mut base_url = Url::parse(&settings.base_url)
            .map_err(|e| ChainError::invalid_parameter(format!("Invalid base URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| ChainError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            retry_executor: RetryExecutor::new(retry_policy),
            last_signature: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 提交配置并输出校验详情；服务端拒绝时返回 `Deploy` 错误
    pub async fn save_config(&self, config: &RuntimeConfig) -> Result<SaveResponse> {
        self.post_config(config, true).await
    }

    /// 仅当配置与上次成功部署的不同（或 `force`）时提交，返回是否实际提交
    ///
    /// 这一路径只在失败时输出校验详情。
    pub async fn deploy_if_changed(&mut self, config: &RuntimeConfig, force: bool) -> Result<bool> {
        let signature = serde_json::to_string(config)?;
        if !force && self.last_signature.as_deref() == Some(signature.as_str()) {
            log::debug!("Config unchanged, skipping deploy");
            return Ok(false);
        }

        self.post_config(config, false).await?;
        self.last_signature = Some(signature);
        Ok(true)
    }

    /// 编译拓扑并按需部署
    pub async fn compile_and_deploy(&mut self, compiler: &Compiler, topology: &Topology, force: bool) -> Result<bool> {
        let config = compiler.compile(topology)?;
        self.deploy_if_changed(&config, force).await
    }

    async fn post_config(&self, config: &RuntimeConfig, log_success_detail: bool) -> Result<SaveResponse> {
        let url = self
            .base_url
            .join(SAVE_CONFIG_PATH)
            .map_err(|e| ChainError::invalid_parameter(format!("Invalid API path: {}", e)))?;
        let body_json = serde_json::to_value(config)?;
        let client = self.client.clone();

        let response: SaveResponse = self
            .retry_executor
            .execute("save_config", move || {
                let client = client.clone();
                let url = url.clone();
                let body_json = body_json.clone();

                async move {
                    let response = client.post(url).json(&body_json).send().await.map_err(|e| {
                        if e.is_timeout() {
                            ChainError::timeout(format!("save_config timed out: {}", e))
                        } else {
                            ChainError::network(format!("HTTP request failed: {}", e))
                        }
                    })?;

                    let status = response.status();
                    let text = response
                        .text()
                        .await
                        .map_err(|e| ChainError::network(format!("Failed to read response: {}", e)))?;

                    if status.is_server_error() {
                        return Err(ChainError::network(format!(
                            "API request failed: {} - {}",
                            status, text
                        )));
                    }
                    if !status.is_success() {
                        return Err(ChainError::deploy(format!("{} - {}", status, text)));
                    }
                    Ok(serde_json::from_str(&text)?)
                }
            })
            .await?;

        if log_success_detail || !response.is_success() {
            response.log_detail();
        }
        if !response.is_success() {
            let message = response
                .message
                .clone()
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
            return Err(ChainError::deploy(message));
        }

        log::info!(
            "{}",
            response.message.as_deref().unwrap_or("Config saved")
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = DeployClient::new(&DeploySettings::default()).unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:19999/api/");
        assert_eq!(
            client.base_url().join(SAVE_CONFIG_PATH).unwrap().as_str(),
            "http://127.0.0.1:19999/api/save_config"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let settings = DeploySettings {
            base_url: "::not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            DeployClient::new(&settings),
            Err(ChainError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_save_response() {
        let response: SaveResponse =
            serde_json::from_str(r#"{"status": "error", "message": null, "detail": "line 1\n\nline 2"}"#)
                .unwrap();
        assert!(!response.is_success());
        assert_eq!(response.message, None);
        response.log_detail();
    }
}
