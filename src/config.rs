//! 配置管理模块
//!
//! 提供设置文件（编译常量、日志、部署端点）的解析、验证和管理，以及拓扑
//! 档案和运行时配置的文件读写。

use crate::error::{ChainError, Result};
use crate::roundrobin::{PortLayout, DEFAULT_BACKEND_BASE_PORT, DEFAULT_LISTEN_BASE_PORT};
use crate::runtime::{is_loopback_address, RuntimeConfig, LOOPBACK};
use crate::types::Topology;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 设置文件的顶层结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// 编译器设置
    #[serde(default)]
    pub compiler: CompilerSettings,
    /// 部署设置
    #[serde(default)]
    pub deploy: DeploySettings,
}

/// 编译器设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerSettings {
    /// 负载均衡器监听端口起点
    #[serde(rename = "listen-base-port", default = "default_listen_base_port")]
    pub listen_base_port: u16,
    /// 后端入站端口起点
    #[serde(rename = "backend-base-port", default = "default_backend_base_port")]
    pub backend_base_port: u16,
    /// 合成入站与用户入站的监听地址
    #[serde(default = "default_loopback")]
    pub loopback: String,
    /// 运行时日志级别
    #[serde(rename = "log-level", default = "default_log_level")]
    pub log_level: String,
    /// 运行时日志是否带时间戳
    #[serde(rename = "log-timestamp", default = "default_true")]
    pub log_timestamp: bool,
    /// 用户入站是否开启嗅探
    #[serde(default = "default_true")]
    pub sniff: bool,
}

/// 部署设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploySettings {
    /// 运行时管理服务的 API 地址
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,
    /// 请求超时（秒）
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 最大尝试次数
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl CompilerSettings {
    /// 轮询组端口布局
    pub fn port_layout(&self) -> PortLayout {
        PortLayout {
            listen_base: self.listen_base_port,
            backend_base: self.backend_base_port,
        }
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            listen_base_port: default_listen_base_port(),
            backend_base_port: default_backend_base_port(),
            loopback: default_loopback(),
            log_level: default_log_level(),
            log_timestamp: true,
            sniff: true,
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

// 默认值函数
fn default_listen_base_port() -> u16 {
    DEFAULT_LISTEN_BASE_PORT
}

fn default_backend_base_port() -> u16 {
    DEFAULT_BACKEND_BASE_PORT
}

fn default_loopback() -> String {
    LOOPBACK.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://127.0.0.1:19999/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

/// 设置管理器
#[derive(Debug, Default)]
pub struct SettingsManager {
    /// 当前设置
    settings: Settings,
    /// 设置文件路径
    settings_path: Option<String>,
}

impl SettingsManager {
    /// 创建使用默认设置的管理器
    pub fn new() -> Self {
        Self::default()
    }

    /// 从文件加载设置
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hopchain::config::SettingsManager;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut manager = SettingsManager::new();
    /// manager.load_from_file("hopchain.yaml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ChainError::config(format!("Failed to read settings file: {}", e)))?;

        self.load_from_str(&content)?;
        self.settings_path = Some(path.to_string_lossy().to_string());
        Ok(())
    }

    /// 从字符串加载设置
    pub fn load_from_str(&mut self, content: &str) -> Result<()> {
        let settings: Settings = serde_yaml::from_str(content)
            .map_err(|e| ChainError::config(format!("Failed to parse settings: {}", e)))?;

        validate_settings(&settings)?;
        self.settings = settings;
        Ok(())
    }

    /// 保存设置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self.settings)
            .map_err(|e| ChainError::config(format!("Failed to serialize settings: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| ChainError::config(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// 保存设置到当前文件路径
    pub fn save(&self) -> Result<()> {
        if let Some(ref path) = self.settings_path {
            self.save_to_file(path)
        } else {
            Err(ChainError::config("No settings file path specified"))
        }
    }

    /// 获取当前设置的引用
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 获取当前设置的可变引用
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// 验证当前设置
    pub fn validate(&self) -> Result<()> {
        validate_settings(&self.settings)
    }
}

fn validate_settings(settings: &Settings) -> Result<()> {
    let compiler = &settings.compiler;
    if compiler.listen_base_port == 0 {
        return Err(ChainError::config("Invalid listen base port"));
    }

    if compiler.backend_base_port == 0 {
        return Err(ChainError::config("Invalid backend base port"));
    }

    // 监听端口起点必须低于后端端口起点，组数上限由 PortLayout::listen_port 检查
    if compiler.listen_base_port >= compiler.backend_base_port {
        return Err(ChainError::config(
            "listen-base-port must be lower than backend-base-port",
        ));
    }

    if compiler.loopback.trim().is_empty() {
        return Err(ChainError::config("Loopback address cannot be empty"));
    }

    if !is_loopback_address(&compiler.loopback) {
        return Err(ChainError::config(format!(
            "{} is not a loopback address",
            compiler.loopback
        )));
    }

    let deploy = &settings.deploy;
    url::Url::parse(&deploy.base_url)
        .map_err(|e| ChainError::config(format!("Invalid deploy base-url: {}", e)))?;

    if deploy.max_attempts == 0 {
        return Err(ChainError::config("max-attempts must be at least 1"));
    }

    Ok(())
}

/// 文件格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    /// 按扩展名判断格式，`.yaml` / `.yml` 以外一律视为 JSON
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => OutputFormat::Yaml,
            _ => OutputFormat::Json,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(format!("Unknown format: {} (expected json or yaml)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

impl Topology {
    /// 从 JSON 或 YAML 档案加载拓扑
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let topology = match OutputFormat::from_path(path) {
            OutputFormat::Json => serde_json::from_str(&content)?,
            OutputFormat::Yaml => serde_yaml::from_str(&content)?,
        };
        log::debug!("Loaded profile {}", path.display());
        Ok(topology)
    }

    /// 保存拓扑，格式由扩展名决定
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match OutputFormat::from_path(path) {
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
            OutputFormat::Yaml => serde_yaml::to_string(self)?,
        };
        fs::write(path, content)?;
        Ok(())
    }
}

/// 按指定格式序列化运行时配置
pub fn render_runtime_config(config: &RuntimeConfig, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => config.to_json_pretty(),
        OutputFormat::Yaml => config.to_yaml(),
    }
}

/// 保存运行时配置到文件
pub fn save_runtime_config<P: AsRef<Path>>(config: &RuntimeConfig, path: P, format: OutputFormat) -> Result<()> {
    fs::write(path, render_runtime_config(config, format)?)?;
    Ok(())
}
