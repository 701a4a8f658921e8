//! 错误处理模块
//!
//! 定义编译错误分类、SDK 主错误类型以及面向界面的错误信息。

use crate::types::NodeType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 轮询组允许的最大后端数量
pub const MAX_POOL_SIZE: usize = 32;

/// 编译阶段的致命错误
///
/// 只由 [`crate::compiler::compile`] 产生，出现时不会返回任何部分配置。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// 轮询池大小不在 [2, 32] 范围内
    #[error("{}", pool_size_message(.tag, .size))]
    RoundRobinPoolSize { tag: String, size: usize },

    /// 带输出的轮询池中包含聚合类节点
    #[error(
        "Round Robin output chaining does not support candidate \"{candidate}\" of type \"{candidate_type}\". Use protocol nodes instead."
    )]
    RoundRobinOutputType {
        candidate: String,
        candidate_type: NodeType,
    },

    /// 被轮询组托管的候选节点本身是选择器
    #[error(
        "Round Robin output chaining does not support candidate \"{candidate}\" of type \"{candidate_type}\"."
    )]
    RoundRobinCandidateType {
        candidate: String,
        candidate_type: NodeType,
    },

    /// 两个轮询组为同一候选节点指定了不同的输出
    #[error("Round Robin candidate \"{candidate}\" has conflicting outputs (\"{first}\" vs \"{second}\").")]
    ConflictingOutput {
        candidate: String,
        first: String,
        second: String,
    },

    /// 合成端口超出 65535，或监听端口伸进了后端端口区间
    #[error("Round Robin group {group_index} needs port {port}, which is outside the available port range.")]
    PortExhausted { group_index: usize, port: u32 },
}

fn pool_size_message(tag: &str, size: &usize) -> String {
    if *size < 2 {
        format!(
            "Round Robin node \"{}\" requires at least 2 pool links (to next hop).",
            tag
        )
    } else {
        format!(
            "Round Robin node \"{}\" exceeds max backends ({}).",
            tag, MAX_POOL_SIZE
        )
    }
}

impl CompileError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::RoundRobinPoolSize { .. } => "RR_POOL_SIZE",
            CompileError::RoundRobinOutputType { .. } => "RR_OUTPUT_TYPE",
            CompileError::RoundRobinCandidateType { .. } => "RR_CANDIDATE_TYPE",
            CompileError::ConflictingOutput { .. } => "RR_CONFLICTING_OUTPUT",
            CompileError::PortExhausted { .. } => "RR_PORT_EXHAUSTED",
        }
    }
}

/// SDK 的主要错误类型
#[derive(Error, Debug)]
pub enum ChainError {
    /// 拓扑编译失败
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// HTTP 请求错误
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 文件读写错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL 解析错误
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 无效参数（编辑操作被拒绝）
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// 资源未找到
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 运行时管理服务拒绝了配置
    #[error("Deploy failed: {0}")]
    Deploy(String),

    /// 网络连接错误
    #[error("Network connection error: {0}")]
    Network(String),

    /// 超时错误
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// 其他错误
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// SDK 的结果类型
pub type Result<T> = std::result::Result<T, ChainError>;

/// 错误分类
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 拓扑结构无法编译
    Topology,
    /// 网络相关错误
    Network,
    /// 配置相关错误
    Configuration,
    /// 部署被服务端拒绝
    Deploy,
    /// 数据处理错误
    DataProcessing,
    /// 系统错误
    System,
    /// 用户输入错误
    UserInput,
    /// 内部错误
    Internal,
}

/// 面向界面的错误信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// 错误分类
    pub category: ErrorCategory,
    /// 错误代码
    pub code: String,
    /// 错误消息（原样展示给用户）
    pub message: String,
    /// 是否可重试
    pub retryable: bool,
    /// 建议的解决方案
    pub suggestion: Option<String>,
}

impl ChainError {
    /// 创建配置错误
    pub fn config<S: Into<String>>(msg: S) -> Self {
        let error = ChainError::Config(msg.into());
        error.log_error();
        error
    }

    /// 创建无效参数错误
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        let error = ChainError::InvalidParameter(msg.into());
        error.log_error();
        error
    }

    /// 创建未找到错误
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        let error = ChainError::NotFound(msg.into());
        error.log_error();
        error
    }

    /// 创建部署错误
    pub fn deploy<S: Into<String>>(msg: S) -> Self {
        let error = ChainError::Deploy(msg.into());
        error.log_error();
        error
    }

    /// 创建网络错误
    pub fn network<S: Into<String>>(msg: S) -> Self {
        let error = ChainError::Network(msg.into());
        error.log_error();
        error
    }

    /// 创建超时错误
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        let error = ChainError::Timeout(msg.into());
        error.log_error();
        error
    }

    /// 获取错误分类
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChainError::Compile(_) => ErrorCategory::Topology,
            ChainError::Http(_) | ChainError::Network(_) | ChainError::Timeout(_) => {
                ErrorCategory::Network
            }
            ChainError::Config(_) => ErrorCategory::Configuration,
            ChainError::Deploy(_) => ErrorCategory::Deploy,
            ChainError::Json(_) | ChainError::Yaml(_) => ErrorCategory::DataProcessing,
            ChainError::Io(_) => ErrorCategory::System,
            ChainError::UrlParse(_)
            | ChainError::InvalidParameter(_)
            | ChainError::NotFound(_) => ErrorCategory::UserInput,
            ChainError::Other(_) => ErrorCategory::Internal,
        }
    }

    /// 获取错误代码
    pub fn code(&self) -> String {
        match self {
            ChainError::Compile(e) => e.code().to_string(),
            ChainError::Http(_) => "HTTP_ERROR".to_string(),
            ChainError::Json(_) => "JSON_ERROR".to_string(),
            ChainError::Yaml(_) => "YAML_ERROR".to_string(),
            ChainError::Io(_) => "IO_ERROR".to_string(),
            ChainError::UrlParse(_) => "URL_PARSE_ERROR".to_string(),
            ChainError::Config(_) => "CONFIG_ERROR".to_string(),
            ChainError::InvalidParameter(_) => "INVALID_PARAMETER".to_string(),
            ChainError::NotFound(_) => "NOT_FOUND".to_string(),
            ChainError::Deploy(_) => "DEPLOY_ERROR".to_string(),
            ChainError::Network(_) => "NETWORK_ERROR".to_string(),
            ChainError::Timeout(_) => "TIMEOUT_ERROR".to_string(),
            ChainError::Other(_) => "OTHER_ERROR".to_string(),
        }
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainError::Http(_) | ChainError::Network(_) | ChainError::Timeout(_)
        )
    }

    /// 获取建议的解决方案
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ChainError::Compile(CompileError::RoundRobinPoolSize { .. }) => {
                Some("请为轮询节点连接 2 到 32 个下一跳节点".to_string())
            }
            ChainError::Compile(CompileError::ConflictingOutput { .. }) => {
                Some("请让共享候选节点的轮询组使用同一个输出".to_string())
            }
            ChainError::Compile(_) => Some("请在轮询池中只使用协议节点".to_string()),
            ChainError::Network(_) | ChainError::Http(_) => {
                Some("请检查运行时管理服务是否可达".to_string())
            }
            ChainError::Timeout(_) => Some("请尝试增加超时时间或检查网络延迟".to_string()),
            ChainError::Config(_) => Some("请检查配置文件格式和内容".to_string()),
            ChainError::Deploy(_) => Some("请查看服务端返回的校验详情".to_string()),
            ChainError::InvalidParameter(_) => Some("请检查输入参数的格式和有效性".to_string()),
            _ => None,
        }
    }

    /// 转换为错误信息
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            category: self.category(),
            code: self.code(),
            message: self.to_string(),
            retryable: self.is_retryable(),
            suggestion: self.suggestion(),
        }
    }

    /// 记录错误日志
    fn log_error(&self) {
        log::error!("[{}] {}", self.code(), self);
    }
}

/// 手动实现Clone trait
impl Clone for ChainError {
    fn clone(&self) -> Self {
        match self {
            ChainError::Compile(e) => ChainError::Compile(e.clone()),
            ChainError::Http(e) => ChainError::Network(e.to_string()),
            ChainError::Json(e) => ChainError::Other(anyhow::anyhow!("JSON error: {}", e)),
            ChainError::Yaml(e) => ChainError::Other(anyhow::anyhow!("YAML error: {}", e)),
            ChainError::Io(e) => ChainError::Io(std::io::Error::new(e.kind(), e.to_string())),
            ChainError::UrlParse(e) => ChainError::UrlParse(*e),
            ChainError::Config(s) => ChainError::Config(s.clone()),
            ChainError::InvalidParameter(s) => ChainError::InvalidParameter(s.clone()),
            ChainError::NotFound(s) => ChainError::NotFound(s.clone()),
            ChainError::Deploy(s) => ChainError::Deploy(s.clone()),
            ChainError::Network(s) => ChainError::Network(s.clone()),
            ChainError::Timeout(s) => ChainError::Timeout(s.clone()),
            ChainError::Other(e) => ChainError::Other(anyhow::anyhow!("{}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_messages() {
        let small = CompileError::RoundRobinPoolSize {
            tag: "rr".to_string(),
            size: 1,
        };
        assert_eq!(
            small.to_string(),
            "Round Robin node \"rr\" requires at least 2 pool links (to next hop)."
        );

        let large = CompileError::RoundRobinPoolSize {
            tag: "rr".to_string(),
            size: 33,
        };
        assert!(large.to_string().contains("exceeds max backends (32)"));
    }

    #[test]
    fn test_compile_error_is_surfaced_verbatim() {
        let inner = CompileError::RoundRobinOutputType {
            candidate: "sel".to_string(),
            candidate_type: NodeType::Selector,
        };
        let err = ChainError::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.code(), "RR_OUTPUT_TYPE");
        assert_eq!(err.category(), ErrorCategory::Topology);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_info() {
        let err = ChainError::network("connection refused");
        let info = err.to_error_info();
        assert_eq!(info.code, "NETWORK_ERROR");
        assert!(info.retryable);
        assert!(info.suggestion.is_some());
        assert!(info.message.contains("connection refused"));
    }

    #[test]
    fn test_clone_keeps_variant() {
        let err = ChainError::deploy("Config validation failed");
        assert!(matches!(err.clone(), ChainError::Deploy(ref m) if m == "Config validation failed"));
    }
}
