//! # hopchain
//!
//! 多跳代理链编辑与编译库。
//! 提供拓扑模型、连线校验、规范化、sing-box 配置编译和部署功能。

pub mod compiler;
pub mod config;
pub mod deploy;
pub mod editor;
pub mod error;
pub mod link;
pub mod logger;
pub mod normalize;
pub mod retry;
pub mod roundrobin;
pub mod runtime;
pub mod topology;
pub mod types;

// 重新导出主要的公共接口
pub use compiler::{compile, Compiler};
pub use config::{CompilerSettings, DeploySettings, OutputFormat, Settings, SettingsManager};
pub use deploy::{DeployClient, SaveResponse};
pub use editor::RemovalReport;
pub use error::{ChainError, CompileError, ErrorCategory, ErrorInfo, Result};
pub use link::{can_link, link, EdgeKind, LinkDecision};
pub use normalize::{normalize, normalize_with_report, NormalizeReport};
pub use retry::{RetryExecutor, RetryPolicy};
pub use roundrobin::{PortLayout, RoundRobinGroup, RoundRobinPlan};
pub use runtime::{BalancerGroup, RuntimeConfig};
pub use types::{
    Inbound, InboundKind, Layer, NodeDefinition, NodeRole, NodeType, PlacedNode, Topology,
    INTERNET_TAG, SYSTEM_TAG_PREFIX,
};

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 初始化日志系统
///
/// # Examples
///
/// ```
/// use hopchain::logger::LoggerConfig;
///
/// hopchain::init_logger(Some(LoggerConfig::for_cli(false, false)));
/// ```
pub fn init_logger(config: Option<logger::LoggerConfig>) {
    logger::init_logger(config);
}
