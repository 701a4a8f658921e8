//! sing-box 运行时配置模型
//!
//! 编译器的输出，也可以从现有配置文件读回（用于查看轮询组）。

use crate::error::Result;
use crate::types::{TlsOptions, TransportOptions, INTERNET_TAG, SYSTEM_TAG_PREFIX};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// 回环地址
pub const LOOPBACK: &str = "127.0.0.1";

const BALANCER_OUTBOUND_SUFFIX: &str = "-lb";
const BACKEND_INBOUND_MARK: &str = "-in-";

/// 是否为回环 IP 地址（`127.0.0.0/8` 或 `::1`）
pub fn is_loopback_address(address: &str) -> bool {
    address
        .trim()
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

/// 完整的运行时配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub inbounds: Vec<InboundConfig>,
    #[serde(default)]
    pub outbounds: Vec<Outbound>,
    #[serde(default)]
    pub route: RouteConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    pub level: String,
    pub timestamp: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            timestamp: true,
        }
    }
}

/// 入站
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundConfig {
    #[serde(rename = "type")]
    pub inbound_type: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sniff: Option<bool>,
}

impl InboundConfig {
    /// 用户入站（mixed）
    pub fn mixed<S: Into<String>>(tag: S, listen: &str, port: u16, sniff: bool) -> Self {
        Self {
            inbound_type: "mixed".to_string(),
            tag: tag.into(),
            listen: Some(listen.to_string()),
            listen_port: Some(port),
            sniff: Some(sniff),
        }
    }

    /// 轮询后端入站（socks，不嗅探）
    pub fn socks<S: Into<String>>(tag: S, listen: &str, port: u16) -> Self {
        Self {
            inbound_type: "socks".to_string(),
            tag: tag.into(),
            listen: Some(listen.to_string()),
            listen_port: Some(port),
            sniff: None,
        }
    }
}

/// 出站
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outbound {
    #[serde(rename = "type")]
    pub outbound_type: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// 链式代理的下一跳
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detour: Option<String>,
    /// 选择器成员
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbounds: Vec<String>,
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_outbound: Option<String>,
}

impl Outbound {
    /// 只有类型和标签的出站
    pub fn new<T: Into<String>, S: Into<String>>(outbound_type: T, tag: S) -> Self {
        Self {
            outbound_type: outbound_type.into(),
            tag: tag.into(),
            server: None,
            server_port: None,
            password: None,
            uuid: None,
            method: None,
            tls: None,
            transport: None,
            version: None,
            detour: None,
            outbounds: Vec::new(),
            default_outbound: None,
        }
    }

    /// 互联网出口
    pub fn direct() -> Self {
        Self::new("direct", INTERNET_TAG)
    }

    /// 指向本地负载均衡器的 socks5 客户端
    pub fn socks_client<S: Into<String>>(tag: S, server: &str, port: u16) -> Self {
        let mut outbound = Self::new("socks", tag);
        outbound.server = Some(server.to_string());
        outbound.server_port = Some(port);
        outbound.version = Some("5".to_string());
        outbound
    }

    /// 选择器，默认项为第一个成员
    pub fn selector<S: Into<String>>(tag: S, members: Vec<String>, default: Option<String>) -> Self {
        let mut outbound = Self::new("selector", tag);
        outbound.default_outbound = default.or_else(|| members.first().cloned());
        outbound.outbounds = members;
        outbound
    }
}

/// 路由配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouteConfig {
    #[serde(default)]
    pub rules: Vec<RouteRule>,
}

/// 路由规则
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouteRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbound: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<String>,
}

impl RouteRule {
    /// DNS 劫持规则，总是第一条
    pub fn hijack_dns() -> Self {
        Self {
            protocol: Some("dns".to_string()),
            action: Some("hijack-dns".to_string()),
            ..Default::default()
        }
    }

    /// 把某个入站的流量交给指定出站
    pub fn inbound_to<I: Into<String>, O: Into<String>>(inbound: I, outbound: O) -> Self {
        Self {
            inbound: vec![inbound.into()],
            outbound: Some(outbound.into()),
            ..Default::default()
        }
    }
}

/// 外部负载均衡器读取的轮询组约定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalancerGroup {
    pub id: String,
    pub listen_port: u16,
    pub backend_ports: Vec<u16>,
}

impl RuntimeConfig {
    /// 运行时管理服务首次启动时写入的引导配置
    pub fn default_config() -> Self {
        Self {
            log: LogConfig::default(),
            inbounds: vec![InboundConfig::mixed("mixed-in", "127.0.0.1", 10808, true)],
            outbounds: vec![Outbound::direct()],
            route: RouteConfig {
                rules: vec![RouteRule::hijack_dns()],
            },
        }
    }

    /// 按标签查找出站
    pub fn outbound(&self, tag: &str) -> Option<&Outbound> {
        self.outbounds.iter().find(|outbound| outbound.tag == tag)
    }

    /// 按标签查找入站
    pub fn inbound(&self, tag: &str) -> Option<&InboundConfig> {
        self.inbounds.iter().find(|inbound| inbound.tag == tag)
    }

    /// 从编译结果中恢复轮询组：`sys-rr-<id>-lb` 出站给出监听端口，
    /// `sys-rr-<id>-in-<k>` 入站给出后端端口。少于两个后端的组被忽略。
    pub fn balancer_groups(&self) -> Vec<BalancerGroup> {
        let mut listen_ports: IndexMap<&str, u16> = IndexMap::new();
        for outbound in &self.outbounds {
            let Some(id) = outbound
                .tag
                .strip_prefix(SYSTEM_TAG_PREFIX)
                .and_then(|rest| rest.strip_suffix(BALANCER_OUTBOUND_SUFFIX))
            else {
                continue;
            };
            if outbound.outbound_type != "socks"
                || !outbound.server.as_deref().is_some_and(is_loopback_address)
            {
                continue;
            }
            if let Some(port) = outbound.server_port {
                listen_ports.insert(id, port);
            }
        }

        let mut backends: HashMap<&str, Vec<(usize, u16)>> = HashMap::new();
        for inbound in &self.inbounds {
            if inbound.inbound_type != "socks" {
                continue;
            }
            let Some((id, position)) = inbound
                .tag
                .strip_prefix(SYSTEM_TAG_PREFIX)
                .and_then(|rest| rest.rsplit_once(BACKEND_INBOUND_MARK))
            else {
                continue;
            };
            let (Ok(position), Some(port)) = (position.parse::<usize>(), inbound.listen_port) else {
                continue;
            };
            backends.entry(id).or_default().push((position, port));
        }

        listen_ports
            .into_iter()
            .filter_map(|(id, listen_port)| {
                let mut ports = backends.remove(id).unwrap_or_default();
                if ports.len() < 2 {
                    return None;
                }
                ports.sort_by_key(|(position, _)| *position);
                Some(BalancerGroup {
                    id: id.to_string(),
                    listen_port,
                    backend_ports: ports.into_iter().map(|(_, port)| port).collect(),
                })
            })
            .collect()
    }

    /// 从 JSON 文本解析
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// 格式化的 JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// YAML 表示
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
