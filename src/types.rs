//! 类型定义模块
//!
//! 拓扑模型：节点库、放置节点、跳（层）与入站。序列化形状与配置档案一致：
//! `{ layers, nodeLibrary, inbounds }`。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 互联网出口的保留标签（虚拟终点，只能作为连线目标）
pub const INTERNET_TAG: &str = "direct";

/// 合成结构使用的保留标签前缀
pub const SYSTEM_TAG_PREFIX: &str = "sys-rr-";

/// 节点类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// 混合代理入站类型
    Mixed,
    /// 手动选择器
    Selector,
    /// URL 测试（自动选择）
    Urltest,
    /// 轮询负载均衡（虚拟节点）
    Roundrobin,
    /// 直连
    Direct,
    /// 阻断
    Block,
    Shadowsocks,
    Vmess,
    Vless,
    Hysteria2,
    Trojan,
    Socks,
    Http,
}

/// 节点在拓扑中扮演的角色，决定连线规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// 协议节点，最多一个下一跳
    Leaf,
    /// 选择器 / URL 测试，扇出不受限
    Selector,
    /// 轮询节点：池 + 至多一个输出
    RoundRobin,
}

impl NodeType {
    /// 线上格式中的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Mixed => "mixed",
            NodeType::Selector => "selector",
            NodeType::Urltest => "urltest",
            NodeType::Roundrobin => "roundrobin",
            NodeType::Direct => "direct",
            NodeType::Block => "block",
            NodeType::Shadowsocks => "shadowsocks",
            NodeType::Vmess => "vmess",
            NodeType::Vless => "vless",
            NodeType::Hysteria2 => "hysteria2",
            NodeType::Trojan => "trojan",
            NodeType::Socks => "socks",
            NodeType::Http => "http",
        }
    }

    pub fn role(&self) -> NodeRole {
        match self {
            NodeType::Selector | NodeType::Urltest => NodeRole::Selector,
            NodeType::Roundrobin => NodeRole::RoundRobin,
            _ => NodeRole::Leaf,
        }
    }

    /// 选择器或 URL 测试
    pub fn is_selector_like(&self) -> bool {
        self.role() == NodeRole::Selector
    }

    /// 任何聚合类节点（选择器、URL 测试、轮询）
    pub fn is_aggregator(&self) -> bool {
        self.role() != NodeRole::Leaf
    }

    /// 不转发流量的终点类型，协议出站不会链接到它们
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeType::Direct | NodeType::Block)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS 选项
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsOptions {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    /// 其余字段原样保留
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// 传输层选项（ws、grpc 等）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransportOptions {
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// 节点库条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDefinition {
    /// 稳定的不透明标识
    #[serde(default)]
    pub id: String,
    /// 唯一标签，同时作为连线端点
    pub tag: String,
    /// 节点类型
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
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
    /// 未识别的属性，往返保存时不丢失
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl NodeDefinition {
    /// 创建只有标签和类型的定义
    pub fn new<S: Into<String>>(tag: S, node_type: NodeType) -> Self {
        let tag = tag.into();
        Self {
            id: format!("lib-{}", tag),
            tag,
            node_type,
            server: None,
            port: None,
            password: None,
            uuid: None,
            method: None,
            tls: None,
            transport: None,
            extra: IndexMap::new(),
        }
    }

    /// 内置的互联网出口定义
    pub fn internet() -> Self {
        let mut definition = Self::new(INTERNET_TAG, NodeType::Direct);
        definition.id = "lib-direct".to_string();
        definition
    }

    /// 设置服务器地址和端口
    pub fn with_server<S: Into<String>>(mut self, server: S, port: u16) -> Self {
        self.server = Some(server.into());
        self.port = Some(port);
        self
    }

    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_uuid<S: Into<String>>(mut self, uuid: S) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_method<S: Into<String>>(mut self, method: S) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// 放置在某一跳中的节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacedNode {
    #[serde(default)]
    pub id: String,
    /// 引用节点库中的标签
    #[serde(default)]
    pub tag: String,
    /// 出边（目标标签，有序）
    #[serde(default)]
    pub detours: Vec<String>,
    /// 旧档案中直接写在放置节点上的类型，仅在节点库缺失定义时使用
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
}

impl PlacedNode {
    pub fn new<S: Into<String>>(tag: S) -> Self {
        let tag = tag.into();
        Self {
            id: format!("node-{}", tag),
            tag,
            detours: Vec::new(),
            node_type: None,
        }
    }

    /// 带出边创建
    pub fn with_detours<S: Into<String>>(mut self, detours: impl IntoIterator<Item = S>) -> Self {
        self.detours = detours.into_iter().map(Into::into).collect();
        self
    }
}

/// 跳（层）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<PlacedNode>,
}

impl Layer {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, title: T) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            nodes: Vec::new(),
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<PlacedNode>) -> Self {
        self.nodes = nodes;
        self
    }
}

/// 入站类型（固定为 mixed）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    #[default]
    Mixed,
}

/// 用户入站
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Inbound {
    pub tag: String,
    #[serde(rename = "type", default)]
    pub kind: InboundKind,
    /// 监听端口（1-65535，唯一）
    pub port: u16,
    /// 指向第 0 跳的出边
    #[serde(default)]
    pub detours: Vec<String>,
    /// 多个出边时合成选择器的默认项
    #[serde(rename = "selectorDefault", default)]
    pub selector_default: Option<String>,
}

impl Inbound {
    pub fn new<S: Into<String>>(tag: S, port: u16) -> Self {
        Self {
            tag: tag.into(),
            kind: InboundKind::Mixed,
            port,
            detours: Vec::new(),
            selector_default: None,
        }
    }

    pub fn with_detours<S: Into<String>>(mut self, detours: impl IntoIterator<Item = S>) -> Self {
        self.detours = detours.into_iter().map(Into::into).collect();
        self
    }

    /// 合成选择器出站的标签
    pub fn selector_tag(&self) -> String {
        format!("{}-selector", self.tag)
    }
}

/// 完整拓扑（也是配置档案的持久化形状）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(rename = "nodeLibrary", default)]
    pub node_library: Vec<NodeDefinition>,
    #[serde(default)]
    pub inbounds: Vec<Inbound>,
}

/// 解析放置节点的实际类型：节点库定义优先，其次是放置节点自身，最后默认为选择器
pub fn resolve_type(library: &[NodeDefinition], node: &PlacedNode) -> NodeType {
    library
        .iter()
        .find(|definition| definition.tag == node.tag)
        .map(|definition| definition.node_type)
        .or(node.node_type)
        .unwrap_or(NodeType::Selector)
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新档案的初始内容：一个 10808 端口入站、内置直连、一个空跳
    pub fn default_profile() -> Self {
        Self {
            layers: vec![Layer::new("layer-1", "HOP 1")],
            node_library: vec![NodeDefinition::internet()],
            inbounds: vec![Inbound::new("mixed-10808", 10808)],
        }
    }

    /// 按标签查找节点库定义
    pub fn resolve_node_definition(&self, tag: &str) -> Option<&NodeDefinition> {
        if tag.is_empty() {
            return None;
        }
        self.node_library.iter().find(|definition| definition.tag == tag)
    }

    /// 放置节点的实际类型
    pub fn resolved_type(&self, node: &PlacedNode) -> NodeType {
        resolve_type(&self.node_library, node)
    }

    /// 查找放置节点及其所在跳（首次出现）
    pub fn find_placed(&self, tag: &str) -> Option<(usize, &PlacedNode)> {
        self.layers.iter().enumerate().find_map(|(hop, layer)| {
            layer
                .nodes
                .iter()
                .find(|node| node.tag == tag)
                .map(|node| (hop, node))
        })
    }

    pub(crate) fn find_placed_mut(&mut self, tag: &str) -> Option<&mut PlacedNode> {
        self.layers
            .iter_mut()
            .flat_map(|layer| layer.nodes.iter_mut())
            .find(|node| node.tag == tag)
    }

    /// 标签是否已放置
    pub fn is_placed(&self, tag: &str) -> bool {
        self.find_placed(tag).is_some()
    }

    /// 按标签查找入站
    pub fn inbound(&self, tag: &str) -> Option<&Inbound> {
        self.inbounds.iter().find(|inbound| inbound.tag == tag)
    }

    pub(crate) fn inbound_mut(&mut self, tag: &str) -> Option<&mut Inbound> {
        self.inbounds.iter_mut().find(|inbound| inbound.tag == tag)
    }

    /// 跳数
    pub fn hop_count(&self) -> usize {
        self.layers.len()
    }

    /// 所有放置节点（按跳、再按节点顺序）
    pub fn placed_nodes(&self) -> impl Iterator<Item = (usize, &PlacedNode)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(hop, layer)| layer.nodes.iter().map(move |node| (hop, node)))
    }
}

/// 标签是否保留给系统使用
pub fn is_reserved_tag(tag: &str) -> bool {
    tag == INTERNET_TAG || tag.starts_with(SYSTEM_TAG_PREFIX)
}
