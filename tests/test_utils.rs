//! 测试工具模块
//! 提供拓扑样例和模拟部署服务器
#![allow(dead_code)]

use hopchain::config::DeploySettings;
use hopchain::types::{Inbound, Layer, NodeDefinition, NodeType, PlacedNode, Topology, INTERNET_TAG};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 协议节点定义
pub fn vless(tag: &str) -> NodeDefinition {
    NodeDefinition::new(tag, NodeType::Vless)
        .with_server(format!("{}.example.com", tag), 443)
        .with_uuid("b831381d-6324-4d53-ad4f-8cda48b30811")
}

/// 由节点定义构成的节点库（自动补上直连）
pub fn library(definitions: Vec<NodeDefinition>) -> Vec<NodeDefinition> {
    let mut library = vec![NodeDefinition::internet()];
    library.extend(definitions);
    library
}

/// 入站 `in1` 连到第一跳的 `a`、`b`，默认选中 `b`
pub fn selector_scenario() -> Topology {
    let mut inbound = Inbound::new("in1", 1080).with_detours(["a", "b"]);
    inbound.selector_default = Some("b".to_string());
    Topology {
        layers: vec![Layer::new("l1", "HOP 1")
            .with_nodes(vec![PlacedNode::new("a"), PlacedNode::new("b")])],
        node_library: library(vec![vless("a"), vless("b")]),
        inbounds: vec![inbound],
    }
}

/// 第一跳轮询节点 `rr`：池 `[x, y]` 在第二跳，输出 `z` 在第三跳
pub fn round_robin_scenario() -> Topology {
    Topology {
        layers: vec![
            Layer::new("l1", "HOP 1")
                .with_nodes(vec![PlacedNode::new("rr").with_detours(["x", "y", "z"])]),
            Layer::new("l2", "HOP 2").with_nodes(vec![PlacedNode::new("x"), PlacedNode::new("y")]),
            Layer::new("l3", "HOP 3")
                .with_nodes(vec![PlacedNode::new("z").with_detours([INTERNET_TAG])]),
        ],
        node_library: library(vec![
            NodeDefinition::new("rr", NodeType::Roundrobin),
            vless("x"),
            vless("y"),
            vless("z"),
        ]),
        inbounds: vec![Inbound::new("in1", 1080).with_detours(["rr"])],
    }
}

/// 池大小为 `size` 的轮询节点，池成员在最后一跳
pub fn pool_of(size: usize) -> Topology {
    let members: Vec<String> = (0..size).map(|i| format!("n{}", i)).collect();
    let mut definitions = vec![NodeDefinition::new("rr", NodeType::Roundrobin)];
    definitions.extend(members.iter().map(|tag| vless(tag)));

    Topology {
        layers: vec![
            Layer::new("l1", "HOP 1")
                .with_nodes(vec![PlacedNode::new("rr").with_detours(members.iter().cloned())]),
            Layer::new("l2", "HOP 2")
                .with_nodes(members.iter().map(|tag| PlacedNode::new(tag.clone())).collect()),
        ],
        node_library: library(definitions),
        inbounds: vec![Inbound::new("in1", 1080).with_detours(["rr"])],
    }
}

/// 三跳链：in1 -> a -> b -> c -> 直连
pub fn linear_chain() -> Topology {
    Topology {
        layers: vec![
            Layer::new("l1", "HOP 1").with_nodes(vec![PlacedNode::new("a").with_detours(["b"])]),
            Layer::new("l2", "HOP 2").with_nodes(vec![PlacedNode::new("b").with_detours(["c"])]),
            Layer::new("l3", "HOP 3")
                .with_nodes(vec![PlacedNode::new("c").with_detours([INTERNET_TAG])]),
        ],
        node_library: library(vec![vless("a"), vless("b"), vless("c")]),
        inbounds: vec![Inbound::new("in1", 1080).with_detours(["a"])],
    }
}

/// 创建模拟运行时管理服务，`/api/save_config` 返回给定响应
pub async fn create_mock_server(body: serde_json::Value) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/save_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    mock_server
}

/// 指向模拟服务器的部署设置
pub fn deploy_settings(server: &MockServer, max_attempts: u32) -> DeploySettings {
    DeploySettings {
        base_url: format!("{}/api", server.uri()),
        timeout_secs: 5,
        max_attempts,
    }
}
