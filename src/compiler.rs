//! 配置编译器
//!
//! 把拓扑编译为 sing-box 运行时配置。编译总是先在副本上执行规范化，
//! 调用方的拓扑不会被修改。轮询节点展开为本地负载均衡结构，
//! 其余放置节点各自成为一个出站。

use crate::config::CompilerSettings;
use crate::error::CompileError;
use crate::normalize::normalize;
use crate::roundrobin::RoundRobinPlan;
use crate::runtime::{
    InboundConfig, LogConfig, Outbound, RouteConfig, RouteRule, RuntimeConfig,
};
use crate::topology::{unique_tags, TopologyIndex};
use crate::types::{NodeDefinition, NodeType, PlacedNode, Topology, INTERNET_TAG};
use indexmap::IndexMap;

/// 编译拓扑（使用默认设置）
///
/// # Examples
///
/// ```
/// use hopchain::compiler::compile;
/// use hopchain::types::Topology;
///
/// let config = compile(&Topology::default_profile()).unwrap();
/// assert_eq!(config.inbounds[0].tag, "mixed-10808");
/// assert_eq!(config.outbounds[0].tag, "direct");
/// ```
pub fn compile(topology: &Topology) -> Result<RuntimeConfig, CompileError> {
    Compiler::default().compile(topology)
}

/// 配置编译器
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    settings: CompilerSettings,
}

impl Compiler {
    pub fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// 编译拓扑；失败时不返回任何部分结果
    pub fn compile(&self, topology: &Topology) -> Result<RuntimeConfig, CompileError> {
        let mut topology = topology.clone();
        normalize(&mut topology);

        let index = TopologyIndex::build(&topology);
        let plan = RoundRobinPlan::build(&topology, &index, self.settings.port_layout())?;

        let mut outbound_map: IndexMap<String, Outbound> = IndexMap::new();
        for (_, node) in topology.placed_nodes() {
            let node_type = index
                .placed_type(&node.tag)
                .unwrap_or_else(|| topology.resolved_type(node));
            if node_type == NodeType::Roundrobin || outbound_map.contains_key(&node.tag) {
                continue;
            }
            let definition = topology.resolve_node_definition(&node.tag);
            let outbound = self.node_outbound(node, node_type, definition, &index, &plan)?;
            outbound_map.insert(node.tag.clone(), outbound);
        }

        for group in &plan.groups {
            outbound_map.insert(
                group.outbound_tag.clone(),
                Outbound::socks_client(
                    group.outbound_tag.clone(),
                    &self.settings.loopback,
                    group.listen_port,
                ),
            );
        }

        if !outbound_map.contains_key(INTERNET_TAG) {
            outbound_map.insert(INTERNET_TAG.to_string(), Outbound::direct());
        }

        let mut inbounds = Vec::new();
        let mut rules = vec![RouteRule::hijack_dns()];
        let mut selectors = Vec::new();

        for inbound in &topology.inbounds {
            inbounds.push(InboundConfig::mixed(
                inbound.tag.clone(),
                &self.settings.loopback,
                inbound.port,
                self.settings.sniff,
            ));

            let detours: Vec<String> = inbound
                .detours
                .iter()
                .filter(|detour| !detour.is_empty())
                .map(|detour| plan.map_tag(detour).to_string())
                .collect();

            match detours.as_slice() {
                [] => {}
                [only] => rules.push(RouteRule::inbound_to(inbound.tag.clone(), only.clone())),
                [first, ..] => {
                    let selector_tag = inbound.selector_tag();
                    let default = inbound
                        .selector_default
                        .as_deref()
                        .map(|tag| plan.map_tag(tag).to_string())
                        .filter(|tag| detours.contains(tag))
                        .unwrap_or_else(|| first.clone());

                    if outbound_map.contains_key(&selector_tag) {
                        log::warn!(
                            "Inbound selector {} shares its tag with a node outbound",
                            selector_tag
                        );
                    }
                    rules.push(RouteRule::inbound_to(inbound.tag.clone(), selector_tag.clone()));
                    selectors.push(Outbound::selector(selector_tag, detours.clone(), Some(default)));
                }
            }
        }

        for group in &plan.groups {
            for ((inbound_tag, port), candidate) in group
                .inbound_tags
                .iter()
                .zip(&group.backend_ports)
                .zip(&group.candidates)
            {
                inbounds.push(InboundConfig::socks(
                    inbound_tag.clone(),
                    &self.settings.loopback,
                    *port,
                ));
                rules.push(RouteRule::inbound_to(
                    inbound_tag.clone(),
                    plan.map_tag(candidate).to_string(),
                ));
            }
        }

        let mut outbounds: Vec<Outbound> = outbound_map.into_values().collect();
        outbounds.extend(selectors);

        log::info!(
            "Compiled topology: {} inbounds, {} outbounds, {} route rules, {} round-robin groups",
            inbounds.len(),
            outbounds.len(),
            rules.len(),
            plan.groups.len()
        );

        Ok(RuntimeConfig {
            log: LogConfig {
                level: self.settings.log_level.clone(),
                timestamp: self.settings.log_timestamp,
            },
            inbounds,
            outbounds,
            route: RouteConfig { rules },
        })
    }

    fn node_outbound(
        &self,
        node: &PlacedNode,
        node_type: NodeType,
        definition: Option<&NodeDefinition>,
        index: &TopologyIndex,
        plan: &RoundRobinPlan,
    ) -> Result<Outbound, CompileError> {
        let mut outbound = Outbound::new(node_type.as_str(), node.tag.clone());
        if let Some(definition) = definition {
            copy_protocol_attributes(&mut outbound, definition);
        }

        if let Some(output) = plan.output_for(&node.tag) {
            if node_type.is_selector_like() {
                return Err(CompileError::RoundRobinCandidateType {
                    candidate: node.tag.clone(),
                    candidate_type: node_type,
                });
            }
            outbound.detour = Some(output.to_string());
            return Ok(outbound);
        }

        let detours: Vec<&str> = node
            .detours
            .iter()
            .filter(|detour| !detour.is_empty())
            .map(|detour| plan.map_tag(detour))
            .collect();

        if node_type.is_selector_like() {
            if detours.is_empty() {
                log::warn!("Selector {} has no outbounds", node.tag);
                return Ok(outbound);
            }
            outbound.outbounds = unique_tags(&detours).into_iter().collect();
            outbound.default_outbound = outbound.outbounds.first().cloned();
            return Ok(outbound);
        }

        if let Some(next_hop) = detours.first() {
            // 协议出站不能链接到 direct / block，交给路由处理
            let terminal = index
                .target_type(next_hop)
                .is_some_and(|target_type| target_type.is_terminal());
            if !terminal {
                outbound.detour = Some(next_hop.to_string());
            }
        }
        Ok(outbound)
    }
}

fn copy_protocol_attributes(outbound: &mut Outbound, definition: &NodeDefinition) {
    let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
    outbound.server = non_empty(&definition.server);
    outbound.server_port = definition.port.filter(|port| *port != 0);
    outbound.password = non_empty(&definition.password);
    outbound.uuid = non_empty(&definition.uuid);
    outbound.method = non_empty(&definition.method);
    outbound.tls = definition.tls.clone();
    outbound.transport = definition.transport.clone();
}
