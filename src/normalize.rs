//! 拓扑规范化
//!
//! 在每次读取拓扑前执行的修复过程：清理非法放置、非法连线和被托管池成员的
//! 出边。永远不会失败，重复执行结果不变。

use crate::topology::{managed_pool_members, unique_tags, TopologyIndex};
use crate::types::{resolve_type, Inbound, NodeDefinition, NodeType, Topology, INTERNET_TAG};
use std::collections::HashSet;

/// 规范化结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// 拓扑是否被修改
    pub changed: bool,
    /// 节点库修复次数（补齐互联网出口、修正其类型、删除重复标签）
    pub library_repaired: usize,
    /// 被删除的放置节点数量
    pub placements_pruned: usize,
    /// 出边或默认项被改写的入站数量
    pub inbounds_rewritten: usize,
    /// 出边被改写的放置节点数量
    pub nodes_rewritten: usize,
    /// 出边被清空的托管池成员数量
    pub managed_cleared: usize,
}

impl NormalizeReport {
    fn finish(mut self) -> Self {
        self.changed = self.library_repaired
            + self.placements_pruned
            + self.inbounds_rewritten
            + self.nodes_rewritten
            + self.managed_cleared
            > 0;
        self
    }
}

/// 规范化拓扑，返回是否发生了修改
///
/// # Examples
///
/// ```
/// use hopchain::normalize::normalize;
/// use hopchain::types::Topology;
///
/// let mut topology = Topology::default_profile();
/// assert!(!normalize(&mut topology));
/// ```
pub fn normalize(topology: &mut Topology) -> bool {
    normalize_with_report(topology).changed
}

/// 规范化拓扑并返回各步骤的修改统计
pub fn normalize_with_report(topology: &mut Topology) -> NormalizeReport {
    let mut report = NormalizeReport {
        library_repaired: repair_library(topology),
        ..Default::default()
    };

    for inbound in &mut topology.inbounds {
        if has_stale_default(inbound) {
            inbound.selector_default = inbound.detours.first().cloned();
            report.inbounds_rewritten += 1;
        }
    }

    report.placements_pruned = prune_placements(topology);

    let index = TopologyIndex::build(topology);

    for inbound in &mut topology.inbounds {
        let after: Vec<String> = unique_tags(&inbound.detours)
            .into_iter()
            .filter(|tag| index.in_hop(tag, 0))
            .collect();
        let mut rewritten = after != inbound.detours;
        inbound.detours = after;

        if has_stale_default(inbound) {
            inbound.selector_default = inbound.detours.first().cloned();
            rewritten = true;
        }
        if rewritten {
            report.inbounds_rewritten += 1;
        }
    }

    let Topology {
        layers,
        node_library,
        ..
    } = &mut *topology;
    for (hop, layer) in layers.iter_mut().enumerate() {
        for node in &mut layer.nodes {
            let node_type = resolve_type(node_library.as_slice(), node);
            let after = index.legal_detours(hop, node_type, &node.detours);
            if after != node.detours {
                node.detours = after;
                report.nodes_rewritten += 1;
            }
        }
    }

    let managed = managed_pool_members(topology, &index);
    if !managed.is_empty() {
        for layer in &mut topology.layers {
            for node in &mut layer.nodes {
                if managed.contains(&node.tag) && !node.detours.is_empty() {
                    node.detours.clear();
                    report.managed_cleared += 1;
                }
            }
        }
    }

    let report = report.finish();
    if report.changed {
        log::warn!(
            "Topology normalized: removed invalid links ({} placements, {} inbounds, {} nodes, {} managed)",
            report.placements_pruned,
            report.inbounds_rewritten,
            report.nodes_rewritten,
            report.managed_cleared
        );
    }
    report
}

/// 默认项不在出边中
fn has_stale_default(inbound: &Inbound) -> bool {
    inbound
        .selector_default
        .as_ref()
        .is_some_and(|default| !inbound.detours.contains(default))
}

/// 补齐互联网出口、强制其类型并删除重复标签
fn repair_library(topology: &mut Topology) -> usize {
    let mut repaired = 0;

    let mut seen = HashSet::new();
    let before = topology.node_library.len();
    topology
        .node_library
        .retain(|definition| seen.insert(definition.tag.clone()));
    repaired += before - topology.node_library.len();

    match topology
        .node_library
        .iter_mut()
        .find(|definition| definition.tag == INTERNET_TAG)
    {
        Some(definition) if definition.node_type != NodeType::Direct => {
            definition.node_type = NodeType::Direct;
            repaired += 1;
        }
        Some(_) => {}
        None => {
            topology.node_library.push(NodeDefinition::internet());
            repaired += 1;
        }
    }

    repaired
}

/// 删除空标签、互联网出口、节点库缺失以及重复放置的节点
fn prune_placements(topology: &mut Topology) -> usize {
    let library: HashSet<&str> = topology
        .node_library
        .iter()
        .map(|definition| definition.tag.as_str())
        .filter(|tag| !tag.is_empty())
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut pruned = 0;
    for layer in &mut topology.layers {
        let before = layer.nodes.len();
        layer.nodes.retain(|node| {
            !node.tag.is_empty()
                && node.tag != INTERNET_TAG
                && library.contains(node.tag.as_str())
                && seen.insert(node.tag.clone())
        });
        pruned += before - layer.nodes.len();
    }
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Layer, PlacedNode};

    fn library(entries: &[(&str, NodeType)]) -> Vec<NodeDefinition> {
        let mut library = vec![NodeDefinition::internet()];
        library.extend(
            entries
                .iter()
                .map(|(tag, node_type)| NodeDefinition::new(*tag, *node_type)),
        );
        library
    }

    #[test]
    fn test_normalized_profile_is_untouched() {
        let mut topology = Topology::default_profile();
        let report = normalize_with_report(&mut topology);
        assert_eq!(report, NormalizeReport::default());
    }

    #[test]
    fn test_library_repair() {
        let mut topology = Topology::new();
        topology.node_library = vec![
            NodeDefinition::new("a", NodeType::Vmess),
            NodeDefinition::new("a", NodeType::Trojan),
        ];
        let report = normalize_with_report(&mut topology);
        assert_eq!(report.library_repaired, 2);
        assert_eq!(topology.node_library.len(), 2);
        assert_eq!(topology.node_library[0].node_type, NodeType::Vmess);
        assert_eq!(topology.node_library[1].tag, INTERNET_TAG);

        let mut wrong = Topology::new();
        wrong.node_library = vec![NodeDefinition::new(INTERNET_TAG, NodeType::Socks)];
        assert!(normalize(&mut wrong));
        assert_eq!(wrong.node_library[0].node_type, NodeType::Direct);
    }

    #[test]
    fn test_prunes_placements() {
        let mut topology = Topology {
            layers: vec![
                Layer::new("l1", "HOP 1").with_nodes(vec![
                    PlacedNode::new("a"),
                    PlacedNode::new(""),
                    PlacedNode::new(INTERNET_TAG),
                    PlacedNode::new("ghost"),
                ]),
                Layer::new("l2", "HOP 2").with_nodes(vec![PlacedNode::new("a")]),
            ],
            node_library: library(&[("a", NodeType::Vmess)]),
            inbounds: Vec::new(),
        };
        let report = normalize_with_report(&mut topology);
        assert_eq!(report.placements_pruned, 4);
        assert_eq!(topology.layers[0].nodes.len(), 1);
        assert!(topology.layers[1].nodes.is_empty());
    }

    #[test]
    fn test_inbound_detours_and_default() {
        let mut topology = Topology {
            layers: vec![
                Layer::new("l1", "HOP 1")
                    .with_nodes(vec![PlacedNode::new("a"), PlacedNode::new("b")]),
                Layer::new("l2", "HOP 2").with_nodes(vec![PlacedNode::new("c")]),
            ],
            node_library: library(&[
                ("a", NodeType::Vmess),
                ("b", NodeType::Vmess),
                ("c", NodeType::Vmess),
            ]),
            inbounds: vec![Inbound::new("in1", 1080).with_detours(["c", "b", "a", "b"])],
        };
        topology.inbounds[0].selector_default = Some("c".to_string());

        assert!(normalize(&mut topology));
        let inbound = &topology.inbounds[0];
        assert_eq!(inbound.detours, vec!["b", "a"]);
        assert_eq!(inbound.selector_default.as_deref(), Some("b"));
    }

    #[test]
    fn test_managed_members_cleared_and_idempotent() {
        let mut topology = Topology {
            layers: vec![
                Layer::new("l1", "HOP 1").with_nodes(vec![
                    PlacedNode::new("rr").with_detours(["z", "x", "y", "x", INTERNET_TAG])
                ]),
                Layer::new("l2", "HOP 2").with_nodes(vec![
                    PlacedNode::new("x").with_detours(["z"]),
                    PlacedNode::new("y"),
                ]),
                Layer::new("l3", "HOP 3").with_nodes(vec![PlacedNode::new("z")]),
            ],
            node_library: library(&[
                ("rr", NodeType::Roundrobin),
                ("x", NodeType::Vmess),
                ("y", NodeType::Vmess),
                ("z", NodeType::Vmess),
            ]),
            inbounds: Vec::new(),
        };

        let report = normalize_with_report(&mut topology);
        assert!(report.changed);
        assert_eq!(report.managed_cleared, 1);
        assert_eq!(topology.layers[0].nodes[0].detours, vec!["x", "y", "z"]);
        assert!(topology.layers[1].nodes[0].detours.is_empty());

        let snapshot = topology.clone();
        assert!(!normalize(&mut topology));
        assert_eq!(topology, snapshot);
    }

    #[test]
    fn test_leaf_keeps_first_legal_target() {
        let mut topology = Topology {
            layers: vec![
                Layer::new("l1", "HOP 1").with_nodes(vec![
                    PlacedNode::new("a").with_detours([INTERNET_TAG, "c", "b"])
                ]),
                Layer::new("l2", "HOP 2")
                    .with_nodes(vec![PlacedNode::new("b"), PlacedNode::new("c")]),
            ],
            node_library: library(&[
                ("a", NodeType::Trojan),
                ("b", NodeType::Vmess),
                ("c", NodeType::Vmess),
            ]),
            inbounds: Vec::new(),
        };
        normalize(&mut topology);
        assert_eq!(topology.layers[0].nodes[0].detours, vec!["c"]);
    }
}
