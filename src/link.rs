//! 连线合法性校验
//!
//! 判断一条新连线（源标签 → 目标标签）是否允许，并在允许时按源节点角色
//! 写入出边。拒绝永远不修改拓扑，只返回给用户看的原因。

use crate::topology::{managed_pool_members, TopologyIndex};
use crate::types::{NodeRole, Topology, INTERNET_TAG};

/// 被接受的连线类别，决定出边的写入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// 入站 → 第 0 跳，追加
    InboundEntry,
    /// 协议节点，整体替换为唯一下一跳
    Single,
    /// 选择器 / URL 测试，追加
    Fanout,
    /// 轮询池成员，追加
    Pool,
    /// 轮询输出，替换已有输出
    Output,
}

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDecision {
    Allow(EdgeKind),
    Deny { reason: String },
}

impl LinkDecision {
    fn deny(reason: String) -> Self {
        LinkDecision::Deny { reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, LinkDecision::Allow(_))
    }

    /// 拒绝原因
    pub fn reason(&self) -> Option<&str> {
        match self {
            LinkDecision::Allow(_) => None,
            LinkDecision::Deny { reason } => Some(reason),
        }
    }
}

/// 校验连线，不修改拓扑
///
/// # Examples
///
/// ```
/// use hopchain::link::can_link;
/// use hopchain::types::{Inbound, Layer, NodeDefinition, NodeType, PlacedNode, Topology};
///
/// let mut topology = Topology::default_profile();
/// topology.node_library.push(NodeDefinition::new("hk", NodeType::Vmess));
/// topology.layers[0].nodes.push(PlacedNode::new("hk"));
///
/// assert!(can_link(&topology, "mixed-10808", "hk", true).is_allowed());
/// assert!(!can_link(&topology, "mixed-10808", "direct", true).is_allowed());
/// ```
pub fn can_link(topology: &Topology, source: &str, target: &str, source_is_inbound: bool) -> LinkDecision {
    let index = TopologyIndex::build(topology);
    evaluate(topology, &index, source, target, source_is_inbound)
}

/// 校验并在允许时写入连线
pub fn link(topology: &mut Topology, source: &str, target: &str, source_is_inbound: bool) -> LinkDecision {
    let index = TopologyIndex::build(topology);
    let decision = evaluate(topology, &index, source, target, source_is_inbound);
    match &decision {
        LinkDecision::Allow(kind) => {
            if apply(topology, &index, source, target, *kind) {
                if source_is_inbound {
                    log::info!("Linked [In] {} -> {}", source, target);
                } else {
                    log::info!("Linked {} -> {}", source, target);
                }
            }
        }
        LinkDecision::Deny { reason } => log::debug!("{}", reason),
    }
    decision
}

fn evaluate(
    topology: &Topology,
    index: &TopologyIndex,
    source: &str,
    target: &str,
    source_is_inbound: bool,
) -> LinkDecision {
    if source == target {
        return LinkDecision::deny(format!(
            "Connection blocked: {} cannot link to itself",
            source
        ));
    }

    let to_internet = target == INTERNET_TAG;

    if source_is_inbound {
        if topology.inbound(source).is_none() {
            return LinkDecision::deny(format!("Connection blocked: unknown inbound {}", source));
        }
        if to_internet {
            return LinkDecision::deny(
                "Connection blocked: Inbound cannot connect to Internet directly. Connect to HOP 1."
                    .to_string(),
            );
        }
        if !index.in_hop(target, 0) {
            return LinkDecision::deny(format!(
                "Connection blocked: Inbound -> {} (must connect to HOP 1)",
                target
            ));
        }
        return LinkDecision::Allow(EdgeKind::InboundEntry);
    }

    let (Some(source_hop), Some(source_type)) = (index.hop_of(source), index.placed_type(source))
    else {
        return LinkDecision::deny(format!(
            "Connection blocked: {} is not placed in any hop",
            source
        ));
    };
    let role = source_type.role();

    if role != NodeRole::RoundRobin && managed_pool_members(topology, index).contains(source) {
        return LinkDecision::deny(format!(
            "Connection blocked: {} is managed by a Round Robin node. Connect from the Round Robin node instead.",
            source
        ));
    }

    let target_hop = index.hop_of(target);
    if !to_internet && target_hop.is_none() {
        return LinkDecision::deny(format!(
            "Connection blocked: {} is not placed in any hop",
            target
        ));
    }

    let source_label = source_hop + 1;
    let target_label = target_hop.map(|hop| hop + 1).unwrap_or(0);

    match role {
        NodeRole::RoundRobin => {
            if to_internet {
                if !index.is_second_to_last_hop(source_hop) {
                    return LinkDecision::deny(format!(
                        "Connection blocked: {} (HOP {}) -> Internet. Round Robin can connect to Internet only when its pool is in the last hop.",
                        source, source_label
                    ));
                }
                return LinkDecision::Allow(EdgeKind::Output);
            }
            if target_hop == Some(source_hop + 1) {
                LinkDecision::Allow(EdgeKind::Pool)
            } else if target_hop == Some(source_hop + 2) {
                LinkDecision::Allow(EdgeKind::Output)
            } else {
                LinkDecision::deny(format!(
                    "Connection blocked: {} (HOP {}) -> {} (HOP {}). Round Robin can link to pool (HOP {}) or output (HOP {}).",
                    source,
                    source_label,
                    target,
                    target_label,
                    source_label + 1,
                    source_label + 2
                ))
            }
        }
        NodeRole::Selector | NodeRole::Leaf => {
            let kind = if role == NodeRole::Selector {
                EdgeKind::Fanout
            } else {
                EdgeKind::Single
            };
            if to_internet {
                if !index.is_last_hop(source_hop) {
                    return LinkDecision::deny(format!(
                        "Connection blocked: {} (HOP {}) -> Internet (must connect to HOP {})",
                        source,
                        source_label,
                        source_label + 1
                    ));
                }
                return LinkDecision::Allow(kind);
            }
            if target_hop != Some(source_hop + 1) {
                return LinkDecision::deny(format!(
                    "Connection blocked: {} (HOP {}) -> {} (HOP {}); must connect to HOP {}",
                    source,
                    source_label,
                    target,
                    target_label,
                    source_label + 1
                ));
            }
            LinkDecision::Allow(kind)
        }
    }
}

/// 写入出边；返回拓扑是否实际发生变化
fn apply(topology: &mut Topology, index: &TopologyIndex, source: &str, target: &str, kind: EdgeKind) -> bool {
    if kind == EdgeKind::InboundEntry {
        let Some(inbound) = topology.inbound_mut(source) else {
            return false;
        };
        if inbound.detours.iter().any(|detour| detour == target) {
            return false;
        }
        inbound.detours.push(target.to_string());
        if inbound.detours.len() > 1 {
            log::info!(
                "Inbound {} has {} connections. A selector will be created.",
                source,
                inbound.detours.len()
            );
        }
        return true;
    }

    let Some(source_hop) = index.hop_of(source) else {
        return false;
    };
    let Some(node) = topology.find_placed_mut(source) else {
        return false;
    };

    match kind {
        EdgeKind::Single => {
            if node.detours.len() == 1 && node.detours[0] == target {
                return false;
            }
            node.detours = vec![target.to_string()];
        }
        EdgeKind::Fanout | EdgeKind::Pool => {
            if node.detours.iter().any(|detour| detour == target) {
                return false;
            }
            node.detours.push(target.to_string());
        }
        EdgeKind::Output => {
            node.detours.retain(|detour| {
                !detour.is_empty()
                    && detour != INTERNET_TAG
                    && !index.in_hop(detour, source_hop + 2)
            });
            node.detours.push(target.to_string());
        }
        EdgeKind::InboundEntry => return false,
    }
    true
}
