//! 轮询组规划
//!
//! 为每个轮询节点分配稳定的合成标识与回环端口。轮询节点本身不是 sing-box
//! 出站，而是被展开为：一个指向本地负载均衡器的 socks 客户端出站、每个池
//! 成员一个 socks 后端入站，以及把后端入站路由到候选节点的规则。

use crate::error::{CompileError, MAX_POOL_SIZE};
use crate::topology::TopologyIndex;
use crate::types::{NodeType, Topology, SYSTEM_TAG_PREFIX};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// 负载均衡器监听端口的默认起点
pub const DEFAULT_LISTEN_BASE_PORT: u16 = 25080;
/// 后端入站端口的默认起点
pub const DEFAULT_BACKEND_BASE_PORT: u16 = 25100;
/// 每个组占用的后端端口数量
pub const BACKEND_STRIDE: u32 = MAX_POOL_SIZE as u32;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a 32 位哈希，按 UTF-16 码元计算
pub fn fnv1a32(input: &str) -> u32 {
    input.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// 为轮询节点分配 8 位十六进制标识，与已用标识冲突时用 `tag:counter` 重新哈希
pub fn synthetic_id(tag: &str, used: &mut HashSet<String>) -> String {
    let mut id = format!("{:08x}", fnv1a32(tag));
    let mut counter = used.len();
    while used.contains(&id) {
        id = format!("{:08x}", fnv1a32(&format!("{}:{}", tag, counter)));
        counter += 1;
    }
    used.insert(id.clone());
    id
}

/// 合成端口的分配起点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLayout {
    pub listen_base: u16,
    pub backend_base: u16,
}

impl Default for PortLayout {
    fn default() -> Self {
        Self {
            listen_base: DEFAULT_LISTEN_BASE_PORT,
            backend_base: DEFAULT_BACKEND_BASE_PORT,
        }
    }
}

impl PortLayout {
    /// 第 `group_index` 组的负载均衡器监听端口
    ///
    /// 监听端口必须低于后端端口起点，否则会与前面组的后端入站冲突。
    pub fn listen_port(&self, group_index: usize) -> Result<u16, CompileError> {
        let port = u32::from(self.listen_base) + group_index as u32;
        if self.listen_base < self.backend_base && port >= u32::from(self.backend_base) {
            return Err(CompileError::PortExhausted { group_index, port });
        }
        to_port(group_index, port)
    }

    /// 第 `group_index` 组的全部后端端口
    pub fn backend_ports(&self, group_index: usize, count: usize) -> Result<Vec<u16>, CompileError> {
        let base = u32::from(self.backend_base) + BACKEND_STRIDE * group_index as u32;
        (0..count as u32)
            .map(|offset| to_port(group_index, base + offset))
            .collect()
    }
}

fn to_port(group_index: usize, port: u32) -> Result<u16, CompileError> {
    u16::try_from(port).map_err(|_| CompileError::PortExhausted { group_index, port })
}

/// 一个轮询组的全部合成结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRobinGroup {
    /// 用户可见的轮询节点标签
    pub tag: String,
    /// 发现顺序（跳优先，再按节点顺序）
    pub group_index: usize,
    /// 8 位十六进制标识
    pub id: String,
    /// `sys-rr-<id>`
    pub base_tag: String,
    /// `sys-rr-<id>-lb`，替代轮询节点作为出站
    pub outbound_tag: String,
    pub listen_port: u16,
    /// `sys-rr-<id>-in-<k>`
    pub inbound_tags: Vec<String>,
    pub backend_ports: Vec<u16>,
    /// 池成员（下一跳）
    pub candidates: Vec<String>,
    /// 输出目标（隔一跳或互联网出口）
    pub output: Option<String>,
}

/// 全部轮询组以及由它们导出的标签映射
#[derive(Debug, Clone, Default)]
pub struct RoundRobinPlan {
    pub groups: Vec<RoundRobinGroup>,
    tag_map: HashMap<String, String>,
    candidate_outputs: IndexMap<String, String>,
}

impl RoundRobinPlan {
    /// 按跳顺序发现轮询节点并分配标识与端口
    ///
    /// 拓扑应已规范化；池大小、候选类型、端口范围和输出冲突在这里检查。
    pub fn build(topology: &Topology, index: &TopologyIndex, ports: PortLayout) -> Result<Self, CompileError> {
        let mut plan = RoundRobinPlan::default();
        let mut used_ids = HashSet::new();

        for (hop, node) in topology.placed_nodes() {
            if node.tag.is_empty() || index.placed_type(&node.tag) != Some(NodeType::Roundrobin) {
                continue;
            }

            let edges = index.split_round_robin(hop, &node.detours);
            let size = edges.pool.len();
            if !(2..=MAX_POOL_SIZE).contains(&size) {
                return Err(CompileError::RoundRobinPoolSize {
                    tag: node.tag.clone(),
                    size,
                });
            }

            if edges.output.is_some() {
                for candidate in &edges.pool {
                    if let Some(candidate_type) = index.placed_type(candidate) {
                        if candidate_type.is_aggregator() {
                            return Err(CompileError::RoundRobinOutputType {
                                candidate: candidate.clone(),
                                candidate_type,
                            });
                        }
                    }
                }
            }

            let group_index = plan.groups.len();
            let id = synthetic_id(&node.tag, &mut used_ids);
            let base_tag = format!("{}{}", SYSTEM_TAG_PREFIX, id);
            let outbound_tag = format!("{}-lb", base_tag);
            let listen_port = ports.listen_port(group_index)?;
            let backend_ports = ports.backend_ports(group_index, size)?;
            let inbound_tags = (0..size).map(|k| format!("{}-in-{}", base_tag, k)).collect();

            log::debug!(
                "Round Robin {} -> {} (listen {}, {} backends)",
                node.tag,
                outbound_tag,
                listen_port,
                size
            );

            plan.tag_map.insert(node.tag.clone(), outbound_tag.clone());
            plan.groups.push(RoundRobinGroup {
                tag: node.tag.clone(),
                group_index,
                id,
                base_tag,
                outbound_tag,
                listen_port,
                inbound_tags,
                backend_ports,
                candidates: edges.pool.into_iter().collect(),
                output: edges.output,
            });
        }

        plan.assign_candidate_outputs()?;
        Ok(plan)
    }

    fn assign_candidate_outputs(&mut self) -> Result<(), CompileError> {
        let mut assigned: IndexMap<String, String> = IndexMap::new();
        for group in &self.groups {
            let Some(output) = &group.output else {
                continue;
            };
            let mapped = self.map_tag(output).to_string();
            for candidate in &group.candidates {
                match assigned.get(candidate) {
                    Some(previous) if *previous != mapped => {
                        return Err(CompileError::ConflictingOutput {
                            candidate: candidate.clone(),
                            first: previous.clone(),
                            second: mapped,
                        });
                    }
                    _ => {
                        assigned.insert(candidate.clone(), mapped.clone());
                    }
                }
            }
        }
        self.candidate_outputs = assigned;
        Ok(())
    }

    /// 把轮询节点标签改写为其负载均衡出站标签，其他标签原样返回
    pub fn map_tag<'a>(&'a self, tag: &'a str) -> &'a str {
        self.tag_map.get(tag).map(String::as_str).unwrap_or(tag)
    }

    /// 被托管候选节点的输出（已经过 `map_tag`）
    pub fn output_for(&self, candidate: &str) -> Option<&str> {
        self.candidate_outputs.get(candidate).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
