//! 拓扑索引
//!
//! 每次操作开始时构建一次：标签 → 跳序号、标签 → 实际类型。连线校验、
//! 规范化和编译共享这里的跳距离判断，避免各自临时推导。

use crate::types::{NodeType, Topology, INTERNET_TAG};
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

/// 标签到跳序号和类型的只读索引
#[derive(Debug, Clone, Default)]
pub struct TopologyIndex {
    hops: HashMap<String, usize>,
    placed_types: HashMap<String, NodeType>,
    library_types: HashMap<String, NodeType>,
    hop_count: usize,
}

/// 轮询节点出边拆分结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundRobinEdges {
    /// 池成员（下一跳中的唯一目标，保持插入顺序）
    pub pool: IndexSet<String>,
    /// 第一个合法输出
    pub output: Option<String>,
}

impl RoundRobinEdges {
    /// 规范化后的出边：池 ++ [输出]
    pub fn into_detours(self) -> Vec<String> {
        let mut detours: Vec<String> = self.pool.into_iter().collect();
        detours.extend(self.output);
        detours
    }
}

impl TopologyIndex {
    /// 构建索引；同一标签多次放置时以首次出现为准
    pub fn build(topology: &Topology) -> Self {
        let mut hops = HashMap::new();
        let mut placed_types = HashMap::new();
        for (hop, node) in topology.placed_nodes() {
            if node.tag.is_empty() || hops.contains_key(&node.tag) {
                continue;
            }
            hops.insert(node.tag.clone(), hop);
            placed_types.insert(node.tag.clone(), topology.resolved_type(node));
        }

        let mut library_types = HashMap::new();
        for definition in &topology.node_library {
            library_types
                .entry(definition.tag.clone())
                .or_insert(definition.node_type);
        }

        Self {
            hops,
            placed_types,
            library_types,
            hop_count: topology.hop_count(),
        }
    }

    pub fn hop_count(&self) -> usize {
        self.hop_count
    }

    /// 标签所在跳；未放置（包括互联网出口）时为 None
    pub fn hop_of(&self, tag: &str) -> Option<usize> {
        self.hops.get(tag).copied()
    }

    pub fn in_hop(&self, tag: &str, hop: usize) -> bool {
        self.hop_of(tag) == Some(hop)
    }

    /// 放置节点的实际类型
    pub fn placed_type(&self, tag: &str) -> Option<NodeType> {
        self.placed_types.get(tag).copied()
    }

    /// 连线目标的类型：先看放置节点，再看节点库
    pub fn target_type(&self, tag: &str) -> Option<NodeType> {
        self.placed_type(tag)
            .or_else(|| self.library_types.get(tag).copied())
    }

    pub fn is_last_hop(&self, hop: usize) -> bool {
        hop + 1 == self.hop_count
    }

    pub fn is_second_to_last_hop(&self, hop: usize) -> bool {
        hop + 2 == self.hop_count
    }

    /// 非轮询节点的合法目标：下一跳，或最后一跳时的互联网出口
    pub fn is_adjacent_target(&self, source_hop: usize, tag: &str) -> bool {
        if tag == INTERNET_TAG {
            return self.is_last_hop(source_hop);
        }
        self.in_hop(tag, source_hop + 1)
    }

    /// 轮询节点的输出类目标：隔一跳，或池位于最后一跳时的互联网出口
    pub fn is_output_target(&self, source_hop: usize, tag: &str) -> bool {
        if tag == INTERNET_TAG {
            return self.is_second_to_last_hop(source_hop);
        }
        self.in_hop(tag, source_hop + 2)
    }

    /// 拆分轮询节点的出边
    pub fn split_round_robin(&self, source_hop: usize, detours: &[String]) -> RoundRobinEdges {
        let unique = unique_tags(detours);
        let pool = unique
            .iter()
            .filter(|tag| self.in_hop(tag, source_hop + 1))
            .cloned()
            .collect();
        let output = unique
            .iter()
            .find(|tag| self.is_output_target(source_hop, tag))
            .cloned();
        RoundRobinEdges { pool, output }
    }

    /// 按节点角色计算合法出边
    pub fn legal_detours(&self, source_hop: usize, node_type: NodeType, detours: &[String]) -> Vec<String> {
        if node_type == NodeType::Roundrobin {
            return self.split_round_robin(source_hop, detours).into_detours();
        }

        let mut legal = unique_tags(detours)
            .into_iter()
            .filter(|tag| self.is_adjacent_target(source_hop, tag));
        if node_type.is_selector_like() {
            legal.collect()
        } else {
            legal.next().into_iter().collect()
        }
    }
}

/// 去重并丢弃空标签，保持首次出现的顺序
pub fn unique_tags<S: AsRef<str>>(tags: &[S]) -> IndexSet<String> {
    tags.iter()
        .map(AsRef::as_ref)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// 被托管的池成员：所属轮询节点已经配置了输出，这些节点不能再有自己的出边
pub fn managed_pool_members(topology: &Topology, index: &TopologyIndex) -> HashSet<String> {
    let mut managed = HashSet::new();
    for (hop, node) in topology.placed_nodes() {
        if index.placed_type(&node.tag) != Some(NodeType::Roundrobin) {
            continue;
        }
        let edges = index.split_round_robin(hop, &node.detours);
        if edges.output.is_some() {
            managed.extend(edges.pool);
        }
    }
    managed
}
