//! 拓扑编辑操作
//!
//! 节点库、放置、跳和入站的增删改。每个操作先完成全部校验再修改拓扑，
//! 被拒绝时拓扑保持原样。连线的新增见 [`crate::link`]。

use crate::error::{ChainError, Result};
use crate::types::{
    is_reserved_tag, Inbound, Layer, NodeDefinition, PlacedNode, Topology, INTERNET_TAG,
    SYSTEM_TAG_PREFIX,
};

/// 删除标签引用的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// 被删除的放置节点数量
    pub placements_removed: usize,
    /// 被删除的出边数量（放置节点与入站）
    pub links_removed: usize,
}

fn check_reserved(tag: &str) -> Result<()> {
    if !is_reserved_tag(tag) {
        return Ok(());
    }
    if tag == INTERNET_TAG {
        return Err(ChainError::invalid_parameter(
            "The \"direct\" tag is reserved.",
        ));
    }
    Err(ChainError::invalid_parameter(format!(
        "Tags starting with \"{}\" are reserved.",
        SYSTEM_TAG_PREFIX
    )))
}

/// 生成 `prefix-n` 形式、在 `existing` 中未出现的标识
fn next_id(prefix: &str, existing: &[&str]) -> String {
    let mut n = existing.len() + 1;
    loop {
        let candidate = format!("{}-{}", prefix, n);
        if !existing.contains(&candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

impl Topology {
    /// 新增或更新节点库定义
    ///
    /// `original_tag` 是被编辑定义的原标签；为 `None` 时按新建处理。
    /// 改名会同步到放置节点、出边、入站出边和选择器默认项。
    pub fn upsert_definition(&mut self, mut definition: NodeDefinition, original_tag: Option<&str>) -> Result<()> {
        let original = original_tag.unwrap_or(&definition.tag).to_string();

        if definition.tag.trim().is_empty() {
            return Err(ChainError::invalid_parameter("Tag cannot be empty"));
        }
        check_reserved(&definition.tag)?;
        check_reserved(&original)?;

        if original != definition.tag && self.resolve_node_definition(&definition.tag).is_some() {
            return Err(ChainError::invalid_parameter(
                "Tag already exists. Choose another one.",
            ));
        }

        let new_tag = definition.tag.clone();
        match self
            .node_library
            .iter()
            .position(|existing| existing.tag == original)
        {
            Some(index) => {
                if definition.id.is_empty() {
                    definition.id = self.node_library[index].id.clone();
                }
                self.node_library[index] = definition;
            }
            None => {
                if definition.id.is_empty() {
                    definition.id = format!("lib-{}", definition.tag);
                }
                self.node_library.push(definition);
            }
        }

        self.apply_tag_change(&original, &new_tag);
        log::info!("Saved node {}", new_tag);
        Ok(())
    }

    /// 重命名节点库中的标签
    pub fn rename_tag(&mut self, old_tag: &str, new_tag: &str) -> Result<()> {
        let mut definition = self
            .resolve_node_definition(old_tag)
            .cloned()
            .ok_or_else(|| ChainError::not_found(format!("Node \"{}\" not found", old_tag)))?;
        definition.tag = new_tag.to_string();
        self.upsert_definition(definition, Some(old_tag))
    }

    fn apply_tag_change(&mut self, old_tag: &str, new_tag: &str) {
        if old_tag.is_empty() || old_tag == new_tag {
            return;
        }
        let rename = |tag: &mut String| {
            if *tag == old_tag {
                *tag = new_tag.to_string();
            }
        };

        for node in self.layers.iter_mut().flat_map(|layer| layer.nodes.iter_mut()) {
            rename(&mut node.tag);
            node.detours.iter_mut().for_each(rename);
        }
        for inbound in &mut self.inbounds {
            inbound.detours.iter_mut().for_each(rename);
            if let Some(default) = inbound.selector_default.as_mut() {
                rename(default);
            }
        }
    }

    /// 删除某标签的全部放置和指向它的出边
    pub fn remove_tag_references(&mut self, tag: &str) -> RemovalReport {
        let mut report = RemovalReport::default();
        if tag.is_empty() {
            return report;
        }

        for layer in &mut self.layers {
            let before = layer.nodes.len();
            layer.nodes.retain(|node| node.tag != tag);
            report.placements_removed += before - layer.nodes.len();

            for node in &mut layer.nodes {
                let before = node.detours.len();
                node.detours.retain(|detour| detour != tag);
                report.links_removed += before - node.detours.len();
            }
        }

        for inbound in &mut self.inbounds {
            let before = inbound.detours.len();
            inbound.detours.retain(|detour| detour != tag);
            report.links_removed += before - inbound.detours.len();

            if inbound.selector_default.as_deref() == Some(tag) {
                inbound.selector_default = inbound.detours.first().cloned();
            }
        }

        report
    }

    /// 删除节点库定义及其全部引用
    pub fn delete_definition(&mut self, tag: &str) -> Result<RemovalReport> {
        if tag == INTERNET_TAG {
            return Err(ChainError::invalid_parameter(
                "Cannot delete the \"direct\" node.",
            ));
        }
        check_reserved(tag)?;
        if self.resolve_node_definition(tag).is_none() {
            return Err(ChainError::not_found(format!("Node \"{}\" not found", tag)));
        }

        let report = self.remove_tag_references(tag);
        self.node_library.retain(|definition| definition.tag != tag);
        log::info!(
            "Deleted library node {} (removed {} placement(s), {} link(s))",
            tag,
            report.placements_removed,
            report.links_removed
        );
        Ok(report)
    }

    fn layer_position(&self, layer_id: &str) -> Result<usize> {
        self.layers
            .iter()
            .position(|layer| layer.id == layer_id)
            .ok_or_else(|| ChainError::not_found(format!("Layer {} not found", layer_id)))
    }

    /// 把节点库中的节点放到某一跳，返回放置节点的标识
    pub fn place_node(&mut self, layer_id: &str, tag: &str) -> Result<String> {
        let position = self.layer_position(layer_id)?;
        if tag == INTERNET_TAG {
            return Err(ChainError::invalid_parameter(
                "Cannot place the \"direct\" node. Use the Internet node instead.",
            ));
        }
        if self.resolve_node_definition(tag).is_none() {
            return Err(ChainError::not_found(format!("Node \"{}\" not found", tag)));
        }
        if self.is_placed(tag) {
            return Err(ChainError::invalid_parameter(format!(
                "Node \"{}\" is already placed. Duplicate placements are not allowed.",
                tag
            )));
        }

        let existing: Vec<&str> = self.placed_nodes().map(|(_, node)| node.id.as_str()).collect();
        let id = next_id("node", &existing);
        let mut node = PlacedNode::new(tag);
        node.id = id.clone();
        self.layers[position].nodes.push(node);
        log::info!("Added {} to layer {}", tag, layer_id);
        Ok(id)
    }

    /// 删除某一跳中的放置节点
    pub fn remove_placement(&mut self, layer_id: &str, node_id: &str) -> Result<()> {
        let position = self.layer_position(layer_id)?;
        let nodes = &mut self.layers[position].nodes;
        let before = nodes.len();
        nodes.retain(|node| node.id != node_id);
        if nodes.len() == before {
            return Err(ChainError::not_found(format!(
                "Node {} not found in layer {}",
                node_id, layer_id
            )));
        }
        log::info!("Deleted node from layer {}", layer_id);
        Ok(())
    }

    /// 把放置节点移动到另一跳的末尾
    pub fn move_node(&mut self, node_id: &str, to_layer_id: &str) -> Result<()> {
        let target = self.layer_position(to_layer_id)?;
        let (source, index) = self
            .layers
            .iter()
            .enumerate()
            .find_map(|(layer_index, layer)| {
                layer
                    .nodes
                    .iter()
                    .position(|node| node.id == node_id)
                    .map(|index| (layer_index, index))
            })
            .ok_or_else(|| ChainError::not_found(format!("Node {} not found", node_id)))?;

        let node = self.layers[source].nodes.remove(index);
        self.layers[target].nodes.push(node);
        Ok(())
    }

    /// 调整跳的顺序
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<()> {
        let count = self.layers.len();
        if from >= count || to >= count {
            return Err(ChainError::invalid_parameter(format!(
                "Layer index out of range (have {} layers)",
                count
            )));
        }
        if from != to {
            let layer = self.layers.remove(from);
            self.layers.insert(to, layer);
        }
        Ok(())
    }

    /// 新增一跳：已有多跳时插在最后一跳之前，返回其标识
    pub fn add_layer(&mut self, title: &str) -> String {
        let existing: Vec<&str> = self.layers.iter().map(|layer| layer.id.as_str()).collect();
        let id = next_id("layer", &existing);
        let title = if title.trim().is_empty() { "Layer" } else { title };
        let layer = Layer::new(id.clone(), title);
        if self.layers.len() > 1 {
            let last = self.layers.len() - 1;
            self.layers.insert(last, layer);
        } else {
            self.layers.push(layer);
        }
        log::info!("Added new layer {}", id);
        id
    }

    /// 删除一跳及其中的放置节点
    pub fn remove_layer(&mut self, layer_id: &str) -> Result<()> {
        let position = self.layer_position(layer_id)?;
        self.layers.remove(position);
        log::info!("Deleted layer {}", layer_id);
        Ok(())
    }

    fn check_inbound_slot(&self, tag: &str, port: u16, exclude: Option<&str>) -> Result<()> {
        if port == 0 {
            return Err(ChainError::invalid_parameter(
                "Invalid port. Must be 1-65535.",
            ));
        }
        let others = || {
            self.inbounds
                .iter()
                .filter(move |inbound| Some(inbound.tag.as_str()) != exclude)
        };
        if others().any(|inbound| inbound.tag == tag) {
            return Err(ChainError::invalid_parameter("Inbound tag already exists"));
        }
        if others().any(|inbound| inbound.port == port) {
            return Err(ChainError::invalid_parameter(format!(
                "Inbound port {} is already in use",
                port
            )));
        }
        Ok(())
    }

    /// 新增入站，标签缺省为 `mixed-<port>`，返回最终标签
    pub fn add_inbound(&mut self, tag: Option<&str>, port: u16) -> Result<String> {
        let tag = match tag.map(str::trim) {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => format!("mixed-{}", port),
        };
        self.check_inbound_slot(&tag, port, None)?;
        self.inbounds.push(Inbound::new(tag.clone(), port));
        log::info!("Added inbound {} on port {}", tag, port);
        Ok(tag)
    }

    /// 修改入站的标签和端口
    pub fn update_inbound(&mut self, tag: &str, new_tag: Option<&str>, port: u16) -> Result<()> {
        if self.inbound(tag).is_none() {
            return Err(ChainError::not_found(format!("Inbound {} not found", tag)));
        }
        let new_tag = match new_tag.map(str::trim) {
            Some(new_tag) if !new_tag.is_empty() => new_tag.to_string(),
            _ => tag.to_string(),
        };
        self.check_inbound_slot(&new_tag, port, Some(tag))?;

        if let Some(inbound) = self.inbound_mut(tag) {
            inbound.tag = new_tag.clone();
            inbound.port = port;
        }
        log::info!("Updated inbound {}", new_tag);
        Ok(())
    }

    /// 删除入站
    pub fn delete_inbound(&mut self, tag: &str) -> Result<()> {
        let before = self.inbounds.len();
        self.inbounds.retain(|inbound| inbound.tag != tag);
        if self.inbounds.len() == before {
            return Err(ChainError::not_found(format!("Inbound {} not found", tag)));
        }
        log::info!("Deleted inbound {}", tag);
        Ok(())
    }

    /// 设置入站选择器的默认项，目标必须是入站的出边之一
    pub fn set_selector_default(&mut self, inbound_tag: &str, target: &str) -> Result<()> {
        let inbound = self
            .inbound_mut(inbound_tag)
            .ok_or_else(|| ChainError::not_found(format!("Inbound {} not found", inbound_tag)))?;
        if !inbound.detours.iter().any(|detour| detour == target) {
            return Err(ChainError::invalid_parameter(format!(
                "{} is not connected to inbound {}",
                target, inbound_tag
            )));
        }
        inbound.selector_default = Some(target.to_string());
        log::info!("Selector {} default set to {}", inbound.selector_tag(), target);
        Ok(())
    }

    /// 删除一条出边，返回是否确实存在该出边
    pub fn unlink(&mut self, source: &str, target: &str, source_is_inbound: bool) -> Result<bool> {
        if source_is_inbound {
            let inbound = self
                .inbound_mut(source)
                .ok_or_else(|| ChainError::not_found(format!("Inbound {} not found", source)))?;
            let before = inbound.detours.len();
            inbound.detours.retain(|detour| detour != target);
            if inbound.selector_default.as_deref() == Some(target) {
                inbound.selector_default = inbound.detours.first().cloned();
            }
            return Ok(inbound.detours.len() != before);
        }

        let node = self
            .find_placed_mut(source)
            .ok_or_else(|| ChainError::not_found(format!("Node {} is not placed", source)))?;
        let before = node.detours.len();
        node.detours.retain(|detour| detour != target);
        Ok(node.detours.len() != before)
    }
}
