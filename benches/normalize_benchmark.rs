//! 规范化与连线校验基准测试

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hopchain::types::{Inbound, Layer, NodeDefinition, NodeType, PlacedNode, Topology, INTERNET_TAG};
use hopchain::{can_link, normalize};

/// 每跳 `width` 个节点、全部连向下一跳的拓扑（大部分出边需要被修剪）
fn dense_topology(hops: usize, width: usize) -> Topology {
    let mut library = vec![NodeDefinition::internet()];
    let mut layers = Vec::new();
    for hop in 0..hops {
        let next: Vec<String> = if hop + 1 < hops {
            (0..width).map(|i| format!("h{}-{}", hop + 1, i)).collect()
        } else {
            vec![INTERNET_TAG.to_string()]
        };
        let nodes = (0..width)
            .map(|i| {
                let tag = format!("h{}-{}", hop, i);
                let node_type = if i % 4 == 0 {
                    NodeType::Selector
                } else {
                    NodeType::Shadowsocks
                };
                library.push(NodeDefinition::new(tag.clone(), node_type));
                PlacedNode::new(tag).with_detours(next.iter().cloned())
            })
            .collect();
        layers.push(Layer::new(format!("l{}", hop), format!("HOP {}", hop + 1)).with_nodes(nodes));
    }

    Topology {
        layers,
        node_library: library,
        inbounds: vec![Inbound::new("in1", 1080).with_detours(["h0-0", "h0-1", "h1-0"])],
    }
}

/// 基准测试首次规范化（需要修剪）
fn bench_normalize(c: &mut Criterion) {
    let topology = dense_topology(6, 50);
    c.bench_function("normalize_dense", |b| {
        b.iter(|| {
            let mut copy = topology.clone();
            black_box(normalize(&mut copy))
        })
    });

    let mut clean = topology.clone();
    normalize(&mut clean);
    c.bench_function("normalize_clean", |b| {
        b.iter(|| {
            let mut copy = clean.clone();
            black_box(normalize(&mut copy))
        })
    });
}

/// 基准测试连线校验
fn bench_can_link(c: &mut Criterion) {
    let topology = dense_topology(6, 50);
    c.bench_function("can_link", |b| {
        b.iter(|| {
            black_box(can_link(
                black_box(&topology),
                black_box("h2-3"),
                black_box("h3-7"),
                false,
            ))
        })
    });
}

criterion_group!(benches, bench_normalize, bench_can_link);
criterion_main!(benches);
