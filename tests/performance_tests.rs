//! 性能测试模块
//! 测试大拓扑下规范化和编译的耗时

use hopchain::types::{Inbound, Layer, NodeDefinition, NodeType, PlacedNode, Topology, INTERNET_TAG};
use hopchain::{compile, normalize};
use std::time::{Duration, Instant};

mod test_utils;
use test_utils::vless;

/// `hops` 跳、每跳 `width` 个协议节点的全连接拓扑，偶数跳额外放一个轮询节点
fn wide_topology(hops: usize, width: usize) -> Topology {
    let mut library = vec![NodeDefinition::internet()];
    let mut layers = Vec::new();

    for hop in 0..hops {
        let mut nodes = Vec::new();
        let next: Vec<String> = if hop + 1 < hops {
            (0..width).map(|i| format!("h{}-n{}", hop + 1, i)).collect()
        } else {
            vec![INTERNET_TAG.to_string()]
        };

        for i in 0..width {
            let tag = format!("h{}-n{}", hop, i);
            library.push(vless(&tag));
            nodes.push(PlacedNode::new(tag).with_detours(next.iter().cloned()));
        }

        if hop % 2 == 0 && hop + 1 < hops {
            let tag = format!("rr{}", hop);
            library.push(NodeDefinition::new(tag.clone(), NodeType::Roundrobin));
            nodes.push(PlacedNode::new(tag).with_detours(next.iter().take(8).cloned()));
        }

        layers.push(Layer::new(format!("l{}", hop), format!("HOP {}", hop + 1)).with_nodes(nodes));
    }

    let entries: Vec<String> = (0..width).map(|i| format!("h0-n{}", i)).collect();
    Topology {
        layers,
        node_library: library,
        inbounds: vec![
            Inbound::new("in1", 1080).with_detours(entries.iter().cloned()),
            Inbound::new("in2", 1081).with_detours(entries.iter().take(1).cloned()),
        ],
    }
}

#[test]
fn test_normalize_large_topology() {
    let mut topology = wide_topology(8, 40);

    let start = Instant::now();
    normalize(&mut topology);
    let first = start.elapsed();

    let start = Instant::now();
    assert!(!normalize(&mut topology));
    let second = start.elapsed();

    println!("normalize: first {:?}, second {:?}", first, second);
    assert!(first < Duration::from_secs(2));
    assert!(second < Duration::from_secs(2));
}

#[test]
fn test_compile_large_topology() {
    let topology = wide_topology(8, 40);

    let start = Instant::now();
    let config = compile(&topology).unwrap();
    let elapsed = start.elapsed();

    println!(
        "compile: {:?} ({} outbounds, {} inbounds)",
        elapsed,
        config.outbounds.len(),
        config.inbounds.len()
    );
    assert_eq!(config.balancer_groups().len(), 4);
    assert!(elapsed < Duration::from_secs(2));
}

#[test]
fn test_repeated_compile() {
    let topology = wide_topology(4, 16);
    let iterations = 200;

    let start = Instant::now();
    for _ in 0..iterations {
        compile(&topology).unwrap();
    }
    let elapsed = start.elapsed();

    println!("{} compiles in {:?}", iterations, elapsed);
    assert!(elapsed < Duration::from_secs(10));
}
