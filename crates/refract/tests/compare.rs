// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

mod fixtures;

use fixtures::*;

use refract::compare::BinaryCompare;
use refract::rtti::{ExternalBlock, InstancePool};
use refract::stream::{share, MemoryStream};

fn material_pool(name: &str, albedo: Vec3) -> (InstancePool, refract::rtti::InstanceId) {
    let mut pool = InstancePool::new();
    let id = pool.insert(Box::new(Material {
        name: name.to_owned(),
        albedo,
        roughness: 0.5,
    }));
    (pool, id)
}

#[test]
fn equality_is_reflexive_and_symmetric() {
    let registry = scene_registry();
    let (pool_a, a) = material_pool("stone", vec3(0.4, 0.4, 0.4));
    let (pool_b, b) = material_pool("stone", vec3(0.4, 0.4, 0.4));
    let (pool_c, c) = material_pool("brick", vec3(0.4, 0.4, 0.4));

    let mut cmp = BinaryCompare::new(&registry);
    assert!(cmp.run(&pool_a, a, &pool_a, a).unwrap());
    assert!(cmp.run(&pool_a, a, &pool_b, b).unwrap());
    assert!(cmp.run(&pool_b, b, &pool_a, a).unwrap());
    assert!(!cmp.run(&pool_a, a, &pool_c, c).unwrap());
    assert!(!cmp.run(&pool_c, c, &pool_a, a).unwrap());
}

#[test]
fn embedded_field_difference_is_detected() {
    let registry = scene_registry();
    let (pool_a, a) = material_pool("stone", vec3(0.4, 0.4, 0.4));
    let (pool_b, b) = material_pool("stone", vec3(0.4, 0.4, 0.5));

    let mut cmp = BinaryCompare::new(&registry);
    assert!(!cmp.run(&pool_a, a, &pool_b, b).unwrap());
}

#[test]
fn array_count_mismatch_short_circuits() {
    let registry = scene_registry();
    let mut pool_a = InstancePool::new();
    let a = pool_a.insert(Box::new(Mesh {
        vertices: vec![vec3(0.0, 0.0, 0.0); 3],
        ..Default::default()
    }));
    let mut pool_b = InstancePool::new();
    let b = pool_b.insert(Box::new(Mesh {
        vertices: vec![vec3(0.0, 0.0, 0.0); 4],
        ..Default::default()
    }));

    let mut cmp = BinaryCompare::new(&registry);
    assert!(!cmp.run(&pool_a, a, &pool_b, b).unwrap());
}

#[test]
fn tolerance_override_absorbs_small_drift() {
    let registry = scene_registry_with_tolerance(0.001);
    let (pool_a, a) = material_pool("m", vec3(1.0, 0.0, 0.0));
    let (pool_b, b) = material_pool("m", vec3(1.0001, 0.0, 0.0));
    let (pool_c, c) = material_pool("m", vec3(1.5, 0.0, 0.0));

    let mut cmp = BinaryCompare::new(&registry);
    assert!(cmp.run(&pool_a, a, &pool_b, b).unwrap());
    assert!(!cmp.run(&pool_a, a, &pool_c, c).unwrap());

    // Without the override the drift is a real difference.
    let strict = scene_registry();
    let mut cmp = BinaryCompare::new(&strict);
    assert!(!cmp.run(&pool_a, a, &pool_b, b).unwrap());
}

fn cyclic_pool(child_name: &str) -> (InstancePool, refract::rtti::InstanceId) {
    let mut pool = InstancePool::new();
    let parent = pool.insert(Box::new(Node {
        name: "parent".to_owned(),
        ..Default::default()
    }));
    let child = pool.insert(Box::new(Node {
        name: child_name.to_owned(),
        parent: Some(parent),
        ..Default::default()
    }));
    pool.get_as_mut::<Node>(parent).unwrap().children = vec![Some(child)];
    (pool, parent)
}

#[test]
fn cycles_terminate_and_differences_still_surface() {
    let registry = scene_registry();
    let (pool_a, a) = cyclic_pool("child");
    let (pool_b, b) = cyclic_pool("child");
    let (pool_c, c) = cyclic_pool("changeling");

    let mut cmp = BinaryCompare::new(&registry);
    assert!(cmp.run(&pool_a, a, &pool_b, b).unwrap());
    assert!(!cmp.run(&pool_a, a, &pool_c, c).unwrap());
}

fn mesh_with_block(block: ExternalBlock) -> (InstancePool, refract::rtti::InstanceId) {
    let mut pool = InstancePool::new();
    let id = pool.insert(Box::new(Mesh {
        payload: block,
        ..Default::default()
    }));
    (pool, id)
}

#[test]
fn blocks_compare_by_payload_bytes() {
    let registry = scene_registry();
    let stream_a = share(MemoryStream::from_vec(vec![1, 2, 3, 4, 5, 6]));
    let stream_b = share(MemoryStream::from_vec(vec![9, 9, 3, 4, 5, 6]));

    // Same bytes at different offsets of different streams.
    let (pool_a, a) = mesh_with_block(ExternalBlock {
        stream: Some(stream_a.clone()),
        offset: 2,
        size: 4,
    });
    let (pool_b, b) = mesh_with_block(ExternalBlock {
        stream: Some(stream_b.clone()),
        offset: 2,
        size: 4,
    });
    let mut cmp = BinaryCompare::new(&registry);
    assert!(cmp.run(&pool_a, a, &pool_b, b).unwrap());

    // Different bytes.
    let (pool_c, c) = mesh_with_block(ExternalBlock {
        stream: Some(stream_b.clone()),
        offset: 0,
        size: 4,
    });
    assert!(!cmp.run(&pool_a, a, &pool_c, c).unwrap());

    // Size mismatch.
    let (pool_d, d) = mesh_with_block(ExternalBlock {
        stream: Some(stream_a.clone()),
        offset: 2,
        size: 3,
    });
    assert!(!cmp.run(&pool_a, a, &pool_d, d).unwrap());
}

#[test]
fn detached_blocks_compare_by_size_only() {
    let registry = scene_registry();
    let (pool_a, a) = mesh_with_block(ExternalBlock {
        stream: None,
        offset: 0,
        size: 8,
    });
    let (pool_b, b) = mesh_with_block(ExternalBlock {
        stream: None,
        offset: 100,
        size: 8,
    });
    let attached = share(MemoryStream::from_vec(vec![0; 16]));
    let (pool_c, c) = mesh_with_block(ExternalBlock {
        stream: Some(attached),
        offset: 0,
        size: 8,
    });

    let mut cmp = BinaryCompare::new(&registry);
    assert!(cmp.run(&pool_a, a, &pool_b, b).unwrap());
    // Attached vs detached is a real difference.
    assert!(!cmp.run(&pool_a, a, &pool_c, c).unwrap());
}
