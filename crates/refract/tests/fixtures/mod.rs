// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixture types for the integration tests: a small scene-graph
//! vocabulary with plain fields, embedded values, arrays, shared
//! references, an inheritance chain and an external block.

#![allow(dead_code)]

use std::sync::Arc;

use refract::compare::CompareOverride;
use refract::impl_reflectable;
use refract::rtti::{
    ExternalBlock, FieldDescriptor, InstanceId, InstancePool, Reflectable, TypeDescriptor,
    TypeDescriptorBuilder, TypeRegistry,
};
use refract::ser::{BinaryDecoder, BinaryEncoder, DecodeOptions, EncodeOptions};
use refract::stream::MemoryStream;

pub const TID_VEC3: u32 = 100;
pub const TID_MATERIAL: u32 = 101;
pub const TID_MESH: u32 = 102;
pub const TID_ENTITY: u32 = 110;
pub const TID_NODE: u32 = 111;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl_reflectable!(Vec3, TID_VEC3);

pub fn vec3(x: f32, y: f32, z: f32) -> Vec3 {
    Vec3 { x, y, z }
}

#[derive(Debug, Default)]
pub struct Material {
    pub name: String,
    pub albedo: Vec3,
    pub roughness: f32,
}

impl_reflectable!(Material, TID_MATERIAL);

#[derive(Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub material: Option<InstanceId>,
    pub payload: ExternalBlock,
}

impl_reflectable!(Mesh, TID_MESH);

/// Concrete type registered as two descriptor levels: an `Entity` base
/// (name, visibility) and the `Node` level itself.
#[derive(Debug, Default)]
pub struct Node {
    pub name: String,
    pub visible: bool,
    pub position: Vec3,
    pub parent: Option<InstanceId>,
    pub children: Vec<Option<InstanceId>>,
}

impl_reflectable!(Node, TID_NODE);

fn vec3_factory() -> Box<dyn Reflectable> {
    Box::new(Vec3::default())
}

fn material_factory() -> Box<dyn Reflectable> {
    Box::new(Material::default())
}

fn mesh_factory() -> Box<dyn Reflectable> {
    Box::new(Mesh::default())
}

fn node_factory() -> Box<dyn Reflectable> {
    Box::new(Node::default())
}

fn vec3_descriptor(compare: Option<Arc<dyn CompareOverride>>) -> TypeDescriptor {
    let mut builder = TypeDescriptorBuilder::new(TID_VEC3, "Vec3", vec3_factory)
        .field(FieldDescriptor::plain::<Vec3, f32, _, _>(
            0,
            "x",
            |v| &v.x,
            |v, value| v.x = value,
        ))
        .field(FieldDescriptor::plain::<Vec3, f32, _, _>(
            1,
            "y",
            |v| &v.y,
            |v, value| v.y = value,
        ))
        .field(FieldDescriptor::plain::<Vec3, f32, _, _>(
            2,
            "z",
            |v| &v.z,
            |v, value| v.z = value,
        ));
    if let Some(handler) = compare {
        builder = builder.compare_with(handler);
    }
    builder.build().unwrap()
}

fn material_descriptor() -> TypeDescriptor {
    TypeDescriptorBuilder::new(TID_MATERIAL, "Material", material_factory)
        .field(FieldDescriptor::plain::<Material, String, _, _>(
            0,
            "name",
            |m| &m.name,
            |m, v| m.name = v,
        ))
        .field(FieldDescriptor::embedded::<Material, Vec3, _, _>(
            1,
            "albedo",
            |m| &m.albedo,
            |m, v| m.albedo = v,
        ))
        .field(FieldDescriptor::plain::<Material, f32, _, _>(
            2,
            "roughness",
            |m| &m.roughness,
            |m, v| m.roughness = v,
        ))
        .build()
        .unwrap()
}

fn mesh_descriptor() -> TypeDescriptor {
    TypeDescriptorBuilder::new(TID_MESH, "Mesh", mesh_factory)
        .field(FieldDescriptor::embedded_array::<Mesh, Vec3, _, _, _, _>(
            0,
            "vertices",
            |m| m.vertices.len(),
            |m, n| m.vertices.resize_with(n, Default::default),
            |m, i| &m.vertices[i],
            |m, i, v| m.vertices[i] = v,
        ))
        .field(FieldDescriptor::plain_array::<Mesh, u32, _, _, _, _>(
            1,
            "indices",
            |m| m.indices.len(),
            |m, n| m.indices.resize(n, 0),
            |m, i| &m.indices[i],
            |m, i, v| m.indices[i] = v,
        ))
        .field(FieldDescriptor::shared_ref::<Mesh, _, _>(
            2,
            "material",
            |m| m.material,
            |m, v| m.material = v,
        ))
        .field(FieldDescriptor::external_block::<Mesh, _, _>(
            3,
            "payload",
            |m| m.payload.clone(),
            |m, v| m.payload = v,
        ))
        .build()
        .unwrap()
}

fn entity_descriptor() -> TypeDescriptor {
    TypeDescriptorBuilder::new(TID_ENTITY, "Entity", node_factory)
        .field(FieldDescriptor::plain::<Node, String, _, _>(
            0,
            "name",
            |n| &n.name,
            |n, v| n.name = v,
        ))
        .field(FieldDescriptor::plain::<Node, bool, _, _>(
            1,
            "visible",
            |n| &n.visible,
            |n, v| n.visible = v,
        ))
        .build()
        .unwrap()
}

fn node_descriptor() -> TypeDescriptor {
    TypeDescriptorBuilder::new(TID_NODE, "Node", node_factory)
        .parent(TID_ENTITY)
        .field(FieldDescriptor::embedded::<Node, Vec3, _, _>(
            0,
            "position",
            |n| &n.position,
            |n, v| n.position = v,
        ))
        .field(FieldDescriptor::shared_ref::<Node, _, _>(
            1,
            "parent",
            |n| n.parent,
            |n, v| n.parent = v,
        ))
        .field(FieldDescriptor::shared_ref_array::<Node, _, _, _, _>(
            2,
            "children",
            |n| n.children.len(),
            |n, len| n.children.resize(len, None),
            |n, i| n.children[i],
            |n, i, v| n.children[i] = v,
        ))
        .build()
        .unwrap()
}

/// Fresh registry with the whole fixture vocabulary installed.
pub fn scene_registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    registry.register(vec3_descriptor(None)).unwrap();
    registry.register(material_descriptor()).unwrap();
    registry.register(mesh_descriptor()).unwrap();
    registry.register(entity_descriptor()).unwrap();
    registry.register(node_descriptor()).unwrap();
    registry
}

/// Like [`scene_registry`], with component-wise tolerance equality on
/// `Vec3`.
pub fn scene_registry_with_tolerance(epsilon: f32) -> TypeRegistry {
    struct Tolerance(f32);
    impl CompareOverride for Tolerance {
        fn equals(&self, a: &dyn Reflectable, b: &dyn Reflectable) -> bool {
            let (Some(a), Some(b)) = (
                a.as_any().downcast_ref::<Vec3>(),
                b.as_any().downcast_ref::<Vec3>(),
            ) else {
                return false;
            };
            (a.x - b.x).abs() <= self.0 && (a.y - b.y).abs() <= self.0 && (a.z - b.z).abs() <= self.0
        }
    }

    let registry = TypeRegistry::new();
    registry
        .register(vec3_descriptor(Some(Arc::new(Tolerance(epsilon)))))
        .unwrap();
    registry.register(material_descriptor()).unwrap();
    registry.register(mesh_descriptor()).unwrap();
    registry.register(entity_descriptor()).unwrap();
    registry.register(node_descriptor()).unwrap();
    registry
}

pub fn encode_bytes(
    registry: &TypeRegistry,
    pool: &InstancePool,
    root: InstanceId,
    options: &EncodeOptions<'_>,
) -> Vec<u8> {
    let mut stream = MemoryStream::new();
    BinaryEncoder::new(registry)
        .encode(pool, root, &mut stream, options)
        .unwrap();
    stream.into_inner()
}

pub fn decode_bytes(
    registry: &TypeRegistry,
    bytes: &[u8],
    options: &DecodeOptions<'_>,
) -> (InstancePool, InstanceId) {
    let mut stream = MemoryStream::from_vec(bytes.to_vec());
    BinaryDecoder::new(registry)
        .decode(&mut stream, bytes.len() as u32, options)
        .unwrap()
}
