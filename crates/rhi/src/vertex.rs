//! Vertex data structures and input descriptions.
//!
//! Pipelines take their vertex input layout from a type implementing
//! [`VertexInput`], so the pipeline code never hard-codes a vertex format.
//!
//! # Vertex Types
//!
//! - [`Vertex`] - 2D position and RGB color

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Binding and attribute layout of a vertex type.
pub trait VertexInput: Pod {
    fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription>;
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

/// Vertex with a 2D position and an RGB color.
///
/// # Memory Layout
///
/// - Offset 0: position (8 bytes)
/// - Offset 8: color (12 bytes)
/// - Total size: 20 bytes
///
/// # Shader Locations
///
/// - location 0: position (vec2)
/// - location 1: color (vec3)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec2, color: Vec3) -> Self {
        Self { position, color }
    }
}

impl VertexInput for Vertex {
    fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
        ]
    }
}
