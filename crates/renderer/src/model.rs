//! Demo geometry and its GPU buffers.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use tracing::debug;

use vkframe_core::config::DemoMesh;
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::device::Device;
use vkframe_rhi::vertex::Vertex;
use vkframe_rhi::{RhiError, RhiResult, vk};

/// CPU-side mesh: vertices plus optional 16-bit indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    /// Empty for a non-indexed mesh.
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Red, green and blue corners of a triangle centered on the origin.
    pub fn triangle() -> Self {
        Self {
            vertices: vec![
                Vertex::new(Vec2::new(0.0, -0.5), Vec3::new(1.0, 0.0, 0.0)),
                Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
                Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
            ],
            indices: Vec::new(),
        }
    }

    /// Indexed quad built from two triangles sharing a diagonal.
    pub fn quad() -> Self {
        Self {
            vertices: vec![
                Vertex::new(Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0)),
                Vertex::new(Vec2::new(0.5, -0.5), Vec3::new(0.0, 1.0, 0.0)),
                Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
                Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(1.0, 1.0, 1.0)),
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    pub fn for_demo(mesh: DemoMesh) -> Self {
        match mesh {
            DemoMesh::Triangle => Self::triangle(),
            DemoMesh::Quad => Self::quad(),
        }
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Checks that the mesh has at least three vertices and every index is
    /// in range.
    pub fn validate(&self) -> RhiResult<()> {
        if self.vertices.len() < 3 {
            return Err(RhiError::InvalidHandle(format!(
                "Mesh needs at least 3 vertices, got {}",
                self.vertices.len()
            )));
        }
        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&i| usize::from(i) >= self.vertices.len())
        {
            return Err(RhiError::InvalidHandle(format!(
                "Index {} out of range for {} vertices",
                bad,
                self.vertices.len()
            )));
        }
        Ok(())
    }
}

/// A mesh uploaded to vertex and index buffers.
pub struct Model {
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<Buffer>,
    index_count: u32,
}

impl Model {
    /// Uploads `mesh` into host-visible buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh is invalid or buffer creation fails.
    pub fn new(device: Arc<Device>, mesh: &MeshData) -> RhiResult<Self> {
        mesh.validate()?;

        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&mesh.vertices),
        )?;

        let index_buffer = if mesh.is_indexed() {
            Some(Buffer::new_with_data(
                device,
                BufferUsage::Index,
                bytemuck::cast_slice(&mesh.indices),
            )?)
        } else {
            None
        };

        debug!(
            "Model uploaded: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            vertex_count: mesh.vertices.len() as u32,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        })
    }

    pub fn bind(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        if let Some(index_buffer) = &self.index_buffer {
            cmd.bind_index_buffer(index_buffer.handle(), 0, vk::IndexType::UINT16);
        }
    }

    pub fn draw(&self, cmd: &CommandBuffer) {
        if self.index_buffer.is_some() {
            cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
        } else {
            cmd.draw(self.vertex_count, 1, 0, 0);
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_is_not_indexed() {
        let mesh = MeshData::triangle();
        assert_eq!(mesh.vertices.len(), 3);
        assert!(!mesh.is_indexed());
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_quad_indices() {
        let mesh = MeshData::quad();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_for_demo() {
        assert_eq!(MeshData::for_demo(DemoMesh::Triangle), MeshData::triangle());
        assert_eq!(MeshData::for_demo(DemoMesh::Quad), MeshData::quad());
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mut mesh = MeshData::quad();
        mesh.indices.push(4);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_degenerate_mesh() {
        let mut mesh = MeshData::triangle();
        mesh.vertices.pop();
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_vertex_bytes_match_stride() {
        let mesh = MeshData::triangle();
        let bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        assert_eq!(bytes.len(), 3 * 20);
    }
}
