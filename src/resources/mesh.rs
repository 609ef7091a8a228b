//! Mesh data, GPU meshes and models

use glam::{Vec2, Vec3, Vec4};

use super::Material;
use crate::backend::{MeshHandle, Vertex};
use crate::error::RenderResult;
use crate::graphics::Graphics;

/// Vertex and index data on the CPU side
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Unit cube centered at the origin, faces wound counter-clockwise
    /// when seen from outside
    pub fn cube() -> Self {
        // (normal, u axis, v axis) per face
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
            (Vec3::X, -Vec3::Z, Vec3::Y),
            (-Vec3::X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, -Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
        ];

        let mut mesh = MeshData::default();
        for (normal, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
            for (cu, cv) in corners {
                let position = (normal + u * cu + v * cv) * 0.5;
                mesh.vertices.push(Vertex {
                    position,
                    normal,
                    uv: Vec2::new((cu + 1.0) * 0.5, (1.0 - cv) * 0.5),
                    tangent: u.extend(1.0),
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Plane on the XZ axis facing +Y
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let subdivisions = subdivisions.max(1);
        let mut mesh = MeshData::default();
        let step = Vec2::new(width, depth) / subdivisions as f32;

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                let uv = Vec2::new(x as f32, z as f32) / subdivisions as f32;
                mesh.vertices.push(Vertex {
                    position: Vec3::new(
                        x as f32 * step.x - width * 0.5,
                        0.0,
                        z as f32 * step.y - depth * 0.5,
                    ),
                    normal: Vec3::Y,
                    uv,
                    tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
                });
            }
        }

        let row = subdivisions + 1;
        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * row + x;
                let next = current + row;
                mesh.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }
        mesh
    }
}

/// Uploaded geometry drawn with an optional material.
///
/// A mesh without material is skipped by the renderer.
#[derive(Debug)]
pub struct Mesh {
    handle: MeshHandle,
    index_count: u32,
    pub material: Option<Material>,
}

impl Mesh {
    pub fn new(
        graphics: &mut Graphics,
        data: &MeshData,
        material: Option<Material>,
    ) -> RenderResult<Self> {
        let handle = graphics
            .device_mut()
            .create_mesh(&data.vertices, &data.indices)?;
        Ok(Self {
            handle,
            index_count: data.indices.len() as u32,
            material,
        })
    }

    pub fn handle(&self) -> MeshHandle {
        self.handle
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Release the geometry and the material's images
    pub fn dispose(self, graphics: &mut Graphics) {
        if let Some(material) = self.material {
            material.dispose(graphics);
        }
        graphics.device_mut().destroy_mesh(self.handle);
    }
}

/// A set of meshes sharing one model matrix
#[derive(Debug, Default)]
pub struct Model {
    pub meshes: Vec<Mesh>,
}

impl Model {
    pub fn new(meshes: Vec<Mesh>) -> Self {
        Self { meshes }
    }

    pub fn single(mesh: Mesh) -> Self {
        Self { meshes: vec![mesh] }
    }

    pub fn dispose(self, graphics: &mut Graphics) {
        for mesh in self.meshes {
            mesh.dispose(graphics);
        }
    }
}
