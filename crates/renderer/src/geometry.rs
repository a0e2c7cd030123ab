//! The 2×2 quad every pass draws: the scene plane under the camera and the
//! full-screen quad for post-processing share the same vertices.

use crate::backend::{Backend, BufferId};
use crate::error::PipelineResult;
use crate::program::Attribute;

/// Triangle-strip order: top-left, top-right, bottom-left, bottom-right.
pub const QUAD_POSITIONS: [f32; 12] = [
    -1.0, 1.0, 0.0, //
    1.0, 1.0, 0.0, //
    -1.0, -1.0, 0.0, //
    1.0, -1.0, 0.0,
];

/// Texture origin at the top-left corner.
pub const QUAD_TEXCOORDS: [f32; 8] = [
    0.0, 0.0, //
    1.0, 0.0, //
    0.0, 1.0, //
    1.0, 1.0,
];

pub const QUAD_VERTEX_COUNT: u32 = 4;

/// Vertex buffers uploaded once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadGeometry {
    pub positions: BufferId,
    pub texcoords: BufferId,
}

impl QuadGeometry {
    pub fn upload<B: Backend + ?Sized>(backend: &mut B) -> PipelineResult<Self> {
        Ok(Self {
            positions: backend.create_vertex_buffer("quad positions", &QUAD_POSITIONS)?,
            texcoords: backend.create_vertex_buffer("quad texcoords", &QUAD_TEXCOORDS)?,
        })
    }

    /// Attribute bindings for a pass drawing this quad.
    pub fn bindings(&self) -> [(Attribute, BufferId, u32); 2] {
        [
            (
                Attribute::Position,
                self.positions,
                Attribute::Position.components(),
            ),
            (
                Attribute::TextureCoord,
                self.texcoords,
                Attribute::TextureCoord.components(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_hold_four_vertices() {
        assert_eq!(
            QUAD_POSITIONS.len() as u32,
            QUAD_VERTEX_COUNT * Attribute::Position.components()
        );
        assert_eq!(
            QUAD_TEXCOORDS.len() as u32,
            QUAD_VERTEX_COUNT * Attribute::TextureCoord.components()
        );
    }

    #[test]
    fn corners_map_to_matching_texcoords() {
        for vertex in 0..QUAD_VERTEX_COUNT as usize {
            let x = QUAD_POSITIONS[vertex * 3];
            let y = QUAD_POSITIONS[vertex * 3 + 1];
            let u = QUAD_TEXCOORDS[vertex * 2];
            let v = QUAD_TEXCOORDS[vertex * 2 + 1];
            assert_eq!(u, (x + 1.0) * 0.5);
            assert_eq!(v, (1.0 - y) * 0.5);
        }
    }
}
