//! Per-face and per-vertex records produced by the mesh builder.
//!
//! Cube geometry is never expanded into triangles on the CPU. Each visible block face becomes
//! one [`SideInstance`] and the rendering backend instances a unit quad per record. Custom
//! models are the exception: their triangles are copied out as [`ModelVertex`] values.

/// Number of `i32` slots a [`SideInstance`] occupies in a world-mesh draw buffer.
pub const VBO_WIDTH: usize = 12;

/// Number of `f32` values a [`ModelVertex`] occupies in a world-mesh draw buffer.
pub const FLOATS_PER_MODEL_VERT: usize = 8;

/// AO byte for a face with no occlusion on any of its four vertices.
pub const AO_NONE: i32 = 0xFF;

/// One visible face of one block.
///
/// # Memory Layout
/// Eleven `i32`s (44 bytes), `#[repr(C)]` so a slice can be handed to a GPU upload as bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SideInstance {
    /// World-space block x
    pub x: i32,
    /// World-space block y
    pub y: i32,
    /// World-space block z
    pub z: i32,
    /// Texture atlas column
    pub atlas_x: i32,
    /// Texture atlas row
    pub atlas_y: i32,
    /// Physical side index, see `BlockSide`
    pub side: i32,
    /// 1 when the face looks into water
    pub underwater: i32,
    /// Orientation side index used to rotate the face in the shader
    pub orientation: i32,
    /// Liquid level of the face (own level for liquids, neighbor's level otherwise)
    pub water_level: i32,
    /// Lower level of a water-transition face, 0 for ordinary faces
    pub water_level_transition: i32,
    /// Four 2-bit AO values, vertex 0 in the low bits
    pub ao: i32,
}

impl SideInstance {
    /// Squared distance from the block position to a point.
    pub fn distance_squared_to(&self, x: f32, y: f32, z: f32) -> f32 {
        let dx = self.x as f32 - x;
        let dy = self.y as f32 - y;
        let dz = self.z as f32 - z;
        dx * dx + dy * dy + dz * dz
    }

    /// Writes the instance into `VBO_WIDTH` buffer slots.
    ///
    /// Slot order: x, y, z, atlas_x, atlas_y, side, underwater, orientation, water_level,
    /// water_level_transition, ao, lod_scale.
    pub fn write_to(&self, head: &mut [i32], lod_scale: i32) {
        head[0] = self.x;
        head[1] = self.y;
        head[2] = self.z;
        head[3] = self.atlas_x;
        head[4] = self.atlas_y;
        head[5] = self.side;
        head[6] = self.underwater;
        head[7] = self.orientation;
        head[8] = self.water_level;
        head[9] = self.water_level_transition;
        head[10] = self.ao;
        head[11] = lod_scale;
    }
}

/// A vertex of a custom (non-cube) block model.
///
/// # Memory Layout
/// - Position: [f32; 3] (12 bytes)
/// - Normal: [f32; 3] (12 bytes)
/// - Texture Coordinates: [f32; 2] (8 bytes)
///
/// Total size: 32 bytes, matching `FLOATS_PER_MODEL_VERT`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable, serde::Deserialize)]
pub struct ModelVertex {
    /// Position in model space, the unit cube spans 0.0-1.0
    pub position: [f32; 3],
    /// Surface normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl ModelVertex {
    /// Creates a new vertex.
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        ModelVertex {
            position,
            normal,
            uv,
        }
    }

    /// The vertex as the eight floats stored in draw buffers.
    pub fn to_floats(&self) -> [f32; FLOATS_PER_MODEL_VERT] {
        [
            self.position[0],
            self.position[1],
            self.position[2],
            self.normal[0],
            self.normal[1],
            self.normal[2],
            self.uv[0],
            self.uv[1],
        ]
    }
}
