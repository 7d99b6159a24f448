//! # Block Model Module
//!
//! Custom (non-cube) block models such as torches. Models are pre-triangulated: a vertex list
//! plus an index list, with coordinates in block space where the unit cube spans 0.0 to 1.0.
//!
//! ## File Format
//!
//! ```json
//! {
//!   "torch": {
//!     "vertices": [ { "position": [0.4, 0.0, 0.4], "normal": [0, 0, -1], "uv": [0, 0] }, ... ],
//!     "indices": [0, 1, 2, ...]
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::engine_state::rendering::vertex::ModelVertex;
use crate::error::{PipelineError, Result};

/// A triangulated model with its axis-aligned bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockModel {
    /// Unique vertices
    pub vertices: Vec<ModelVertex>,
    /// Triangle list into `vertices`
    pub indices: Vec<u32>,
    /// Minimum corner of the bounding box
    pub min: [f32; 3],
    /// Maximum corner of the bounding box
    pub max: [f32; 3],
}

impl BlockModel {
    /// Creates a model, checking every index and computing the bounds.
    ///
    /// # Errors
    /// `PipelineError::Model` if an index points past the vertex list or the index count is not
    /// a multiple of three.
    pub fn new(vertices: Vec<ModelVertex>, indices: Vec<u32>) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(PipelineError::Model(format!(
                "index count {} is not a triangle list",
                indices.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|i| **i as usize >= vertices.len()) {
            return Err(PipelineError::Model(format!(
                "index {} out of range for {} vertices",
                bad,
                vertices.len()
            )));
        }

        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for vertex in &vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(vertex.position[axis]);
                max[axis] = max[axis].max(vertex.position[axis]);
            }
        }
        if vertices.is_empty() {
            min = [0.0; 3];
            max = [0.0; 3];
        }

        Ok(BlockModel {
            vertices,
            indices,
            min,
            max,
        })
    }

    /// An axis-aligned box from `min` to `max`, 4 vertices and 2 triangles per face.
    pub fn cuboid(min: [f32; 3], max: [f32; 3]) -> Self {
        let [x0, y0, z0] = min;
        let [x1, y1, z1] = max;
        let faces: [([[f32; 3]; 4], [f32; 3]); 6] = [
            ([[x1, y0, z0], [x0, y0, z0], [x0, y1, z0], [x1, y1, z0]], [0.0, 0.0, -1.0]),
            ([[x1, y0, z1], [x1, y0, z0], [x1, y1, z0], [x1, y1, z1]], [1.0, 0.0, 0.0]),
            ([[x0, y0, z1], [x1, y0, z1], [x1, y1, z1], [x0, y1, z1]], [0.0, 0.0, 1.0]),
            ([[x0, y0, z0], [x0, y0, z1], [x0, y1, z1], [x0, y1, z0]], [-1.0, 0.0, 0.0]),
            ([[x0, y1, z1], [x1, y1, z1], [x1, y1, z0], [x0, y1, z0]], [0.0, 1.0, 0.0]),
            ([[x0, y0, z0], [x1, y0, z0], [x1, y0, z1], [x0, y0, z1]], [0.0, -1.0, 0.0]),
        ];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (corners, normal) in faces {
            let base = vertices.len() as u32;
            for (corner, uv) in corners.into_iter().zip(uvs) {
                vertices.push(ModelVertex::new(corner, normal, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        BlockModel {
            vertices,
            indices,
            min,
            max,
        }
    }

    /// Number of vertices the model expands to once indexed, one per index.
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

#[derive(Deserialize)]
struct BlockModelDef {
    vertices: Vec<ModelVertex>,
    indices: Vec<u32>,
}

/// Cache of loaded models, keyed by the model path named in the block catalog.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, Arc<BlockModel>>,
}

impl ModelCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object of models.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let defs: HashMap<String, BlockModelDef> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for (name, def) in defs {
            let model = BlockModel::new(def.vertices, def.indices)
                .map_err(|e| PipelineError::Model(format!("{}: {}", name, e)))?;
            catalog.insert(name, model);
        }
        log::info!("Loaded {} custom block models", catalog.len());
        Ok(catalog)
    }

    /// Reads a model file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Models for the bundled block catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(
            "torch",
            BlockModel::cuboid([0.4375, 0.0, 0.4375], [0.5625, 0.625, 0.5625]),
        );
        catalog
    }

    /// Adds or replaces a model.
    pub fn insert(&mut self, name: impl Into<String>, model: BlockModel) {
        self.models.insert(name.into(), Arc::new(model));
    }

    /// Looks up a model by path.
    pub fn get(&self, name: &str) -> Option<Arc<BlockModel>> {
        self.models.get(name).cloned()
    }

    /// Number of cached models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no models are cached.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
