//! # Block Type Module
//!
//! The block-type catalog: the static properties of every kind of block, loaded once from JSON
//! and read-only afterwards. Chunks only store ids; everything else is looked up here.
//!
//! ## File Format
//!
//! ```json
//! [
//!   { "id": 0, "name": "air", "transparent": true },
//!   { "id": 4, "name": "stone", "face_atlas_coords": [[3,0],[3,0],[3,0],[3,0],[3,0],[3,0]] },
//!   { "id": 9, "name": "torch", "model": "torch" }
//! ]
//! ```
//!
//! Faces are listed in side order: north, west, south, east, up, down.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::block_side::BlockSide;
use super::{Block, BlockTypeSize};
use crate::error::{PipelineError, Result};

/// Name every catalog must define for the empty block.
pub const AIR_NAME: &str = "air";
/// Name every catalog must define for the liquid the water simulation moves.
pub const WATER_NAME: &str = "water";
/// Name of the optional block that water washes away.
pub const TORCH_NAME: &str = "torch";

/// Static properties of one kind of block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockType {
    /// Identifier stored in packed blocks
    pub id: BlockTypeSize,
    /// Unique name
    pub name: String,
    /// Light passes through; neighbors keep their faces
    pub transparent: bool,
    /// Rendered as liquid and moved by the water simulation
    pub liquid: bool,
    /// Cross-quad plant, always rendered, destroyed by flowing water
    pub is_foliage: bool,
    /// Rendered from `model` instead of cube faces
    pub is_custom_model: bool,
    /// Honors the stored orientation
    pub oriented: bool,
    /// Atlas coordinates per face, in side order
    pub face_atlas_coords: [[i32; 2]; 6],
    /// Model used when no per-orientation model applies
    pub model: Option<String>,
    /// Per-orientation models, in side order
    pub models: [Option<String>; 6],
}

impl BlockType {
    /// Atlas coordinates shown on `side`.
    pub fn atlas(&self, side: BlockSide) -> [i32; 2] {
        self.face_atlas_coords[side.index()]
    }

    /// The model to draw for a block with the given orientation.
    ///
    /// Oriented types use their per-orientation model when one is declared and fall back to the
    /// base model otherwise.
    pub fn model_for(&self, orientation: Option<BlockSide>) -> Option<&str> {
        if self.oriented {
            if let Some(name) = orientation.and_then(|side| self.models[side.index()].as_deref()) {
                return Some(name);
            }
        }
        self.model.as_deref()
    }
}

#[derive(Deserialize)]
struct OrientedModelsDef {
    north: Option<String>,
    west: Option<String>,
    south: Option<String>,
    east: Option<String>,
    up: Option<String>,
    down: Option<String>,
}

#[derive(Deserialize)]
struct BlockTypeDef {
    id: BlockTypeSize,
    name: String,
    #[serde(default)]
    transparent: bool,
    #[serde(default)]
    liquid: bool,
    #[serde(default)]
    is_foliage: bool,
    #[serde(default)]
    oriented: bool,
    #[serde(default)]
    face_atlas_coords: Option<Vec<[i32; 2]>>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    models: Option<OrientedModelsDef>,
}

impl BlockTypeDef {
    fn into_block_type(self) -> Result<BlockType> {
        let is_custom_model = self.model.is_some();
        let face_atlas_coords = match self.face_atlas_coords {
            Some(coords) => coords.try_into().map_err(|coords: Vec<[i32; 2]>| {
                PipelineError::Catalog(format!(
                    "block '{}' needs 6 face atlas coordinates, got {}",
                    self.name,
                    coords.len()
                ))
            })?,
            None if is_custom_model || self.name == AIR_NAME => [[0, 0]; 6],
            None => {
                return Err(PipelineError::Catalog(format!(
                    "block '{}' has neither a model nor face atlas coordinates",
                    self.name
                )))
            }
        };
        let models = match self.models {
            Some(m) => [m.north, m.west, m.south, m.east, m.up, m.down],
            None => Default::default(),
        };

        Ok(BlockType {
            id: self.id,
            name: self.name,
            transparent: self.transparent,
            liquid: self.liquid,
            is_foliage: self.is_foliage,
            is_custom_model,
            oriented: self.oriented,
            face_atlas_coords,
            model: self.model,
            models,
        })
    }
}

/// Lookup table of every block type, indexed by id and by name.
#[derive(Debug, Clone)]
pub struct BlockCatalog {
    by_id: Vec<Option<BlockType>>,
    by_name: HashMap<String, BlockTypeSize>,
    air_id: BlockTypeSize,
    water_id: BlockTypeSize,
    torch_id: Option<BlockTypeSize>,
}

impl BlockCatalog {
    /// Builds a catalog from already-parsed types.
    ///
    /// # Errors
    /// `PipelineError::Catalog` when an id or name repeats, when `air` or `water` is missing,
    /// when `air` is not id 0 (zeroed chunk memory must read as air), or when `water` is not a liquid.
    pub fn new(types: Vec<BlockType>) -> Result<Self> {
        let max_id = types.iter().map(|t| t.id as usize).max().unwrap_or(0);
        let mut by_id: Vec<Option<BlockType>> = vec![None; max_id + 1];
        let mut by_name = HashMap::with_capacity(types.len());

        for block_type in types {
            let id = block_type.id;
            if by_name.insert(block_type.name.clone(), id).is_some() {
                return Err(PipelineError::Catalog(format!(
                    "duplicate block name '{}'",
                    block_type.name
                )));
            }
            let slot = &mut by_id[id as usize];
            if slot.is_some() {
                return Err(PipelineError::Catalog(format!("duplicate block id {}", id)));
            }
            *slot = Some(block_type);
        }

        let air_id = *by_name
            .get(AIR_NAME)
            .ok_or_else(|| PipelineError::Catalog("catalog has no 'air' block".into()))?;
        if air_id != 0 {
            return Err(PipelineError::Catalog(format!(
                "'air' must have id 0, found {}",
                air_id
            )));
        }
        let water_id = *by_name
            .get(WATER_NAME)
            .ok_or_else(|| PipelineError::Catalog("catalog has no 'water' block".into()))?;
        if !by_id[water_id as usize].as_ref().is_some_and(|t| t.liquid) {
            return Err(PipelineError::Catalog("'water' must be a liquid".into()));
        }
        let torch_id = by_name.get(TORCH_NAME).copied();

        log::info!("Loaded block catalog with {} types", by_name.len());

        Ok(BlockCatalog {
            by_id,
            by_name,
            air_id,
            water_id,
            torch_id,
        })
    }

    /// Parses a catalog from its JSON list form.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let defs: Vec<BlockTypeDef> = serde_json::from_str(json)?;
        let types = defs
            .into_iter()
            .map(BlockTypeDef::into_block_type)
            .collect::<Result<Vec<_>>>()?;
        Self::new(types)
    }

    /// Reads a catalog file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// The catalog bundled with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(include_str!("../../../../res/blocks.json"))
    }

    /// Looks up a type by id. Unknown ids yield `None`.
    pub fn get(&self, id: BlockTypeSize) -> Option<&BlockType> {
        self.by_id.get(id as usize).and_then(Option::as_ref)
    }

    /// Looks up the type of a packed block.
    pub fn of(&self, block: Block) -> Option<&BlockType> {
        self.get(block.id())
    }

    /// Looks up a type by name.
    pub fn by_name(&self, name: &str) -> Option<&BlockType> {
        self.by_name.get(name).and_then(|id| self.get(*id))
    }

    /// The id registered under `name`.
    pub fn id_of(&self, name: &str) -> Result<BlockTypeSize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| PipelineError::UnknownBlock(name.to_string()))
    }

    /// Id of the empty block, always 0.
    pub fn air_id(&self) -> BlockTypeSize {
        self.air_id
    }

    /// Id of water.
    pub fn water_id(&self) -> BlockTypeSize {
        self.water_id
    }

    /// Id of torches, when the catalog has them.
    pub fn torch_id(&self) -> Option<BlockTypeSize> {
        self.torch_id
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the catalog is empty. A valid catalog never is.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Iterates over every registered type in id order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockType> {
        self.by_id.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = BlockCatalog::builtin().unwrap();
        assert_eq!(catalog.air_id(), 0);
        assert!(catalog.get(catalog.water_id()).unwrap().liquid);
        let torch = catalog.by_name(TORCH_NAME).unwrap();
        assert!(torch.is_custom_model);
        assert_eq!(catalog.torch_id(), Some(torch.id));
        assert_eq!(catalog.len(), catalog.iter().count());
    }

    #[test]
    fn test_lookup_by_name_and_id() {
        let catalog = BlockCatalog::builtin().unwrap();
        let stone = catalog.id_of("stone").unwrap();
        assert_eq!(catalog.get(stone).unwrap().name, "stone");
        assert!(catalog.get(60000).is_none());
        assert!(matches!(
            catalog.id_of("unobtainium"),
            Err(PipelineError::UnknownBlock(_))
        ));
    }

    #[test]
    fn test_requires_air_and_water() {
        let err = BlockCatalog::from_json_str(
            r#"[{ "id": 0, "name": "air" }, { "id": 1, "name": "dirt", "face_atlas_coords": [[0,0],[0,0],[0,0],[0,0],[0,0],[0,0]] }]"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Catalog(_)));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = BlockCatalog::from_json_str(
            r#"[
                { "id": 0, "name": "air" },
                { "id": 1, "name": "water", "liquid": true, "transparent": true, "face_atlas_coords": [[0,0],[0,0],[0,0],[0,0],[0,0],[0,0]] },
                { "id": 1, "name": "dirt", "face_atlas_coords": [[0,0],[0,0],[0,0],[0,0],[0,0],[0,0]] }
            ]"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Catalog(_)));
    }

    #[test]
    fn test_rejects_short_atlas_list() {
        let err = BlockCatalog::from_json_str(
            r#"[{ "id": 0, "name": "air" }, { "id": 1, "name": "dirt", "face_atlas_coords": [[0,0]] }]"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Catalog(_)));
    }

    #[test]
    fn test_oriented_model_selection() {
        let catalog = BlockCatalog::from_json_str(
            r#"[
                { "id": 0, "name": "air" },
                { "id": 1, "name": "water", "liquid": true, "transparent": true, "face_atlas_coords": [[0,0],[0,0],[0,0],[0,0],[0,0],[0,0]] },
                { "id": 2, "name": "lever", "oriented": true, "model": "lever",
                  "models": { "north": "lever_wall", "west": null, "south": null, "east": null, "up": null, "down": null } }
            ]"#,
        )
        .unwrap();
        let lever = catalog.by_name("lever").unwrap();
        assert_eq!(lever.model_for(Some(BlockSide::NORTH)), Some("lever_wall"));
        assert_eq!(lever.model_for(Some(BlockSide::UP)), Some("lever"));
        assert_eq!(lever.model_for(None), Some("lever"));
    }
}
