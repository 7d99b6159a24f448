//! # Block Module
//!
//! This module provides the packed block representation stored in chunks, together with the
//! block-type catalog, block sides, and custom model catalog.
//!
//! ## Memory Layout
//!
//! A block occupies exactly three bytes:
//!
//! | byte | bits | meaning                                  |
//! |------|------|------------------------------------------|
//! | 0    | 0-7  | block type id, high byte                 |
//! | 1    | 0-7  | block type id, low byte                  |
//! | 2    | 5-7  | orientation (0-5 = side, 6-7 = unset)    |
//! | 2    | 3-4  | rotation in quarter turns                |
//! | 2    | 0-2  | water level (0 = dry, 6+ = source)       |
//!
//! The same bytes are written to chunk files and network packets, so this layout is part of the
//! on-disk format.

use block_side::BlockSide;

pub mod block_model;
pub mod block_side;
pub mod block_type;

/// The underlying integer type used to identify block types.
pub type BlockTypeSize = u16;

/// Number of bytes in a packed block.
pub const BLOCK_DATA_BYTES: usize = 3;

/// Stored orientation value meaning "no orientation".
pub const ORIENTATION_UNSET: u8 = 6;

/// Highest storable water level. Player-placed liquid starts here.
pub const MAX_WATER_LEVEL: u8 = 7;

const ORIENTATION_SHIFT: u8 = 5;
const ROTATION_SHIFT: u8 = 3;
const ROTATION_MASK: u8 = 0b11;
const WATER_MASK: u8 = 0b111;

/// Represents a single voxel block in the world.
///
/// Only the type id and the per-instance state are stored here. Type properties such as
/// transparency or atlas coordinates are looked up in the
/// [`BlockCatalog`](block_type::BlockCatalog).
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Block {
    bytes: [u8; BLOCK_DATA_BYTES],
}

impl Block {
    /// Air: id 0 with no state. This is also what zeroed chunk memory decodes to.
    pub const AIR: Block = Block { bytes: [0; 3] };

    /// Packs a block.
    ///
    /// # Arguments
    /// * `id` - The block type id
    /// * `orientation` - The face the block was placed against, if any
    /// * `rotation` - Horizontal quarter turns, taken modulo 4
    /// * `water_level` - Liquid level, clamped to 0-7
    pub fn new(
        id: BlockTypeSize,
        orientation: Option<BlockSide>,
        rotation: u8,
        water_level: u8,
    ) -> Self {
        let [high, low] = id.to_be_bytes();
        let orientation = orientation.map_or(ORIENTATION_UNSET, |side| side as u8);
        let state = (orientation << ORIENTATION_SHIFT)
            | ((rotation & ROTATION_MASK) << ROTATION_SHIFT)
            | water_level.min(MAX_WATER_LEVEL);
        Block {
            bytes: [high, low, state],
        }
    }

    /// A block of the given type with no orientation, rotation or water.
    pub fn of_type(id: BlockTypeSize) -> Self {
        Self::new(id, None, 0, 0)
    }

    /// The block type id.
    pub fn id(&self) -> BlockTypeSize {
        BlockTypeSize::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    /// The face the block was placed against, or `None` when unset.
    pub fn orientation(&self) -> Option<BlockSide> {
        BlockSide::from_index(self.bytes[2] >> ORIENTATION_SHIFT)
    }

    /// Horizontal quarter turns, 0-3.
    pub fn rotation(&self) -> u8 {
        (self.bytes[2] >> ROTATION_SHIFT) & ROTATION_MASK
    }

    /// Liquid level, 0-7.
    pub fn water_level(&self) -> u8 {
        self.bytes[2] & WATER_MASK
    }

    /// The packed bytes, as persisted.
    pub fn to_bytes(self) -> [u8; BLOCK_DATA_BYTES] {
        self.bytes
    }

    /// Rebuilds a block from its packed bytes.
    pub fn from_bytes(bytes: [u8; BLOCK_DATA_BYTES]) -> Self {
        Block { bytes }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id())
            .field("orientation", &self.orientation())
            .field("rotation", &self.rotation())
            .field("water_level", &self.water_level())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let block = Block::new(513, Some(BlockSide::EAST), 3, 5);
        assert_eq!(block.id(), 513);
        assert_eq!(block.orientation(), Some(BlockSide::EAST));
        assert_eq!(block.rotation(), 3);
        assert_eq!(block.water_level(), 5);
        assert_eq!(Block::from_bytes(block.to_bytes()), block);
    }

    #[test]
    fn test_unset_orientation() {
        let block = Block::of_type(4);
        assert_eq!(block.orientation(), None);
        assert_eq!(block.rotation(), 0);
        assert_eq!(block.water_level(), 0);
    }

    #[test]
    fn test_fields_do_not_bleed() {
        let block = Block::new(u16::MAX, Some(BlockSide::DOWN), 7, 255);
        assert_eq!(block.id(), u16::MAX);
        assert_eq!(block.orientation(), Some(BlockSide::DOWN));
        assert_eq!(block.rotation(), 3);
        assert_eq!(block.water_level(), MAX_WATER_LEVEL);
    }

    #[test]
    fn test_air_is_zeroed() {
        let zeroed: Block = bytemuck::Zeroable::zeroed();
        assert_eq!(zeroed, Block::AIR);
        assert_eq!(Block::AIR.id(), 0);
        assert_eq!(std::mem::size_of::<Block>(), BLOCK_DATA_BYTES);
    }
}
