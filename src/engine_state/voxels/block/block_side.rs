//! # Block Side Module
//!
//! This module defines the six faces of a voxel block and the two mappings that decide which
//! texture a rendered face shows: horizontal rotation for rotated blocks, and the orientation
//! permutation for blocks that can be placed facing any direction.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Represents the six possible faces of a voxel block.
///
/// The discriminants are the side indices written into draw buffers and stored in a block's
/// orientation bits, so they must not be reordered.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, FromPrimitive)]
pub enum BlockSide {
    /// Facing negative Z
    NORTH = 0,
    /// Facing positive X
    WEST = 1,
    /// Facing positive Z
    SOUTH = 2,
    /// Facing negative X
    EAST = 3,
    /// Facing positive Y
    UP = 4,
    /// Facing negative Y
    DOWN = 5,
}

impl BlockSide {
    /// All six faces in index order.
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::NORTH,
            BlockSide::WEST,
            BlockSide::SOUTH,
            BlockSide::EAST,
            BlockSide::UP,
            BlockSide::DOWN,
        ]
    }

    /// The four horizontal faces, in the same order as a chunk's neighbor array.
    pub fn horizontal() -> [BlockSide; 4] {
        [
            BlockSide::NORTH,
            BlockSide::WEST,
            BlockSide::SOUTH,
            BlockSide::EAST,
        ]
    }

    /// Converts a stored side index back into a side. Returns `None` for the "unset" values 6 and 7.
    pub fn from_index(index: u8) -> Option<BlockSide> {
        FromPrimitive::from_u8(index)
    }

    /// The side's index into per-face tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this face points along the horizontal plane.
    pub fn is_horizontal(self) -> bool {
        (self as u8) < 4
    }

    /// Unit offset `(dx, dy, dz)` from a block to its neighbor across this face.
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            BlockSide::NORTH => (0, 0, -1),
            BlockSide::WEST => (1, 0, 0),
            BlockSide::SOUTH => (0, 0, 1),
            BlockSide::EAST => (-1, 0, 0),
            BlockSide::UP => (0, 1, 0),
            BlockSide::DOWN => (0, -1, 0),
        }
    }


    /// Rotates a horizontal face by `rotation` quarter turns. Vertical faces are unchanged.
    ///
    /// # Arguments
    /// * `rotation` - Number of quarter turns (0-3)
    ///
    /// # Returns
    /// The face whose texture should be displayed on this physical side.
    pub fn rotated(self, rotation: u8) -> BlockSide {
        if rotation == 0 || !self.is_horizontal() {
            return self;
        }
        let index = (self as u8 + rotation) % 4;
        BlockSide::from_index(index).unwrap_or(self)
    }

    /// Maps a physical face to the logical face of a block placed with `orientation`.
    ///
    /// Blocks are modeled standing on their DOWN face. Orienting a block onto another face swaps
    /// the faces on the axis it was tipped over and leaves the remaining axis alone:
    ///
    /// | orientation   | swaps                               |
    /// |---------------|-------------------------------------|
    /// | UP            | UP <-> DOWN, NORTH <-> SOUTH          |
    /// | NORTH, SOUTH  | NORTH -> UP, SOUTH -> DOWN, UP -> SOUTH, DOWN -> NORTH |
    /// | EAST          | EAST -> DOWN, WEST -> UP, UP -> EAST, DOWN -> WEST |
    /// | WEST          | EAST -> UP, WEST -> DOWN, UP -> WEST, DOWN -> EAST |
    /// | DOWN, unset   | identity                            |
    pub fn converted(self, orientation: Option<BlockSide>) -> BlockSide {
        use BlockSide::*;

        let Some(orientation) = orientation else {
            return self;
        };

        match (orientation, self) {
            (UP, UP) => DOWN,
            (UP, DOWN) => UP,
            (UP, NORTH) => SOUTH,
            (UP, SOUTH) => NORTH,

            (NORTH | SOUTH, NORTH) => UP,
            (NORTH | SOUTH, SOUTH) => DOWN,
            (NORTH | SOUTH, UP) => SOUTH,
            (NORTH | SOUTH, DOWN) => NORTH,

            (EAST, EAST) => DOWN,
            (EAST, WEST) => UP,
            (EAST, UP) => EAST,
            (EAST, DOWN) => WEST,

            (WEST, EAST) => UP,
            (WEST, WEST) => DOWN,
            (WEST, UP) => WEST,
            (WEST, DOWN) => EAST,

            (_, side) => side,
        }
    }
}
