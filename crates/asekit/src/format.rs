//! Parser and model for Aseprite files.
//!
//! Using the spec at: <https://github.com/aseprite/aseprite/blob/main/docs/ase-file-specs.md>
//!
//! The implementation is split into two layers:
//!
//! - Structural layer (`raw`): the physical file layout (headers, chunks,
//!   bytes). Chunk payloads are decoded into transient raw structs and
//!   discarded once folded into the model.
//! - Logical layer (`document`): the authoritative in-memory representation.
//!   All cross-references (cel -> layer, linked cel -> source cel,
//!   tilemap layer -> tileset) are stored as indices and validated once at
//!   parse time, so everything downstream can treat the document as
//!   fully resolved.

use bitflags::bitflags;

use crate::error::{AseError, Result};

mod document;
mod raw;
mod slice;

pub use self::document::{
    Cel, CelData, Document, ExternalFile, Frame, Header, ImageCel, Layer, Palette, PaletteEntry,
    PreciseBounds, Tag, Tileset, TilemapCel,
};
pub use self::slice::{Slice, SliceKey};

/// The color depth (bits per pixel) of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    /// 32-bit RGBA (red, green, blue, alpha).
    Rgba,
    /// 16-bit grayscale (gray, alpha).
    Grayscale,
    /// 8-bit index into the palette.
    Indexed,
}

impl ColorDepth {
    pub(crate) fn from_bits_per_pixel(bits: u16) -> Result<Self> {
        match bits {
            32 => Ok(Self::Rgba),
            16 => Ok(Self::Grayscale),
            8 => Ok(Self::Indexed),
            other => Err(AseError::UnsupportedFeature(format!(
                "color depth of {other} bits per pixel"
            ))),
        }
    }

    /// The number of bytes one pixel occupies in cel and tileset data.
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba => 4,
            Self::Grayscale => 2,
            Self::Indexed => 1,
        }
    }
}

bitflags! {
    /// File-level flags from the header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        /// Layer opacity is valid and overrides cel opacity.
        const LAYER_OPACITY_VALID = 0x0001;
    }
}

bitflags! {
    /// Flags for a layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LayerFlags: u16 {
        /// The layer is visible.
        const VISIBLE = 0x0001;
        /// The layer is editable.
        const EDITABLE = 0x0002;
        /// Movement on this layer is locked.
        const LOCK_MOVEMENT = 0x0004;
        /// This is the background layer.
        const BACKGROUND = 0x0008;
        /// Prefer linked cels when creating new frames.
        const PREFER_LINKED_CELS = 0x0010;
        /// The layer group should be displayed collapsed in the UI.
        const DISPLAY_COLLAPSED = 0x0020;
        /// This is a reference layer.
        const REFERENCE_LAYER = 0x0040;
    }
}

/// The type of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    /// A normal image layer.
    Normal,
    /// A group layer that contains other layers.
    Group,
    /// A tilemap layer.
    Tilemap {
        /// The index of the tileset used by this layer.
        tileset_index: u32,
    },
}

/// The blend mode for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlendMode {
    Normal = 0,
    Multiply = 1,
    Screen = 2,
    Overlay = 3,
    Darken = 4,
    Lighten = 5,
    ColorDodge = 6,
    ColorBurn = 7,
    HardLight = 8,
    SoftLight = 9,
    Difference = 10,
    Exclusion = 11,
    Hue = 12,
    Saturation = 13,
    Color = 14,
    Luminosity = 15,
    Addition = 16,
    Subtraction = 17,
    Divide = 18,
}

impl BlendMode {
    pub(crate) fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::Normal,
            1 => Self::Multiply,
            2 => Self::Screen,
            3 => Self::Overlay,
            4 => Self::Darken,
            5 => Self::Lighten,
            6 => Self::ColorDodge,
            7 => Self::ColorBurn,
            8 => Self::HardLight,
            9 => Self::SoftLight,
            10 => Self::Difference,
            11 => Self::Exclusion,
            12 => Self::Hue,
            13 => Self::Saturation,
            14 => Self::Color,
            15 => Self::Luminosity,
            16 => Self::Addition,
            17 => Self::Subtraction,
            18 => Self::Divide,
            _ => return None,
        })
    }
}

/// The loop direction of an animation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDirection {
    Forward,
    Reverse,
    PingPong,
    PingPongReverse,
}

bitflags! {
    /// Flags for a tileset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TilesetFlags: u32 {
        /// Includes a link to an external file.
        const EXTERNAL_FILE = 0x0001;
        /// Includes tiles inside this file.
        const EMBEDDED = 0x0002;
        /// Tile id 0 means "empty".
        const ZERO_IS_EMPTY = 0x0004;
        /// Match X-flipped tiles.
        const MATCH_X_FLIP = 0x0008;
        /// Match Y-flipped tiles.
        const MATCH_Y_FLIP = 0x0010;
        /// Match diagonally flipped tiles.
        const MATCH_D_FLIP = 0x0020;
    }
}
