//! The structural layer: decoding of the typed chunk stream inside each
//! frame block.
//!
//! One raw struct per recognized chunk type, each with a `read` function
//! that consumes a payload sub-reader. The payload reader is bounded by the
//! chunk's declared size, so a handler can never bleed into the next chunk,
//! and chunk types this decoder does not recognize are representable (and
//! skipped) rather than fatal.

use bitflags::bitflags;

use crate::error::Result;
use crate::format::{BlendMode, ColorDepth, LayerFlags, LayerType, LoopDirection, TilesetFlags};
use crate::image::Rgba;
use crate::reader::{MemReader, inflate};

pub(super) const CHUNK_OLD_PALETTE: u16 = 0x0004;
pub(super) const CHUNK_OLD_PALETTE_2: u16 = 0x0011;
pub(super) const CHUNK_LAYER: u16 = 0x2004;
pub(super) const CHUNK_CEL: u16 = 0x2005;
pub(super) const CHUNK_CEL_EXTRA: u16 = 0x2006;
pub(super) const CHUNK_COLOR_PROFILE: u16 = 0x2007;
pub(super) const CHUNK_EXTERNAL_FILES: u16 = 0x2008;
pub(super) const CHUNK_TAGS: u16 = 0x2018;
pub(super) const CHUNK_PALETTE: u16 = 0x2019;
pub(super) const CHUNK_USER_DATA: u16 = 0x2020;
pub(super) const CHUNK_SLICE: u16 = 0x2022;
pub(super) const CHUNK_TILESET: u16 = 0x2023;

/// A chunk describing a layer.
#[derive(Debug, Clone)]
pub(super) struct LayerChunk {
    pub(super) flags: LayerFlags,
    pub(super) layer_type: LayerType,
    pub(super) child_level: u16,
    pub(super) blend_mode: BlendMode,
    pub(super) opacity: u8,
    pub(super) name: String,
}

impl LayerChunk {
    pub(super) fn read(reader: &mut MemReader<'_>) -> Result<Self> {
        let flags = LayerFlags::from_bits_truncate(reader.read_u16_le()?);
        let layer_type_val = reader.read_u16_le()?;
        let child_level = reader.read_u16_le()?;
        let _default_width = reader.read_u16_le()?;
        let _default_height = reader.read_u16_le()?;
        let blend_mode_val = reader.read_u16_le()?;
        let opacity = reader.read_u8()?;
        reader.skip(3)?;
        let name = reader.read_string()?;

        let layer_type = match layer_type_val {
            0 => LayerType::Normal,
            1 => LayerType::Group,
            2 => {
                let tileset_index = reader.read_u32_le()?;
                LayerType::Tilemap { tileset_index }
            }
            _ => return Err(reader.invalid_data("invalid layer type")),
        };

        let blend_mode = BlendMode::from_u16(blend_mode_val)
            .ok_or_else(|| reader.invalid_data("invalid blend mode"))?;

        Ok(Self {
            flags,
            layer_type,
            child_level,
            blend_mode,
            opacity,
            name,
        })
    }
}

/// The content variant of a cel chunk, with compressed payloads already
/// inflated and length-checked.
#[derive(Debug, Clone)]
pub(super) enum RawCelData {
    Image {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    Linked {
        frame: u16,
    },
    Tilemap {
        width: u32,
        height: u32,
        bits_per_tile: u16,
        tile_id_mask: u32,
        x_flip_mask: u32,
        y_flip_mask: u32,
        diagonal_flip_mask: u32,
        data: Vec<u8>,
    },
}

/// A chunk describing a cel.
#[derive(Debug, Clone)]
pub(super) struct CelChunk {
    pub(super) layer_index: u16,
    pub(super) x: i16,
    pub(super) y: i16,
    pub(super) opacity: u8,
    pub(super) data: RawCelData,
}

impl CelChunk {
    pub(super) fn read(reader: &mut MemReader<'_>, depth: ColorDepth) -> Result<Self> {
        let layer_index = reader.read_u16_le()?;
        let x = reader.read_i16_le()?;
        let y = reader.read_i16_le()?;
        let opacity = reader.read_u8()?;
        let cel_type = reader.read_u16_le()?;
        let _z_index = reader.read_i16_le()?;
        reader.skip(5)?;

        let data = match cel_type {
            0 => {
                let width = u32::from(reader.read_u16_le()?);
                let height = u32::from(reader.read_u16_le()?);
                let expected = width as usize * height as usize * depth.bytes_per_pixel();
                let pixels = reader.read_bytes(expected)?;
                RawCelData::Image {
                    width,
                    height,
                    pixels,
                }
            }
            1 => RawCelData::Linked {
                frame: reader.read_u16_le()?,
            },
            2 => {
                let width = u32::from(reader.read_u16_le()?);
                let height = u32::from(reader.read_u16_le()?);
                let expected = width as usize * height as usize * depth.bytes_per_pixel();
                let pixels = inflate(&reader.read_remaining(), expected)?;
                RawCelData::Image {
                    width,
                    height,
                    pixels,
                }
            }
            3 => {
                let width = u32::from(reader.read_u16_le()?);
                let height = u32::from(reader.read_u16_le()?);
                let bits_per_tile = reader.read_u16_le()?;
                let tile_id_mask = reader.read_u32_le()?;
                let x_flip_mask = reader.read_u32_le()?;
                let y_flip_mask = reader.read_u32_le()?;
                let diagonal_flip_mask = reader.read_u32_le()?;
                reader.skip(10)?;
                let expected =
                    (width as usize * height as usize * usize::from(bits_per_tile)).div_ceil(8);
                let data = inflate(&reader.read_remaining(), expected)?;
                RawCelData::Tilemap {
                    width,
                    height,
                    bits_per_tile,
                    tile_id_mask,
                    x_flip_mask,
                    y_flip_mask,
                    diagonal_flip_mask,
                    data,
                }
            }
            _ => return Err(reader.invalid_data("invalid cel type")),
        };

        Ok(Self {
            layer_index,
            x,
            y,
            opacity,
            data,
        })
    }
}

/// Extra chunk with sub-pixel cel bounds. Attaches to the immediately
/// preceding cel in the same frame.
#[derive(Debug, Clone, Copy)]
pub(super) struct CelExtraChunk {
    pub(super) precise: bool,
    pub(super) x: f64,
    pub(super) y: f64,
    pub(super) width: f64,
    pub(super) height: f64,
}

impl CelExtraChunk {
    pub(super) fn read(reader: &mut MemReader<'_>) -> Result<Self> {
        let flags = reader.read_u32_le()?;
        let x = reader.read_fixed()?;
        let y = reader.read_fixed()?;
        let width = reader.read_fixed()?;
        let height = reader.read_fixed()?;
        Ok(Self {
            precise: flags & 0x1 != 0,
            x,
            y,
            width,
            height,
        })
    }
}

/// A single animation tag from a tags chunk.
#[derive(Debug, Clone)]
pub(super) struct RawTag {
    pub(super) from_frame: u16,
    pub(super) to_frame: u16,
    pub(super) direction: LoopDirection,
    pub(super) repeat: u16,
    pub(super) name: String,
}

pub(super) fn read_tags(reader: &mut MemReader<'_>) -> Result<Vec<RawTag>> {
    let num_tags = reader.read_u16_le()?;
    reader.skip(8)?;
    let mut tags = Vec::with_capacity(usize::from(num_tags));
    for _ in 0..num_tags {
        let from_frame = reader.read_u16_le()?;
        let to_frame = reader.read_u16_le()?;
        let direction = match reader.read_u8()? {
            0 => LoopDirection::Forward,
            1 => LoopDirection::Reverse,
            2 => LoopDirection::PingPong,
            3 => LoopDirection::PingPongReverse,
            _ => return Err(reader.invalid_data("invalid animation direction")),
        };
        let repeat = reader.read_u16_le()?;
        // 6 reserved, 3 deprecated color bytes, 1 extra byte.
        reader.skip(10)?;
        let name = reader.read_string()?;
        tags.push(RawTag {
            from_frame,
            to_frame,
            direction,
            repeat,
            name,
        });
    }
    Ok(tags)
}

bitflags! {
    struct PaletteEntryFlags: u16 {
        const HAS_NAME = 0x0001;
    }
}

/// One decoded entry of a palette chunk.
#[derive(Debug, Clone)]
pub(super) struct RawPaletteEntry {
    pub(super) color: Rgba,
    pub(super) name: Option<String>,
}

/// A palette chunk: a run of entries covering `[first_index, last_index]`.
#[derive(Debug, Clone)]
pub(super) struct PaletteChunk {
    pub(super) first_index: u32,
    pub(super) last_index: u32,
    pub(super) entries: Vec<RawPaletteEntry>,
}

impl PaletteChunk {
    pub(super) fn read(reader: &mut MemReader<'_>) -> Result<Self> {
        let _new_size = reader.read_u32_le()?;
        let first_index = reader.read_u32_le()?;
        let last_index = reader.read_u32_le()?;
        reader.skip(8)?;
        if last_index < first_index {
            return Err(reader.invalid_data("invalid palette range"));
        }

        let count = (last_index - first_index + 1) as usize;
        // The declared count is untrusted; cap the pre-allocation by what
        // the payload could actually hold (an entry is at least 6 bytes).
        let mut entries = Vec::with_capacity(count.min(reader.remaining() / 6));
        for _ in 0..count {
            let flags = PaletteEntryFlags::from_bits_truncate(reader.read_u16_le()?);
            let r = reader.read_u8()?;
            let g = reader.read_u8()?;
            let b = reader.read_u8()?;
            let a = reader.read_u8()?;
            let name = if flags.contains(PaletteEntryFlags::HAS_NAME) {
                Some(reader.read_string()?)
            } else {
                None
            };
            entries.push(RawPaletteEntry {
                color: Rgba::new(r, g, b, a),
                name,
            });
        }

        Ok(Self {
            first_index,
            last_index,
            entries,
        })
    }
}

bitflags! {
    struct SliceChunkFlags: u32 {
        const NINE_PATCH = 0x0001;
        const HAS_PIVOT = 0x0002;
    }
}

/// One keyframe within a slice chunk.
#[derive(Debug, Clone)]
pub(super) struct RawSliceKey {
    pub(super) frame: u32,
    pub(super) x: i32,
    pub(super) y: i32,
    pub(super) width: u32,
    pub(super) height: u32,
    pub(super) center: Option<(i32, i32, u32, u32)>,
    pub(super) pivot: Option<(i32, i32)>,
}

/// A chunk describing a named slice and its per-frame keys.
#[derive(Debug, Clone)]
pub(super) struct SliceChunk {
    pub(super) name: String,
    pub(super) keys: Vec<RawSliceKey>,
}

impl SliceChunk {
    pub(super) fn read(reader: &mut MemReader<'_>) -> Result<Self> {
        let num_keys = reader.read_u32_le()?;
        let flags = SliceChunkFlags::from_bits_truncate(reader.read_u32_le()?);
        let _reserved = reader.read_u32_le()?;
        let name = reader.read_string()?;

        // Untrusted count; a key is at least 20 bytes.
        let mut keys = Vec::with_capacity((num_keys as usize).min(reader.remaining() / 20));
        for _ in 0..num_keys {
            let frame = reader.read_u32_le()?;
            let x = reader.read_i32_le()?;
            let y = reader.read_i32_le()?;
            let width = reader.read_u32_le()?;
            let height = reader.read_u32_le()?;
            let center = if flags.contains(SliceChunkFlags::NINE_PATCH) {
                let cx = reader.read_i32_le()?;
                let cy = reader.read_i32_le()?;
                let cw = reader.read_u32_le()?;
                let ch = reader.read_u32_le()?;
                Some((cx, cy, cw, ch))
            } else {
                None
            };
            let pivot = if flags.contains(SliceChunkFlags::HAS_PIVOT) {
                let px = reader.read_i32_le()?;
                let py = reader.read_i32_le()?;
                Some((px, py))
            } else {
                None
            };
            keys.push(RawSliceKey {
                frame,
                x,
                y,
                width,
                height,
                center,
                pivot,
            });
        }

        Ok(Self { name, keys })
    }
}

/// A chunk describing a tileset with an embedded, deflate-compressed bank of
/// tile rasters.
#[derive(Debug, Clone)]
pub(super) struct TilesetChunk {
    pub(super) id: u32,
    pub(super) flags: TilesetFlags,
    pub(super) num_tiles: u32,
    pub(super) tile_width: u16,
    pub(super) tile_height: u16,
    pub(super) base_index: i16,
    pub(super) name: String,
    pub(super) pixels: Vec<u8>,
}

impl TilesetChunk {
    pub(super) fn read(reader: &mut MemReader<'_>, depth: ColorDepth) -> Result<Self> {
        let id = reader.read_u32_le()?;
        let flags = TilesetFlags::from_bits_truncate(reader.read_u32_le()?);
        let num_tiles = reader.read_u32_le()?;
        let tile_width = reader.read_u16_le()?;
        let tile_height = reader.read_u16_le()?;
        let base_index = reader.read_i16_le()?;
        reader.skip(14)?;
        let name = reader.read_string()?;

        if flags.contains(TilesetFlags::EXTERNAL_FILE) {
            let _external_file_id = reader.read_u32_le()?;
            let _external_tileset_id = reader.read_u32_le()?;
        }

        if !flags.contains(TilesetFlags::EMBEDDED) {
            return Err(crate::error::AseError::UnsupportedFeature(format!(
                "tileset {name:?} has no embedded tile data"
            )));
        }

        let compressed_len = reader.read_u32_le()? as usize;
        let compressed = reader.read_bytes(compressed_len)?;
        // The size fields are untrusted; a crafted chunk must fail, not
        // overflow.
        let expected = (num_tiles as usize)
            .checked_mul(usize::from(tile_width))
            .and_then(|size| size.checked_mul(usize::from(tile_height)))
            .and_then(|size| size.checked_mul(depth.bytes_per_pixel()))
            .ok_or_else(|| reader.invalid_data("tileset pixel size overflows"))?;
        let pixels = inflate(&compressed, expected)?;

        Ok(Self {
            id,
            flags,
            num_tiles,
            tile_width,
            tile_height,
            base_index,
            name,
            pixels,
        })
    }
}

/// An entry of an external-files chunk. Recorded for completeness; nothing
/// in the compositing pipeline consumes these.
#[derive(Debug, Clone)]
pub(super) struct RawExternalFile {
    pub(super) id: u32,
    pub(super) kind: u8,
    pub(super) path: String,
}

pub(super) fn read_external_files(reader: &mut MemReader<'_>) -> Result<Vec<RawExternalFile>> {
    let count = reader.read_u32_le()?;
    reader.skip(8)?;
    // Untrusted count; an entry is at least 14 bytes.
    let mut files = Vec::with_capacity((count as usize).min(reader.remaining() / 14));
    for _ in 0..count {
        let id = reader.read_u32_le()?;
        let kind = reader.read_u8()?;
        reader.skip(7)?;
        let path = reader.read_string()?;
        files.push(RawExternalFile { id, kind, path });
    }
    Ok(files)
}
