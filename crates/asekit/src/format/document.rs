//! The logical layer: the fully resolved in-memory document.

use crate::error::{AseError, Result};
use crate::format::slice::{Slice, SliceKey};
use crate::format::{
    BlendMode, ColorDepth, HeaderFlags, LayerFlags, LayerType, LoopDirection, TilesetFlags, raw,
};
use crate::image::Rgba;
use crate::reader::MemReader;

const FILE_MAGIC: u16 = 0xA5E0;
const FRAME_MAGIC: u16 = 0xF1FA;
const HEADER_SIZE: usize = 128;
const FRAME_HEADER_SIZE: usize = 16;
const CHUNK_HEADER_SIZE: usize = 6;

/// Canvas-level metadata from the 128-byte file header.
#[derive(Debug, Clone)]
pub struct Header {
    pub width: u16,
    pub height: u16,
    pub depth: ColorDepth,
    pub frame_count: u16,
    pub flags: HeaderFlags,
    /// The palette index treated as fully transparent in indexed documents.
    pub transparent_index: u8,
    pub num_colors: u16,
}

impl Header {
    fn parse(reader: &mut MemReader<'_>) -> Result<Self> {
        let _file_size = reader.read_u32_le()?;
        let magic = reader.read_u16_le()?;
        if magic != FILE_MAGIC {
            return Err(reader.invalid_data("bad file magic number"));
        }
        let frame_count = reader.read_u16_le()?;
        let width = reader.read_u16_le()?;
        let height = reader.read_u16_le()?;
        if width == 0 || height == 0 {
            return Err(reader.invalid_data("zero canvas dimension"));
        }
        let depth = ColorDepth::from_bits_per_pixel(reader.read_u16_le()?)?;
        let flags = HeaderFlags::from_bits_truncate(reader.read_u32_le()?);
        let _speed = reader.read_u16_le()?;
        reader.skip(8)?;
        let transparent_index = reader.read_u8()?;
        reader.skip(3)?;
        let num_colors = reader.read_u16_le()?;
        // Pixel ratio and grid fields are irrelevant to compositing.
        reader.seek_to(HEADER_SIZE)?;

        Ok(Self {
            width,
            height,
            depth,
            frame_count,
            flags,
            transparent_index,
            num_colors,
        })
    }
}

/// A drawable or group track.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub flags: LayerFlags,
    pub layer_type: LayerType,
    pub blend_mode: BlendMode,
    pub opacity: u8,
    /// Nesting depth as stored in the file; 0 for root layers.
    pub child_level: u16,
    /// Index of the parent group layer, reconstructed from `child_level`.
    pub parent: Option<usize>,
}

impl Layer {
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.flags.contains(LayerFlags::VISIBLE)
    }
}

/// One tick of the timeline.
#[derive(Debug, Clone)]
pub struct Frame {
    pub duration_ms: u16,
    /// Cels in file emission order, which equals layer order bottom to top.
    pub cels: Vec<Cel>,
}

/// Sub-pixel position and scaled size from a cel-extra chunk.
#[derive(Debug, Clone, Copy)]
pub struct PreciseBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Decoded pixel content of an image cel.
#[derive(Debug, Clone)]
pub struct ImageCel {
    pub width: u32,
    pub height: u32,
    /// Raw bytes at the document's bits-per-pixel, row-major.
    pub pixels: Vec<u8>,
}

/// Decoded tile grid of a tilemap cel.
#[derive(Debug, Clone)]
pub struct TilemapCel {
    /// Grid size in tiles.
    pub width: u32,
    pub height: u32,
    pub bits_per_tile: u16,
    pub tile_id_mask: u32,
    pub x_flip_mask: u32,
    pub y_flip_mask: u32,
    pub diagonal_flip_mask: u32,
    pub data: Vec<u8>,
}

/// The content variant of a cel.
#[derive(Debug, Clone)]
pub enum CelData {
    Image(ImageCel),
    /// Reuses the image data of `frames[frame].cels[cel]` (same layer,
    /// resolved at parse time, never chained).
    Linked {
        frame: usize,
        cel: usize,
    },
    Tilemap(TilemapCel),
}

/// One layer's content on one frame.
#[derive(Debug, Clone)]
pub struct Cel {
    pub layer: usize,
    pub x: i32,
    pub y: i32,
    pub opacity: u8,
    pub precise: Option<PreciseBounds>,
    pub data: CelData,
}

/// A bank of fixed-size tile rasters.
#[derive(Debug, Clone)]
pub struct Tileset {
    pub id: u32,
    pub name: String,
    pub flags: TilesetFlags,
    pub tile_width: u16,
    pub tile_height: u16,
    pub tile_count: u32,
    pub base_index: i16,
    /// All tile rasters back to back, bpp-sized pixels.
    pub pixels: Vec<u8>,
}

impl Tileset {
    /// The raw bytes of one tile raster.
    #[must_use]
    pub fn tile_pixels(&self, tile_id: u32, depth: ColorDepth) -> &[u8] {
        let tile_len =
            usize::from(self.tile_width) * usize::from(self.tile_height) * depth.bytes_per_pixel();
        let start = tile_id as usize * tile_len;
        &self.pixels[start..start + tile_len]
    }
}

/// One entry of the color palette.
#[derive(Debug, Clone)]
pub struct PaletteEntry {
    pub color: Rgba,
    pub name: Option<String>,
}

/// The indexed color table.
#[derive(Debug, Clone, Default)]
pub struct Palette {
    pub entries: Vec<PaletteEntry>,
}

impl Palette {
    /// Color at `index`, transparent when the index is out of range.
    #[must_use]
    pub fn color(&self, index: u8) -> Rgba {
        self.entries
            .get(usize::from(index))
            .map_or(Rgba::TRANSPARENT, |entry| entry.color)
    }

    fn apply_chunk(&mut self, chunk: raw::PaletteChunk) {
        let needed = chunk.last_index as usize + 1;
        if self.entries.len() < needed {
            self.entries.resize_with(needed, || PaletteEntry {
                color: Rgba::TRANSPARENT,
                name: None,
            });
        }
        for (offset, entry) in chunk.entries.into_iter().enumerate() {
            self.entries[chunk.first_index as usize + offset] = PaletteEntry {
                color: entry.color,
                name: entry.name,
            };
        }
    }
}

/// A named contiguous frame range.
#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    pub from_frame: usize,
    pub to_frame: usize,
    pub direction: LoopDirection,
    pub repeat: u16,
}

/// A reference to a file outside this document.
#[derive(Debug, Clone)]
pub struct ExternalFile {
    pub id: u32,
    pub kind: u8,
    pub path: String,
}

/// One fully decoded and validated document.
///
/// All cross-references are indices into the owned vectors and were checked
/// during [`Document::parse`], so downstream consumers may index without
/// further validation.
#[derive(Debug, Clone)]
pub struct Document {
    pub header: Header,
    pub layers: Vec<Layer>,
    pub frames: Vec<Frame>,
    pub palette: Option<Palette>,
    pub tags: Vec<Tag>,
    pub slices: Vec<Slice>,
    pub tilesets: Vec<Tileset>,
    pub external_files: Vec<ExternalFile>,
}

impl Document {
    /// Decodes a complete file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = MemReader::new(bytes);
        let header = Header::parse(&mut reader)?;

        let mut doc = Document {
            header,
            layers: Vec::new(),
            frames: Vec::new(),
            palette: None,
            tags: Vec::new(),
            slices: Vec::new(),
            tilesets: Vec::new(),
            external_files: Vec::new(),
        };

        for _ in 0..doc.header.frame_count {
            doc.parse_frame(&mut reader)?;
        }

        doc.resolve_layer_hierarchy();
        doc.resolve_linked_cels()?;
        doc.validate()?;

        Ok(doc)
    }

    fn parse_frame(&mut self, reader: &mut MemReader<'_>) -> Result<()> {
        let frame_start = reader.tell();
        let frame_size = reader.read_u32_le()? as usize;
        let magic = reader.read_u16_le()?;
        if magic != FRAME_MAGIC {
            return Err(reader.invalid_data("bad frame magic number"));
        }
        let old_chunk_count = reader.read_u16_le()?;
        let duration_ms = reader.read_u16_le()?;
        reader.skip(2)?;
        let new_chunk_count = reader.read_u32_le()?;
        let chunk_count = if new_chunk_count == 0 {
            u32::from(old_chunk_count)
        } else {
            new_chunk_count
        };

        let mut frame = Frame {
            duration_ms,
            cels: Vec::new(),
        };

        for _ in 0..chunk_count {
            let chunk_size = reader.read_u32_le()? as usize;
            let chunk_type = reader.read_u16_le()?;
            if chunk_size < CHUNK_HEADER_SIZE {
                return Err(reader.invalid_data("chunk size smaller than its header"));
            }
            // The payload reader is bounded by the declared chunk size and the
            // outer reader advances past it unconditionally, so chunks with
            // trailing fields we do not read (or whole chunk types we do not
            // recognize) are tolerated.
            let mut payload = reader.sub_reader(chunk_size - CHUNK_HEADER_SIZE)?;
            self.dispatch_chunk(chunk_type, &mut payload, &mut frame)?;
        }

        self.frames.push(frame);
        // Frame sizes are trusted the same way chunk sizes are.
        reader.seek_to(frame_start + frame_size)
    }

    fn dispatch_chunk(
        &mut self,
        chunk_type: u16,
        payload: &mut MemReader<'_>,
        frame: &mut Frame,
    ) -> Result<()> {
        match chunk_type {
            raw::CHUNK_LAYER => {
                let chunk = raw::LayerChunk::read(payload)?;
                self.layers.push(Layer {
                    name: chunk.name,
                    flags: chunk.flags,
                    layer_type: chunk.layer_type,
                    blend_mode: chunk.blend_mode,
                    opacity: chunk.opacity,
                    child_level: chunk.child_level,
                    parent: None,
                });
            }
            raw::CHUNK_CEL => {
                let chunk = raw::CelChunk::read(payload, self.header.depth)?;
                let data = match chunk.data {
                    raw::RawCelData::Image {
                        width,
                        height,
                        pixels,
                    } => CelData::Image(ImageCel {
                        width,
                        height,
                        pixels,
                    }),
                    // The cel index is filled in by resolve_linked_cels.
                    raw::RawCelData::Linked { frame } => CelData::Linked {
                        frame: usize::from(frame),
                        cel: 0,
                    },
                    raw::RawCelData::Tilemap {
                        width,
                        height,
                        bits_per_tile,
                        tile_id_mask,
                        x_flip_mask,
                        y_flip_mask,
                        diagonal_flip_mask,
                        data,
                    } => CelData::Tilemap(TilemapCel {
                        width,
                        height,
                        bits_per_tile,
                        tile_id_mask,
                        x_flip_mask,
                        y_flip_mask,
                        diagonal_flip_mask,
                        data,
                    }),
                };
                frame.cels.push(Cel {
                    layer: usize::from(chunk.layer_index),
                    x: i32::from(chunk.x),
                    y: i32::from(chunk.y),
                    opacity: chunk.opacity,
                    precise: None,
                    data,
                });
            }
            raw::CHUNK_CEL_EXTRA => {
                let chunk = raw::CelExtraChunk::read(payload)?;
                if chunk.precise
                    && let Some(cel) = frame.cels.last_mut()
                {
                    cel.precise = Some(PreciseBounds {
                        x: chunk.x,
                        y: chunk.y,
                        width: chunk.width,
                        height: chunk.height,
                    });
                }
            }
            raw::CHUNK_TAGS => {
                for tag in raw::read_tags(payload)? {
                    self.tags.push(Tag {
                        name: tag.name,
                        from_frame: usize::from(tag.from_frame),
                        to_frame: usize::from(tag.to_frame),
                        direction: tag.direction,
                        repeat: tag.repeat,
                    });
                }
            }
            raw::CHUNK_PALETTE => {
                let chunk = raw::PaletteChunk::read(payload)?;
                self.palette.get_or_insert_default().apply_chunk(chunk);
            }
            raw::CHUNK_SLICE => {
                let chunk = raw::SliceChunk::read(payload)?;
                self.slices.push(Slice::from_chunk(chunk));
            }
            raw::CHUNK_TILESET => {
                let chunk = raw::TilesetChunk::read(payload, self.header.depth)?;
                self.tilesets.push(Tileset {
                    id: chunk.id,
                    name: chunk.name,
                    flags: chunk.flags,
                    tile_width: chunk.tile_width,
                    tile_height: chunk.tile_height,
                    tile_count: chunk.num_tiles,
                    base_index: chunk.base_index,
                    pixels: chunk.pixels,
                });
            }
            raw::CHUNK_EXTERNAL_FILES => {
                for file in raw::read_external_files(payload)? {
                    self.external_files.push(ExternalFile {
                        id: file.id,
                        kind: file.kind,
                        path: file.path,
                    });
                }
            }
            // Superseded by the new palette chunk.
            raw::CHUNK_OLD_PALETTE | raw::CHUNK_OLD_PALETTE_2 => {}
            // Recognized but irrelevant to compositing.
            raw::CHUNK_COLOR_PROFILE | raw::CHUNK_USER_DATA => {}
            other => {
                log::debug!("skipping unknown chunk type {other:#06x}");
            }
        }
        Ok(())
    }

    /// Reconstructs parent links from each layer's nesting depth: a layer's
    /// parent is the nearest preceding layer with a strictly smaller level.
    fn resolve_layer_hierarchy(&mut self) {
        let mut stack: Vec<usize> = Vec::new();
        for index in 0..self.layers.len() {
            let level = self.layers[index].child_level;
            while let Some(&candidate) = stack.last() {
                if self.layers[candidate].child_level < level {
                    break;
                }
                stack.pop();
            }
            self.layers[index].parent = stack.last().copied();
            stack.push(index);
        }
    }

    /// Resolves every linked cel to a direct (frame, cel) index pair on the
    /// same layer. Links are a single hop; a link targeting another link is
    /// malformed.
    fn resolve_linked_cels(&mut self) -> Result<()> {
        for frame_index in 0..self.frames.len() {
            for cel_index in 0..self.frames[frame_index].cels.len() {
                let CelData::Linked {
                    frame: target_frame,
                    ..
                } = self.frames[frame_index].cels[cel_index].data
                else {
                    continue;
                };
                let layer = self.frames[frame_index].cels[cel_index].layer;

                let target = self
                    .frames
                    .get(target_frame)
                    .and_then(|frame| {
                        frame
                            .cels
                            .iter()
                            .position(|candidate| candidate.layer == layer)
                    })
                    .ok_or_else(|| {
                        AseError::MalformedFormat(format!(
                            "linked cel on layer {layer} points at frame {target_frame}, \
                             which has no cel on that layer"
                        ))
                    })?;

                if matches!(
                    self.frames[target_frame].cels[target].data,
                    CelData::Linked { .. }
                ) {
                    return Err(AseError::MalformedFormat(format!(
                        "linked cel on layer {layer} targets another linked cel \
                         in frame {target_frame}"
                    )));
                }

                self.frames[frame_index].cels[cel_index].data = CelData::Linked {
                    frame: target_frame,
                    cel: target,
                };
            }
        }
        Ok(())
    }

    /// Checks every structural reference once, so compositing can treat the
    /// document as total.
    fn validate(&self) -> Result<()> {
        for layer in &self.layers {
            if let LayerType::Tilemap { tileset_index } = layer.layer_type
                && tileset_index as usize >= self.tilesets.len()
            {
                return Err(AseError::MalformedFormat(format!(
                    "layer {:?} references missing tileset {tileset_index}",
                    layer.name
                )));
            }
        }
        for frame in &self.frames {
            for cel in &frame.cels {
                if cel.layer >= self.layers.len() {
                    return Err(AseError::MalformedFormat(format!(
                        "cel references missing layer {}",
                        cel.layer
                    )));
                }
            }
        }
        for tag in &self.tags {
            if tag.from_frame > tag.to_frame || tag.to_frame >= self.frames.len() {
                return Err(AseError::MalformedFormat(format!(
                    "tag {:?} has frame range {}..={} outside the document",
                    tag.name, tag.from_frame, tag.to_frame
                )));
            }
        }
        Ok(())
    }

    /// Effective visibility: the AND of the visible flag over the layer and
    /// every ancestor group.
    #[must_use]
    pub fn layer_visible(&self, layer_index: usize) -> bool {
        let mut current = Some(layer_index);
        while let Some(index) = current {
            let layer = &self.layers[index];
            if !layer.is_visible() {
                return false;
            }
            current = layer.parent;
        }
        true
    }

    /// The tileset bound to a tilemap layer, if the layer is one.
    #[must_use]
    pub fn layer_tileset(&self, layer_index: usize) -> Option<&Tileset> {
        match self.layers[layer_index].layer_type {
            LayerType::Tilemap { tileset_index } => Some(&self.tilesets[tileset_index as usize]),
            _ => None,
        }
    }

    /// The baked per-frame keys of every slice, pivots defaulted to
    /// `default_pivot` fractions of the key size when absent.
    #[must_use]
    pub fn baked_slices(&self, default_pivot: (f64, f64)) -> Vec<(String, Vec<SliceKey>)> {
        self.slices
            .iter()
            .map(|slice| {
                (
                    slice.name.clone(),
                    slice.baked_keys(self.frames.len(), default_pivot),
                )
            })
            .collect()
    }
}
