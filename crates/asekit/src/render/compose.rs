//! Compositing of one frame into a flat canvas-sized raster.

use crate::format::{BlendMode, Cel, CelData, ColorDepth, Document, HeaderFlags, ImageCel};
use crate::image::{Image, Rgba};
use crate::render::blend::blend;

/// Composites `frame_index` of the document into a canvas-sized image,
/// walking the frame's cels in file order (layer order, bottom to top).
///
/// When `indexed_output` is set and the document is indexed, palette indices
/// are passed through in the red channel with full alpha instead of being
/// looked up, which lets the caller keep the palette external.
///
/// This is a total function: every structural reference was validated when
/// the document was parsed.
#[must_use]
pub fn composite(doc: &Document, frame_index: usize, indexed_output: bool) -> Image {
    let mut canvas = Image::new(u32::from(doc.header.width), u32::from(doc.header.height));

    for cel in &doc.frames[frame_index].cels {
        let layer = &doc.layers[cel.layer];
        if !doc.layer_visible(cel.layer) {
            continue;
        }

        let opacity = if doc.header.flags.contains(HeaderFlags::LAYER_OPACITY_VALID) {
            layer.opacity
        } else {
            cel.opacity
        };
        if opacity == 0 {
            continue;
        }

        // Indexed documents never blend.
        let mode = if doc.header.depth == ColorDepth::Indexed {
            BlendMode::Normal
        } else {
            layer.blend_mode
        };

        // A linked cel keeps its own position but borrows the source cel's
        // pixel data.
        let data = match &cel.data {
            CelData::Linked { frame, cel } => &doc.frames[*frame].cels[*cel].data,
            other => other,
        };

        match data {
            CelData::Image(image) => {
                let pixels = decode_pixels(doc, &image.pixels, indexed_output);
                blit_image(&mut canvas, cel, image, &pixels, mode, opacity);
            }
            CelData::Tilemap(tilemap) => {
                blit_tilemap(&mut canvas, doc, cel, tilemap, mode, opacity, indexed_output);
            }
            // Links are resolved in one hop at parse time.
            CelData::Linked { .. } => unreachable!("linked cel resolved to another link"),
        }
    }

    canvas
}

/// Decodes raw cel or tileset bytes into straight-alpha RGBA per the
/// document's color depth.
fn decode_pixels(doc: &Document, bytes: &[u8], indexed_output: bool) -> Vec<Rgba> {
    match doc.header.depth {
        ColorDepth::Rgba => bytes
            .chunks_exact(4)
            .map(|px| Rgba::new(px[0], px[1], px[2], px[3]))
            .collect(),
        ColorDepth::Grayscale => bytes
            .chunks_exact(2)
            .map(|px| Rgba::new(px[0], px[0], px[0], px[1]))
            .collect(),
        ColorDepth::Indexed => bytes
            .iter()
            .map(|&index| {
                if index == doc.header.transparent_index {
                    Rgba::TRANSPARENT
                } else if indexed_output {
                    Rgba::new(index, 0, 0, 255)
                } else {
                    doc.palette
                        .as_ref()
                        .map_or(Rgba::TRANSPARENT, |palette| palette.color(index))
                }
            })
            .collect(),
    }
}

fn blit_image(
    canvas: &mut Image,
    cel: &Cel,
    image: &ImageCel,
    pixels: &[Rgba],
    mode: BlendMode,
    opacity: u8,
) {
    if let Some(precise) = cel.precise {
        // Nearest-neighbor resample to the scaled footprint.
        let out_w = precise.width.round() as i64;
        let out_h = precise.height.round() as i64;
        if out_w <= 0 || out_h <= 0 || image.width == 0 || image.height == 0 {
            return;
        }
        let x0 = precise.x.round() as i64;
        let y0 = precise.y.round() as i64;
        for oy in 0..out_h {
            for ox in 0..out_w {
                let sx = (ox * i64::from(image.width) / out_w) as u32;
                let sy = (oy * i64::from(image.height) / out_h) as u32;
                let src = pixels[(sy * image.width + sx) as usize];
                blit_pixel(canvas, x0 + ox, y0 + oy, src, mode, opacity);
            }
        }
    } else {
        blit_block(
            canvas,
            pixels,
            image.width,
            image.height,
            i64::from(cel.x),
            i64::from(cel.y),
            mode,
            opacity,
        );
    }
}

fn blit_tilemap(
    canvas: &mut Image,
    doc: &Document,
    cel: &Cel,
    tilemap: &crate::format::TilemapCel,
    mode: BlendMode,
    opacity: u8,
    indexed_output: bool,
) {
    let Some(tileset) = doc.layer_tileset(cel.layer) else {
        return;
    };
    let zero_is_empty = tileset
        .flags
        .contains(crate::format::TilesetFlags::ZERO_IS_EMPTY);

    let bits = u32::from(tilemap.bits_per_tile);
    let mut bit_reader = BitReader::new(&tilemap.data);

    for row in 0..tilemap.height {
        for col in 0..tilemap.width {
            let Some(value) = bit_reader.read(bits) else {
                return;
            };
            let tile_id = value & tilemap.tile_id_mask;
            // Flip and rotation bits are decoded but deliberately not applied
            // to the blit; tile transformation is unimplemented.
            let _x_flip = value & tilemap.x_flip_mask != 0;
            let _y_flip = value & tilemap.y_flip_mask != 0;
            let _diagonal_flip = value & tilemap.diagonal_flip_mask != 0;

            if (zero_is_empty && tile_id == 0)
                || tile_id == tilemap.tile_id_mask
                || tile_id >= tileset.tile_count
            {
                continue;
            }

            let tile_bytes = tileset.tile_pixels(tile_id, doc.header.depth);
            let pixels = decode_pixels(doc, tile_bytes, indexed_output);
            blit_block(
                canvas,
                &pixels,
                u32::from(tileset.tile_width),
                u32::from(tileset.tile_height),
                i64::from(cel.x) + i64::from(col) * i64::from(tileset.tile_width),
                i64::from(cel.y) + i64::from(row) * i64::from(tileset.tile_height),
                mode,
                opacity,
            );
        }
    }
}

#[expect(clippy::too_many_arguments)]
fn blit_block(
    canvas: &mut Image,
    pixels: &[Rgba],
    width: u32,
    height: u32,
    x0: i64,
    y0: i64,
    mode: BlendMode,
    opacity: u8,
) {
    for sy in 0..height {
        for sx in 0..width {
            let src = pixels[(sy * width + sx) as usize];
            blit_pixel(
                canvas,
                x0 + i64::from(sx),
                y0 + i64::from(sy),
                src,
                mode,
                opacity,
            );
        }
    }
}

/// Blends one source pixel into the canvas, discarding writes outside it.
fn blit_pixel(canvas: &mut Image, x: i64, y: i64, src: Rgba, mode: BlendMode, opacity: u8) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    let dest = canvas.pixel(x, y);
    canvas.put_pixel(x, y, blend(mode, dest, src, opacity));
}

/// Reads fixed-width little-endian bit fields that may span byte boundaries,
/// accumulating 8 bits at a time.
struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    accumulator: u64,
    available: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            accumulator: 0,
            available: 0,
        }
    }

    fn read(&mut self, bits: u32) -> Option<u32> {
        debug_assert!(bits > 0 && bits <= 32);
        while self.available < bits {
            let byte = *self.data.get(self.position)?;
            self.accumulator |= u64::from(byte) << self.available;
            self.available += 8;
            self.position += 1;
        }
        let mask = if bits == 32 {
            u64::from(u32::MAX)
        } else {
            (1u64 << bits) - 1
        };
        let value = (self.accumulator & mask) as u32;
        self.accumulator >>= bits;
        self.available -= bits;
        Some(value)
    }
}
