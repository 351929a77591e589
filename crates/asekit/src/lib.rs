//! Decoding, compositing, and atlas packing for Aseprite documents.
//!
//! The pipeline is a pure transform with three stages:
//!
//! 1. [`Document::parse`] decodes the chunked binary format into a fully
//!    resolved document (layer hierarchy, linked cels, tilesets, palette,
//!    tags, slices).
//! 2. [`composite`] flattens one frame's visible, blended, possibly tiled
//!    layers into a canvas-sized [`Image`]; geometry ops on [`Image`] then
//!    crop, trim, and flip it.
//! 3. [`atlas::pack`] arranges a deduplicated set of frame images into the
//!    smallest square canvas.
//!
//! [`export_frames`] drives all three stages under an [`ImportOptions`],
//! producing exactly what an engine-side importer consumes: unique frame
//! images, a frame-to-image map, and atlas placements.
//!
//! Everything is synchronous and side-effect-free; independent documents
//! (or frames of one document) can be processed on separate threads freely.

pub mod atlas;
pub mod error;
pub mod format;
pub mod image;
mod reader;
mod render;

pub use crate::error::{AseError, Result};
pub use crate::format::Document;
pub use crate::image::{Image, Rect, Rgba, dedup_images};
pub use crate::render::composite;

/// Configuration supplied by the importing collaborator.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Pass palette indices through in the red channel instead of resolving
    /// them to colors (indexed documents only).
    pub indexed_output: bool,
    /// Trim transparent borders from each frame.
    pub trim: bool,
    /// Flip each frame vertically (for bottom-up texture coordinates).
    pub flip: bool,
    /// Collapse byte-identical frames into one image.
    pub dedup: bool,
    /// Pixel spacing between packed frames.
    pub atlas_margin: u32,
    /// Pivot fractions used for slice keys without an explicit pivot.
    pub default_pivot: (f64, f64),
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            indexed_output: false,
            trim: true,
            flip: false,
            dedup: true,
            atlas_margin: 0,
            default_pivot: (0.5, 0.5),
        }
    }
}

/// The composited frames of a document, deduplicated and packed.
#[derive(Debug, Clone)]
pub struct FrameSet {
    /// Unique frame images, in first-appearance order.
    pub images: Vec<Image>,
    /// For every document frame, the index of its image in `images`.
    pub frame_map: Vec<usize>,
    /// Atlas placement for each image in `images`.
    pub packing: atlas::Packing,
}

/// Composites every frame of `doc`, applies the configured geometry ops,
/// deduplicates, and packs the result.
///
/// Deduplication runs sequentially in document order: a later frame may only
/// reference an earlier representative.
#[must_use]
pub fn export_frames(doc: &Document, options: &ImportOptions) -> FrameSet {
    let mut images: Vec<Image> = (0..doc.frames.len())
        .map(|frame| {
            let mut image = composite(doc, frame, options.indexed_output);
            if options.trim {
                image = image.trim();
            }
            if options.flip {
                image.flip_vertical();
            }
            image
        })
        .collect();

    let frame_map;
    if options.dedup {
        (images, frame_map) = dedup_images(images);
    } else {
        frame_map = (0..images.len()).collect();
    }

    let sizes: Vec<(u32, u32)> = images
        .iter()
        .map(|image| (image.width(), image.height()))
        .collect();
    let packing = atlas::pack(&sizes, options.atlas_margin);

    FrameSet {
        images,
        frame_map,
        packing,
    }
}
