#![cfg(test)]

use proptest::prelude::*;

use super::blend::blend;
use super::compose::composite;
use crate::format::{
    BlendMode, Cel, CelData, ColorDepth, Document, Frame, Header, HeaderFlags, ImageCel, Layer,
    LayerFlags, LayerType, Palette, PaletteEntry, TilemapCel, Tileset, TilesetFlags,
};
use crate::image::Rgba;

fn rgba_layer(name: &str, blend_mode: BlendMode) -> Layer {
    Layer {
        name: name.to_string(),
        flags: LayerFlags::VISIBLE,
        layer_type: LayerType::Normal,
        blend_mode,
        opacity: 255,
        child_level: 0,
        parent: None,
    }
}

fn image_cel(layer: usize, x: i32, y: i32, width: u32, height: u32, color: Rgba) -> Cel {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for _ in 0..width * height {
        pixels.extend_from_slice(&[color.r, color.g, color.b, color.a]);
    }
    Cel {
        layer,
        x,
        y,
        opacity: 255,
        precise: None,
        data: CelData::Image(ImageCel {
            width,
            height,
            pixels,
        }),
    }
}

fn document(width: u16, height: u16, layers: Vec<Layer>, frames: Vec<Frame>) -> Document {
    Document {
        header: Header {
            width,
            height,
            depth: ColorDepth::Rgba,
            frame_count: frames.len() as u16,
            flags: HeaderFlags::empty(),
            transparent_index: 0,
            num_colors: 0,
        },
        layers,
        frames,
        palette: None,
        tags: Vec::new(),
        slices: Vec::new(),
        tilesets: Vec::new(),
        external_files: Vec::new(),
    }
}

mod blending {
    use super::*;

    const OPAQUE_RED: Rgba = Rgba::new(200, 20, 20, 255);
    const OPAQUE_TEAL: Rgba = Rgba::new(30, 140, 160, 255);

    #[test]
    fn normal_over_empty_dest_returns_source() {
        let src = Rgba::new(12, 34, 56, 200);
        assert_eq!(blend(BlendMode::Normal, Rgba::TRANSPARENT, src, 255), src);
    }

    #[test]
    fn empty_source_leaves_dest() {
        for mode in [BlendMode::Normal, BlendMode::Multiply, BlendMode::Hue] {
            assert_eq!(
                blend(mode, OPAQUE_RED, Rgba::TRANSPARENT, 255),
                OPAQUE_RED
            );
        }
    }

    #[test]
    fn zero_opacity_leaves_dest() {
        assert_eq!(blend(BlendMode::Normal, OPAQUE_RED, OPAQUE_TEAL, 0), OPAQUE_RED);
    }

    #[test]
    fn multiply_darkens_and_screen_lightens() {
        let out = blend(BlendMode::Multiply, OPAQUE_RED, OPAQUE_TEAL, 255);
        assert!(out.r <= OPAQUE_RED.r && out.g <= OPAQUE_TEAL.g);
        let out = blend(BlendMode::Screen, OPAQUE_RED, OPAQUE_TEAL, 255);
        assert!(out.r >= OPAQUE_RED.r && out.g >= OPAQUE_TEAL.g);
    }

    #[test]
    fn darken_and_lighten_pick_channel_extremes() {
        let dark = blend(BlendMode::Darken, OPAQUE_RED, OPAQUE_TEAL, 255);
        assert_eq!((dark.r, dark.g, dark.b), (30, 20, 20));
        let light = blend(BlendMode::Lighten, OPAQUE_RED, OPAQUE_TEAL, 255);
        assert_eq!((light.r, light.g, light.b), (200, 140, 160));
    }

    #[test]
    fn overlay_is_hard_light_swapped() {
        let overlay = blend(BlendMode::Overlay, OPAQUE_RED, OPAQUE_TEAL, 255);
        let hard = blend(BlendMode::HardLight, OPAQUE_TEAL, OPAQUE_RED, 255);
        assert_eq!((overlay.r, overlay.g, overlay.b), (hard.r, hard.g, hard.b));
    }

    #[test]
    fn addition_and_subtraction_clamp() {
        let add = blend(BlendMode::Addition, OPAQUE_RED, OPAQUE_RED, 255);
        assert_eq!(add.r, 255);
        let sub = blend(BlendMode::Subtraction, Rgba::new(10, 10, 10, 255), OPAQUE_RED, 255);
        assert_eq!(sub.r, 0);
    }

    fn luma(p: Rgba) -> f64 {
        0.3 * f64::from(p.r) + 0.59 * f64::from(p.g) + 0.11 * f64::from(p.b)
    }

    #[test]
    fn color_mode_borrows_dest_luminosity() {
        let out = blend(BlendMode::Color, OPAQUE_RED, OPAQUE_TEAL, 255);
        assert!((luma(out) - luma(OPAQUE_RED)).abs() < 2.0);
    }

    #[test]
    fn luminosity_mode_borrows_source_luminosity() {
        let out = blend(BlendMode::Luminosity, OPAQUE_RED, OPAQUE_TEAL, 255);
        assert!((luma(out) - luma(OPAQUE_TEAL)).abs() < 2.0);
    }

    #[test]
    fn hue_mode_preserves_dest_gray_axis() {
        // A gray dest has zero saturation, so borrowing its saturation must
        // produce gray again regardless of the source hue.
        let gray = Rgba::new(100, 100, 100, 255);
        let out = blend(BlendMode::Hue, gray, OPAQUE_TEAL, 255);
        assert!((luma(out) - luma(gray)).abs() < 2.0);
        assert!(i32::from(out.r).abs_diff(i32::from(out.g)) <= 1);
        assert!(i32::from(out.g).abs_diff(i32::from(out.b)) <= 1);
    }

    proptest! {
        #[test]
        fn screen_is_inverted_multiply(a in 0u8..=255, b in 0u8..=255) {
            let dest = Rgba::new(a, a, a, 255);
            let src = Rgba::new(b, b, b, 255);
            let screen = blend(BlendMode::Screen, dest, src, 255);
            let inv_mul = blend(
                BlendMode::Multiply,
                Rgba::new(255 - a, 255 - a, 255 - a, 255),
                Rgba::new(255 - b, 255 - b, 255 - b, 255),
                255,
            );
            prop_assert_eq!(screen.r, 255 - inv_mul.r);
        }

        #[test]
        fn composed_alpha_never_decreases(
            dest_a in 0u8..=255, src_a in 0u8..=255, opacity in 0u8..=255
        ) {
            let dest = Rgba::new(50, 50, 50, dest_a);
            let src = Rgba::new(70, 70, 70, src_a);
            let out = blend(BlendMode::Normal, dest, src, opacity);
            if dest_a > 0 {
                prop_assert!(out.a >= dest_a);
            }
        }
    }
}

mod compositing {
    use super::*;

    #[test]
    fn single_opaque_layer_fills_canvas() {
        let red = Rgba::new(255, 0, 0, 255);
        let doc = document(
            2,
            2,
            vec![rgba_layer("base", BlendMode::Normal)],
            vec![Frame {
                duration_ms: 100,
                cels: vec![image_cel(0, 0, 0, 2, 2, red)],
            }],
        );
        let out = composite(&doc, 0, false);
        assert!(out.pixels().iter().all(|&p| p == red));
    }

    #[test]
    fn hidden_ancestor_hides_child_cel() {
        let mut group = rgba_layer("group", BlendMode::Normal);
        group.layer_type = LayerType::Group;
        group.flags = LayerFlags::empty();
        let mut child = rgba_layer("child", BlendMode::Normal);
        child.child_level = 1;
        child.parent = Some(0);
        let doc = document(
            2,
            2,
            vec![group, child],
            vec![Frame {
                duration_ms: 100,
                cels: vec![image_cel(1, 0, 0, 2, 2, Rgba::new(255, 0, 0, 255))],
            }],
        );
        let out = composite(&doc, 0, false);
        assert!(out.pixels().iter().all(|&p| p == Rgba::TRANSPARENT));
    }

    #[test]
    fn cel_opacity_applies_without_layer_override() {
        let mut cel = image_cel(0, 0, 0, 1, 1, Rgba::new(255, 0, 0, 255));
        cel.opacity = 128;
        let doc = document(
            1,
            1,
            vec![rgba_layer("base", BlendMode::Normal)],
            vec![Frame {
                duration_ms: 100,
                cels: vec![cel],
            }],
        );
        let out = composite(&doc, 0, false);
        assert_eq!(out.pixel(0, 0).a, 128);
    }

    #[test]
    fn layer_opacity_overrides_cel_opacity_when_flagged() {
        let mut cel = image_cel(0, 0, 0, 1, 1, Rgba::new(255, 0, 0, 255));
        cel.opacity = 10;
        let mut layer = rgba_layer("base", BlendMode::Normal);
        layer.opacity = 200;
        let mut doc = document(
            1,
            1,
            vec![layer],
            vec![Frame {
                duration_ms: 100,
                cels: vec![cel],
            }],
        );
        doc.header.flags = HeaderFlags::LAYER_OPACITY_VALID;
        let out = composite(&doc, 0, false);
        assert_eq!(out.pixel(0, 0).a, 200);
    }

    #[test]
    fn blit_clips_to_canvas_bounds() {
        let doc = document(
            2,
            2,
            vec![rgba_layer("base", BlendMode::Normal)],
            vec![Frame {
                duration_ms: 100,
                cels: vec![image_cel(0, -1, -1, 3, 3, Rgba::new(0, 255, 0, 255))],
            }],
        );
        let out = composite(&doc, 0, false);
        assert!(out.pixels().iter().all(|&p| p.a == 255));
    }

    #[test]
    fn linked_cel_composites_like_its_source() {
        let red = Rgba::new(255, 0, 0, 255);
        let source_frame = Frame {
            duration_ms: 100,
            cels: vec![image_cel(0, 1, 0, 1, 1, red)],
        };
        let linked_frame = Frame {
            duration_ms: 100,
            cels: vec![Cel {
                layer: 0,
                x: 1,
                y: 0,
                opacity: 255,
                precise: None,
                data: CelData::Linked { frame: 0, cel: 0 },
            }],
        };
        let doc = document(
            2,
            1,
            vec![rgba_layer("base", BlendMode::Normal)],
            vec![source_frame, linked_frame],
        );
        assert_eq!(composite(&doc, 1, false), composite(&doc, 0, false));
    }

    #[test]
    fn precise_bounds_resample_to_scaled_footprint() {
        let mut cel = image_cel(0, 0, 0, 1, 1, Rgba::new(0, 0, 255, 255));
        cel.precise = Some(crate::format::PreciseBounds {
            x: 0.0,
            y: 0.0,
            width: 2.0,
            height: 2.0,
        });
        let doc = document(
            2,
            2,
            vec![rgba_layer("base", BlendMode::Normal)],
            vec![Frame {
                duration_ms: 100,
                cels: vec![cel],
            }],
        );
        let out = composite(&doc, 0, false);
        assert!(out.pixels().iter().all(|&p| p.a == 255));
    }

    fn indexed_document() -> Document {
        let mut doc = document(2, 1, vec![rgba_layer("base", BlendMode::Multiply)], vec![]);
        doc.header.depth = ColorDepth::Indexed;
        doc.header.transparent_index = 0;
        doc.palette = Some(Palette {
            entries: vec![
                PaletteEntry {
                    color: Rgba::new(9, 9, 9, 255),
                    name: None,
                },
                PaletteEntry {
                    color: Rgba::new(0, 200, 0, 255),
                    name: None,
                },
            ],
        });
        doc.frames = vec![Frame {
            duration_ms: 100,
            cels: vec![Cel {
                layer: 0,
                x: 0,
                y: 0,
                opacity: 255,
                precise: None,
                data: CelData::Image(ImageCel {
                    width: 2,
                    height: 1,
                    pixels: vec![0, 1],
                }),
            }],
        }];
        doc.header.frame_count = 1;
        doc
    }

    #[test]
    fn indexed_pixels_resolve_through_palette() {
        let out = composite(&indexed_document(), 0, false);
        // Index 0 is the transparent index; index 1 resolves to green. The
        // layer's Multiply mode is forced to Normal for indexed documents.
        assert_eq!(out.pixel(0, 0), Rgba::TRANSPARENT);
        assert_eq!(out.pixel(1, 0), Rgba::new(0, 200, 0, 255));
    }

    #[test]
    fn indexed_output_passes_raw_indices_through() {
        let out = composite(&indexed_document(), 0, true);
        assert_eq!(out.pixel(0, 0), Rgba::TRANSPARENT);
        assert_eq!(out.pixel(1, 0), Rgba::new(1, 0, 0, 255));
    }

    #[test]
    fn tilemap_cel_expands_against_its_tileset() {
        let mut layer = rgba_layer("tiles", BlendMode::Normal);
        layer.layer_type = LayerType::Tilemap { tileset_index: 0 };

        // Two 1x1 RGBA tiles: tile 0 transparent-ish blue, tile 1 yellow.
        let tileset = Tileset {
            id: 0,
            name: "terrain".to_string(),
            flags: TilesetFlags::EMBEDDED | TilesetFlags::ZERO_IS_EMPTY,
            tile_width: 1,
            tile_height: 1,
            tile_count: 2,
            base_index: 1,
            pixels: vec![0, 0, 255, 255, 255, 255, 0, 255],
        };

        // 2x1 grid of 32-bit tile references: [1, 0]; 0 is empty.
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        let cel = Cel {
            layer: 0,
            x: 0,
            y: 0,
            opacity: 255,
            precise: None,
            data: CelData::Tilemap(TilemapCel {
                width: 2,
                height: 1,
                bits_per_tile: 32,
                tile_id_mask: 0x1fff_ffff,
                x_flip_mask: 0x8000_0000,
                y_flip_mask: 0x4000_0000,
                diagonal_flip_mask: 0x2000_0000,
                data,
            }),
        };

        let mut doc = document(
            2,
            1,
            vec![layer],
            vec![Frame {
                duration_ms: 100,
                cels: vec![cel],
            }],
        );
        doc.tilesets = vec![tileset];

        let out = composite(&doc, 0, false);
        assert_eq!(out.pixel(0, 0), Rgba::new(255, 255, 0, 255));
        assert_eq!(out.pixel(1, 0), Rgba::TRANSPARENT);
    }
}
