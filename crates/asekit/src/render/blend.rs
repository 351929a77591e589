//! The per-pixel blend engine: Aseprite's 19 layer blend modes over
//! straight-alpha 8-bit channels.
//!
//! Every mode shares the Normal-mode alpha composition; the mode only
//! changes the effective source RGB fed into it. The per-channel modes use
//! the same rounded fixed-point helpers Aseprite uses, so dualities such as
//! `screen(a, b) == 255 - multiply(255 - a, 255 - b)` hold exactly.

use crate::format::BlendMode;
use crate::image::Rgba;

/// Rounded `a * b / 255`.
fn mul_un8(a: i32, b: i32) -> i32 {
    let t = a * b + 0x80;
    ((t >> 8) + t) >> 8
}

/// Rounded `a * 255 / b`; caller guarantees `b != 0`.
fn div_un8(a: i32, b: i32) -> i32 {
    (a * 0xFF + b / 2) / b
}

fn clamp_un8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

fn multiply(a: i32, b: i32) -> i32 {
    mul_un8(a, b)
}

fn screen(a: i32, b: i32) -> i32 {
    a + b - mul_un8(a, b)
}

fn hard_light(a: i32, b: i32) -> i32 {
    if b < 128 {
        multiply(a, b << 1)
    } else {
        screen(a, (b << 1) - 255)
    }
}

fn darken(a: i32, b: i32) -> i32 {
    a.min(b)
}

fn lighten(a: i32, b: i32) -> i32 {
    a.max(b)
}

fn color_dodge(a: i32, b: i32) -> i32 {
    if a == 0 {
        return 0;
    }
    let b = 255 - b;
    if b <= a { 255 } else { div_un8(a, b) }
}

fn color_burn(a: i32, b: i32) -> i32 {
    if a == 255 {
        return 255;
    }
    let a = 255 - a;
    if a >= b { 0 } else { 255 - div_un8(a, b) }
}

fn soft_light(a: i32, b: i32) -> i32 {
    let dest = f64::from(a) / 255.0;
    let src = f64::from(b) / 255.0;

    let d = if dest <= 0.25 {
        ((16.0 * dest - 12.0) * dest + 4.0) * dest
    } else {
        dest.sqrt()
    };

    let result = if src <= 0.5 {
        dest - (1.0 - 2.0 * src) * dest * (1.0 - dest)
    } else {
        dest + (2.0 * src - 1.0) * (d - dest)
    };

    (result * 255.0 + 0.5) as i32
}

fn difference(a: i32, b: i32) -> i32 {
    (a - b).abs()
}

fn exclusion(a: i32, b: i32) -> i32 {
    a + b - 2 * mul_un8(a, b)
}

fn addition(a: i32, b: i32) -> i32 {
    (a + b).min(255)
}

fn subtract(a: i32, b: i32) -> i32 {
    (a - b).max(0)
}

fn divide(a: i32, b: i32) -> i32 {
    if a == 0 {
        0
    } else if a >= b {
        255
    } else {
        div_un8(a, b)
    }
}

// The HSL family operates on the whole RGB triple in normalized space.

fn luminosity(rgb: [f64; 3]) -> f64 {
    0.3 * rgb[0] + 0.59 * rgb[1] + 0.11 * rgb[2]
}

fn saturation(rgb: [f64; 3]) -> f64 {
    rgb[0].max(rgb[1]).max(rgb[2]) - rgb[0].min(rgb[1]).min(rgb[2])
}

/// Rescales mid and max channels relative to min, preserving rank order via
/// a 3-way median, so the triple's saturation becomes `sat`.
fn set_saturation(rgb: [f64; 3], sat: f64) -> [f64; 3] {
    let mut order = [0usize, 1, 2];
    order.sort_by(|&left, &right| rgb[left].total_cmp(&rgb[right]));
    let [min, mid, max] = order;

    let mut out = [0.0; 3];
    if rgb[max] > rgb[min] {
        out[mid] = (rgb[mid] - rgb[min]) * sat / (rgb[max] - rgb[min]);
        out[max] = sat;
    }
    out[min] = 0.0;
    out
}

/// Shifts all channels so the triple's luminosity becomes `lum`, then clips
/// back into gamut by interpolating toward the luminosity value.
fn set_luminosity(rgb: [f64; 3], lum: f64) -> [f64; 3] {
    let delta = lum - luminosity(rgb);
    clip_color([rgb[0] + delta, rgb[1] + delta, rgb[2] + delta])
}

fn clip_color(rgb: [f64; 3]) -> [f64; 3] {
    let lum = luminosity(rgb);
    let min = rgb[0].min(rgb[1]).min(rgb[2]);
    let max = rgb[0].max(rgb[1]).max(rgb[2]);

    let mut out = rgb;
    if min < 0.0 {
        for channel in &mut out {
            *channel = lum + (*channel - lum) * lum / (lum - min);
        }
    }
    if max > 1.0 {
        for channel in &mut out {
            *channel = lum + (*channel - lum) * (1.0 - lum) / (max - lum);
        }
    }
    out
}

fn normalized(pixel: Rgba) -> [f64; 3] {
    [
        f64::from(pixel.r) / 255.0,
        f64::from(pixel.g) / 255.0,
        f64::from(pixel.b) / 255.0,
    ]
}

fn denormalized(rgb: [f64; 3]) -> (i32, i32, i32) {
    (
        (rgb[0] * 255.0 + 0.5) as i32,
        (rgb[1] * 255.0 + 0.5) as i32,
        (rgb[2] * 255.0 + 0.5) as i32,
    )
}

/// The mode-specific source RGB, before alpha composition.
fn blended_rgb(mode: BlendMode, dest: Rgba, src: Rgba) -> (i32, i32, i32) {
    let per_channel = |op: fn(i32, i32) -> i32| {
        (
            op(i32::from(dest.r), i32::from(src.r)),
            op(i32::from(dest.g), i32::from(src.g)),
            op(i32::from(dest.b), i32::from(src.b)),
        )
    };
    match mode {
        BlendMode::Normal => (i32::from(src.r), i32::from(src.g), i32::from(src.b)),
        BlendMode::Multiply => per_channel(multiply),
        BlendMode::Screen => per_channel(screen),
        // Overlay is hard light with the operands swapped.
        BlendMode::Overlay => per_channel(|a, b| hard_light(b, a)),
        BlendMode::Darken => per_channel(darken),
        BlendMode::Lighten => per_channel(lighten),
        BlendMode::ColorDodge => per_channel(color_dodge),
        BlendMode::ColorBurn => per_channel(color_burn),
        BlendMode::HardLight => per_channel(hard_light),
        BlendMode::SoftLight => per_channel(soft_light),
        BlendMode::Difference => per_channel(difference),
        BlendMode::Exclusion => per_channel(exclusion),
        BlendMode::Addition => per_channel(addition),
        BlendMode::Subtraction => per_channel(subtract),
        BlendMode::Divide => per_channel(divide),
        BlendMode::Hue => {
            let base = normalized(dest);
            let rgb = set_saturation(normalized(src), saturation(base));
            denormalized(set_luminosity(rgb, luminosity(base)))
        }
        BlendMode::Saturation => {
            let base = normalized(dest);
            let rgb = set_saturation(base, saturation(normalized(src)));
            denormalized(set_luminosity(rgb, luminosity(base)))
        }
        BlendMode::Color => {
            let base = normalized(dest);
            denormalized(set_luminosity(normalized(src), luminosity(base)))
        }
        BlendMode::Luminosity => {
            let base = normalized(dest);
            denormalized(set_luminosity(base, luminosity(normalized(src))))
        }
    }
}

/// Blends `src` over `dest` with the given mode and opacity (0..=255),
/// returning the composed straight-alpha pixel.
pub(crate) fn blend(mode: BlendMode, dest: Rgba, src: Rgba, opacity: u8) -> Rgba {
    if dest.a == 0 {
        let mut out = src;
        out.a = clamp_un8(mul_un8(i32::from(src.a), i32::from(opacity)));
        return out;
    }
    if src.a == 0 {
        return dest;
    }

    let src_alpha = mul_un8(i32::from(src.a), i32::from(opacity));
    if src_alpha == 0 {
        return dest;
    }
    let dest_alpha = i32::from(dest.a);
    let out_alpha = src_alpha + dest_alpha - mul_un8(src_alpha, dest_alpha);

    let (sr, sg, sb) = blended_rgb(mode, dest, src);
    let channel = |dest_channel: u8, src_channel: i32| {
        let dest_channel = i32::from(dest_channel);
        clamp_un8(dest_channel + (src_channel - dest_channel) * src_alpha / out_alpha)
    };

    Rgba::new(
        channel(dest.r, sr),
        channel(dest.g, sg),
        channel(dest.b, sb),
        clamp_un8(out_alpha),
    )
}
