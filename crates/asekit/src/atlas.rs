//! Atlas packing: finds the smallest square canvas holding a set of
//! rectangles, by binary search over the side length delegating to a shelf
//! placement routine.
//!
//! The placement heuristic is deliberately simple (shelves filled in height
//! order); the only properties the pipeline relies on are that placements
//! never overlap, the margin is respected, and a square that fits keeps
//! fitting as it grows.

use itertools::Itertools;

use crate::image::Rect;

/// The result of packing: one placement rect per input size, in input
/// order, plus the final canvas dimensions.
#[derive(Debug, Clone)]
pub struct Packing {
    pub rects: Vec<Rect>,
    pub width: u32,
    pub height: u32,
}

/// Packs `sizes` (width, height pairs) with `margin` pixels of spacing into
/// the smallest square canvas the shelf placer can fill.
#[must_use]
pub fn pack(sizes: &[(u32, u32)], margin: u32) -> Packing {
    if sizes.is_empty() {
        return Packing {
            rects: Vec::new(),
            width: 0,
            height: 0,
        };
    }
    // A single image bypasses packing entirely.
    if let [(width, height)] = sizes {
        return Packing {
            rects: vec![Rect::new(0, 0, *width, *height)],
            width: *width,
            height: *height,
        };
    }

    // Everything in one row always fits, so this bounds the search. A lone
    // rect taller than that row is covered by the max-height term.
    let row_bound: u32 = sizes.iter().map(|&(width, _)| width + margin).sum();
    let tallest = sizes
        .iter()
        .map(|&(_, height)| height + margin)
        .max()
        .unwrap_or(0);
    let mut low = 0u32;
    let mut high = row_bound.max(tallest);
    // `best` stays None when the first placement is degenerate (a
    // zero-dimension rect); the search then yields the empty packing below.
    let mut best = try_place(sizes, margin, high);

    // Monotone: if side S fits, every larger side fits too.
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if let Some(rects) = try_place(sizes, margin, mid) {
            high = mid;
            best = Some(rects);
        } else {
            low = mid;
        }
    }

    let Some(mut rects) = best else {
        return Packing {
            rects: Vec::new(),
            width: 0,
            height: 0,
        };
    };

    let extent_x = rects.iter().map(|r| r.x + r.width as i32).max().unwrap_or(0) as u32;
    let extent_y = rects
        .iter()
        .map(|r| r.y + r.height as i32)
        .max()
        .unwrap_or(0) as u32;

    // Center each rect within its margin-padded cell.
    if margin >= 2 {
        let shift = (margin / 2) as i32;
        for rect in &mut rects {
            rect.x += shift;
            rect.y += shift;
        }
    }

    Packing {
        rects,
        width: extent_x + margin,
        height: extent_y + margin,
    }
}

/// Attempts to place every rectangle inside a `side`x`side` square using
/// shelves filled in descending height order. Returns placements in input
/// order, or `None` when something does not fit.
fn try_place(sizes: &[(u32, u32)], margin: u32, side: u32) -> Option<Vec<Rect>> {
    let order = (0..sizes.len()).sorted_by_key(|&index| std::cmp::Reverse(sizes[index].1));

    let mut rects = vec![Rect::new(0, 0, 0, 0); sizes.len()];
    let mut cursor_x = 0u32;
    let mut cursor_y = 0u32;
    let mut shelf_height = 0u32;
    let mut first = true;

    for index in order {
        let (width, height) = sizes[index];
        // A degenerate first placement counts as a failed fit.
        if first && (width == 0 || height == 0) {
            return None;
        }
        first = false;

        let padded_w = width + margin;
        let padded_h = height + margin;
        if cursor_x + padded_w > side {
            cursor_y += shelf_height;
            cursor_x = 0;
            shelf_height = 0;
        }
        if cursor_x + padded_w > side || cursor_y + padded_h > side {
            return None;
        }
        rects[index] = Rect::new(cursor_x as i32, cursor_y as i32, width, height);
        cursor_x += padded_w;
        shelf_height = shelf_height.max(padded_h);
    }

    Some(rects)
}
