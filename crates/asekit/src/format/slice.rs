//! Slices: named sub-rectangles of the canvas, optionally animated per
//! frame, with step-function ("baking") expansion over the timeline.

use crate::format::raw;
use crate::image::Rect;

/// The settings of a slice at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceKey {
    pub frame: usize,
    pub bounds: Rect,
    /// Center rectangle of a 9-patch slice, in canvas coordinates.
    pub center: Option<Rect>,
    pub pivot: Option<(f64, f64)>,
}

impl SliceKey {
    fn zero() -> Self {
        Self {
            frame: 0,
            bounds: Rect::new(0, 0, 0, 0),
            center: None,
            pivot: None,
        }
    }
}

/// A named sub-rectangle of the canvas that may vary per frame.
#[derive(Debug, Clone)]
pub struct Slice {
    pub name: String,
    /// Keys sorted by starting frame, as emitted in the file.
    pub keys: Vec<SliceKey>,
}

impl Slice {
    pub(super) fn from_chunk(chunk: raw::SliceChunk) -> Self {
        let keys = chunk
            .keys
            .into_iter()
            .map(|key| SliceKey {
                frame: key.frame as usize,
                bounds: Rect::new(key.x, key.y, key.width, key.height),
                center: key
                    .center
                    .map(|(x, y, width, height)| Rect::new(x, y, width, height)),
                pivot: key
                    .pivot
                    .map(|(x, y)| (f64::from(x), f64::from(y))),
            })
            .collect();
        Self {
            name: chunk.name,
            keys,
        }
    }

    /// Expands the key list into one key per frame: each key's settings
    /// persist forward until superseded by the next key. Frames before the
    /// first key get a zero-sized default key.
    ///
    /// A key without an explicit pivot gets one synthesized at
    /// `default_pivot` fractions of the key's size.
    #[must_use]
    pub fn baked_keys(&self, total_frames: usize, default_pivot: (f64, f64)) -> Vec<SliceKey> {
        let mut current = SliceKey::zero();
        let mut baked = Vec::with_capacity(total_frames);
        for frame in 0..total_frames {
            if let Some(key) = self.keys.iter().find(|key| key.frame == frame) {
                current = key.clone();
                if current.pivot.is_none() {
                    current.pivot = Some((
                        default_pivot.0 * f64::from(current.bounds.width),
                        default_pivot.1 * f64::from(current.bounds.height),
                    ));
                }
            }
            baked.push(SliceKey {
                frame,
                ..current.clone()
            });
        }
        baked
    }
}
