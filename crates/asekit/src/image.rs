//! Flat RGBA rasters and the geometry operations the importer pipeline
//! applies to them: crop, vertical flip, transparency trim, and exact
//! equality for frame deduplication.

/// A straight-alpha RGBA color value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// An integer rectangle in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn overlaps(&self, other: &Rect) -> bool {
        let (ax1, ay1) = (self.x + self.width as i32, self.y + self.height as i32);
        let (bx1, by1) = (other.x + other.width as i32, other.y + other.height as i32);
        self.x < bx1 && other.x < ax1 && self.y < by1 && other.y < ay1
    }
}

/// A flat composited RGBA raster.
///
/// `offset` is the raster's origin within the canvas it was cut from, so a
/// cropped or trimmed image remembers where it came from. The pixel buffer
/// length always equals `width * height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    offset: (i32, i32),
    pixels: Vec<Rgba>,
}

impl Image {
    /// A fully transparent image at the canvas origin.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            offset: (0, 0),
            pixels: vec![Rgba::TRANSPARENT; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    #[must_use]
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        self.pixels[(y * self.width + x) as usize]
    }

    pub(crate) fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba) {
        self.pixels[(y * self.width + x) as usize] = pixel;
    }

    /// The raster's bounds in canvas coordinates.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(self.offset.0, self.offset.1, self.width, self.height)
    }

    /// Copies out the sub-rectangle `rect` (canvas coordinates). Pixels of
    /// `rect` outside this image are transparent. A rect equal to the
    /// current bounds is a plain copy.
    #[must_use]
    pub fn crop(&self, rect: Rect) -> Image {
        if rect == self.bounds() {
            return self.clone();
        }
        let mut out = Image::new(rect.width, rect.height);
        out.offset = (rect.x, rect.y);
        for y in 0..rect.height {
            let src_y = rect.y - self.offset.1 + y as i32;
            if src_y < 0 || src_y >= self.height as i32 {
                continue;
            }
            for x in 0..rect.width {
                let src_x = rect.x - self.offset.0 + x as i32;
                if src_x < 0 || src_x >= self.width as i32 {
                    continue;
                }
                let pixel = self.pixel(src_x as u32, src_y as u32);
                out.put_pixel(x, y, pixel);
            }
        }
        out
    }

    /// Reverses the row order in place.
    pub fn flip_vertical(&mut self) {
        let row = self.width as usize;
        let height = self.height as usize;
        for y in 0..height / 2 {
            let (top, bottom) = self.pixels.split_at_mut((height - y - 1) * row);
            top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
        }
    }

    /// Crops away fully transparent borders.
    ///
    /// An entirely transparent image degenerates to a 1x1 transparent image
    /// at the original offset, keeping downstream nonzero-size invariants
    /// intact.
    #[must_use]
    pub fn trim(&self) -> Image {
        let mut min_x = self.width;
        let mut min_y = self.height;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut any = false;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.pixel(x, y).a > 0 {
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                    any = true;
                }
            }
        }
        if !any {
            let mut out = Image::new(1, 1);
            out.offset = self.offset;
            return out;
        }
        self.crop(Rect::new(
            self.offset.0 + min_x as i32,
            self.offset.1 + min_y as i32,
            max_x - min_x + 1,
            max_y - min_y + 1,
        ))
    }
}

/// Eliminates exact duplicates from `images`, keeping document order.
///
/// Returns the deduplicated images and, for every input index, the index of
/// its representative in the output. Duplicate detection is exact (offset,
/// dimensions, and every pixel), not perceptual, and later frames may only
/// reference earlier representatives, so this runs sequentially.
#[must_use]
pub fn dedup_images(images: Vec<Image>) -> (Vec<Image>, Vec<usize>) {
    let mut unique: Vec<Image> = Vec::new();
    let mut map = Vec::with_capacity(images.len());
    for image in images {
        if let Some(existing) = unique.iter().position(|candidate| *candidate == image) {
            map.push(existing);
        } else {
            map.push(unique.len());
            unique.push(image);
        }
    }
    (unique, map)
}
