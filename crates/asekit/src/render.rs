//! Compositing of decoded documents into flat RGBA rasters.

mod blend;
mod compose;
mod tests;

pub use self::compose::composite;
