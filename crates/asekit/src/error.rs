//! Error types for document decoding.

/// An error produced while decoding a sprite document.
///
/// Both variants are terminal for the document being parsed; there is no
/// partial-document recovery. Compositing and geometry operations are total
/// over a document that passed parse-time validation, so they produce no
/// errors of their own.
#[derive(Debug, thiserror::Error)]
pub enum AseError {
    /// The file violates the structure of the format: a bad magic number, a
    /// compressed payload whose inflated size does not match the expected raw
    /// size, or a structural reference (layer index, linked-cel frame,
    /// tileset index) that points out of range.
    #[error("malformed file: {0}")]
    MalformedFormat(String),

    /// The file uses a chunk or field combination this decoder does not
    /// implement, such as an unexpected bits-per-pixel value.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
}

pub type Result<T> = std::result::Result<T, AseError>;
