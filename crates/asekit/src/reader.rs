//! Primitive decoding over an in-memory byte buffer.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{AseError, Result};

macro_rules! impl_read_int {
    ($name:ident, $ty:ty) => {
        pub(crate) fn $name(&mut self) -> Result<$ty> {
            let mut buf = [0u8; size_of::<$ty>()];
            self.read_exact(&mut buf)?;
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

/// A cursor over a borrowed byte buffer.
///
/// All multi-byte reads are little-endian. Reads past the end of the buffer
/// fail with [`AseError::MalformedFormat`] carrying the offset at which the
/// read was attempted.
#[derive(Debug, Clone)]
pub(crate) struct MemReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> MemReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub(crate) fn tell(&self) -> usize {
        self.position
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub(crate) fn invalid_data(&self, message: &str) -> AseError {
        AseError::MalformedFormat(format!("{message} (at offset {})", self.position))
    }

    pub(crate) fn seek_to(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(self.invalid_data("seek past end of data"));
        }
        self.position = offset;
        Ok(())
    }

    pub(crate) fn skip(&mut self, count: usize) -> Result<()> {
        self.seek_to(self.position + count)
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.remaining() < buf.len() {
            return Err(self.invalid_data("not enough data"));
        }
        buf.copy_from_slice(&self.data[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(())
    }

    /// Splits off the next `len` bytes as an independent reader, advancing
    /// this reader past them. Used for chunk payloads so a handler can never
    /// read past its chunk's declared size.
    pub(crate) fn sub_reader(&mut self, len: usize) -> Result<MemReader<'a>> {
        if self.remaining() < len {
            return Err(self.invalid_data("truncated sub-block"));
        }
        let sub = MemReader::new(&self.data[self.position..self.position + len]);
        self.position += len;
        Ok(sub)
    }

    pub(crate) fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        // Check before allocating: `count` may come from an untrusted size
        // field far larger than the buffer.
        if self.remaining() < count {
            return Err(self.invalid_data("not enough data"));
        }
        let bytes = self.data[self.position..self.position + count].to_vec();
        self.position += count;
        Ok(bytes)
    }

    pub(crate) fn read_remaining(&mut self) -> Vec<u8> {
        let rest = self.data[self.position..].to_vec();
        self.position = self.data.len();
        rest
    }

    impl_read_int!(read_u8, u8);
    impl_read_int!(read_u16_le, u16);
    impl_read_int!(read_i16_le, i16);
    impl_read_int!(read_u32_le, u32);
    impl_read_int!(read_i32_le, i32);

    /// Reads a u16 length-prefixed UTF-8 string.
    pub(crate) fn read_string(&mut self) -> Result<String> {
        let byte_count = self.read_u16_le()?;
        let bytes = self.read_bytes(usize::from(byte_count))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads a 16.16 fixed-point number.
    pub(crate) fn read_fixed(&mut self) -> Result<f64> {
        let raw = self.read_i32_le()?;
        Ok(f64::from(raw) / 65536.0)
    }
}

/// Inflates a zlib-wrapped deflate stream, validating the decompressed size.
///
/// `expected_len` comes from untrusted size fields, so the pre-allocation is
/// capped by the most the compressed input could expand to (deflate tops out
/// at 1032:1) and the decoder never reads past `expected_len + 1` bytes.
pub(crate) fn inflate(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len.min(data.len().saturating_mul(1032)));
    ZlibDecoder::new(data)
        .take((expected_len as u64).saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|err| AseError::MalformedFormat(format!("bad deflate stream: {err}")))?;
    if out.len() != expected_len {
        return Err(AseError::MalformedFormat(format!(
            "decompressed to {} bytes, expected {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}
