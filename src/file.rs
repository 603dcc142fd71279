//! Little-endian framing helpers for the binary layer/network format.

use crate::error::Error;
use std::io::{Read, Write};

/// Write a size field as a 4-byte little-endian unsigned integer
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<(), Error> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Read a 4-byte little-endian unsigned integer
pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32, Error> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a size field and fail with a format error unless it matches
pub fn expect_u32<R: Read>(reader: &mut R, expected: u32, what: &str) -> Result<(), Error> {
    let found = read_u32(reader)?;
    if found != expected {
        return Err(Error::Format(format!(
            "{}: expected {}, found {}",
            what, expected, found
        )));
    }
    Ok(())
}
