//! Little-endian fixed-width field encoding for model files

use crate::error::{EnsembleError, Result};
use std::io::{ErrorKind, Read, Write};

pub fn write_u8<W: Write>(w: &mut W, value: u8) -> Result<()> {
    w.write_all(&[value])?;
    Ok(())
}

pub fn write_i32<W: Write>(w: &mut W, value: i32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn write_f32<W: Write>(w: &mut W, value: f32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Write a count or index that must fit the on-disk `i32` field
pub fn write_len<W: Write>(w: &mut W, value: usize) -> Result<()> {
    let value = i32::try_from(value).map_err(|_| {
        EnsembleError::SerializationError(format!("{} does not fit a 4-byte field", value))
    })?;
    write_i32(w, value)
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => {
            EnsembleError::SerializationError("unexpected end of model file".to_string())
        }
        _ => EnsembleError::IoError(e),
    })?;
    Ok(buf)
}

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    Ok(read_array::<R, 1>(r)?[0])
}

pub fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    Ok(i32::from_le_bytes(read_array(r)?))
}

pub fn read_f32<R: Read>(r: &mut R) -> Result<f32> {
    Ok(f32::from_le_bytes(read_array(r)?))
}

/// Read a non-negative `i32` count or index
pub fn read_len<R: Read>(r: &mut R) -> Result<usize> {
    let value = read_i32(r)?;
    usize::try_from(value).map_err(|_| {
        EnsembleError::SerializationError(format!("negative size field: {}", value))
    })
}

/// Read `n` consecutive `f32` values
pub fn read_f32_vec<R: Read>(r: &mut R, n: usize) -> Result<Vec<f32>> {
    (0..n).map(|_| read_f32(r)).collect()
}
