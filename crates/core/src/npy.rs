//! Minimal reader/writer for the standard NumPy `.npy` array format (magic
//! `\x93NUMPY`, version 1.0, float32 rows). Only the subset this crate needs
//! — dense 2-D `float32` matrices — is supported.

use crate::error::{FilexError, Result};
use crate::handler::Matrix;

const MAGIC: &[u8] = b"\x93NUMPY";

/// Serialize a matrix (possibly empty) to `.npy` bytes.
pub fn write_npy(matrix: &Matrix) -> Vec<u8> {
    let rows = matrix.len();
    let cols = matrix.first().map(|r| r.len()).unwrap_or(0);

    let header_dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, {cols}), }}"
    );

    // Total header (magic + version + len-field + dict + padding) must be a
    // multiple of 64 bytes, and must end with '\n'.
    let prefix_len = MAGIC.len() + 2 /* version */ + 2 /* header len field */;
    let unpadded = header_dict.len() + 1; // + trailing newline
    let total = prefix_len + unpadded;
    let padded_total = total.div_ceil(64) * 64;
    let pad = padded_total - total;

    let mut header = header_dict.into_bytes();
    header.extend(std::iter::repeat(b' ').take(pad));
    header.push(b'\n');

    let mut out = Vec::with_capacity(prefix_len + header.len() + rows * cols * 4);
    out.extend_from_slice(MAGIC);
    out.push(1); // major version
    out.push(0); // minor version
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(&header);

    for row in matrix {
        for v in row {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    out
}

/// Parse `.npy` bytes back into a matrix.
pub fn read_npy(bytes: &[u8]) -> Result<Matrix> {
    if bytes.len() < 10 || &bytes[0..6] != MAGIC {
        return Err(FilexError::TransientLoadError("not a valid .npy file".into()));
    }
    let major = bytes[6];
    let header_len_size = if major >= 2 { 4 } else { 2 };
    let header_len_bytes = &bytes[8..8 + header_len_size];
    let header_len = if major >= 2 {
        u32::from_le_bytes(header_len_bytes.try_into().unwrap()) as usize
    } else {
        u16::from_le_bytes(header_len_bytes.try_into().unwrap()) as usize
    };

    let data_start = 8 + header_len_size + header_len;
    if bytes.len() < data_start {
        return Err(FilexError::TransientLoadError("truncated .npy header".into()));
    }
    let header =
        std::str::from_utf8(&bytes[8 + header_len_size..data_start])
            .map_err(|_| FilexError::TransientLoadError("non-utf8 .npy header".into()))?;

    let (rows, cols) = parse_shape(header)?;
    if !header.contains("<f4") {
        return Err(FilexError::TransientLoadError(
            "only little-endian float32 .npy arrays are supported".into(),
        ));
    }

    let data = &bytes[data_start..];
    let expected = rows * cols * 4;
    if data.len() < expected {
        return Err(FilexError::TransientLoadError("truncated .npy data".into()));
    }

    let mut matrix = Vec::with_capacity(rows);
    for r in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for c in 0..cols {
            let offset = (r * cols + c) * 4;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&data[offset..offset + 4]);
            row.push(f32::from_le_bytes(buf));
        }
        matrix.push(row);
    }
    Ok(matrix)
}

fn parse_shape(header: &str) -> Result<(usize, usize)> {
    let start = header
        .find("'shape':")
        .ok_or_else(|| FilexError::TransientLoadError("missing shape in .npy header".into()))?;
    let rest = &header[start..];
    let open = rest
        .find('(')
        .ok_or_else(|| FilexError::TransientLoadError("malformed shape tuple".into()))?;
    let close = rest
        .find(')')
        .ok_or_else(|| FilexError::TransientLoadError("malformed shape tuple".into()))?;
    let inner = &rest[open + 1..close];
    let dims: Vec<usize> = inner
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| FilexError::TransientLoadError("non-numeric shape dim".into()))?;

    match dims.as_slice() {
        [rows, cols] => Ok((*rows, *cols)),
        [rows] => Ok((*rows, 0)),
        [] => Ok((0, 0)),
        _ => Err(FilexError::TransientLoadError("unsupported .npy rank".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_matrix() {
        let matrix: Matrix = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let bytes = write_npy(&matrix);
        assert!(bytes.starts_with(MAGIC));
        let loaded = read_npy(&bytes).unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn round_trips_an_empty_matrix() {
        let matrix: Matrix = vec![];
        let bytes = write_npy(&matrix);
        let loaded = read_npy(&bytes).unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn rejects_garbage() {
        assert!(read_npy(b"not an npy file").is_err());
    }
}
