// SPDX-License-Identifier: GPL-3.0-only
use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;

use crate::index::catalog::RemoteCatalog;
use crate::index::error::IndexError;
use crate::index::marshal;

/// How an index file is wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEncoding {
    /// `specs.4.8.gz`
    Gzip,
    /// Legacy deflate streams (`Marshal.4.8.Z`, `.rz`)
    Zlib,
    /// Uncompressed `specs.4.8`
    Plain,
}

impl IndexEncoding {
    pub fn detect(data: &[u8]) -> Result<Self, IndexError> {
        match data {
            [0x1f, 0x8b, ..] => Ok(IndexEncoding::Gzip),
            [0x04, 0x08, ..] => Ok(IndexEncoding::Plain),
            [cmf, flg, ..] if cmf & 0x0f == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0 => {
                Ok(IndexEncoding::Zlib)
            }
            _ => Err(IndexError::UnknownEncoding(data.iter().take(4).copied().collect())),
        }
    }
}

/// Strip any compression and return the raw Marshal payload
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, IndexError> {
    let mut payload = Vec::new();
    match IndexEncoding::detect(data)? {
        IndexEncoding::Plain => payload.extend_from_slice(data),
        IndexEncoding::Gzip => {
            GzDecoder::new(data)
                .read_to_end(&mut payload)
                .map_err(IndexError::Decompress)?;
        }
        IndexEncoding::Zlib => {
            ZlibDecoder::new(data)
                .read_to_end(&mut payload)
                .map_err(IndexError::Decompress)?;
        }
    }
    Ok(payload)
}

/// Decode index bytes in any supported encoding
pub fn decode_index(data: &[u8]) -> Result<(RemoteCatalog, Vec<u8>), IndexError> {
    let payload = decompress(data)?;
    let catalog = RemoteCatalog::from_marshal(marshal::parse(&payload)?)?;
    Ok((catalog, payload))
}
