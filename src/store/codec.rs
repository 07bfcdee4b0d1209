//! Binary embeddings file.
//!
//! ```text
//! magic      8 bytes  "LEXEMB01"
//! dims       u32 LE
//! rows       u32 LE
//! model_len  u16 LE, model name (UTF-8)
//! rows × { id_len u16 LE, chunk_id (UTF-8), dims × f32 LE }
//! ```

use std::path::Path;

use super::{EmbeddingFile, EmbeddingRecord, StoreError};
use crate::artifact::{self, ArtifactError};

const MAGIC: &[u8; 8] = b"LEXEMB01";

pub fn encode(file: &EmbeddingFile) -> Result<Vec<u8>, StoreError> {
    if file.dimensions == 0 {
        return Err(StoreError::Format("zero dimensions".to_string()));
    }
    let dims = u32::try_from(file.dimensions)
        .map_err(|_| StoreError::Format(format!("dimension {} too large", file.dimensions)))?;
    let rows = u32::try_from(file.records.len())
        .map_err(|_| StoreError::Format("too many rows".to_string()))?;

    let mut out = Vec::with_capacity(
        24 + file.records.len() * (file.dimensions * 4 + 16) + file.model.len(),
    );
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&dims.to_le_bytes());
    out.extend_from_slice(&rows.to_le_bytes());
    push_str(&mut out, &file.model)?;

    for (row, record) in file.records.iter().enumerate() {
        if record.vector.len() != file.dimensions {
            return Err(StoreError::DimensionMismatch {
                row,
                expected: file.dimensions,
                actual: record.vector.len(),
            });
        }
        push_str(&mut out, &record.chunk_id)?;
        out.extend_from_slice(&serialize_vector(&record.vector));
    }

    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<EmbeddingFile, StoreError> {
    let mut r = Reader { bytes, pos: 0 };

    if r.take(MAGIC.len())? != MAGIC {
        return Err(StoreError::Format("bad magic, not an embeddings file".to_string()));
    }
    let dimensions = r.u32()? as usize;
    let rows = r.u32()? as usize;
    if dimensions == 0 {
        return Err(StoreError::Format("zero dimensions".to_string()));
    }
    let model = r.string()?;

    let mut records = Vec::with_capacity(rows.min(bytes.len() / (dimensions * 4)));
    for _ in 0..rows {
        let chunk_id = r.string()?;
        let raw = r.take(dimensions * 4)?;
        let vector = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        records.push(EmbeddingRecord { chunk_id, vector });
    }

    if r.pos != bytes.len() {
        return Err(StoreError::Format(format!(
            "{} trailing bytes after {rows} rows",
            bytes.len() - r.pos
        )));
    }

    Ok(EmbeddingFile {
        model,
        dimensions,
        records,
    })
}

pub fn write_embeddings(path: &Path, file: &EmbeddingFile) -> Result<(), StoreError> {
    let bytes = encode(file)?;
    artifact::write_atomic(path, &bytes)?;
    Ok(())
}

pub fn read_embeddings(path: &Path) -> Result<EmbeddingFile, StoreError> {
    let bytes = std::fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
    decode(&bytes)
}

/// Serialize a float32 vector into little-endian bytes.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn push_str(out: &mut Vec<u8>, s: &str) -> Result<(), StoreError> {
    let len = u16::try_from(s.len())
        .map_err(|_| StoreError::Format(format!("string too long: {} bytes", s.len())))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| StoreError::Format(format!("truncated at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, StoreError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, StoreError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, StoreError> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| StoreError::Format(format!("invalid UTF-8 near byte {}", self.pos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EmbeddingFile {
        EmbeddingFile {
            model: "hash-3".to_string(),
            dimensions: 3,
            records: vec![
                EmbeddingRecord {
                    chunk_id: "npc2017_0001".to_string(),
                    vector: vec![1.0, 2.0, -3.5],
                },
                EmbeddingRecord {
                    chunk_id: "npc2017_0002".to_string(),
                    vector: vec![0.0, 0.5, 0.25],
                },
            ],
        }
    }

    #[test]
    fn test_serialize_vector() {
        let bytes = serialize_vector(&[1.0, 2.0, -3.5]);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x40]);
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x60, 0xc0]);
    }

    #[test]
    fn test_encode_decode() {
        let file = sample();
        let decoded = decode(&encode(&file).unwrap()).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&sample()).unwrap();
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 2);
    }

    #[test]
    fn test_truncated_file() {
        let bytes = encode(&sample()).unwrap();
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, StoreError::Format(_)));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(StoreError::Format(_))));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(StoreError::Format(_))));
    }

    #[test]
    fn test_non_utf8_chunk_id() {
        let mut bytes = encode(&sample()).unwrap();
        // magic + dims + rows + model ("hash-3") + first id length
        let first_id_byte = 8 + 4 + 4 + 2 + 6 + 2;
        assert_eq!(bytes[first_id_byte], b'n');
        bytes[first_id_byte] = 0xFF;
        assert!(matches!(decode(&bytes), Err(StoreError::Format(_))));
    }

    #[test]
    fn test_zero_dimensions_rejected_on_write() {
        let file = EmbeddingFile {
            model: "hash-0".to_string(),
            dimensions: 0,
            records: vec![EmbeddingRecord {
                chunk_id: "npc2017_0001".to_string(),
                vector: Vec::new(),
            }],
        };
        assert!(matches!(encode(&file), Err(StoreError::Format(_))));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.bin");
        assert!(write_embeddings(&path, &file).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_encode_rejects_ragged_rows() {
        let mut file = sample();
        file.records[1].vector.push(9.0);
        let err = encode(&file).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { row: 1, .. }));
    }

    #[test]
    fn test_write_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.bin");
        write_embeddings(&path, &sample()).unwrap();
        assert_eq!(read_embeddings(&path).unwrap(), sample());
    }
}
