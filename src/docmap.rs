// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Document map (§4.8): docno → document record, with O(1) lookup.
//!
//! Records are fixed-stride so `fetch(docno)` is a single seek + read at
//! `docno * STRIDE`. `aux_id` and `mime_type` are genuinely variable
//! length in principle but the format calls for fixed strides, so both
//! are stored as a one-byte length prefix plus a fixed-capacity field,
//! truncating anything longer (documented in `DESIGN.md`, not expected
//! to matter in practice for either field).

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

const AUX_ID_CAPACITY: usize = 64;
const MIME_TYPE_CAPACITY: usize = 32;

const FLAG_COMPRESSED: u8 = 0x01;

pub(crate) const STRIDE: usize = 4 // repos_id
    + 8 // byte_offset
    + 8 // byte_length
    + 1 // flags
    + 8 // terms
    + 8 // distinct
    + 8 // weight
    + (1 + AUX_ID_CAPACITY)
    + (1 + MIME_TYPE_CAPACITY);

/// One document's bookkeeping record.
#[derive(Debug, Clone, PartialEq)]
pub struct DocRecord {
    pub repos_id: u32,
    pub byte_offset: u64,
    pub byte_length: u64,
    pub compressed: bool,
    pub terms: u64,
    pub distinct: u64,
    pub weight: f64,
    pub aux_id: String,
    pub mime_type: String,
}

fn write_capped_string(writer: &mut impl Write, value: &str, capacity: usize) -> Result<()> {
    let bytes = value.as_bytes();
    let len = bytes.len().min(capacity);
    writer.write_u8(len as u8)?;
    writer.write_all(&bytes[..len])?;
    writer.write_all(&vec![0u8; capacity - len])?;
    Ok(())
}

fn read_capped_string(reader: &mut impl Read, capacity: usize) -> Result<String> {
    let len = reader.read_u8()? as usize;
    let mut bytes = vec![0u8; capacity];
    reader.read_exact(&mut bytes)?;
    if len > capacity {
        return Err(Error::Corrupt("document record string length exceeds its fixed capacity"));
    }
    String::from_utf8(bytes[..len].to_vec())
        .map_err(|_| Error::Corrupt("document record string is not valid UTF-8"))
}

impl DocRecord {
    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(STRIDE);
        out.write_u32::<LittleEndian>(self.repos_id)?;
        out.write_u64::<LittleEndian>(self.byte_offset)?;
        out.write_u64::<LittleEndian>(self.byte_length)?;
        out.write_u8(if self.compressed { FLAG_COMPRESSED } else { 0 })?;
        out.write_u64::<LittleEndian>(self.terms)?;
        out.write_u64::<LittleEndian>(self.distinct)?;
        out.write_f64::<LittleEndian>(self.weight)?;
        write_capped_string(&mut out, &self.aux_id, AUX_ID_CAPACITY)?;
        write_capped_string(&mut out, &self.mime_type, MIME_TYPE_CAPACITY)?;
        debug_assert_eq!(out.len(), STRIDE);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let repos_id = reader.read_u32::<LittleEndian>()?;
        let byte_offset = reader.read_u64::<LittleEndian>()?;
        let byte_length = reader.read_u64::<LittleEndian>()?;
        let flags = reader.read_u8()?;
        let terms = reader.read_u64::<LittleEndian>()?;
        let distinct = reader.read_u64::<LittleEndian>()?;
        let weight = reader.read_f64::<LittleEndian>()?;
        let aux_id = read_capped_string(&mut reader, AUX_ID_CAPACITY)?;
        let mime_type = read_capped_string(&mut reader, MIME_TYPE_CAPACITY)?;

        Ok(Self {
            repos_id,
            byte_offset,
            byte_length,
            compressed: flags & FLAG_COMPRESSED != 0,
            terms,
            distinct,
            weight,
            aux_id,
            mime_type,
        })
    }
}

/// Running totals for `DocMap::stats`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocMapStats {
    pub documents: u64,
    pub avg_bytes: f64,
    pub avg_weight: f64,
    pub avg_words: f64,
}

/// Fixed-stride paged file of [`DocRecord`]s, indexed by dense docno.
pub struct DocMap<F> {
    file: F,
    len: u64,
    total_bytes: u128,
    total_weight: f64,
    total_terms: u128,
}

impl<F: Read + Write + Seek> DocMap<F> {
    /// Wraps a freshly created, empty backing file.
    #[must_use]
    pub fn new(file: F) -> Self {
        Self {
            file,
            len: 0,
            total_bytes: 0,
            total_weight: 0.0,
            total_terms: 0,
        }
    }

    /// Reopens an existing backing file holding `len` already-appended
    /// records, recomputing running totals by scanning them once.
    ///
    /// # Errors
    ///
    /// Propagates I/O or decode errors.
    pub fn reopen(mut file: F, len: u64) -> Result<Self> {
        let mut total_bytes = 0u128;
        let mut total_weight = 0.0f64;
        let mut total_terms = 0u128;

        file.seek(SeekFrom::Start(0))?;
        let mut buf = vec![0u8; STRIDE];
        for _ in 0..len {
            file.read_exact(&mut buf)?;
            let record = DocRecord::decode(&buf)?;
            total_bytes += u128::from(record.byte_length);
            total_weight += record.weight;
            total_terms += u128::from(record.terms);
        }

        Ok(Self {
            file,
            len,
            total_bytes,
            total_weight,
            total_terms,
        })
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a record, assigning it the next dense docno.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors, or `Corrupt` if a string field exceeds its
    /// fixed capacity.
    pub fn append(&mut self, record: &DocRecord) -> Result<u64> {
        let bytes = record.encode()?;
        self.file.seek(SeekFrom::Start(self.len * STRIDE as u64))?;
        self.file.write_all(&bytes)?;

        let docno = self.len;
        self.len += 1;
        self.total_bytes += u128::from(record.byte_length);
        self.total_weight += record.weight;
        self.total_terms += u128::from(record.terms);

        Ok(docno)
    }

    /// Fetches the record at `docno`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `docno >= len()`, or propagates I/O/decode
    /// errors.
    pub fn fetch(&mut self, docno: u64) -> Result<DocRecord> {
        if docno >= self.len {
            return Err(Error::NotFound("docno is out of range"));
        }

        self.file.seek(SeekFrom::Start(docno * STRIDE as u64))?;
        let mut buf = vec![0u8; STRIDE];
        self.file.read_exact(&mut buf)?;
        DocRecord::decode(&buf)
    }

    /// Aggregate statistics across every document appended so far.
    #[must_use]
    pub fn stats(&self) -> DocMapStats {
        if self.len == 0 {
            return DocMapStats {
                documents: 0,
                avg_bytes: 0.0,
                avg_weight: 0.0,
                avg_words: 0.0,
            };
        }

        let n = self.len as f64;
        DocMapStats {
            documents: self.len,
            avg_bytes: self.total_bytes as f64 / n,
            avg_weight: self.total_weight / n,
            avg_words: self.total_terms as f64 / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    fn sample(repos_id: u32, byte_length: u64, weight: f64, terms: u64) -> DocRecord {
        DocRecord {
            repos_id,
            byte_offset: 0,
            byte_length,
            compressed: false,
            terms,
            distinct: terms,
            weight,
            aux_id: "doc-1".to_string(),
            mime_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn append_then_fetch_round_trips() -> Result<()> {
        let mut map = DocMap::new(Cursor::new(Vec::new()));
        let docno = map.append(&sample(1, 100, 5.0, 10))?;
        assert_eq!(docno, 0);

        let fetched = map.fetch(0)?;
        assert_eq!(fetched, sample(1, 100, 5.0, 10));

        Ok(())
    }

    #[test]
    fn fetch_out_of_range_is_not_found() {
        let mut map = DocMap::new(Cursor::new(Vec::new()));
        let err = map.fetch(0).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn stats_average_across_documents() -> Result<()> {
        let mut map = DocMap::new(Cursor::new(Vec::new()));
        map.append(&sample(1, 100, 4.0, 8))?;
        map.append(&sample(1, 200, 6.0, 12))?;

        let stats = map.stats();
        assert_eq!(stats.documents, 2);
        assert!((stats.avg_bytes - 150.0).abs() < 1e-9);
        assert!((stats.avg_weight - 5.0).abs() < 1e-9);
        assert!((stats.avg_words - 10.0).abs() < 1e-9);

        Ok(())
    }

    #[test]
    fn reopen_recomputes_totals_from_disk() -> Result<()> {
        let mut backing = Cursor::new(Vec::new());
        {
            let mut map = DocMap::new(&mut backing);
            map.append(&sample(1, 100, 4.0, 8))?;
            map.append(&sample(1, 200, 6.0, 12))?;
        }

        let mut reopened = DocMap::reopen(backing, 2)?;
        assert_eq!(reopened.stats().documents, 2);
        assert_eq!(reopened.fetch(1)?, sample(1, 200, 6.0, 12));

        Ok(())
    }
}
