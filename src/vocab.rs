// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Vocab vector wire format (§3, §4.7).
//!
//! Unlike sorted-run records (vbyte throughout), a vocab vector's header
//! fields are fixed-width and big-endian, per §4.7 ("Byte-order: fields
//! written big-endian when fixed-width"). A vocab vector has no separate
//! `first` field: the stored bytes (inline or in an extent) begin with
//! the list's `first` docno folded in, via [`crate::posting::fold_first_into_body`].

use crate::codec::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Header shared by both `INLINE` and `EXTENT` vocab vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocabHeader {
    /// Number of distinct documents containing the term.
    pub docs: u32,
    /// Total occurrences across all documents.
    pub occurs: u64,
    /// Largest docno in the list.
    pub last: u64,
    /// Encoded byte length of the postings (`first` folded in, no
    /// separate field — see module docs).
    pub size: u64,
}

impl VocabHeader {
    /// Checks the `docs <= occurs` invariant from §3.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        u64::from(self.docs) <= self.occurs
    }
}

/// Where a term's postings live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabLocation {
    /// Postings stored directly inside the B-tree leaf.
    Inline(Vec<u8>),
    /// Postings stored in a vector file. `capacity >= header.size`; the
    /// overallocated tail is zero-filled (§3).
    Extent {
        fileno: u32,
        offset: u64,
        capacity: u64,
    },
}

/// A term's vocab vector: header plus storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabVector {
    pub header: VocabHeader,
    pub location: VocabLocation,
}

const TAG_INLINE: u8 = 0;
const TAG_EXTENT: u8 = 1;

impl Encode for VocabVector {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<BigEndian>(self.header.docs)?;
        writer.write_u64::<BigEndian>(self.header.occurs)?;
        writer.write_u64::<BigEndian>(self.header.last)?;
        writer.write_u64::<BigEndian>(self.header.size)?;

        match &self.location {
            VocabLocation::Inline(bytes) => {
                writer.write_u8(TAG_INLINE)?;
                writer.write_u32::<BigEndian>(bytes.len() as u32)?;
                writer.write_all(bytes)?;
            }
            VocabLocation::Extent {
                fileno,
                offset,
                capacity,
            } => {
                writer.write_u8(TAG_EXTENT)?;
                writer.write_u32::<BigEndian>(*fileno)?;
                writer.write_u64::<BigEndian>(*offset)?;
                writer.write_u64::<BigEndian>(*capacity)?;
            }
        }

        Ok(())
    }
}

impl Decode for VocabVector {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let docs = reader.read_u32::<BigEndian>()?;
        let occurs = reader.read_u64::<BigEndian>()?;
        let last = reader.read_u64::<BigEndian>()?;
        let size = reader.read_u64::<BigEndian>()?;

        let header = VocabHeader {
            docs,
            occurs,
            last,
            size,
        };

        if !header.is_consistent() {
            return Err(DecodeError::Malformed("docs must not exceed occurs"));
        }

        let tag = reader.read_u8()?;
        let location = match tag {
            TAG_INLINE => {
                let len = reader.read_u32::<BigEndian>()? as usize;
                let mut bytes = vec![0u8; len];
                reader.read_exact(&mut bytes)?;
                VocabLocation::Inline(bytes)
            }
            TAG_EXTENT => {
                let fileno = reader.read_u32::<BigEndian>()?;
                let offset = reader.read_u64::<BigEndian>()?;
                let capacity = reader.read_u64::<BigEndian>()?;

                if capacity < header.size {
                    return Err(DecodeError::Malformed(
                        "extent capacity must be at least the declared size",
                    ));
                }

                VocabLocation::Extent {
                    fileno,
                    offset,
                    capacity,
                }
            }
            _ => return Err(DecodeError::Malformed("unknown vocab vector tag")),
        };

        Ok(Self { header, location })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn inline_roundtrip() {
        let vector = VocabVector {
            header: VocabHeader {
                docs: 1,
                occurs: 1,
                last: 0,
                size: 2,
            },
            location: VocabLocation::Inline(vec![0x00, 0x01]),
        };

        let bytes = vector.encode_into_vec();
        let decoded = VocabVector::decode_from(&mut &bytes[..]).expect("decode");
        assert_eq!(decoded, vector);
    }

    #[test]
    fn extent_roundtrip() {
        let vector = VocabVector {
            header: VocabHeader {
                docs: 10,
                occurs: 40,
                last: 999,
                size: 120,
            },
            location: VocabLocation::Extent {
                fileno: 3,
                offset: 4096,
                capacity: 128,
            },
        };

        let bytes = vector.encode_into_vec();
        let decoded = VocabVector::decode_from(&mut &bytes[..]).expect("decode");
        assert_eq!(decoded, vector);
    }

    #[test]
    fn rejects_docs_greater_than_occurs() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&5u32.to_be_bytes()); // docs = 5
        bytes.extend_from_slice(&1u64.to_be_bytes()); // occurs = 1 (invalid: docs > occurs)
        bytes.extend_from_slice(&0u64.to_be_bytes()); // last
        bytes.extend_from_slice(&0u64.to_be_bytes()); // size
        bytes.push(TAG_INLINE);
        bytes.extend_from_slice(&0u32.to_be_bytes());

        let err = VocabVector::decode_from(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn rejects_undersized_extent_capacity() {
        let vector = VocabVector {
            header: VocabHeader {
                docs: 1,
                occurs: 1,
                last: 0,
                size: 100,
            },
            location: VocabLocation::Extent {
                fileno: 0,
                offset: 0,
                capacity: 10,
            },
        };

        let bytes = vector.encode_into_vec();
        let err = VocabVector::decode_from(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
