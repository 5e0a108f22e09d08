// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Posting-list encoding (§3, §4.7).
//!
//! A posting list for one term is a sorted sequence of
//! `(docno, within-doc frequency, word positions...)`. On the wire the
//! first docno is written as-is (`first`), every following docno is a
//! delta from the previous record's last docno minus one, and every word
//! position after the first in a document is a delta from the previous
//! position. All integers are vbyte (§4.7).

use crate::codec::{decode_vbyte, encode_vbyte, vbyte_len, DecodeError, VbyteDecode};

/// One decoded posting: a document and its within-document occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub docno: u64,
    pub freq: u64,
    pub positions: Vec<u64>,
}

/// The result of encoding a sorted posting list: everything needed to
/// populate a vocab vector's header fields, plus the encoded body.
#[derive(Debug, Clone)]
pub struct EncodedPostings {
    pub first: u64,
    pub docs: u64,
    pub occurs: u64,
    pub last: u64,
    /// Encoded bytes *excluding* `first` — this is what a sorted-run
    /// record's `size` field measures (§3).
    pub body: Vec<u8>,
}

/// Encodes a posting list.
///
/// # Panics
///
/// Panics (in debug builds, via `debug_assert!`) if `postings` is empty or
/// not strictly ascending by docno — callers are expected to have already
/// grouped and sorted postings before encoding.
#[must_use]
pub fn encode_postings(postings: &[Posting]) -> EncodedPostings {
    debug_assert!(!postings.is_empty(), "posting list must be non-empty");

    let first = postings.first().map(|p| p.docno).unwrap_or_default();
    let last = postings.last().map(|p| p.docno).unwrap_or_default();
    let docs = postings.len() as u64;
    let occurs = postings.iter().map(|p| p.freq).sum();

    let mut body = Vec::new();
    let mut prev_docno: Option<u64> = None;

    for posting in postings {
        if let Some(prev) = prev_docno {
            debug_assert!(
                posting.docno > prev,
                "postings must be strictly ascending by docno"
            );
            encode_vbyte(posting.docno - prev - 1, &mut body);
        }

        encode_vbyte(posting.freq, &mut body);

        let mut prev_pos: Option<u64> = None;
        for &pos in &posting.positions {
            match prev_pos {
                None => encode_vbyte(pos, &mut body),
                Some(prev) => encode_vbyte(pos - prev, &mut body),
            }
            prev_pos = Some(pos);
        }

        prev_docno = Some(posting.docno);
    }

    EncodedPostings {
        first,
        docs,
        occurs,
        last,
        body,
    }
}

/// Decodes `docs` postings out of `body`, given the list's `first` docno
/// and the per-document occurrence count implied by `freq`.
///
/// # Errors
///
/// Returns `Corrupt`-flavored [`DecodeError`]s on truncated or malformed
/// input; per §4.1, any decreasing docno or truncation mid-record is
/// fatal and not recoverable by retrying.
pub fn decode_postings(first: u64, docs: u64, body: &[u8]) -> Result<Vec<Posting>, DecodeError> {
    let mut postings = Vec::with_capacity(docs as usize);
    let mut cursor = 0usize;
    let mut prev_docno: Option<u64> = None;

    let mut read_vbyte = |cursor: &mut usize| -> Result<u64, DecodeError> {
        match decode_vbyte(body.get(*cursor..).ok_or(DecodeError::NeedMoreInput)?)? {
            VbyteDecode::Value { value, consumed } => {
                *cursor += consumed;
                Ok(value)
            }
            VbyteDecode::Incomplete => Err(DecodeError::NeedMoreInput),
        }
    };

    for _ in 0..docs {
        let docno = match prev_docno {
            None => first,
            Some(prev) => {
                let delta = read_vbyte(&mut cursor)?;
                prev.checked_add(delta + 1).ok_or(DecodeError::Malformed(
                    "docno delta overflowed while decoding posting list",
                ))?
            }
        };

        if let Some(prev) = prev_docno {
            if docno <= prev {
                return Err(DecodeError::Malformed(
                    "docnos must be strictly ascending within a posting list",
                ));
            }
        }

        let freq = read_vbyte(&mut cursor)?;
        if freq == 0 {
            return Err(DecodeError::Malformed(
                "within-document frequency must be at least one",
            ));
        }

        let mut positions = Vec::with_capacity(freq as usize);
        let mut prev_pos: Option<u64> = None;
        for _ in 0..freq {
            let pos = read_vbyte(&mut cursor)?;
            let absolute = match prev_pos {
                None => pos,
                Some(prev) => prev + pos,
            };
            positions.push(absolute);
            prev_pos = Some(absolute);
        }

        postings.push(Posting {
            docno,
            freq,
            positions,
        });
        prev_docno = Some(docno);
    }

    Ok(postings)
}

/// Bytes needed to store `first` folded into the body, as used by the
/// final merge's INLINE/EXTENT storage (§4.1 step 4) where there is no
/// separate `first` field — see `DESIGN.md` for why this differs from
/// the sorted-run record's `size` accounting.
#[must_use]
pub fn fold_first_into_body(first: u64, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vbyte_len(first) + body.len());
    encode_vbyte(first, &mut out);
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn p(docno: u64, freq: u64) -> Posting {
        Posting {
            docno,
            freq,
            positions: vec![],
        }
    }

    #[test]
    fn single_doc_single_term() {
        // Scenario 1: add doc 0 with term "cat" once.
        let postings = vec![Posting {
            docno: 0,
            freq: 1,
            positions: vec![1],
        }];

        let encoded = encode_postings(&postings);
        assert_eq!(encoded.docs, 1);
        assert_eq!(encoded.occurs, 1);
        assert_eq!(encoded.last, 0);
        assert_eq!(encoded.first, 0);

        let inline = fold_first_into_body(encoded.first, &encoded.body);
        assert_eq!(inline, vec![0x00, 0x01]);
        assert_eq!(inline.len(), 2);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let postings = vec![
            Posting {
                docno: 0,
                freq: 2,
                positions: vec![3, 10],
            },
            Posting {
                docno: 4,
                freq: 1,
                positions: vec![0],
            },
            Posting {
                docno: 100,
                freq: 3,
                positions: vec![1, 1, 50],
            },
        ];

        let encoded = encode_postings(&postings);
        let decoded =
            decode_postings(encoded.first, encoded.docs, &encoded.body).expect("decode");
        assert_eq!(decoded, postings);
    }

    #[test]
    fn rejects_non_ascending_docnos() {
        // Hand-crafted body: first=0, then a delta that repeats the same docno.
        let mut body = Vec::new();
        encode_vbyte(0, &mut body); // delta -> docno 0 again (prev was 0)
        encode_vbyte(1, &mut body); // freq

        let err = decode_postings(0, 2, &body).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn two_run_merge_body_by_direct_construction() {
        // docs {0, 2} in one fragment, {5, 7} in another, freq 1 each, no positions.
        let a = encode_postings(&[p(0, 1), p(2, 1)]);
        let b = encode_postings(&[p(5, 1), p(7, 1)]);

        assert_eq!(a.first, 0);
        assert_eq!(a.last, 2);
        assert_eq!(b.first, 5);
        assert_eq!(b.last, 7);

        // Delta-rebase b.first against a.last, per §4.1 step 3.
        let rebased_b_first = b.first - (a.last + 1);
        assert_eq!(rebased_b_first, 2);

        let mut merged_body = a.body.clone();
        encode_vbyte(rebased_b_first, &mut merged_body);
        merged_body.extend_from_slice(&b.body);

        let decoded = decode_postings(a.first, 4, &merged_body).expect("decode");
        assert_eq!(
            decoded.iter().map(|p| p.docno).collect::<Vec<_>>(),
            vec![0, 2, 5, 7]
        );
    }
}
