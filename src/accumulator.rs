// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Postings accumulator (§4.4).
//!
//! In-memory `term -> posting list` table built while documents are
//! parsed. A caller sequences `add_doc` then one or more `add_word` calls
//! then `update` once per document; `dump` folds the whole table into a
//! single sorted run in the same wire format the merge machine consumes
//! (§3), so a freshly dumped run can feed straight into the pyramid.

use crate::error::{Error, Result};
use crate::merge::encode_run_record;
use crate::posting::{encode_postings, Posting};
use rustc_hash::{FxHashMap, FxHashSet};

/// Per-document stats returned by `update`, destined for the document map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocStats {
    /// Length-normalization weight (occurrence count).
    pub weight: f64,
    /// Total word occurrences folded into the table.
    pub terms: u64,
    /// Number of distinct terms in the document.
    pub distinct: u64,
}

struct InFlightDoc {
    docno: u64,
    words: FxHashMap<Vec<u8>, Vec<u64>>,
}

/// In-memory term -> posting-list table.
pub struct Accumulator {
    table: FxHashMap<Vec<u8>, Vec<Posting>>,
    stoplist: Option<FxHashSet<Vec<u8>>>,
    stemmer: Option<Box<dyn Fn(&[u8]) -> Vec<u8>>>,
    current: Option<InFlightDoc>,
    resident_bytes: usize,
}

impl Accumulator {
    #[must_use]
    pub fn new(tablesize: usize) -> Self {
        Self {
            table: FxHashMap::with_capacity_and_hasher(tablesize, Default::default()),
            stoplist: None,
            stemmer: None,
            current: None,
            resident_bytes: 0,
        }
    }

    #[must_use]
    pub fn with_stoplist(mut self, stoplist: FxHashSet<Vec<u8>>) -> Self {
        self.stoplist = Some(stoplist);
        self
    }

    #[must_use]
    pub fn with_stemmer(mut self, stemmer: Box<dyn Fn(&[u8]) -> Vec<u8>>) -> Self {
        self.stemmer = Some(stemmer);
        self
    }

    /// Starts a new in-flight document. `docno` must be strictly greater
    /// than every previously folded docno (dump order relies on runs of
    /// ascending docnos per term).
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if a document is already in flight.
    pub fn add_doc(&mut self, docno: u64) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::InvalidState(
                "add_doc called while a document is already in flight",
            ));
        }
        self.current = Some(InFlightDoc {
            docno,
            words: FxHashMap::default(),
        });
        Ok(())
    }

    /// Records one occurrence of `term` at `wordno` in the in-flight
    /// document. A stoplist or stemmer configured at construction is
    /// applied first; a stopped word is silently dropped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no document is in flight.
    pub fn add_word(&mut self, term: &[u8], wordno: u64) -> Result<()> {
        let doc = self
            .current
            .as_mut()
            .ok_or(Error::InvalidState("add_word called with no document in flight"))?;

        let stemmed;
        let term = match &self.stemmer {
            Some(stem) => {
                stemmed = stem(term);
                &stemmed[..]
            }
            None => term,
        };

        if let Some(stoplist) = &self.stoplist {
            if stoplist.contains(term) {
                return Ok(());
            }
        }

        doc.words.entry(term.to_vec()).or_default().push(wordno);
        Ok(())
    }

    /// Folds the in-flight document into the table and returns its stats.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no document is in flight.
    pub fn update(&mut self) -> Result<DocStats> {
        let doc = self
            .current
            .take()
            .ok_or(Error::InvalidState("update called with no document in flight"))?;

        let mut terms = 0u64;
        let distinct = doc.words.len() as u64;

        for (term, mut positions) in doc.words {
            positions.sort_unstable();
            terms += positions.len() as u64;

            self.resident_bytes += term.len() + positions.len() * 8 + 24;

            self.table.entry(term).or_default().push(Posting {
                docno: doc.docno,
                freq: positions.len() as u64,
                positions,
            });
        }

        Ok(DocStats {
            weight: terms as f64,
            terms,
            distinct,
        })
    }

    /// Bytes the current table would occupy if dumped now.
    #[must_use]
    pub fn postings_size(&self) -> u64 {
        let mut total = 0u64;
        for (term, postings) in &self.table {
            let encoded = encode_postings(postings);
            total += encode_run_record(
                term,
                encoded.docs,
                encoded.occurs,
                encoded.last,
                encoded.body.len() as u64,
                encoded.first,
                &encoded.body,
            )
            .len() as u64;
        }
        total
    }

    /// Approximate total resident bytes held by the table.
    #[must_use]
    pub fn memsize(&self) -> usize {
        self.resident_bytes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Dumps the accumulated table as a single sorted run (§3 wire
    /// format), sorted bytewise by term. Resets the table so the
    /// accumulator can be reused for the next batch of documents.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if a document is still in flight.
    pub fn dump(&mut self) -> Result<Vec<u8>> {
        if self.current.is_some() {
            return Err(Error::InvalidState(
                "dump called with a document still in flight; call update first",
            ));
        }

        let mut terms: Vec<(Vec<u8>, Vec<Posting>)> = std::mem::take(&mut self.table).into_iter().collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        self.resident_bytes = 0;

        let mut out = Vec::new();
        for (term, postings) in &terms {
            let encoded = encode_postings(postings);
            let record = encode_run_record(
                term,
                encoded.docs,
                encoded.occurs,
                encoded.last,
                encoded.body.len() as u64,
                encoded.first,
                &encoded.body,
            );
            out.extend_from_slice(&record);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::IntermediateMerge;
    use test_log::test;

    #[test]
    fn single_doc_round_trips_through_update_and_dump() -> Result<()> {
        let mut acc = Accumulator::new(16);

        acc.add_doc(0)?;
        acc.add_word(b"cat", 0)?;
        let stats = acc.update()?;

        assert_eq!(stats.terms, 1);
        assert_eq!(stats.distinct, 1);

        let dumped = acc.dump()?;
        assert!(acc.is_empty());
        assert!(!dumped.is_empty());

        Ok(())
    }

    #[test]
    fn dump_sorts_terms_bytewise() -> Result<()> {
        let mut acc = Accumulator::new(16);

        acc.add_doc(0)?;
        acc.add_word(b"zebra", 0)?;
        acc.add_word(b"ant", 1)?;
        acc.update()?;

        let dumped = acc.dump()?;

        // Feed the dump into a k=1 merge and confirm the first term seen
        // is the lexicographically smaller one.
        let mut merge = IntermediateMerge::new(1, u64::MAX);
        merge.feed(0, &dumped);
        merge.mark_eof(0);

        let mut output = Vec::new();
        loop {
            match merge.step()? {
                crate::merge::StepResult::OutputReady(_) => output.extend(merge.take_output()),
                crate::merge::StepResult::Finished => break,
                other => panic!("unexpected: {other:?}"),
            }
        }

        assert_eq!(output, dumped);
        Ok(())
    }

    #[test]
    fn stoplist_drops_configured_words() -> Result<()> {
        let mut stop = FxHashSet::default();
        stop.insert(b"the".to_vec());
        let mut acc = Accumulator::new(16).with_stoplist(stop);

        acc.add_doc(0)?;
        acc.add_word(b"the", 0)?;
        acc.add_word(b"fox", 1)?;
        let stats = acc.update()?;

        assert_eq!(stats.distinct, 1);
        assert_eq!(stats.terms, 1);

        Ok(())
    }

    #[test]
    fn rejects_add_word_without_add_doc() {
        let mut acc = Accumulator::new(16);
        let err = acc.add_word(b"cat", 0).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
