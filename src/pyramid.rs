// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Pyramid scheduler (§4.2).
//!
//! Owns the list of sorted-run temp files and decides when to collapse a
//! contiguous slice of them through [`crate::merge::IntermediateMerge`] to
//! keep fan-in bounded, then drives the final collapse through
//! [`crate::merge::FinalMerge`]. All actual I/O — reading a run's bytes,
//! creating a new temp file, persisting merged output, unlinking an
//! exhausted source — is delegated to a [`MergeDriver`] so this module
//! never touches a file descriptor itself (the fd pool is the only thing
//! that does).
//!
//! The merge-trigger rule in the design notes ("any consecutive > 1
//! entries immediately preceding a limited entry") is underspecified
//! about what "consecutive" ranges over when levels differ. This
//! implementation takes "consecutive" to mean a contiguous run of equal
//! level immediately before the limited entry — see `DESIGN.md`.

use crate::btree::PageLocation;
use crate::error::{Error, Result};
use crate::merge::{FinalMerge, IntermediateMerge, StepResult};

/// One temp run's bookkeeping entry (§3 "Pyramid state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFile {
    pub fileno: u32,
    /// Number of times this run has already been through a merge.
    pub level: u32,
    /// Marks a run that hit the per-file size cap mid-merge and must stay
    /// adjacent to its siblings to preserve merge order.
    pub limited: bool,
}

/// I/O delegate for the pyramid. All methods are best-effort blocking
/// calls made between `step()` suspension points.
pub trait MergeDriver {
    /// Reads up to `want` bytes from `fileno`'s current read cursor.
    /// Returns fewer than `want` bytes (including zero) at EOF.
    fn read_chunk(&mut self, fileno: u32, want: usize) -> Result<Vec<u8>>;

    /// Allocates a new, empty temp file and returns its fileno.
    fn new_file(&mut self) -> Result<u32>;

    /// Appends `bytes` to `fileno`.
    fn write_chunk(&mut self, fileno: u32, bytes: &[u8]) -> Result<()>;

    /// Removes a fully consumed source run.
    fn unlink(&mut self, fileno: u32) -> Result<()>;
}

/// Result of sealing the pyramid (§4.2 "Final merge").
#[derive(Debug, Clone, Copy)]
pub struct FinalOutcome {
    pub root: PageLocation,
    pub distinct_terms: usize,
    pub total_occurs: u128,
}

/// Scheduler over the set of sorted-run temp files.
pub struct Pyramid {
    files: Vec<RunFile>,
    width: usize,
    chunk_size: usize,
    max_filesize: u64,
    finished: bool,
}

impl Pyramid {
    #[must_use]
    pub fn new(width: usize, chunk_size: usize, max_filesize: u64) -> Self {
        Self {
            files: Vec::new(),
            width,
            chunk_size,
            max_filesize,
            finished: false,
        }
    }

    #[must_use]
    pub fn files(&self) -> &[RunFile] {
        &self.files
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Registers a new sorted run (typically just dumped by the postings
    /// accumulator) and runs partial merges until no trigger fires.
    ///
    /// Returns the number of partial merges the width trigger fired during
    /// this call (0 if the new file didn't push any run past the width
    /// bound).
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if called after `finish`, or propagates
    /// merge/driver errors.
    pub fn add(
        &mut self,
        fileno: u32,
        level: u32,
        limited: bool,
        driver: &mut dyn MergeDriver,
    ) -> Result<usize> {
        if self.finished {
            return Err(Error::InvalidState("pyramid already finished"));
        }

        self.files.push(RunFile {
            fileno,
            level,
            limited,
        });

        let mut merges = 0;
        while let Some((start, end)) = find_trigger(&self.files, self.width) {
            let slice: Vec<RunFile> = self.files[start..end].to_vec();
            let replacement = self.partial_merge(&slice, driver)?;
            self.files.splice(start..end, replacement);
            merges += 1;
        }

        Ok(merges)
    }

    fn partial_merge(&self, slice: &[RunFile], driver: &mut dyn MergeDriver) -> Result<Vec<RunFile>> {
        let new_level = slice.iter().map(|f| f.level).max().unwrap_or(0) + 1;
        let k = slice.len();

        let mut merge = IntermediateMerge::new(k, self.max_filesize);
        let mut output_filenos = vec![driver.new_file()?];
        let mut eof_signalled = vec![false; k];

        loop {
            match merge.step()? {
                StepResult::NeedInput(i) => {
                    let chunk = driver.read_chunk(slice[i].fileno, self.chunk_size)?;
                    if chunk.is_empty() {
                        if !eof_signalled[i] {
                            merge.mark_eof(i);
                            eof_signalled[i] = true;
                        }
                    } else {
                        merge.feed(i, &chunk);
                    }
                }
                StepResult::OutputReady(_) => {
                    let bytes = merge.take_output();
                    let current = *output_filenos.last().expect("at least one output file");
                    driver.write_chunk(current, &bytes)?;
                }
                StepResult::NeedNewFile => {
                    let next = driver.new_file()?;
                    output_filenos.push(next);
                    merge.rotate_output_file();
                }
                StepResult::Finished => break,
            }
        }

        for source in slice {
            driver.unlink(source.fileno)?;
        }

        let last_index = output_filenos.len() - 1;
        Ok(output_filenos
            .into_iter()
            .enumerate()
            .map(|(i, fileno)| {
                if i == last_index {
                    RunFile {
                        fileno,
                        level: new_level,
                        limited: false,
                    }
                } else {
                    RunFile {
                        fileno,
                        level: new_level + 1,
                        limited: true,
                    }
                }
            })
            .collect())
    }

    /// Merges every remaining run into the final on-disk index structures.
    /// Seals the pyramid: a further `add` returns `InvalidState`.
    ///
    /// # Errors
    ///
    /// Propagates merge/driver/allocation/B-tree errors.
    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        &mut self,
        driver: &mut dyn MergeDriver,
        vocab_lsize: u64,
        pagesize: usize,
        alloc_extent: &mut dyn FnMut(u64) -> Result<(u32, u64)>,
        alloc_page: &mut dyn FnMut() -> Result<PageLocation>,
        emit_page: &mut dyn FnMut(PageLocation, &[u8]) -> Result<()>,
    ) -> Result<FinalOutcome> {
        if self.finished {
            return Err(Error::InvalidState("pyramid already finished"));
        }

        let slice = std::mem::take(&mut self.files);
        let k = slice.len().max(1);

        let mut merge = FinalMerge::new(k, self.max_filesize, vocab_lsize);
        let mut current_output_fileno: Option<u32> = None;
        let mut eof_signalled = vec![false; slice.len()];

        loop {
            match merge.step(alloc_extent)? {
                StepResult::NeedInput(i) => {
                    let chunk = driver.read_chunk(slice[i].fileno, self.chunk_size)?;
                    if chunk.is_empty() {
                        if !eof_signalled[i] {
                            merge.mark_eof(i);
                            eof_signalled[i] = true;
                        }
                    } else {
                        merge.feed(i, &chunk);
                    }
                }
                StepResult::OutputReady(_) => {
                    let bytes = merge.take_output();
                    let fileno = match current_output_fileno {
                        Some(f) => f,
                        None => {
                            let f = driver.new_file()?;
                            current_output_fileno = Some(f);
                            f
                        }
                    };
                    driver.write_chunk(fileno, &bytes)?;
                }
                StepResult::NeedNewFile => {
                    let next = driver.new_file()?;
                    current_output_fileno = Some(next);
                    merge.rotate_output_file();
                }
                StepResult::Finished => break,
            }
        }

        for source in &slice {
            driver.unlink(source.fileno)?;
        }

        let distinct_terms = merge.distinct_terms();
        let total_occurs = merge.total_occurs();
        let root = merge.finalize_btree(pagesize, alloc_page, emit_page)?;

        self.finished = true;

        Ok(FinalOutcome {
            root,
            distinct_terms,
            total_occurs,
        })
    }
}

/// Finds the leftmost contiguous slice that should be merged next, per
/// the two trigger conditions in §4.2.
fn find_trigger(files: &[RunFile], width: usize) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;

    let mut consider = |start: usize, end: usize, best: &mut Option<(usize, usize)>| {
        if end - start > 1 && best.map_or(true, |(s, _)| start < s) {
            *best = Some((start, end));
        }
    };

    // Condition 1: a contiguous run of >= width same-level, non-limited files.
    let mut i = 0;
    while i < files.len() {
        if files[i].limited {
            i += 1;
            continue;
        }
        let level = files[i].level;
        let mut j = i;
        while j < files.len() && !files[j].limited && files[j].level == level {
            j += 1;
        }
        if j - i >= width {
            consider(i, j, &mut best);
        }
        i = j.max(i + 1);
    }

    // Condition 2: a contiguous equal-level block of > 1 entries immediately
    // preceding a limited=true entry.
    for j in 1..files.len() {
        if !files[j].limited {
            continue;
        }
        let level = files[j - 1].level;
        let mut start = j;
        while start > 0 && files[start - 1].level == level && !files[start - 1].limited {
            start -= 1;
        }
        if j - start > 1 {
            consider(start, j, &mut best);
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use test_log::test;

    struct FakeDriver {
        next_fileno: u32,
        files: RefCell<HashMap<u32, (Vec<u8>, usize)>>,
    }

    impl FakeDriver {
        fn new() -> Self {
            Self {
                next_fileno: 0,
                files: RefCell::new(HashMap::new()),
            }
        }

        fn seed(&mut self, bytes: Vec<u8>) -> u32 {
            let fileno = self.next_fileno;
            self.next_fileno += 1;
            self.files.borrow_mut().insert(fileno, (bytes, 0));
            fileno
        }
    }

    impl MergeDriver for FakeDriver {
        fn read_chunk(&mut self, fileno: u32, want: usize) -> Result<Vec<u8>> {
            let mut files = self.files.borrow_mut();
            let (bytes, pos) = files.get_mut(&fileno).expect("fileno exists");
            let end = (*pos + want).min(bytes.len());
            let chunk = bytes[*pos..end].to_vec();
            *pos = end;
            Ok(chunk)
        }

        fn new_file(&mut self) -> Result<u32> {
            let fileno = self.next_fileno;
            self.next_fileno += 1;
            self.files.borrow_mut().insert(fileno, (Vec::new(), 0));
            Ok(fileno)
        }

        fn write_chunk(&mut self, fileno: u32, bytes: &[u8]) -> Result<()> {
            self.files
                .borrow_mut()
                .get_mut(&fileno)
                .expect("fileno exists")
                .0
                .extend_from_slice(bytes);
            Ok(())
        }

        fn unlink(&mut self, fileno: u32) -> Result<()> {
            self.files.borrow_mut().remove(&fileno);
            Ok(())
        }
    }

    fn run_bytes(term: &[u8], postings: &[(u64, u64)]) -> Vec<u8> {
        use crate::codec::encode_vbyte;
        use crate::posting::{encode_postings, Posting};

        let list: Vec<Posting> = postings
            .iter()
            .map(|&(docno, freq)| Posting {
                docno,
                freq,
                positions: vec![],
            })
            .collect();
        let encoded = encode_postings(&list);

        let mut out = Vec::new();
        encode_vbyte(term.len() as u64, &mut out);
        out.extend_from_slice(term);
        encode_vbyte(encoded.docs, &mut out);
        encode_vbyte(encoded.occurs, &mut out);
        encode_vbyte(encoded.last, &mut out);
        encode_vbyte(encoded.body.len() as u64, &mut out);
        encode_vbyte(encoded.first, &mut out);
        out.extend_from_slice(&encoded.body);
        out
    }

    #[test]
    fn width_trigger_merges_contiguous_same_level_files() -> Result<()> {
        let mut driver = FakeDriver::new();
        let mut pyramid = Pyramid::new(2, 64, u64::MAX);

        let f0 = driver.seed(run_bytes(b"ant", &[(0, 1)]));
        pyramid.add(f0, 0, false, &mut driver)?;
        assert_eq!(pyramid.files().len(), 1);

        let f1 = driver.seed(run_bytes(b"bee", &[(1, 1)]));
        pyramid.add(f1, 0, false, &mut driver)?;

        // width=2 same-level non-limited files triggers a merge, collapsing
        // to a single level-1 run.
        assert_eq!(pyramid.files().len(), 1);
        assert_eq!(pyramid.files()[0].level, 1);
        assert!(!pyramid.files()[0].limited);

        Ok(())
    }

    #[test]
    fn finish_produces_a_btree_root_and_seals_the_pyramid() -> Result<()> {
        let mut driver = FakeDriver::new();
        let mut pyramid = Pyramid::new(8, 64, u64::MAX);

        let f0 = driver.seed(run_bytes(b"ant", &[(0, 1)]));
        pyramid.add(f0, 0, false, &mut driver)?;
        let f1 = driver.seed(run_bytes(b"bee", &[(1, 1)]));
        pyramid.add(f1, 0, false, &mut driver)?;

        let mut next_extent_offset = 0u64;
        let mut alloc_extent = |size: u64| -> Result<(u32, u64)> {
            let offset = next_extent_offset;
            next_extent_offset += size;
            Ok((99, offset))
        };

        let mut next_page_offset = 0u64;
        let mut alloc_page = || -> Result<PageLocation> {
            let loc = PageLocation {
                fileno: 100,
                offset: next_page_offset,
            };
            next_page_offset += 256;
            Ok(loc)
        };
        let mut emit_page = |_loc: PageLocation, _bytes: &[u8]| -> Result<()> { Ok(()) };

        let outcome = pyramid.finish(
            &mut driver,
            256,
            256,
            &mut alloc_extent,
            &mut alloc_page,
            &mut emit_page,
        )?;

        assert_eq!(outcome.distinct_terms, 2);
        assert_eq!(outcome.total_occurs, 2);
        assert!(pyramid.is_finished());

        let err = pyramid.add(0, 0, false, &mut driver).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        Ok(())
    }
}
