// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Resumable k-way merge of sorted posting-list runs (§4.1).
//!
//! This is the hardest single piece of the core. The source it is
//! modeled on drives one `goto`-based state machine with computed labels
//! per channel and globally; here every channel gets its own
//! [`RecordCursor`] (an explicit small state machine that can be paused
//! and resumed mid variable-byte-integer, mid term, or mid postings
//! body), and the merge engine itself tracks a higher-level phase. Both
//! reuse the same [`State`] discriminant set named in the design notes —
//! a channel "is in" one of the `Read*` states while the engine as a
//! whole is never in more than one of the later ones at a time.
//!
//! Driving a merge is a two-step loop: call [`IntermediateMerge::feed`]
//! (or [`FinalMerge::feed`]) to hand the engine more bytes for a channel,
//! then call `step` until it asks for more input, asks the driver to
//! persist output, asks for a new output file, or reports it is
//! finished — exactly the suspension points named in the design (every
//! `step` return is a point where "between returns, execution is
//! uninterruptible" holds).
//!
//! One scope reduction from the literal source: a single run contributing
//! more than one record for the same term (the "split across at most one
//! file boundary" case) is not supported — each channel may contribute at
//! most one record per term per merge invocation. See `DESIGN.md`.

use crate::btree::{self, PageLocation};
use crate::codec::{encode_vbyte, PartialVarint};
use crate::error::{Error, Result};
use crate::posting::fold_first_into_body;
use crate::vocab::{VocabHeader, VocabLocation, VocabVector};

/// Observable state of either a channel's low-level record parser or the
/// engine's own higher-level phase (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    ReadTermlen,
    ReadTerm,
    ReadDocs,
    ReadOccurs,
    ReadLast,
    ReadSize,
    ReadFirst,
    ReadBody,
    Select,
    Prefinish,
    AssignVocab,
    WriteVocabFirst,
    WriteVocabBody,
    WriteVocabEnd,
    WriteFileFirst,
    WriteFileBody,
    WriteFileOveralloc,
    WriteFileEnd,
    WriteBtree,
    FlushNewfile,
    FlushSwitch,
    Finished,
    Err,
}

/// One fully decoded sorted-run record (§3).
#[derive(Debug, Clone)]
struct RunRecord {
    term: Vec<u8>,
    docs: u64,
    occurs: u64,
    last: u64,
    size: u64,
    first: u64,
    body: Vec<u8>,
}

/// Result of trying to advance a channel's record parser by one step.
enum Advance {
    Pending,
    Eof,
    Record(RunRecord),
}

/// Per-channel resumable record parser.
struct RecordCursor {
    state: State,
    scratch: PartialVarint,
    termlen: usize,
    term: Vec<u8>,
    term_read: usize,
    docs: u64,
    occurs: u64,
    last: u64,
    size: u64,
    first: u64,
    body: Vec<u8>,
    body_read: usize,
}

impl RecordCursor {
    fn new() -> Self {
        Self {
            state: State::Start,
            scratch: PartialVarint::new(),
            termlen: 0,
            term: Vec::new(),
            term_read: 0,
            docs: 0,
            occurs: 0,
            last: 0,
            size: 0,
            first: 0,
            body: Vec::new(),
            body_read: 0,
        }
    }

    fn take_vbyte(&mut self, buf: &[u8], pos: &mut usize, eof: bool) -> Result<Option<u64>> {
        while *pos < buf.len() {
            let byte = buf[*pos];
            *pos += 1;
            if let Some(value) = self.scratch.push_byte(byte)? {
                return Ok(Some(value));
            }
        }
        if eof && !self.scratch.is_empty() {
            return Err(Error::Corrupt(
                "channel ended mid variable-byte integer",
            ));
        }
        Ok(None)
    }

    fn take_bytes(
        dst: &mut Vec<u8>,
        read: &mut usize,
        want: usize,
        buf: &[u8],
        pos: &mut usize,
        eof: bool,
    ) -> Result<bool> {
        if dst.len() < want {
            dst.resize(want, 0);
        }
        while *read < want && *pos < buf.len() {
            dst[*read] = buf[*pos];
            *read += 1;
            *pos += 1;
        }
        if *read == want {
            return Ok(true);
        }
        if eof {
            return Err(Error::Corrupt("channel ended mid-record"));
        }
        Ok(false)
    }

    fn advance(&mut self, buf: &[u8], pos: &mut usize, eof: bool) -> Result<Advance> {
        loop {
            match self.state {
                State::Start => {
                    if *pos >= buf.len() {
                        return Ok(if eof { Advance::Eof } else { Advance::Pending });
                    }
                    self.state = State::ReadTermlen;
                }
                State::ReadTermlen => match self.take_vbyte(buf, pos, eof)? {
                    Some(v) => {
                        self.termlen = v as usize;
                        self.term_read = 0;
                        self.state = State::ReadTerm;
                    }
                    None => return Ok(Advance::Pending),
                },
                State::ReadTerm => {
                    if Self::take_bytes(&mut self.term, &mut self.term_read, self.termlen, buf, pos, eof)? {
                        if self.term[..self.termlen].iter().any(|&b| b < 0x20) {
                            return Err(Error::Corrupt("control character in term"));
                        }
                        self.state = State::ReadDocs;
                    } else {
                        return Ok(Advance::Pending);
                    }
                }
                State::ReadDocs => match self.take_vbyte(buf, pos, eof)? {
                    Some(v) => {
                        self.docs = v;
                        self.state = State::ReadOccurs;
                    }
                    None => return Ok(Advance::Pending),
                },
                State::ReadOccurs => match self.take_vbyte(buf, pos, eof)? {
                    Some(v) => {
                        self.occurs = v;
                        self.state = State::ReadLast;
                    }
                    None => return Ok(Advance::Pending),
                },
                State::ReadLast => match self.take_vbyte(buf, pos, eof)? {
                    Some(v) => {
                        self.last = v;
                        self.state = State::ReadSize;
                    }
                    None => return Ok(Advance::Pending),
                },
                State::ReadSize => match self.take_vbyte(buf, pos, eof)? {
                    Some(v) => {
                        self.size = v;
                        self.state = State::ReadFirst;
                    }
                    None => return Ok(Advance::Pending),
                },
                State::ReadFirst => match self.take_vbyte(buf, pos, eof)? {
                    Some(v) => {
                        self.first = v;
                        self.body_read = 0;
                        self.state = State::ReadBody;
                    }
                    None => return Ok(Advance::Pending),
                },
                State::ReadBody => {
                    if Self::take_bytes(&mut self.body, &mut self.body_read, self.size as usize, buf, pos, eof)? {
                        if self.docs == 0 {
                            return Err(Error::Corrupt("run record declares zero docs"));
                        }
                        let record = RunRecord {
                            term: self.term[..self.termlen].to_vec(),
                            docs: self.docs,
                            occurs: self.occurs,
                            last: self.last,
                            size: self.size,
                            first: self.first,
                            body: self.body[..self.size as usize].to_vec(),
                        };
                        self.state = State::Start;
                        return Ok(Advance::Record(record));
                    }
                    return Ok(Advance::Pending);
                }
                _ => unreachable!("RecordCursor only occupies the Read* states"),
            }
        }
    }
}

struct Channel {
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    cursor: RecordCursor,
    peeked: Option<RunRecord>,
    alive: bool,
}

impl Channel {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            eof: false,
            cursor: RecordCursor::new(),
            peeked: None,
            alive: true,
        }
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }
}

/// Encodes a fully merged record in the sorted-run wire format (§3, §6).
pub(crate) fn encode_run_record(term: &[u8], docs: u64, occurs: u64, last: u64, size: u64, first: u64, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 32);
    encode_vbyte(term.len() as u64, &mut out);
    out.extend_from_slice(term);
    encode_vbyte(docs, &mut out);
    encode_vbyte(occurs, &mut out);
    encode_vbyte(last, &mut out);
    encode_vbyte(size, &mut out);
    encode_vbyte(first, &mut out);
    out.extend_from_slice(body);
    out
}

struct MergedGroup {
    term: Vec<u8>,
    docs: u64,
    occurs: u64,
    last: u64,
    first: u64,
    body: Vec<u8>,
}

/// Groups, delta-rebases, and concatenates one same-term group of run
/// records (§4.1 steps 2-3).
fn merge_group(mut group: Vec<RunRecord>) -> Result<MergedGroup> {
    group.sort_by_key(|r| r.first);

    let term = group[0].term.clone();
    let first = group[0].first;
    let mut last = group[0].last;
    let mut docs = 0u64;
    let mut occurs = 0u64;
    let mut body = Vec::new();
    let mut prev_last: Option<u64> = None;

    for rec in &group {
        if let Some(prev_last_val) = prev_last {
            if rec.first <= prev_last_val {
                return Err(Error::Corrupt(
                    "overlapping or non-increasing docno ranges for the same term across runs",
                ));
            }
            let delta = rec.first - (prev_last_val + 1);
            encode_vbyte(delta, &mut body);
        }
        body.extend_from_slice(&rec.body);
        docs += rec.docs;
        occurs += rec.occurs;
        last = rec.last;
        prev_last = Some(rec.last);
    }

    Ok(MergedGroup {
        term,
        docs,
        occurs,
        last,
        first,
        body,
    })
}

/// Pops the next same-term group across all primed, alive channels.
/// Returns `None` once every channel is exhausted.
fn pop_next_group(channels: &mut [Channel]) -> Option<Vec<RunRecord>> {
    let min_term = channels
        .iter()
        .filter(|c| c.alive)
        .filter_map(|c| c.peeked.as_ref().map(|r| r.term.clone()))
        .min()?;

    let mut group = Vec::new();
    for c in channels.iter_mut() {
        if c.alive {
            if let Some(r) = &c.peeked {
                if r.term == min_term {
                    group.push(c.peeked.take().unwrap());
                }
            }
        }
    }
    Some(group)
}

/// Ensures every alive channel has a peeked record (or is marked
/// exhausted). Returns `Some(channel_index)` if priming had to stop to
/// wait for more input.
fn prime_all(channels: &mut [Channel]) -> Result<Option<usize>> {
    for i in 0..channels.len() {
        if !channels[i].alive || channels[i].peeked.is_some() {
            continue;
        }
        let channel = &mut channels[i];
        match channel.cursor.advance(&channel.buf, &mut channel.pos, channel.eof)? {
            Advance::Pending => return Ok(Some(i)),
            Advance::Eof => channel.alive = false,
            Advance::Record(r) => {
                channel.compact();
                channel.peeked = Some(r);
            }
        }
    }
    Ok(None)
}

/// What a `step` call asks the driver to do next (§4.1, §5 suspension
/// points).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Channel `i` has no more buffered bytes; call `feed`/`mark_eof` and
    /// retry.
    NeedInput(usize),
    /// `len` bytes are ready in the output buffer (`take_output`).
    OutputReady(usize),
    /// The current output file is full; call `rotate_output_file` then
    /// retry.
    NeedNewFile,
    /// The merge is complete.
    Finished,
}

/// Intermediate merge: `k` sorted runs in, one larger sorted run out
/// (§4.1 step 5).
pub struct IntermediateMerge {
    channels: Vec<Channel>,
    state: State,
    output_buf: Vec<u8>,
    bytes_in_current_file: u64,
    max_filesize: u64,
    pending_output: Option<Vec<u8>>,
}

impl IntermediateMerge {
    #[must_use]
    pub fn new(fan_in: usize, max_filesize: u64) -> Self {
        Self {
            channels: (0..fan_in).map(|_| Channel::new()).collect(),
            state: State::Select,
            output_buf: Vec::new(),
            bytes_in_current_file: 0,
            max_filesize,
            pending_output: None,
        }
    }

    pub fn feed(&mut self, channel: usize, bytes: &[u8]) {
        self.channels[channel].buf.extend_from_slice(bytes);
    }

    pub fn mark_eof(&mut self, channel: usize) {
        self.channels[channel].eof = true;
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output_buf)
    }

    /// Call after persisting the current output and switching to a new
    /// output file.
    pub fn rotate_output_file(&mut self) {
        self.bytes_in_current_file = 0;
    }

    /// # Errors
    ///
    /// Returns `Corrupt` on any structural violation in an input run
    /// (§4.1 failure semantics).
    pub fn step(&mut self) -> Result<StepResult> {
        if self.state == State::Finished {
            return Ok(StepResult::Finished);
        }

        if let Some(pending) = self.pending_output.take() {
            self.output_buf.extend_from_slice(&pending);
            self.bytes_in_current_file += pending.len() as u64;
            return Ok(StepResult::OutputReady(self.output_buf.len()));
        }

        if let Some(i) = prime_all(&mut self.channels)? {
            self.state = self.channels[i].cursor.state;
            return Ok(StepResult::NeedInput(i));
        }

        self.state = State::Select;
        let Some(group) = pop_next_group(&mut self.channels) else {
            self.state = State::Finished;
            return Ok(StepResult::Finished);
        };

        let merged = merge_group(group)?;
        let encoded = encode_run_record(
            &merged.term,
            merged.docs,
            merged.occurs,
            merged.last,
            merged.body.len() as u64,
            merged.first,
            &merged.body,
        );

        if self.bytes_in_current_file > 0
            && self.bytes_in_current_file + encoded.len() as u64 > self.max_filesize
        {
            self.pending_output = Some(encoded);
            self.state = State::FlushNewfile;
            return Ok(StepResult::NeedNewFile);
        }

        self.bytes_in_current_file += encoded.len() as u64;
        self.output_buf.extend_from_slice(&encoded);
        Ok(StepResult::OutputReady(self.output_buf.len()))
    }
}

/// One term's finished placement decision, ready for the B-tree bulk
/// loader (§4.1 step 4).
struct VocabEntry {
    term: Vec<u8>,
    vector: VocabVector,
}

/// A term whose postings are too large to inline, waiting on a vector
/// file with enough room before `alloc_extent` can be asked where it
/// goes. Deferring the `alloc_extent` call until the destination file is
/// certain keeps the returned `(fileno, offset)` always describing the
/// file the bytes are actually about to be written into, rather than the
/// one being rotated away from.
struct PendingExtent {
    term: Vec<u8>,
    folded: Vec<u8>,
    docs: u32,
    occurs: u64,
    last: u64,
    size: u64,
}

/// Final merge: `k` sorted runs in, packed vector-file bytes plus a set
/// of vocab entries ready for bulk-loading into the B-tree (§4.1 step 4).
pub struct FinalMerge {
    channels: Vec<Channel>,
    state: State,
    output_buf: Vec<u8>,
    bytes_in_current_vector_file: u64,
    max_filesize: u64,
    vocab_lsize: u64,
    vocab_entries: Vec<VocabEntry>,
    total_occurs: u128,
    pending_extent: Option<PendingExtent>,
}

impl FinalMerge {
    #[must_use]
    pub fn new(fan_in: usize, max_filesize: u64, vocab_lsize: u64) -> Self {
        Self {
            channels: (0..fan_in).map(|_| Channel::new()).collect(),
            state: State::Select,
            output_buf: Vec::new(),
            bytes_in_current_vector_file: 0,
            max_filesize,
            vocab_lsize,
            vocab_entries: Vec::new(),
            total_occurs: 0,
            pending_extent: None,
        }
    }

    pub fn feed(&mut self, channel: usize, bytes: &[u8]) {
        self.channels[channel].buf.extend_from_slice(bytes);
    }

    pub fn mark_eof(&mut self, channel: usize) {
        self.channels[channel].eof = true;
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output_buf)
    }

    pub fn rotate_output_file(&mut self) {
        self.bytes_in_current_vector_file = 0;
    }

    /// Total occurrences summed across every merged term so far — feeds
    /// the params file's `terms_high`/`terms_low` fields (§6).
    #[must_use]
    pub fn total_occurs(&self) -> u128 {
        self.total_occurs
    }

    /// Number of distinct terms merged so far.
    #[must_use]
    pub fn distinct_terms(&self) -> usize {
        self.vocab_entries.len()
    }

    /// `alloc_extent(capacity)` assigns a vector-file placement for a
    /// postings blob too large to inline.
    ///
    /// # Errors
    ///
    /// Returns `Corrupt` on any structural violation in an input run, or
    /// whatever `alloc_extent` returns.
    pub fn step(&mut self, alloc_extent: &mut dyn FnMut(u64) -> Result<(u32, u64)>) -> Result<StepResult> {
        // A run of consecutive inlined terms produces no output bytes, so
        // this loops internally rather than recursing — otherwise a long
        // stretch of small terms between two extent-sized ones would grow
        // the call stack by one frame per term.
        loop {
            if self.state == State::Finished {
                return Ok(StepResult::Finished);
            }

            if let Some(pending) = self.pending_extent.take() {
                let (fileno, offset) = alloc_extent(pending.size)?;
                self.bytes_in_current_vector_file += pending.size;
                self.output_buf.extend_from_slice(&pending.folded);
                self.total_occurs += u128::from(pending.occurs);
                self.vocab_entries.push(VocabEntry {
                    term: pending.term,
                    vector: VocabVector {
                        header: VocabHeader {
                            docs: pending.docs,
                            occurs: pending.occurs,
                            last: pending.last,
                            size: pending.size,
                        },
                        location: VocabLocation::Extent {
                            fileno,
                            offset,
                            capacity: pending.size,
                        },
                    },
                });
                return Ok(StepResult::OutputReady(self.output_buf.len()));
            }

            if let Some(i) = prime_all(&mut self.channels)? {
                self.state = self.channels[i].cursor.state;
                return Ok(StepResult::NeedInput(i));
            }

            self.state = State::Select;
            let Some(group) = pop_next_group(&mut self.channels) else {
                self.state = State::Finished;
                return Ok(StepResult::Finished);
            };

            let merged = merge_group(group)?;
            self.state = State::Prefinish;

            let folded = fold_first_into_body(merged.first, &merged.body);
            let size = folded.len() as u64;

            if size < self.vocab_lsize {
                self.state = State::AssignVocab;
                let entry = VocabEntry {
                    term: merged.term,
                    vector: VocabVector {
                        header: VocabHeader {
                            docs: merged.docs as u32,
                            occurs: merged.occurs,
                            last: merged.last,
                            size,
                        },
                        location: VocabLocation::Inline(folded),
                    },
                };
                self.total_occurs += u128::from(entry.vector.header.occurs);
                self.vocab_entries.push(entry);
                continue;
            }

            self.state = State::WriteFileFirst;

            if self.bytes_in_current_vector_file > 0
                && self.bytes_in_current_vector_file + size > self.max_filesize
            {
                self.pending_extent = Some(PendingExtent {
                    term: merged.term,
                    folded,
                    docs: merged.docs as u32,
                    occurs: merged.occurs,
                    last: merged.last,
                    size,
                });
                self.state = State::FlushSwitch;
                return Ok(StepResult::NeedNewFile);
            }

            let (fileno, offset) = alloc_extent(size)?;
            self.bytes_in_current_vector_file += size;
            self.output_buf.extend_from_slice(&folded);
            self.total_occurs += u128::from(merged.occurs);
            self.vocab_entries.push(VocabEntry {
                term: merged.term,
                vector: VocabVector {
                    header: VocabHeader {
                        docs: merged.docs as u32,
                        occurs: merged.occurs,
                        last: merged.last,
                        size,
                    },
                    location: VocabLocation::Extent {
                        fileno,
                        offset,
                        capacity: size,
                    },
                },
            });

            return Ok(StepResult::OutputReady(self.output_buf.len()));
        }
    }

    /// Bulk-loads every merged term's vocab vector into a B-tree (§4.5)
    /// and returns its root location. Call only after `step` reports
    /// `Finished`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no terms were merged, or propagates
    /// `alloc`/`emit` errors.
    pub fn finalize_btree(
        self,
        pagesize: usize,
        alloc: &mut dyn FnMut() -> Result<PageLocation>,
        emit: &mut dyn FnMut(PageLocation, &[u8]) -> Result<()>,
    ) -> Result<PageLocation> {
        let items = self
            .vocab_entries
            .into_iter()
            .map(|entry| (entry.term, entry.vector.encode_into_vec()))
            .collect();

        btree::bulk_load(pagesize, items, alloc, emit)
    }
}
