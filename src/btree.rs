// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Vocabulary B-tree bulk loader (§4.5).
//!
//! Out of the two wire-contract-only supporting components, this is the
//! simpler one: stream `(key, payload)` pairs in ascending order and get
//! back pages of exactly `pagesize` bytes, each carrying a `tailsize`
//! header, a `prefixsize` byte (top bit = leaf), and a sibling pointer.
//!
//! A leaf page's sibling pointer cannot be known until the *next* leaf
//! page has been assigned a location, so a completed page is held back
//! one step (`pending`) and only handed to the caller once its neighbor's
//! location is known — avoiding a double write to patch it in later.
//!
//! Per-page prefix compression (the format allows, but does not require,
//! a shared prefix up to 127 bytes across a page's keys) is implemented
//! here as the always-valid `prefix_len = 0` case: every key is stored in
//! full. This keeps the bulk loader simple and correct; see `DESIGN.md`.

use crate::error::{Error, Result};

/// Location of a page: which file and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLocation {
    pub fileno: u32,
    pub offset: u64,
}

const TAIL_LEN: usize = 1 + 4 + 8;
const HEADER_LEN: usize = 2;
const LEAF_FLAG: u8 = 0x80;
const NO_SIBLING_FILENO: u32 = u32::MAX;

struct PageBuilder {
    pagesize: usize,
    is_leaf: bool,
    body: Vec<u8>,
    first_key: Option<Vec<u8>>,
}

impl PageBuilder {
    fn new(pagesize: usize, is_leaf: bool) -> Self {
        Self {
            pagesize,
            is_leaf,
            body: Vec::new(),
            first_key: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.first_key.is_none()
    }

    fn entry_len(key: &[u8], payload: &[u8]) -> usize {
        2 + key.len() + crate::codec::vbyte_len(payload.len() as u64) + payload.len()
    }

    fn fits(&self, key: &[u8], payload: &[u8]) -> bool {
        HEADER_LEN + self.body.len() + Self::entry_len(key, payload) + TAIL_LEN <= self.pagesize
    }

    fn add(&mut self, key: &[u8], payload: &[u8]) {
        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }

        self.body
            .extend_from_slice(&(key.len() as u16).to_be_bytes());
        self.body.extend_from_slice(key);
        crate::codec::encode_vbyte(payload.len() as u64, &mut self.body);
        self.body.extend_from_slice(payload);
    }

    fn finish(&self, sibling: Option<PageLocation>) -> Vec<u8> {
        let mut page = vec![0u8; self.pagesize];
        page[0..2].copy_from_slice(&(TAIL_LEN as u16).to_be_bytes());
        page[HEADER_LEN..HEADER_LEN + self.body.len()].copy_from_slice(&self.body);

        let tail_start = self.pagesize - TAIL_LEN;
        page[tail_start] = if self.is_leaf { LEAF_FLAG } else { 0 };

        let (fileno, offset) = match sibling {
            Some(loc) => (loc.fileno, loc.offset),
            None => (NO_SIBLING_FILENO, 0),
        };
        page[tail_start + 1..tail_start + 5].copy_from_slice(&fileno.to_be_bytes());
        page[tail_start + 5..tail_start + 13].copy_from_slice(&offset.to_be_bytes());

        page
    }
}

fn encode_location(loc: PageLocation) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12);
    bytes.extend_from_slice(&loc.fileno.to_be_bytes());
    bytes.extend_from_slice(&loc.offset.to_be_bytes());
    bytes
}

fn build_level(
    pagesize: usize,
    is_leaf: bool,
    items: &[(Vec<u8>, Vec<u8>)],
    alloc: &mut dyn FnMut() -> Result<PageLocation>,
    emit: &mut dyn FnMut(PageLocation, &[u8]) -> Result<()>,
) -> Result<Vec<(Vec<u8>, PageLocation)>> {
    let mut out = Vec::new();
    let mut current = PageBuilder::new(pagesize, is_leaf);
    let mut pending: Option<(PageLocation, PageBuilder)> = None;

    for (key, payload) in items {
        if !current.fits(key, payload) {
            if current.is_empty() {
                return Err(Error::InvalidState(
                    "a single B-tree entry does not fit in one page",
                ));
            }

            let loc = alloc()?;
            out.push((current.first_key.clone().expect("non-empty"), loc));

            if let Some((prev_loc, prev_page)) = pending.take() {
                emit(prev_loc, &prev_page.finish(Some(loc)))?;
            }

            let flushed = std::mem::replace(&mut current, PageBuilder::new(pagesize, is_leaf));
            pending = Some((loc, flushed));

            if !current.fits(key, payload) {
                return Err(Error::InvalidState(
                    "a single B-tree entry does not fit in one page",
                ));
            }
        }

        current.add(key, payload);
    }

    if !current.is_empty() {
        let loc = alloc()?;
        out.push((current.first_key.clone().expect("non-empty"), loc));

        if let Some((prev_loc, prev_page)) = pending.take() {
            emit(prev_loc, &prev_page.finish(Some(loc)))?;
        }

        pending = Some((loc, current));
    }

    if let Some((loc, page)) = pending {
        emit(loc, &page.finish(None))?;
    }

    Ok(out)
}

/// Bulk-loads a height-balanced B-tree from `items` (already sorted
/// ascending by key) and returns the root's location.
///
/// `alloc` assigns a page a location (e.g. the next slot in a growing
/// vocab file, rotating to a new file as `max_filesize` demands); `emit`
/// persists a finished page at its assigned location.
///
/// # Errors
///
/// Returns `InvalidState` if `items` is empty or a single entry cannot
/// fit in one page, or propagates whatever `alloc`/`emit` return.
pub fn bulk_load(
    pagesize: usize,
    items: Vec<(Vec<u8>, Vec<u8>)>,
    alloc: &mut dyn FnMut() -> Result<PageLocation>,
    emit: &mut dyn FnMut(PageLocation, &[u8]) -> Result<()>,
) -> Result<PageLocation> {
    if items.is_empty() {
        return Err(Error::InvalidState("cannot bulk-load an empty B-tree"));
    }

    let mut level = build_level(pagesize, true, &items, alloc, emit)?;

    while level.len() > 1 {
        let next_items: Vec<(Vec<u8>, Vec<u8>)> = level
            .iter()
            .map(|(key, loc)| (key.clone(), encode_location(*loc)))
            .collect();
        level = build_level(pagesize, false, &next_items, alloc, emit)?;
    }

    Ok(level[0].1)
}
