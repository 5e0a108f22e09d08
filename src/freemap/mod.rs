// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segregated-fit free-space allocator over a growing set of files (§4.3).
//!
//! Three intrusive lists share one conceptual record in the source this
//! core is modeled on: a doubly linked free list sorted by
//! `(fileno, offset)`, a doubly linked size-segregated list, and a node in
//! a red-black tree used as an approximate index. Rather than reproduce
//! three mutable intrusive pointers through one node (an aliasing hazard
//! in Rust — see `DESIGN.md`), every record lives in a [`crate::freemap::slab::Slab`]
//! and all three lists reference it by stable index.
//!
//! The red-black tree is stood in for by a `BTreeMap` holding a random
//! sample of free records, exactly as described in §4.3: a short linear
//! walk from the nearest indexed neighbor finds the exact record.

mod slab;

use crate::error::{Error, Result};
use slab::Slab;
use std::collections::BTreeMap;

/// Number of size-segregated lists: one per bit position of a 64-bit size.
pub const SIZELISTS: usize = 64;

/// Allocation strategy (§4.3). Chosen at construction by default, but a
/// caller may override it per call — useful for tests and for callers
/// that mix strategies across allocation sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// First-fit walk of the full free list.
    First,
    /// Ascend size-lists starting at `ceil(log2(need))`, take the first
    /// adequate record found.
    Close,
    /// Same ascent, but scan the first adequate bucket for the minimum
    /// adequate size.
    Best,
    /// Descend from the largest non-empty size-list, scan for the maximum
    /// size.
    Worst,
}

/// Per-call allocation options.
#[derive(Debug, Clone, Copy)]
pub struct AllocOptions {
    /// Overrides the allocator's default strategy for this call.
    pub strategy: Option<Strategy>,
    /// `EXACT` requires `size == need`; ignored by [`Freemap::allocate_at`].
    pub exact: bool,
    /// If the remainder after carving `need` out of a candidate is
    /// `<= append`, the caller receives the whole extent instead of a
    /// split (caps metadata growth from tiny remainders).
    pub append: u64,
}

impl Default for AllocOptions {
    fn default() -> Self {
        Self {
            strategy: None,
            exact: false,
            append: 0,
        }
    }
}

/// A contiguous byte range in one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub fileno: u32,
    pub offset: u64,
    pub size: u64,
}

/// Callback used to grow the file set. Given the current file count,
/// returns the new file's size; the returned extent becomes an unused
/// tail at `(new_fileno, 0, new_size)`.
pub type NewFileFn<'a> = dyn FnMut(u32) -> Result<u64> + 'a;

#[derive(Debug, Clone, Copy)]
struct FreeRecord {
    fileno: u32,
    offset: u64,
    size: u64,

    prev: Option<usize>,
    next: Option<usize>,

    bucket: usize,
    bucket_prev: Option<usize>,
    bucket_next: Option<usize>,

    indexed: bool,
}

fn floor_log2(size: u64) -> usize {
    debug_assert!(size > 0);
    (63 - size.leading_zeros()) as usize
}

fn ceil_log2(need: u64) -> usize {
    if need <= 1 {
        0
    } else {
        (64 - (need - 1).leading_zeros()) as usize
    }
}

/// Tiny xorshift64 PRNG used only to decide whether a freed record joins
/// the sampled index (~20% of the time) — not security-sensitive, so it
/// is not worth pulling in a crate dependency for.
struct Xorshift64(u64);

impl Xorshift64 {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Returns `true` with probability `numerator / denominator`.
    fn chance(&mut self, numerator: u64, denominator: u64) -> bool {
        self.next() % denominator < numerator
    }
}

/// Segregated-fit allocator over a file set.
pub struct Freemap {
    default_strategy: Strategy,
    arena: Slab<FreeRecord>,

    /// Global sorted free list, head/tail by `(fileno, offset)` ascending.
    head: Option<usize>,
    tail: Option<usize>,

    bucket_heads: Vec<Option<usize>>,
    bucket_tails: Vec<Option<usize>>,

    /// Sampled index: `(fileno, offset) -> arena index`, holding roughly
    /// 20% of free records.
    index: BTreeMap<(u32, u64), usize>,

    /// At most one record per file: bytes past the file's used region
    /// that have never been allocated.
    unused_tails: BTreeMap<u32, (u64, u64)>,

    file_count: u32,

    /// Write-only observability counter (§9 open question #3): bytes
    /// absorbed into a loose-fit extent instead of being split off as a
    /// separate free record.
    pub waste: u64,

    rng: Xorshift64,
}

impl Freemap {
    #[must_use]
    pub fn new(default_strategy: Strategy) -> Self {
        Self {
            default_strategy,
            arena: Slab::new(),
            head: None,
            tail: None,
            bucket_heads: vec![None; SIZELISTS],
            bucket_tails: vec![None; SIZELISTS],
            index: BTreeMap::new(),
            unused_tails: BTreeMap::new(),
            file_count: 0,
            waste: 0,
            rng: Xorshift64(0x9E37_79B9_7F4A_7C15),
        }
    }

    /// Number of files the allocator has grown to so far.
    #[must_use]
    pub fn file_count(&self) -> u32 {
        self.file_count
    }

    // ---- size-bucket list maintenance -----------------------------------

    fn bucket_push(&mut self, idx: usize) {
        let bucket = self.arena.get(idx).bucket;
        let old_head = self.bucket_heads[bucket];

        {
            let rec = self.arena.get_mut(idx);
            rec.bucket_prev = None;
            rec.bucket_next = old_head;
        }

        if let Some(head) = old_head {
            self.arena.get_mut(head).bucket_prev = Some(idx);
        } else {
            self.bucket_tails[bucket] = Some(idx);
        }

        self.bucket_heads[bucket] = Some(idx);
    }

    fn bucket_remove(&mut self, idx: usize) {
        let (bucket, prev, next) = {
            let rec = self.arena.get(idx);
            (rec.bucket, rec.bucket_prev, rec.bucket_next)
        };

        match prev {
            Some(p) => self.arena.get_mut(p).bucket_next = next,
            None => self.bucket_heads[bucket] = next,
        }

        match next {
            Some(n) => self.arena.get_mut(n).bucket_prev = prev,
            None => self.bucket_tails[bucket] = prev,
        }
    }

    // ---- global sorted list maintenance ---------------------------------

    fn key(rec: &FreeRecord) -> (u32, u64) {
        (rec.fileno, rec.offset)
    }

    /// Finds the record immediately before `key` in sorted order (or
    /// `None` if `key` would be the new head), via the sampled index plus
    /// a short linear walk.
    fn find_insertion_point(&self, key: (u32, u64)) -> Option<usize> {
        if let Some((_, &idx)) = self.index.range(..=key).next_back() {
            let mut cur = idx;
            loop {
                let rec = self.arena.get(cur);
                match rec.next {
                    Some(next_idx) if Self::key(self.arena.get(next_idx)) <= key => {
                        cur = next_idx;
                    }
                    _ => return Some(cur),
                }
            }
        } else {
            // No sampled neighbor at or before `key`: walk from the head.
            let mut cur = self.head?;
            if Self::key(self.arena.get(cur)) > key {
                return None;
            }
            loop {
                let rec = self.arena.get(cur);
                match rec.next {
                    Some(next_idx) if Self::key(self.arena.get(next_idx)) <= key => {
                        cur = next_idx;
                    }
                    _ => return Some(cur),
                }
            }
        }
    }

    fn link_after(&mut self, prev: Option<usize>, idx: usize) {
        let next = match prev {
            Some(p) => self.arena.get(p).next,
            None => self.head,
        };

        {
            let rec = self.arena.get_mut(idx);
            rec.prev = prev;
            rec.next = next;
        }

        match prev {
            Some(p) => self.arena.get_mut(p).next = Some(idx),
            None => self.head = Some(idx),
        }

        match next {
            Some(n) => self.arena.get_mut(n).prev = Some(idx),
            None => self.tail = Some(idx),
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let rec = self.arena.get(idx);
            (rec.prev, rec.next)
        };

        match prev {
            Some(p) => self.arena.get_mut(p).next = next,
            None => self.head = next,
        }

        match next {
            Some(n) => self.arena.get_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    fn remove_record(&mut self, idx: usize) -> FreeRecord {
        self.bucket_remove(idx);
        self.unlink(idx);

        let rec = *self.arena.get(idx);
        if rec.indexed {
            self.index.remove(&Self::key(&rec));
        }
        self.arena.remove(idx);
        rec
    }

    fn insert_free_record(&mut self, fileno: u32, offset: u64, size: u64) -> usize {
        debug_assert!(size > 0, "cannot insert a zero-size free record");

        // Coalesce with neighbors before inserting, so the invariant
        // "adjacent free extents in the same file are coalesced" always
        // holds (§3).
        let key = (fileno, offset);
        let prev_idx = self.find_insertion_point(key);

        let mut merged_offset = offset;
        let mut merged_size = size;
        let mut remove_prev = None;
        let mut remove_next = None;

        if let Some(p) = prev_idx {
            let prev = *self.arena.get(p);
            if prev.fileno == fileno && prev.offset + prev.size == merged_offset {
                merged_offset = prev.offset;
                merged_size += prev.size;
                remove_prev = Some(p);
            }
        }

        let next_idx = match remove_prev {
            Some(p) => self.arena.get(p).next,
            None => match prev_idx {
                Some(p) => self.arena.get(p).next,
                None => self.head,
            },
        };

        if let Some(n) = next_idx {
            let next = *self.arena.get(n);
            if next.fileno == fileno && merged_offset + merged_size == next.offset {
                merged_size += next.size;
                remove_next = Some(n);
            }
        }

        let mut freed = Vec::with_capacity(2);

        let insertion_prev = if let Some(p) = remove_prev {
            let before = self.arena.get(p).prev;
            self.remove_record(p);
            freed.push(p);
            before
        } else {
            prev_idx
        };

        if let Some(n) = remove_next {
            self.remove_record(n);
            freed.push(n);
        }

        let bucket = floor_log2(merged_size);
        let record = FreeRecord {
            fileno,
            offset: merged_offset,
            size: merged_size,
            prev: None,
            next: None,
            bucket,
            bucket_prev: None,
            bucket_next: None,
            indexed: false,
        };

        let idx = self.arena.insert(record);

        // Re-resolve the insertion point: coalescing may have removed the
        // node we anchored on. `freed` names exactly the slots this call
        // removed, so this holds even if a future change coalesces more
        // than one neighbor per side.
        let insertion_prev = match insertion_prev {
            Some(p) if !freed.contains(&p) => Some(p),
            _ => self.find_insertion_point((fileno, merged_offset)),
        };

        self.link_after(insertion_prev, idx);
        self.bucket_push(idx);

        if self.rng.chance(1, 5) {
            self.arena.get_mut(idx).indexed = true;
            self.index.insert((fileno, merged_offset), idx);
        }

        idx
    }

    // ---- allocation -------------------------------------------------------

    fn carve(&mut self, idx: usize, need: u64, exact: bool, append: u64) -> Extent {
        let rec = *self.arena.get(idx);
        let remainder = rec.size - need;

        if exact || remainder == 0 {
            self.remove_record(idx);
            return Extent {
                fileno: rec.fileno,
                offset: rec.offset,
                size: rec.size,
            };
        }

        if remainder <= append {
            self.waste += remainder;
            self.remove_record(idx);
            return Extent {
                fileno: rec.fileno,
                offset: rec.offset,
                size: rec.size,
            };
        }

        self.remove_record(idx);
        self.insert_free_record(rec.fileno, rec.offset + need, remainder);

        Extent {
            fileno: rec.fileno,
            offset: rec.offset,
            size: need,
        }
    }

    fn find_first_fit(&self, need: u64, exact: bool) -> Option<usize> {
        let mut cur = self.head;
        while let Some(idx) = cur {
            let rec = self.arena.get(idx);
            let ok = if exact { rec.size == need } else { rec.size >= need };
            if ok {
                return Some(idx);
            }
            cur = rec.next;
        }
        None
    }

    fn bucket_min(&self, bucket: usize) -> Option<usize> {
        let mut cur = self.bucket_heads[bucket];
        let mut best: Option<usize> = None;
        while let Some(idx) = cur {
            let rec = self.arena.get(idx);
            best = Some(match best {
                Some(b) if self.arena.get(b).size <= rec.size => b,
                _ => idx,
            });
            cur = rec.bucket_next;
        }
        best
    }

    fn bucket_max(&self, bucket: usize) -> Option<usize> {
        let mut cur = self.bucket_heads[bucket];
        let mut best: Option<usize> = None;
        while let Some(idx) = cur {
            let rec = self.arena.get(idx);
            best = Some(match best {
                Some(b) if self.arena.get(b).size >= rec.size => b,
                _ => idx,
            });
            cur = rec.bucket_next;
        }
        best
    }

    fn find_close_or_best(&self, need: u64, exact: bool, want_best: bool) -> Option<usize> {
        if exact {
            // Exact matches must live in exactly one bucket: floor(log2(need)).
            let bucket = floor_log2(need.max(1));
            let mut cur = self.bucket_heads[bucket];
            while let Some(idx) = cur {
                let rec = self.arena.get(idx);
                if rec.size == need {
                    return Some(idx);
                }
                cur = rec.bucket_next;
            }
            return None;
        }

        let start = ceil_log2(need);
        for bucket in start..SIZELISTS {
            if self.bucket_heads[bucket].is_some() {
                return if want_best {
                    self.bucket_min(bucket)
                } else {
                    self.bucket_heads[bucket]
                };
            }
        }
        None
    }

    fn find_worst(&self, need: u64, exact: bool) -> Option<usize> {
        if exact {
            return self.find_close_or_best(need, true, false);
        }

        let start = ceil_log2(need);
        for bucket in (start..SIZELISTS).rev() {
            if self.bucket_heads[bucket].is_some() {
                return self.bucket_max(bucket);
            }
        }
        None
    }

    fn find_candidate(&self, strategy: Strategy, need: u64, exact: bool) -> Option<usize> {
        match strategy {
            Strategy::First => self.find_first_fit(need, exact),
            Strategy::Close => self.find_close_or_best(need, exact, false),
            Strategy::Best => self.find_close_or_best(need, exact, true),
            Strategy::Worst => self.find_worst(need, exact),
        }
    }

    fn grow(&mut self, newfile: &mut NewFileFn<'_>) -> Result<()> {
        let fileno = self.file_count;
        let size = newfile(fileno)?;
        self.file_count += 1;
        self.unused_tails.insert(fileno, (0, size));
        Ok(())
    }

    /// Finds any unused tail with at least `need` bytes, carving `need`
    /// bytes off its front.
    fn carve_from_any_tail(&mut self, need: u64) -> Option<Extent> {
        let fileno = *self
            .unused_tails
            .iter()
            .find(|(_, &(_, size))| size >= need)
            .map(|(fileno, _)| fileno)?;

        let (offset, size) = self.unused_tails.remove(&fileno).expect("just matched");
        let remainder = size - need;

        if remainder > 0 {
            self.unused_tails.insert(fileno, (offset + need, remainder));
        }

        Some(Extent {
            fileno,
            offset,
            size: need,
        })
    }

    /// Allocates `need` bytes anywhere, per the configured/overridden
    /// strategy (§4.3).
    ///
    /// # Errors
    ///
    /// Returns `Resource` if the `newfile` callback fails, or propagates
    /// any error it returns.
    pub fn allocate(
        &mut self,
        need: u64,
        opts: AllocOptions,
        newfile: &mut NewFileFn<'_>,
    ) -> Result<Extent> {
        if need == 0 {
            return Err(Error::InvalidState("cannot allocate zero bytes"));
        }

        let strategy = opts.strategy.unwrap_or(self.default_strategy);

        if let Some(idx) = self.find_candidate(strategy, need, opts.exact) {
            return Ok(self.carve(idx, need, opts.exact, opts.append));
        }

        if !opts.exact {
            if let Some(extent) = self.carve_from_any_tail(need) {
                return Ok(extent);
            }
        }

        self.grow(newfile)?;
        self.carve_from_any_tail(need)
            .ok_or(Error::Resource("newfile callback returned too small a file"))
    }

    /// Allocates exactly `[offset, offset + need)` in file `fileno`,
    /// splitting/trimming whatever free record or unused tail covers it.
    /// Grows the file set via `newfile` if `fileno` does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the target range is not free.
    pub fn allocate_at(
        &mut self,
        fileno: u32,
        offset: u64,
        need: u64,
        newfile: &mut NewFileFn<'_>,
    ) -> Result<Extent> {
        while self.file_count <= fileno {
            self.grow(newfile)?;
        }

        if let Some(idx) = self.find_record_covering(fileno, offset) {
            let rec = *self.arena.get(idx);

            if offset + need <= rec.offset + rec.size {
                self.remove_record(idx);
                let prefix = offset - rec.offset;
                let suffix = (rec.offset + rec.size) - (offset + need);
                if prefix > 0 {
                    self.insert_free_record(fileno, rec.offset, prefix);
                }
                if suffix > 0 {
                    self.insert_free_record(fileno, offset + need, suffix);
                }
                return Ok(Extent { fileno, offset, size: need });
            }

            if let Some(&(tail_offset, tail_size)) = self.unused_tails.get(&fileno) {
                if rec.offset + rec.size == tail_offset && offset + need <= tail_offset + tail_size
                {
                    self.remove_record(idx);
                    let prefix = offset - rec.offset;
                    if prefix > 0 {
                        self.insert_free_record(fileno, rec.offset, prefix);
                    }

                    let consumed_from_tail = (offset + need) - tail_offset;
                    let remaining_tail = tail_size - consumed_from_tail;
                    if remaining_tail > 0 {
                        self.unused_tails
                            .insert(fileno, (offset + need, remaining_tail));
                    } else {
                        self.unused_tails.remove(&fileno);
                    }

                    return Ok(Extent { fileno, offset, size: need });
                }
            }
        }

        if let Some(&(tail_offset, tail_size)) = self.unused_tails.get(&fileno) {
            if offset >= tail_offset && offset + need <= tail_offset + tail_size {
                let gap_before = offset - tail_offset;
                let gap_after = (tail_offset + tail_size) - (offset + need);

                self.unused_tails.remove(&fileno);
                if gap_before > 0 {
                    self.insert_free_record(fileno, tail_offset, gap_before);
                }
                if gap_after > 0 {
                    self.unused_tails.insert(fileno, (offset + need, gap_after));
                }

                return Ok(Extent { fileno, offset, size: need });
            }
        }

        Err(Error::NotFound(
            "requested extent is not covered by any free record or unused tail",
        ))
    }

    fn find_record_covering(&self, fileno: u32, offset: u64) -> Option<usize> {
        let anchor = self.find_insertion_point((fileno, offset))?;
        let rec = self.arena.get(anchor);
        if rec.fileno == fileno && rec.offset <= offset && offset < rec.offset + rec.size {
            Some(anchor)
        } else {
            None
        }
    }

    /// Returns `extent` to the free list, coalescing with adjacent extents
    /// in the same file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` on a zero-size extent.
    pub fn free(&mut self, extent: Extent) -> Result<()> {
        if extent.size == 0 {
            return Err(Error::InvalidState("cannot free a zero-size extent"));
        }

        self.insert_free_record(extent.fileno, extent.offset, extent.size);
        Ok(())
    }

    /// Total bytes currently free (sum of the free list; excludes unused
    /// tails).
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        let mut total = 0;
        let mut cur = self.head;
        while let Some(idx) = cur {
            let rec = self.arena.get(idx);
            total += rec.size;
            cur = rec.next;
        }
        total
    }

    /// Debug-only consistency check of the invariants in §4.3: sorted,
    /// non-overlapping free list; every record in exactly one size-list
    /// matching `floor(log2(size))`; at most one unused tail per file.
    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) -> Result<()> {
        let mut cur = self.head;
        let mut prev_key: Option<(u32, u64)> = None;

        while let Some(idx) = cur {
            let rec = self.arena.get(idx);
            let key = Self::key(rec);

            if let Some(prev) = prev_key {
                if key <= prev {
                    return Err(Error::InvalidState("free list is not strictly sorted"));
                }
            }

            if rec.bucket != floor_log2(rec.size) {
                return Err(Error::InvalidState("record is in the wrong size bucket"));
            }

            prev_key = Some(key);
            cur = rec.next;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn no_grow() -> impl FnMut(u32) -> Result<u64> {
        |_| Err(Error::Resource("no growth expected in this test"))
    }

    #[test]
    fn alloc_free_is_noop_on_space() -> Result<()> {
        let mut map = Freemap::new(Strategy::First);
        map.insert_free_record(0, 0, 1000);

        let extent = map.allocate(100, AllocOptions::default(), &mut no_grow())?;
        assert_eq!(extent, Extent { fileno: 0, offset: 0, size: 100 });

        map.free(extent)?;
        assert_eq!(map.free_bytes(), 1000);
        map.check_invariants()?;

        Ok(())
    }

    #[test]
    fn exact_allocation_consumes_entire_record() -> Result<()> {
        let mut map = Freemap::new(Strategy::First);
        map.insert_free_record(0, 0, 50);

        let extent = map.allocate(
            50,
            AllocOptions {
                exact: true,
                ..Default::default()
            },
            &mut no_grow(),
        )?;
        assert_eq!(extent.size, 50);
        assert_eq!(map.free_bytes(), 0);

        Ok(())
    }

    #[test]
    fn best_fit_picks_smallest_adequate_extent() -> Result<()> {
        // Scenario 4: extents of 10, 20, 40, 80 exist.
        let mut map = Freemap::new(Strategy::Best);
        map.insert_free_record(0, 0, 10);
        map.insert_free_record(0, 100, 20);
        map.insert_free_record(0, 200, 40);
        map.insert_free_record(0, 300, 80);

        let extent = map.allocate(
            15,
            AllocOptions {
                strategy: Some(Strategy::Best),
                exact: false,
                append: 0,
            },
            &mut no_grow(),
        )?;

        assert_eq!(extent, Extent { fileno: 0, offset: 100, size: 15 });
        assert_eq!(map.free_bytes(), 10 + 5 + 40 + 80);

        Ok(())
    }

    #[test]
    fn best_fit_exact_leaves_residue() -> Result<()> {
        let mut map = Freemap::new(Strategy::Best);
        map.insert_free_record(0, 0, 10);
        map.insert_free_record(0, 100, 20);
        map.insert_free_record(0, 200, 40);
        map.insert_free_record(0, 300, 80);

        let extent = map.allocate(
            15,
            AllocOptions {
                strategy: Some(Strategy::Best),
                exact: true,
                append: 0,
            },
            &mut no_grow(),
        )?;

        // EXACT means the whole size-20 record is handed back unchanged...
        assert_eq!(extent, Extent { fileno: 0, offset: 100, size: 20 });
        // ...no residue was split off.
        assert_eq!(map.free_bytes(), 10 + 40 + 80);

        Ok(())
    }

    #[test]
    fn loose_fit_absorbs_small_remainder_via_append_slack() -> Result<()> {
        let mut map = Freemap::new(Strategy::First);
        map.insert_free_record(0, 0, 103);

        let extent = map.allocate(
            100,
            AllocOptions {
                exact: false,
                append: 5,
                strategy: None,
            },
            &mut no_grow(),
        )?;

        assert_eq!(extent.size, 103);
        assert_eq!(map.waste, 3);
        assert_eq!(map.free_bytes(), 0);

        Ok(())
    }

    #[test]
    fn grows_file_set_when_nothing_fits() -> Result<()> {
        let mut map = Freemap::new(Strategy::First);
        let mut newfile = |fileno: u32| -> Result<u64> {
            assert_eq!(fileno, 0);
            Ok(1_000)
        };

        let extent = map.allocate(500, AllocOptions::default(), &mut newfile)?;
        assert_eq!(extent, Extent { fileno: 0, offset: 0, size: 500 });
        assert_eq!(map.file_count(), 1);

        Ok(())
    }

    #[test]
    fn allocate_at_location_splits_free_record() -> Result<()> {
        let mut map = Freemap::new(Strategy::First);
        map.insert_free_record(0, 0, 100);

        let extent = map.allocate_at(0, 40, 20, &mut no_grow())?;
        assert_eq!(extent, Extent { fileno: 0, offset: 40, size: 20 });
        assert_eq!(map.free_bytes(), 100 - 20);

        Ok(())
    }

    #[test]
    fn allocate_at_location_from_unused_tail() -> Result<()> {
        let mut map = Freemap::new(Strategy::First);
        let mut newfile = |_fileno: u32| -> Result<u64> { Ok(1_000) };

        let extent = map.allocate_at(0, 0, 30, &mut newfile)?;
        assert_eq!(extent, Extent { fileno: 0, offset: 0, size: 30 });

        let extent2 = map.allocate_at(0, 30, 10, &mut no_grow())?;
        assert_eq!(extent2, Extent { fileno: 0, offset: 30, size: 10 });

        Ok(())
    }

    #[test]
    fn coalesces_adjacent_free_extents() -> Result<()> {
        let mut map = Freemap::new(Strategy::First);
        map.insert_free_record(0, 0, 50);
        map.insert_free_record(0, 50, 50);

        map.check_invariants()?;
        assert_eq!(map.free_bytes(), 100);

        // A single allocation for the full 100 bytes proves they coalesced
        // into one record.
        let extent = map.allocate(
            100,
            AllocOptions {
                exact: true,
                ..Default::default()
            },
            &mut no_grow(),
        )?;
        assert_eq!(extent, Extent { fileno: 0, offset: 0, size: 100 });

        Ok(())
    }

    #[test]
    fn rejects_zero_size_allocation_and_free() {
        let mut map = Freemap::new(Strategy::First);
        assert!(matches!(
            map.allocate(0, AllocOptions::default(), &mut no_grow()),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            map.free(Extent { fileno: 0, offset: 0, size: 0 }),
            Err(Error::InvalidState(_))
        ));
    }
}
