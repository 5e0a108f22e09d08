// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Index façade (§2 data flow, §6 external interfaces, §7 error mapping).
//!
//! Ties the postings accumulator, pyramid scheduler, freemap, document map
//! and params file together behind one build surface (`IndexBuilder`) and
//! one read surface (`Index`). Individually each component only knows how
//! to do its own job; this module is the only place that owns an `FdPool`
//! and hands out the driver/allocator closures the lower layers expect.
//!
//! `IndexBuilder::finish` needs `driver`, `alloc_extent`, `alloc_page` and
//! `emit_page` alive at once, all mutating the same fd pool and freemap.
//! Rather than fight the borrow checker over four simultaneous `&mut`
//! borrows of `self`, the fd pool and freemap are moved into `RefCell`s for
//! the duration of that one call, and small scalars (the vector/vocab
//! cursor state) live in `Cell`s — the same pattern already used by the
//! `FakeDriver` test double in `pyramid.rs`.

use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::accumulator::{Accumulator, DocStats};
use crate::btree::PageLocation;
use crate::codec::{Decode, Encode};
use crate::config::Config;
use crate::docmap::{DocMap, DocMapStats, DocRecord};
use crate::error::{Error, Result};
use crate::fdpool::{FdPool, FileKind, Whence};
use crate::freemap::Freemap;
use crate::params::{Flags, ParamsFile, RepoEntry, StorageParams};
use crate::pyramid::{MergeDriver, Pyramid};

#[cfg(feature = "metrics")]
use crate::metrics::Metrics;
#[cfg(feature = "metrics")]
use std::sync::Arc;

const PARAMS_FILE_NAME: &str = "params";

/// Which stemming algorithm a caller configured, so the right params-file
/// flag bit gets set (§6's flags byte has three independent stemmer bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StemmerFlavor {
    Porters,
    Eds,
    Light,
}

struct PendingDoc {
    repos_id: u32,
    byte_offset: u64,
    byte_length: u64,
    compressed: bool,
    aux_id: String,
    mime_type: String,
}

/// Outcome of a completed build, mirroring the fields a caller would want
/// to compare against a freshly opened [`Index`]'s `stats()` (§8's
/// round-trip property).
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub documents: u64,
    pub distinct_terms: usize,
    pub total_occurs: u128,
    pub vector_files: u32,
    pub vocab_files: u32,
    pub root: PageLocation,
}

/// Drives run-file creation/reading for [`Pyramid::add`]. Each in-build
/// dump goes through here; the fd pool, the running next-fileno counter,
/// and per-run read cursors are disjoint fields of the builder, so this
/// can borrow them directly without interior mutability.
struct RunDriver<'a> {
    fdpool: &'a mut FdPool,
    next_fileno: &'a mut u32,
    cursors: &'a mut FxHashMap<u32, u64>,
}

impl MergeDriver for RunDriver<'_> {
    fn read_chunk(&mut self, fileno: u32, want: usize) -> Result<Vec<u8>> {
        let cursor = *self.cursors.entry(fileno).or_insert(0);
        let handle = self.fdpool.pin(FileKind::Run, fileno, Whence::Start(cursor))?;
        let mut buf = Vec::new();
        let read = handle.with_file(|f| f.take(want as u64).read_to_end(&mut buf))?;
        self.cursors.insert(fileno, cursor + read as u64);
        Ok(buf)
    }

    fn new_file(&mut self) -> Result<u32> {
        let fileno = *self.next_fileno;
        self.fdpool.create(FileKind::Run, fileno)?;
        *self.next_fileno += 1;
        self.cursors.insert(fileno, 0);
        Ok(fileno)
    }

    fn write_chunk(&mut self, fileno: u32, bytes: &[u8]) -> Result<()> {
        let handle = self.fdpool.pin(FileKind::Run, fileno, Whence::End)?;
        handle.with_file(|f| f.write_all(bytes))
    }

    fn unlink(&mut self, fileno: u32) -> Result<()> {
        self.fdpool.unlink(FileKind::Run, fileno);
        self.cursors.remove(&fileno);
        Ok(())
    }
}

/// Drives the final merge: reads the last remaining run files and writes
/// the packed vector-file output. Shares its fd pool and run cursors with
/// the `alloc_extent` closure via `RefCell`, since both are alive for the
/// whole `Pyramid::finish` call.
struct FinalDriver<'a> {
    fdpool: &'a RefCell<FdPool>,
    run_cursors: &'a RefCell<FxHashMap<u32, u64>>,
    current_vector_fileno: &'a Cell<u32>,
    current_vector_offset: &'a Cell<u64>,
    is_first_vector_file: &'a Cell<bool>,
}

impl MergeDriver for FinalDriver<'_> {
    fn read_chunk(&mut self, fileno: u32, want: usize) -> Result<Vec<u8>> {
        let cursor = {
            let mut cursors = self.run_cursors.borrow_mut();
            *cursors.entry(fileno).or_insert(0)
        };
        let handle = self.fdpool.borrow_mut().pin(FileKind::Run, fileno, Whence::Start(cursor))?;
        let mut buf = Vec::new();
        let read = handle.with_file(|f| f.take(want as u64).read_to_end(&mut buf))?;
        self.run_cursors.borrow_mut().insert(fileno, cursor + read as u64);
        Ok(buf)
    }

    /// The very first vector file is created lazily by `alloc_extent`
    /// (called once, inside `step`, before any output exists to write).
    /// Every later call is a genuine rotation: the old file is full, so
    /// this just advances the cursor state; the new file itself is
    /// created lazily by the next `alloc_extent` call.
    fn new_file(&mut self) -> Result<u32> {
        if self.is_first_vector_file.get() {
            self.is_first_vector_file.set(false);
            Ok(self.current_vector_fileno.get())
        } else {
            let next = self.current_vector_fileno.get() + 1;
            self.current_vector_fileno.set(next);
            self.current_vector_offset.set(0);
            Ok(next)
        }
    }

    fn write_chunk(&mut self, fileno: u32, bytes: &[u8]) -> Result<()> {
        let handle = self.fdpool.borrow_mut().pin(FileKind::Vector, fileno, Whence::End)?;
        handle.with_file(|f| f.write_all(bytes))
    }

    fn unlink(&mut self, fileno: u32) -> Result<()> {
        self.fdpool.borrow_mut().unlink(FileKind::Run, fileno);
        self.run_cursors.borrow_mut().remove(&fileno);
        Ok(())
    }
}

/// Builds a fresh index from scratch: parse, accumulate, dump, merge.
pub struct IndexBuilder {
    dir: PathBuf,
    config: Config,
    fdpool: FdPool,
    accumulator: Accumulator,
    pyramid: Pyramid,
    freemap: Freemap,
    docmap: DocMap<File>,
    next_run_fileno: u32,
    run_cursors: FxHashMap<u32, u64>,
    docno: u64,
    package_name: String,
    flags: Flags,
    repos_entries: Vec<RepoEntry>,
    pending_doc: Option<PendingDoc>,
    #[cfg(feature = "metrics")]
    metrics: Arc<Metrics>,
}

impl IndexBuilder {
    /// Creates a fresh build rooted at `dir`, which must already exist.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors opening the document map file.
    pub fn create<P: Into<PathBuf>>(dir: P, config: Config, package_name: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        log::debug!("creating index build at {dir:?}");
        #[cfg(feature = "metrics")]
        let metrics = Arc::new(Metrics::default());
        let fdpool = FdPool::new(dir.clone(), config.fd_limit);
        #[cfg(feature = "metrics")]
        let fdpool = fdpool.with_metrics(metrics.clone());
        let docmap_path = fdpool.name(FileKind::DocMap, 0);
        let docmap_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&docmap_path)?;

        Ok(Self {
            accumulator: Accumulator::new(config.tablesize),
            pyramid: Pyramid::new(config.pyramid_width, config.parsebuf, config.max_filesize),
            freemap: Freemap::new(config.freemap_strategy),
            docmap: DocMap::new(docmap_file),
            fdpool,
            config,
            dir,
            next_run_fileno: 0,
            run_cursors: FxHashMap::default(),
            docno: 0,
            package_name: package_name.into(),
            flags: Flags::default(),
            repos_entries: Vec::new(),
            pending_doc: None,
            #[cfg(feature = "metrics")]
            metrics,
        })
    }

    /// Runtime counters for this build (fd cache efficiency, dump/merge
    /// counts). Only available with the `metrics` feature.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub fn with_stoplist(mut self, stoplist: FxHashSet<Vec<u8>>) -> Self {
        self.accumulator = self.accumulator.with_stoplist(stoplist);
        self
    }

    #[must_use]
    pub fn with_stemmer(mut self, stemmer: Box<dyn Fn(&[u8]) -> Vec<u8>>, flavor: StemmerFlavor) -> Self {
        match flavor {
            StemmerFlavor::Porters => self.flags.stemmed_porters = true,
            StemmerFlavor::Eds => self.flags.stemmed_eds = true,
            StemmerFlavor::Light => self.flags.stemmed_light = true,
        }
        self.accumulator = self.accumulator.with_stemmer(stemmer);
        self
    }

    /// Registers a repository (source collection file) by id, to be
    /// recorded in the params file's trailing repository table.
    pub fn add_repo(&mut self, repos_id: u32, path: impl Into<String>) {
        self.repos_entries.push(RepoEntry {
            repos_id,
            path: path.into(),
        });
        self.flags.source = true;
    }

    /// Starts a new in-flight document, returning its assigned docno.
    /// Follow with one or more `add_word` calls, then `commit_doc`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if a document is already in flight.
    pub fn add_doc(
        &mut self,
        repos_id: u32,
        byte_offset: u64,
        byte_length: u64,
        compressed: bool,
        aux_id: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Result<u64> {
        self.accumulator.add_doc(self.docno)?;
        self.pending_doc = Some(PendingDoc {
            repos_id,
            byte_offset,
            byte_length,
            compressed,
            aux_id: aux_id.into(),
            mime_type: mime_type.into(),
        });
        Ok(self.docno)
    }

    /// Records one occurrence of `term` at `wordno` in the in-flight
    /// document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no document is in flight.
    pub fn add_word(&mut self, term: &[u8], wordno: u64) -> Result<()> {
        self.accumulator.add_word(term, wordno)
    }

    /// Folds the in-flight document into the accumulator and the document
    /// map, dumping a sorted run first if the accumulator has grown past
    /// the configured memory threshold.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no document is in flight, or propagates
    /// I/O or merge errors from a triggered dump.
    pub fn commit_doc(&mut self) -> Result<DocStats> {
        let pending = self
            .pending_doc
            .take()
            .ok_or(Error::InvalidState("commit_doc called with no document in flight"))?;

        let stats = self.accumulator.update()?;

        let record = DocRecord {
            repos_id: pending.repos_id,
            byte_offset: pending.byte_offset,
            byte_length: pending.byte_length,
            compressed: pending.compressed,
            terms: stats.terms,
            distinct: stats.distinct,
            weight: stats.weight,
            aux_id: pending.aux_id,
            mime_type: pending.mime_type,
        };
        let assigned = self.docmap.append(&record)?;
        debug_assert_eq!(assigned, self.docno, "docmap and accumulator docnos must stay in lockstep");
        self.docno += 1;

        if self.accumulator.memsize() >= self.config.memory {
            self.flush_accumulator()?;
        }

        Ok(stats)
    }

    /// Dumps the accumulator's current contents as a sorted run and feeds
    /// it to the pyramid. A no-op if nothing is accumulated.
    ///
    /// # Errors
    ///
    /// Propagates I/O or merge errors.
    fn flush_accumulator(&mut self) -> Result<()> {
        if self.accumulator.is_empty() {
            return Ok(());
        }

        let bytes = self.accumulator.dump()?;
        let fileno = self.next_run_fileno;
        self.next_run_fileno += 1;
        log::trace!("dumping accumulator to run {fileno} ({} bytes)", bytes.len());
        #[cfg(feature = "metrics")]
        self.metrics.record_accumulator_dump();

        let handle = self.fdpool.create(FileKind::Run, fileno)?;
        handle.with_file(|f| f.write_all(&bytes))?;
        self.run_cursors.insert(fileno, 0);

        let mut driver = RunDriver {
            fdpool: &mut self.fdpool,
            next_fileno: &mut self.next_run_fileno,
            cursors: &mut self.run_cursors,
        };
        let merges = self.pyramid.add(fileno, 0, false, &mut driver)?;
        #[cfg(feature = "metrics")]
        for _ in 0..merges {
            self.metrics.record_partial_merge();
        }
        #[cfg(not(feature = "metrics"))]
        let _ = merges;

        Ok(())
    }

    /// Flushes any remaining accumulator contents, runs the final merge,
    /// and writes the params file. Consumes the builder — a build happens
    /// exactly once (§5's "writers are single-threaded and serialized by
    /// commit").
    ///
    /// # Errors
    ///
    /// Propagates I/O, merge, allocation, or B-tree errors.
    pub fn finish(mut self) -> Result<IndexStats> {
        log::info!("starting final merge at {:?}", self.dir);
        self.flush_accumulator()?;

        let fdpool = RefCell::new(self.fdpool);
        let freemap = RefCell::new(self.freemap);
        let run_cursors = RefCell::new(self.run_cursors);

        let current_vector_fileno = Cell::new(0u32);
        let current_vector_offset = Cell::new(0u64);
        let is_first_vector_file = Cell::new(true);

        let vocab_file_open = Cell::new(false);
        let current_vocab_fileno = Cell::new(0u32);
        let current_vocab_offset = Cell::new(0u64);

        let max_filesize = self.config.max_filesize;
        let pagesize = self.config.pagesize as usize;

        let mut driver = FinalDriver {
            fdpool: &fdpool,
            run_cursors: &run_cursors,
            current_vector_fileno: &current_vector_fileno,
            current_vector_offset: &current_vector_offset,
            is_first_vector_file: &is_first_vector_file,
        };

        // Placed via `allocate_at` at an exactly known, monotonically
        // advancing (fileno, offset): a fresh build never frees anything
        // mid-pass, and the output stream only ever appends to the
        // current vector file, so there is never a reason to let the
        // freemap's general best/worst/close search reconsider an older
        // file's already-abandoned tail.
        let mut alloc_extent = |size: u64| -> Result<(u32, u64)> {
            let fileno = current_vector_fileno.get();
            let offset = current_vector_offset.get();
            let extent = freemap.borrow_mut().allocate_at(fileno, offset, size, &mut |_count| {
                fdpool.borrow_mut().create(FileKind::Vector, fileno)?;
                Ok(max_filesize)
            })?;
            current_vector_offset.set(offset + size);
            Ok((extent.fileno, extent.offset))
        };

        let mut alloc_page = || -> Result<PageLocation> {
            let need_new_file = !vocab_file_open.get()
                || current_vocab_offset.get() + pagesize as u64 > max_filesize;

            if need_new_file {
                if vocab_file_open.get() {
                    current_vocab_fileno.set(current_vocab_fileno.get() + 1);
                }
                fdpool.borrow_mut().create(FileKind::Vocab, current_vocab_fileno.get())?;
                current_vocab_offset.set(0);
                vocab_file_open.set(true);
            }

            let loc = PageLocation {
                fileno: current_vocab_fileno.get(),
                offset: current_vocab_offset.get(),
            };
            current_vocab_offset.set(loc.offset + pagesize as u64);
            Ok(loc)
        };

        let mut emit_page = |loc: PageLocation, bytes: &[u8]| -> Result<()> {
            let handle = fdpool.borrow_mut().pin(FileKind::Vocab, loc.fileno, Whence::Start(loc.offset))?;
            handle.with_file(|f| f.write_all(bytes))
        };

        let outcome = self.pyramid.finish(
            &mut driver,
            self.config.vocab_lsize,
            pagesize,
            &mut alloc_extent,
            &mut alloc_page,
            &mut emit_page,
        )?;

        self.fdpool = fdpool.into_inner();
        self.freemap = freemap.into_inner();
        self.run_cursors = run_cursors.into_inner();

        let vector_files = if is_first_vector_file.get() {
            0
        } else {
            current_vector_fileno.get() + 1
        };
        let vocab_files = if vocab_file_open.get() {
            current_vocab_fileno.get() + 1
        } else {
            0
        };

        self.flags.built = true;
        self.flags.sorted = true;

        let docmap_stats = self.docmap.stats();
        let total_occurs = outcome.total_occurs.min(u128::from(u64::MAX)) as u64;

        let mut params = ParamsFile {
            package_name: self.package_name.clone(),
            flags: self.flags,
            repos: self.repos_entries.len() as u32,
            vectors: vector_files,
            vocabs: vocab_files,
            repos_pos: 0,
            terms_high: (total_occurs >> 32) as u32,
            terms_low: total_occurs as u32,
            updates: 0,
            avg_weight: docmap_stats.avg_weight,
            avg_length: docmap_stats.avg_words,
            avg_f_t: average_term_frequency(outcome.total_occurs, outcome.distinct_terms),
            slope: 0.0,
            quant_bits: 0,
            w_qt_min: 0.0,
            w_qt_max: 0.0,
            doc_order_vectors: 0,
            doc_order_word_pos_vectors: 0,
            impact_vectors: 0,
            root_fileno: outcome.root.fileno,
            root_offset: outcome.root.offset as u32,
            terms: outcome.distinct_terms as u32,
            storage: StorageParams {
                pagesize: self.config.pagesize,
                max_filesize: self.config.max_filesize as u32,
                vocab_lsize: self.config.vocab_lsize as u32,
                file_lsize: 0,
                max_termlen: 256,
                btleaf_strategy: 0,
                btnode_strategy: 0,
                bigendian: cfg!(target_endian = "big"),
            },
            config: Vec::new(),
            repos_entries: Vec::new(),
        };

        // `repos_pos` names the header length preceding the repository
        // table; measure it with a placeholder pass before writing the
        // real file with the repository entries attached.
        let header_len = params.encode_into_vec().len();
        params.repos_pos = header_len as u32;
        params.repos_entries = self.repos_entries.clone();

        let bytes = params.encode_into_vec();
        let mut params_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.dir.join(PARAMS_FILE_NAME))?;
        params_file.write_all(&bytes)?;
        log::info!(
            "finished build: {} documents, {} distinct terms, {vector_files} vector files, {vocab_files} vocab files",
            docmap_stats.documents,
            outcome.distinct_terms
        );

        Ok(IndexStats {
            documents: docmap_stats.documents,
            distinct_terms: outcome.distinct_terms,
            total_occurs: outcome.total_occurs,
            vector_files,
            vocab_files,
            root: outcome.root,
        })
    }
}

fn average_term_frequency(total_occurs: u128, distinct_terms: usize) -> f64 {
    if distinct_terms == 0 {
        0.0
    } else {
        total_occurs as f64 / distinct_terms as f64
    }
}

/// Read-only view of a completed index: the params file plus the document
/// map. Vocabulary lookup and scoring are out of scope (§1's non-goals);
/// this exists so a caller can confirm a build round-tripped and fetch a
/// document's bookkeeping record.
pub struct Index {
    params: ParamsFile,
    docmap: DocMap<File>,
}

impl Index {
    /// Opens a previously finished build.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors, or `Corrupt` if the params file is missing
    /// its magic or carries an unsupported format version.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        log::debug!("opening index at {dir:?}");

        let mut params_file = File::open(dir.join(PARAMS_FILE_NAME))?;
        let params = ParamsFile::decode_from(&mut params_file)?;

        let fdpool = FdPool::new(dir, 1);
        let docmap_path = fdpool.name(FileKind::DocMap, 0);
        let docmap_file = OpenOptions::new().read(true).write(true).open(&docmap_path)?;
        let file_len = docmap_file.metadata()?.len();
        let records = file_len / crate::docmap::STRIDE as u64;
        let docmap = DocMap::reopen(docmap_file, records)?;

        Ok(Self { params, docmap })
    }

    #[must_use]
    pub fn params(&self) -> &ParamsFile {
        &self.params
    }

    #[must_use]
    pub fn stats(&self) -> DocMapStats {
        self.docmap.stats()
    }

    /// Fetches a document's bookkeeping record by docno.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `docno` is out of range.
    pub fn fetch_doc(&mut self, docno: u64) -> Result<DocRecord> {
        self.docmap.fetch(docno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn small_config() -> Config {
        Config::new()
            .with_tablesize(16)
            .with_memory(usize::MAX) // never dump mid-build in these tests
            .with_max_filesize(4096)
            .with_pagesize(256)
            .with_vocab_lsize(8) // force extents so vector files get exercised
            .with_pyramid_width(2)
            .with_fd_limit(16)
    }

    #[test]
    fn builds_a_tiny_single_document_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut builder = IndexBuilder::create(dir.path(), small_config(), "ifcore-test")?;
        builder.add_repo(0, "docs.trecweb");

        let docno = builder.add_doc(0, 0, 100, false, "WT01-B01-1", "text/plain")?;
        assert_eq!(docno, 0);
        builder.add_word(b"cat", 0)?;
        builder.add_word(b"sat", 1)?;
        builder.add_word(b"mat", 2)?;
        let stats = builder.commit_doc()?;
        assert_eq!(stats.distinct, 3);
        assert_eq!(stats.terms, 3);

        let outcome = builder.finish()?;
        assert_eq!(outcome.documents, 1);
        assert_eq!(outcome.distinct_terms, 3);
        assert_eq!(outcome.total_occurs, 3);

        let mut index = Index::open(dir.path())?;
        assert_eq!(index.params().terms, 3);
        assert_eq!(index.params().repos_entries.len(), 1);
        assert_eq!(index.stats().documents, 1);

        let record = index.fetch_doc(0)?;
        assert_eq!(record.repos_id, 0);
        assert_eq!(record.aux_id, "WT01-B01-1");
        assert_eq!(record.terms, 3);

        Ok(())
    }

    #[test]
    fn multiple_documents_and_a_dump_still_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // A tiny memory threshold forces at least one mid-build dump.
        let config = small_config().with_memory(1);
        let mut builder = IndexBuilder::create(dir.path(), config, "ifcore-test")?;

        for doc in 0..5u64 {
            builder.add_doc(0, doc * 100, 100, false, format!("doc-{doc}"), "text/plain")?;
            builder.add_word(b"common", 0)?;
            builder.add_word(format!("unique{doc}").as_bytes(), 1)?;
            builder.commit_doc()?;
        }

        let outcome = builder.finish()?;
        assert_eq!(outcome.documents, 5);
        // "common" plus five distinct "uniqueN" terms.
        assert_eq!(outcome.distinct_terms, 6);
        assert_eq!(outcome.total_occurs, 10);

        let mut index = Index::open(dir.path())?;
        assert_eq!(index.stats().documents, 5);
        for doc in 0..5u64 {
            let record = index.fetch_doc(doc)?;
            assert_eq!(record.aux_id, format!("doc-{doc}"));
        }

        Ok(())
    }

    #[test]
    fn commit_doc_without_add_doc_is_invalid_state() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut builder = IndexBuilder::create(dir.path(), small_config(), "ifcore-test")?;
        let err = builder.commit_doc().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        Ok(())
    }
}
