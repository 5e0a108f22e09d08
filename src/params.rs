// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Superblock / params file (§6).
//!
//! All fixed-width fields are big-endian. Doubles are not serialized as
//! IEEE 754 bit patterns; they are split into a 32-bit scaled mantissa
//! and a 32-bit exponent (`encode_double`/`decode_double`, an `ldexp`
//! pair), which keeps the format independent of the host's native
//! double representation at the cost of some precision — acceptable
//! here since every double in this file is a diagnostic summary
//! statistic, never re-derived into index behavior.
//!
//! Two details the on-disk layout leaves implicit were resolved by
//! picking the simplest consistent reading (see `DESIGN.md`): the
//! "2-byte magic `1D 78` + package-name" header is read as a 2-byte magic
//! followed by a length-prefixed ASCII string; repository filenames are
//! also length-prefixed ASCII rather than a fixed width, since the
//! format says to read them "until EOF".

use crate::codec::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAGIC: [u8; 2] = [0x1D, 0x78];

/// Format version written to every params file this crate produces.
/// Chosen by the source format this is modeled on; kept as a literal
/// constant rather than derived from anything, since it identifies the
/// wire format, not this crate's own version.
pub const FORMAT_VERSION: u32 = 0x3141_592e;

const FLAG_STEMMED_PORTERS: u8 = 1 << 0;
const FLAG_STEMMED_EDS: u8 = 1 << 1;
const FLAG_STEMMED_LIGHT: u8 = 1 << 2;
const FLAG_BUILT: u8 = 1 << 3;
const FLAG_SORTED: u8 = 1 << 4;
const FLAG_SOURCE: u8 = 1 << 5;

/// Build-state and stemming-policy bitflags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub stemmed_porters: bool,
    pub stemmed_eds: bool,
    pub stemmed_light: bool,
    pub built: bool,
    pub sorted: bool,
    pub source: bool,
}

impl Flags {
    fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.stemmed_porters {
            byte |= FLAG_STEMMED_PORTERS;
        }
        if self.stemmed_eds {
            byte |= FLAG_STEMMED_EDS;
        }
        if self.stemmed_light {
            byte |= FLAG_STEMMED_LIGHT;
        }
        if self.built {
            byte |= FLAG_BUILT;
        }
        if self.sorted {
            byte |= FLAG_SORTED;
        }
        if self.source {
            byte |= FLAG_SOURCE;
        }
        byte
    }

    fn from_byte(byte: u8) -> Self {
        Self {
            stemmed_porters: byte & FLAG_STEMMED_PORTERS != 0,
            stemmed_eds: byte & FLAG_STEMMED_EDS != 0,
            stemmed_light: byte & FLAG_STEMMED_LIGHT != 0,
            built: byte & FLAG_BUILT != 0,
            sorted: byte & FLAG_SORTED != 0,
            source: byte & FLAG_SOURCE != 0,
        }
    }
}

/// Splits `value` into a 32-bit scaled mantissa and exponent (`ldexp`
/// pair): `value ≈ (mantissa as i32 / 2^31) * 2^exponent`.
#[must_use]
pub fn encode_double(value: f64) -> (u32, u32) {
    if value == 0.0 || !value.is_finite() {
        return (0, 0);
    }

    let (mantissa, exponent) = frexp(value);
    let scaled = (mantissa * 2_147_483_648.0).round().clamp(
        f64::from(i32::MIN),
        f64::from(i32::MAX),
    ) as i32;
    (scaled as u32, exponent as u32)
}

/// Inverse of [`encode_double`].
#[must_use]
pub fn decode_double(mantissa: u32, exponent: u32) -> f64 {
    if mantissa == 0 && exponent == 0 {
        return 0.0;
    }
    let scaled = mantissa as i32 as f64 / 2_147_483_648.0;
    scaled * 2f64.powi(exponent as i32)
}

/// Decomposes `value` into a mantissa in `[0.5, 1.0)` (or its negation)
/// and a power-of-two exponent, i.e. `value == mantissa * 2^exponent`.
fn frexp(value: f64) -> (f64, i32) {
    if value == 0.0 || !value.is_finite() {
        return (value, 0);
    }

    let bits = value.to_bits();
    let raw_exponent = ((bits >> 52) & 0x7ff) as i32;
    if raw_exponent == 0 {
        // Subnormal. Diagnostic statistics never reach this range in
        // practice; treat as zero rather than renormalizing by hand.
        return (0.0, 0);
    }

    let exponent = raw_exponent - 1022;
    let mantissa_bits = (bits & !(0x7ffu64 << 52)) | (1022u64 << 52);
    (f64::from_bits(mantissa_bits), exponent)
}

/// Tunables baked into the params file so a reader can interpret the
/// rest of the index without being told them out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageParams {
    pub pagesize: u32,
    pub max_filesize: u32,
    pub vocab_lsize: u32,
    pub file_lsize: u32,
    pub max_termlen: u32,
    pub btleaf_strategy: u32,
    pub btnode_strategy: u32,
    pub bigendian: bool,
}

impl Encode for StorageParams {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<BigEndian>(self.pagesize)?;
        writer.write_u32::<BigEndian>(self.max_filesize)?;
        writer.write_u32::<BigEndian>(self.vocab_lsize)?;
        writer.write_u32::<BigEndian>(self.file_lsize)?;
        writer.write_u32::<BigEndian>(self.max_termlen)?;
        writer.write_u32::<BigEndian>(self.btleaf_strategy)?;
        writer.write_u32::<BigEndian>(self.btnode_strategy)?;
        writer.write_u8(u8::from(self.bigendian))?;
        Ok(())
    }
}

impl Decode for StorageParams {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            pagesize: reader.read_u32::<BigEndian>()?,
            max_filesize: reader.read_u32::<BigEndian>()?,
            vocab_lsize: reader.read_u32::<BigEndian>()?,
            file_lsize: reader.read_u32::<BigEndian>()?,
            max_termlen: reader.read_u32::<BigEndian>()?,
            btleaf_strategy: reader.read_u32::<BigEndian>()?,
            btnode_strategy: reader.read_u32::<BigEndian>()?,
            bigendian: reader.read_u8()? != 0,
        })
    }
}

/// One repository's mapping entry at the end of the params file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    pub repos_id: u32,
    pub path: String,
}

/// Full contents of the superblock/params file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsFile {
    pub package_name: String,
    pub flags: Flags,
    pub repos: u32,
    pub vectors: u32,
    pub vocabs: u32,
    pub repos_pos: u32,
    pub terms_high: u32,
    pub terms_low: u32,
    pub updates: u32,
    pub avg_weight: f64,
    pub avg_length: f64,
    pub avg_f_t: f64,
    pub slope: f64,
    pub quant_bits: u32,
    pub w_qt_min: f64,
    pub w_qt_max: f64,
    pub doc_order_vectors: u32,
    pub doc_order_word_pos_vectors: u32,
    pub impact_vectors: u32,
    pub root_fileno: u32,
    pub root_offset: u32,
    pub terms: u32,
    pub storage: StorageParams,
    pub config: Vec<u8>,
    pub repos_entries: Vec<RepoEntry>,
}

fn write_double<W: Write>(writer: &mut W, value: f64) -> Result<(), EncodeError> {
    let (mantissa, exponent) = encode_double(value);
    writer.write_u32::<BigEndian>(mantissa)?;
    writer.write_u32::<BigEndian>(exponent)?;
    Ok(())
}

fn read_double<R: Read>(reader: &mut R) -> Result<f64, DecodeError> {
    let mantissa = reader.read_u32::<BigEndian>()?;
    let exponent = reader.read_u32::<BigEndian>()?;
    Ok(decode_double(mantissa, exponent))
}

impl Encode for ParamsFile {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&MAGIC)?;
        let name_bytes = self.package_name.as_bytes();
        writer.write_u8(name_bytes.len() as u8)?;
        writer.write_all(name_bytes)?;

        writer.write_u32::<BigEndian>(FORMAT_VERSION)?;
        writer.write_u8(self.flags.to_byte())?;
        writer.write_u32::<BigEndian>(self.repos)?;
        writer.write_u32::<BigEndian>(self.vectors)?;
        writer.write_u32::<BigEndian>(self.vocabs)?;
        writer.write_u32::<BigEndian>(self.repos_pos)?;
        writer.write_u32::<BigEndian>(self.terms_high)?;
        writer.write_u32::<BigEndian>(self.terms_low)?;
        writer.write_u32::<BigEndian>(self.updates)?;

        write_double(writer, self.avg_weight)?;
        write_double(writer, self.avg_length)?;
        write_double(writer, self.avg_f_t)?;
        write_double(writer, self.slope)?;

        writer.write_u32::<BigEndian>(self.quant_bits)?;
        write_double(writer, self.w_qt_min)?;
        write_double(writer, self.w_qt_max)?;

        writer.write_u32::<BigEndian>(self.doc_order_vectors)?;
        writer.write_u32::<BigEndian>(self.doc_order_word_pos_vectors)?;
        writer.write_u32::<BigEndian>(self.impact_vectors)?;

        writer.write_u32::<BigEndian>(self.root_fileno)?;
        writer.write_u32::<BigEndian>(self.root_offset)?;
        writer.write_u32::<BigEndian>(self.terms)?;

        self.storage.encode_into(writer)?;

        writer.write_u32::<BigEndian>(self.config.len() as u32)?;
        writer.write_all(&self.config)?;

        for entry in &self.repos_entries {
            writer.write_u32::<BigEndian>(entry.repos_id)?;
            let path_bytes = entry.path.as_bytes();
            writer.write_u32::<BigEndian>(path_bytes.len() as u32)?;
            writer.write_all(path_bytes)?;
        }

        Ok(())
    }
}

impl Decode for ParamsFile {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; 2];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(DecodeError::Malformed("params file magic mismatch"));
        }

        let name_len = reader.read_u8()? as usize;
        let mut name_bytes = vec![0u8; name_len];
        reader.read_exact(&mut name_bytes)?;
        let package_name = String::from_utf8(name_bytes)
            .map_err(|_| DecodeError::Malformed("package name is not valid UTF-8"))?;

        let format_version = reader.read_u32::<BigEndian>()?;
        if format_version != FORMAT_VERSION {
            return Err(DecodeError::Malformed("unsupported params file format version"));
        }

        let flags = Flags::from_byte(reader.read_u8()?);
        let repos = reader.read_u32::<BigEndian>()?;
        let vectors = reader.read_u32::<BigEndian>()?;
        let vocabs = reader.read_u32::<BigEndian>()?;
        let repos_pos = reader.read_u32::<BigEndian>()?;
        let terms_high = reader.read_u32::<BigEndian>()?;
        let terms_low = reader.read_u32::<BigEndian>()?;
        let updates = reader.read_u32::<BigEndian>()?;

        let avg_weight = read_double(reader)?;
        let avg_length = read_double(reader)?;
        let avg_f_t = read_double(reader)?;
        let slope = read_double(reader)?;

        let quant_bits = reader.read_u32::<BigEndian>()?;
        let w_qt_min = read_double(reader)?;
        let w_qt_max = read_double(reader)?;

        let doc_order_vectors = reader.read_u32::<BigEndian>()?;
        let doc_order_word_pos_vectors = reader.read_u32::<BigEndian>()?;
        let impact_vectors = reader.read_u32::<BigEndian>()?;

        let root_fileno = reader.read_u32::<BigEndian>()?;
        let root_offset = reader.read_u32::<BigEndian>()?;
        let terms = reader.read_u32::<BigEndian>()?;

        let storage = StorageParams::decode_from(reader)?;

        let config_len = reader.read_u32::<BigEndian>()? as usize;
        let mut config = vec![0u8; config_len];
        reader.read_exact(&mut config)?;

        let mut repos_entries = Vec::new();
        loop {
            let repos_id = match reader.read_u32::<BigEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let path_len = reader.read_u32::<BigEndian>()? as usize;
            let mut path_bytes = vec![0u8; path_len];
            reader.read_exact(&mut path_bytes)?;
            let path = String::from_utf8(path_bytes)
                .map_err(|_| DecodeError::Malformed("repository path is not valid UTF-8"))?;
            repos_entries.push(RepoEntry { repos_id, path });
        }

        Ok(Self {
            package_name,
            flags,
            repos,
            vectors,
            vocabs,
            repos_pos,
            terms_high,
            terms_low,
            updates,
            avg_weight,
            avg_length,
            avg_f_t,
            slope,
            quant_bits,
            w_qt_min,
            w_qt_max,
            doc_order_vectors,
            doc_order_word_pos_vectors,
            impact_vectors,
            root_fileno,
            root_offset,
            terms,
            storage,
            config,
            repos_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn sample() -> ParamsFile {
        ParamsFile {
            package_name: "ifcore".to_string(),
            flags: Flags {
                stemmed_porters: true,
                built: true,
                sorted: true,
                ..Flags::default()
            },
            repos: 1,
            vectors: 2,
            vocabs: 1,
            repos_pos: 0,
            terms_high: 0,
            terms_low: 12345,
            updates: 0,
            avg_weight: 3.5,
            avg_length: 120.25,
            avg_f_t: 1.75,
            slope: 0.02,
            quant_bits: 8,
            w_qt_min: 0.1,
            w_qt_max: 9.9,
            doc_order_vectors: 0,
            doc_order_word_pos_vectors: 0,
            impact_vectors: 0,
            root_fileno: 3,
            root_offset: 4096,
            terms: 50_000,
            storage: StorageParams {
                pagesize: 8192,
                max_filesize: 2 * 1024 * 1024 * 1024,
                vocab_lsize: 256,
                file_lsize: 0,
                max_termlen: 256,
                btleaf_strategy: 0,
                btnode_strategy: 0,
                bigendian: true,
            },
            config: vec![1, 2, 3],
            repos_entries: vec![
                RepoEntry {
                    repos_id: 0,
                    path: "docs.trecweb".to_string(),
                },
                RepoEntry {
                    repos_id: 1,
                    path: "docs2.trecweb".to_string(),
                },
            ],
        }
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let original = sample();
        let bytes = original.encode_into_vec();
        let decoded = ParamsFile::decode_from(&mut &bytes[..]).expect("decode");

        assert_eq!(decoded.package_name, original.package_name);
        assert_eq!(decoded.flags, original.flags);
        assert_eq!(decoded.root_fileno, original.root_fileno);
        assert_eq!(decoded.storage, original.storage);
        assert_eq!(decoded.repos_entries, original.repos_entries);
        assert!((decoded.avg_weight - original.avg_weight).abs() < 1e-6);
        assert!((decoded.slope - original.slope).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().encode_into_vec();
        bytes[0] = 0x00;
        let err = ParamsFile::decode_from(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn double_roundtrip_is_approximately_identity() {
        for value in [0.0, 1.0, -1.0, 3.5, 0.02, 123_456.789, -0.000_01] {
            let (mantissa, exponent) = encode_double(value);
            let decoded = decode_double(mantissa, exponent);
            assert!((decoded - value).abs() < value.abs() * 1e-6 + 1e-9);
        }
    }
}
