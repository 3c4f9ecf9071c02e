//! On-disk binary file headers (component §6).
//!
//! Every persisted file begins with an 8-byte magic-1, a file-type
//! discriminant, per-type fields, and an 8-byte magic-2 placed at the *end*
//! of the header so truncation or format drift is detectable without
//! scanning the payload.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::KmtricksError;

const MAGIC1: [u8; 8] = *b"KMTRICKS";
const MAGIC2: [u8; 8] = *b"SKCIRTMK";

/// Discriminant identifying which of the header shapes below follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    Kmer = 0,
    CountMatrix = 1,
    PaMatrix = 2,
    BitVector = 3,
    BitMatrix = 4,
    Hist = 5,
}

impl FileType {
    const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Kmer),
            1 => Some(Self::CountMatrix),
            2 => Some(Self::PaMatrix),
            3 => Some(Self::BitVector),
            4 => Some(Self::BitMatrix),
            5 => Some(Self::Hist),
            _ => None,
        }
    }
}

struct HeaderWriter<'a, W: Write> {
    w: &'a mut W,
    path: &'a Path,
}

impl<'a, W: Write> HeaderWriter<'a, W> {
    fn start(w: &'a mut W, path: &'a Path, ty: FileType) -> Result<Self, KmtricksError> {
        w.write_all(&MAGIC1).map_err(|e| KmtricksError::io(e, path))?;
        w.write_all(&[ty as u8]).map_err(|e| KmtricksError::io(e, path))?;
        Ok(Self { w, path })
    }

    fn u8(&mut self, v: u8) -> Result<(), KmtricksError> {
        self.w
            .write_all(&[v])
            .map_err(|e| KmtricksError::io(e, self.path))
    }

    fn u16(&mut self, v: u16) -> Result<(), KmtricksError> {
        self.w
            .write_all(&v.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, self.path))
    }

    fn u32(&mut self, v: u32) -> Result<(), KmtricksError> {
        self.w
            .write_all(&v.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, self.path))
    }

    fn u64(&mut self, v: u64) -> Result<(), KmtricksError> {
        self.w
            .write_all(&v.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, self.path))
    }

    fn str_field(&mut self, s: &str) -> Result<(), KmtricksError> {
        self.u16(s.len() as u16)?;
        self.w
            .write_all(s.as_bytes())
            .map_err(|e| KmtricksError::io(e, self.path))
    }

    fn finish(self) -> Result<(), KmtricksError> {
        self.w
            .write_all(&MAGIC2)
            .map_err(|e| KmtricksError::io(e, self.path))
    }
}

struct HeaderReader<'a, R: Read> {
    r: &'a mut R,
    path: &'a Path,
}

impl<'a, R: Read> HeaderReader<'a, R> {
    fn start(r: &'a mut R, path: &'a Path) -> Result<(Self, FileType), KmtricksError> {
        let mut magic1 = [0u8; 8];
        r.read_exact(&mut magic1).map_err(|e| KmtricksError::io(e, path))?;
        if magic1 != MAGIC1 {
            return Err(KmtricksError::format("bad magic-1", path));
        }
        let mut ty_byte = [0u8; 1];
        r.read_exact(&mut ty_byte).map_err(|e| KmtricksError::io(e, path))?;
        let ty = FileType::from_u8(ty_byte[0])
            .ok_or_else(|| KmtricksError::format("unknown file-type discriminant", path))?;
        Ok((Self { r, path }, ty))
    }

    fn u8(&mut self) -> Result<u8, KmtricksError> {
        let mut b = [0u8; 1];
        self.r.read_exact(&mut b).map_err(|e| KmtricksError::io(e, self.path))?;
        Ok(b[0])
    }

    fn u16(&mut self) -> Result<u16, KmtricksError> {
        let mut b = [0u8; 2];
        self.r.read_exact(&mut b).map_err(|e| KmtricksError::io(e, self.path))?;
        Ok(u16::from_le_bytes(b))
    }

    fn u32(&mut self) -> Result<u32, KmtricksError> {
        let mut b = [0u8; 4];
        self.r.read_exact(&mut b).map_err(|e| KmtricksError::io(e, self.path))?;
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> Result<u64, KmtricksError> {
        let mut b = [0u8; 8];
        self.r.read_exact(&mut b).map_err(|e| KmtricksError::io(e, self.path))?;
        Ok(u64::from_le_bytes(b))
    }

    fn str_field(&mut self) -> Result<String, KmtricksError> {
        let len = self.u16()? as usize;
        let mut buf = vec![0u8; len];
        self.r
            .read_exact(&mut buf)
            .map_err(|e| KmtricksError::io(e, self.path))?;
        String::from_utf8(buf).map_err(|_| KmtricksError::format("non-UTF8 string field", self.path))
    }

    fn finish(self) -> Result<(), KmtricksError> {
        let mut magic2 = [0u8; 8];
        self.r
            .read_exact(&mut magic2)
            .map_err(|e| KmtricksError::io(e, self.path))?;
        if magic2 != MAGIC2 {
            return Err(KmtricksError::format("bad magic-2 (truncated file?)", self.path));
        }
        Ok(())
    }
}

/// `{magics, key_width, count_width, sample_id, partition_id, k,
/// is_compressed, is_hashes, magic2}` header for a per-(sample, partition)
/// count file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmerFileHeader {
    pub key_width: u8,
    pub count_width: u8,
    pub sample_id: String,
    pub partition_id: u16,
    pub k: u16,
    pub is_compressed: bool,
    pub is_hashes: bool,
}

impl KmerFileHeader {
    /// # Errors
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), KmtricksError> {
        let file = File::create(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut w = BufWriter::new(file);
        let mut h = HeaderWriter::start(&mut w, path, FileType::Kmer)?;
        h.u8(self.key_width)?;
        h.u8(self.count_width)?;
        h.str_field(&self.sample_id)?;
        h.u16(self.partition_id)?;
        h.u16(self.k)?;
        h.u8(u8::from(self.is_compressed))?;
        h.u8(u8::from(self.is_hashes))?;
        h.finish()
    }

    /// # Errors
    /// Returns [`KmtricksError::Format`] on magic mismatch.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let file = File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut r = BufReader::new(file);
        let (mut h, ty) = HeaderReader::start(&mut r, path)?;
        if ty != FileType::Kmer {
            return Err(KmtricksError::format("not a KmerFile", path));
        }
        let key_width = h.u8()?;
        let count_width = h.u8()?;
        let sample_id = h.str_field()?;
        let partition_id = h.u16()?;
        let k = h.u16()?;
        let is_compressed = h.u8()? != 0;
        let is_hashes = h.u8()? != 0;
        h.finish()?;
        Ok(Self {
            key_width,
            count_width,
            sample_id,
            partition_id,
            k,
            is_compressed,
            is_hashes,
        })
    }
}

/// `CountMatrixFile`: `KmerFile` fields plus `{matrix_type, nb_counts}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMatrixHeader {
    pub base: KmerFileHeader,
    pub matrix_type: u8,
    pub nb_counts: u64,
}

impl CountMatrixHeader {
    /// # Errors
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), KmtricksError> {
        let file = File::create(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut w = BufWriter::new(file);
        let mut h = HeaderWriter::start(&mut w, path, FileType::CountMatrix)?;
        h.u8(self.base.key_width)?;
        h.u8(self.base.count_width)?;
        h.str_field(&self.base.sample_id)?;
        h.u16(self.base.partition_id)?;
        h.u16(self.base.k)?;
        h.u8(u8::from(self.base.is_compressed))?;
        h.u8(u8::from(self.base.is_hashes))?;
        h.u8(self.matrix_type)?;
        h.u64(self.nb_counts)?;
        h.finish()
    }

    /// # Errors
    /// Returns [`KmtricksError::Format`] on magic mismatch.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let file = File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut r = BufReader::new(file);
        let (mut h, ty) = HeaderReader::start(&mut r, path)?;
        if ty != FileType::CountMatrix {
            return Err(KmtricksError::format("not a CountMatrixFile", path));
        }
        let base = KmerFileHeader {
            key_width: h.u8()?,
            count_width: h.u8()?,
            sample_id: h.str_field()?,
            partition_id: h.u16()?,
            k: h.u16()?,
            is_compressed: h.u8()? != 0,
            is_hashes: h.u8()? != 0,
        };
        let matrix_type = h.u8()?;
        let nb_counts = h.u64()?;
        h.finish()?;
        Ok(Self {
            base,
            matrix_type,
            nb_counts,
        })
    }
}

/// `PAMatrixFile`: adds `{bits_in_use, row_bytes}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaMatrixHeader {
    pub partition_id: u16,
    pub bits_in_use: u32,
    pub row_bytes: u32,
}

impl PaMatrixHeader {
    /// # Errors
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), KmtricksError> {
        let file = File::create(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut w = BufWriter::new(file);
        let mut h = HeaderWriter::start(&mut w, path, FileType::PaMatrix)?;
        h.u16(self.partition_id)?;
        h.u32(self.bits_in_use)?;
        h.u32(self.row_bytes)?;
        h.finish()
    }

    /// # Errors
    /// Returns [`KmtricksError::Format`] on magic mismatch.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let file = File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut r = BufReader::new(file);
        let (mut h, ty) = HeaderReader::start(&mut r, path)?;
        if ty != FileType::PaMatrix {
            return Err(KmtricksError::format("not a PAMatrixFile", path));
        }
        let out = Self {
            partition_id: h.u16()?,
            bits_in_use: h.u32()?,
            row_bytes: h.u32()?,
        };
        h.finish()?;
        Ok(out)
    }
}

/// `BitVectorFile`: `{partition_id, bytes, nb_bits, compressed}` + payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVectorHeader {
    pub partition_id: u16,
    pub bytes: u32,
    pub nb_bits: u64,
    pub compressed: bool,
}

impl BitVectorHeader {
    /// # Errors
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), KmtricksError> {
        let file = File::create(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut w = BufWriter::new(file);
        let mut h = HeaderWriter::start(&mut w, path, FileType::BitVector)?;
        h.u16(self.partition_id)?;
        h.u32(self.bytes)?;
        h.u64(self.nb_bits)?;
        h.u8(u8::from(self.compressed))?;
        h.finish()
    }

    /// # Errors
    /// Returns [`KmtricksError::Format`] on magic mismatch.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let file = File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut r = BufReader::new(file);
        let (mut h, ty) = HeaderReader::start(&mut r, path)?;
        if ty != FileType::BitVector {
            return Err(KmtricksError::format("not a BitVectorFile", path));
        }
        let out = Self {
            partition_id: h.u16()?,
            bytes: h.u32()?,
            nb_bits: h.u64()?,
            compressed: h.u8()? != 0,
        };
        h.finish()?;
        Ok(out)
    }
}

/// `BitMatrixFile`: `{matrix_type, partition_id, nb_rows_padded,
/// nb_cols_padded, row_bytes, compressed}` + payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrixHeader {
    pub matrix_type: u8,
    pub partition_id: u16,
    pub nb_rows_padded: u32,
    pub nb_cols_padded: u32,
    pub row_bytes: u32,
    pub compressed: bool,
}

impl BitMatrixHeader {
    /// # Errors
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), KmtricksError> {
        let file = File::create(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut w = BufWriter::new(file);
        let mut h = HeaderWriter::start(&mut w, path, FileType::BitMatrix)?;
        h.u8(self.matrix_type)?;
        h.u16(self.partition_id)?;
        h.u32(self.nb_rows_padded)?;
        h.u32(self.nb_cols_padded)?;
        h.u32(self.row_bytes)?;
        h.u8(u8::from(self.compressed))?;
        h.finish()
    }

    /// # Errors
    /// Returns [`KmtricksError::Format`] on magic mismatch.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let file = File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut r = BufReader::new(file);
        let (mut h, ty) = HeaderReader::start(&mut r, path)?;
        if ty != FileType::BitMatrix {
            return Err(KmtricksError::format("not a BitMatrixFile", path));
        }
        let out = Self {
            matrix_type: h.u8()?,
            partition_id: h.u16()?,
            nb_rows_padded: h.u32()?,
            nb_cols_padded: h.u32()?,
            row_bytes: h.u32()?,
            compressed: h.u8()? != 0,
        };
        h.finish()?;
        Ok(out)
    }
}

/// `HistFile`: `{sample_id, k, lower, upper, uniq_total, occ_total}` + oob
/// + two dense `u64` arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistFileHeader {
    pub sample_id: String,
    pub k: u16,
    pub lower: u32,
    pub upper: u32,
    pub uniq_total: u64,
    pub occ_total: u64,
}

impl HistFileHeader {
    /// # Errors
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), KmtricksError> {
        let file = File::create(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut w = BufWriter::new(file);
        let mut h = HeaderWriter::start(&mut w, path, FileType::Hist)?;
        h.str_field(&self.sample_id)?;
        h.u16(self.k)?;
        h.u32(self.lower)?;
        h.u32(self.upper)?;
        h.u64(self.uniq_total)?;
        h.u64(self.occ_total)?;
        h.finish()
    }

    /// # Errors
    /// Returns [`KmtricksError::Format`] on magic mismatch.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let file = File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut r = BufReader::new(file);
        let (mut h, ty) = HeaderReader::start(&mut r, path)?;
        if ty != FileType::Hist {
            return Err(KmtricksError::format("not a HistFile", path));
        }
        let out = Self {
            sample_id: h.str_field()?,
            k: h.u16()?,
            lower: h.u32()?,
            upper: h.u32()?,
            uniq_total: h.u64()?,
            occ_total: h.u64()?,
        };
        h.finish()?;
        Ok(out)
    }
}
