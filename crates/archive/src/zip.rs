//! Minimal, in-memory ZIP reader.
//!
//! Module archives are small enough (bounded by the caller before they get
//! here) to hold in memory, so the central directory is parsed once up front
//! and entries are decompressed on demand straight out of the byte buffer.
//!
//! Supported: stored (0) and deflate (8) entries, data descriptors.
//! Rejected: Zip64, multi-disk archives, encrypted entries.

use exn::OptionExt;
use flate2::read::DeflateDecoder;
use std::io::Read;

use crate::error::{ErrorKind, Result};

const SIG_LFH: u32 = 0x0403_4b50;
const SIG_CDFH: u32 = 0x0201_4b50;
const SIG_EOCD: u32 = 0x0605_4b50;

const LFH_LEN: usize = 30;
const CDFH_LEN: usize = 46;
const EOCD_MIN_LEN: usize = 22;
// EOCD (22) + maximum comment length (65535).
const EOCD_SEARCH_WINDOW: usize = EOCD_MIN_LEN + u16::MAX as usize;

const FLAG_ENCRYPTED: u16 = 0x0001;

/// Compression method of a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflate,
}

impl TryFrom<u16> for Method {
    type Error = crate::error::Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::Stored),
            8 => Ok(Self::Deflate),
            other => exn::bail!(ErrorKind::Unsupported(format!("compression method {other}"))),
        }
    }
}

/// Central directory record for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: String,
    method: Method,
    crc32: u32,
    compressed_size: u64,
    size: u64,
    local_header_offset: u64,
}

impl Entry {
    /// Full path of the entry inside the archive.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed size as recorded in the central directory.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Directory entries are recognised by a trailing slash.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// A parsed ZIP archive held in memory.
#[derive(Debug, Clone)]
pub struct Archive {
    data: Vec<u8>,
    entries: Vec<Entry>,
}

impl Archive {
    /// Parse the central directory of `data`.
    ///
    /// Entry contents are not touched until [`read`](Self::read) is called,
    /// so a successful parse does not guarantee every entry decompresses.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let entries = parse_central_directory(&data)?;
        tracing::debug!(entries = entries.len(), bytes = data.len(), "parsed zip central directory");
        Ok(Self { data, entries })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Length of the raw (compressed) archive in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw archive bytes, as handed to [`new`](Self::new).
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Find an entry by its full in-archive name.
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Decompress `entry`, refusing anything larger than `limit` bytes.
    ///
    /// The limit is checked against the recorded size before any work is done
    /// and enforced again while inflating, so a lying header cannot be used to
    /// expand past it. The CRC-32 recorded in the central directory is
    /// verified.
    pub fn read(&self, entry: &Entry, limit: u64) -> Result<Vec<u8>> {
        if entry.size > limit {
            exn::bail!(ErrorKind::TooLarge { name: entry.name.clone(), size: entry.size, limit });
        }
        let compressed = self.payload(entry)?;
        let mut out = Vec::with_capacity(usize::try_from(entry.size).unwrap_or(0));
        match entry.method {
            Method::Stored => out.extend_from_slice(compressed),
            Method::Deflate => {
                // One byte past the recorded size is enough to detect a lie.
                let mut decoder = DeflateDecoder::new(compressed).take(entry.size.saturating_add(1));
                if decoder.read_to_end(&mut out).is_err() {
                    exn::bail!(ErrorKind::malformed(format!("invalid deflate stream in {}", entry.name)));
                }
            },
        }
        if out.len() as u64 != entry.size || crc32fast::hash(&out) != entry.crc32 {
            exn::bail!(ErrorKind::Checksum(entry.name.clone()));
        }
        Ok(out)
    }

    /// Locate the compressed bytes of `entry` via its local file header.
    fn payload(&self, entry: &Entry) -> Result<&[u8]> {
        let offset = usize::try_from(entry.local_header_offset)
            .ok()
            .ok_or_raise(|| ErrorKind::malformed("local header offset out of range"))?;
        let header = slice(&self.data, offset, LFH_LEN)?;
        if le_u32(header, 0) != SIG_LFH {
            exn::bail!(ErrorKind::malformed(format!("bad local header signature for {}", entry.name)));
        }
        let name_len = le_u16(header, 26) as usize;
        let extra_len = le_u16(header, 28) as usize;
        let start = offset + LFH_LEN + name_len + extra_len;
        let len = usize::try_from(entry.compressed_size)
            .ok()
            .ok_or_raise(|| ErrorKind::malformed("compressed size out of range"))?;
        slice(&self.data, start, len)
    }
}

fn parse_central_directory(data: &[u8]) -> Result<Vec<Entry>> {
    if data.len() < EOCD_MIN_LEN {
        exn::bail!(ErrorKind::malformed("too short to be a zip archive"));
    }
    let window_start = data.len().saturating_sub(EOCD_SEARCH_WINDOW);
    let eocd = rfind_sig(&data[window_start..], SIG_EOCD)
        .map(|pos| window_start + pos)
        .ok_or_raise(|| ErrorKind::malformed("end of central directory not found"))?;
    let record = slice(data, eocd, EOCD_MIN_LEN)?;

    let disk = le_u16(record, 4);
    let cd_disk = le_u16(record, 6);
    let entries_on_disk = le_u16(record, 8);
    let entries_total = le_u16(record, 10);
    let cd_size = le_u32(record, 12);
    let cd_offset = le_u32(record, 16);

    if entries_total == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX {
        exn::bail!(ErrorKind::Unsupported("zip64".to_string()));
    }
    if disk != 0 || cd_disk != 0 || entries_on_disk != entries_total {
        exn::bail!(ErrorKind::Unsupported("multi-disk archive".to_string()));
    }
    let cd_offset = cd_offset as usize;
    let cd_size = cd_size as usize;
    if cd_offset.saturating_add(cd_size) > eocd {
        exn::bail!(ErrorKind::malformed("central directory overlaps end record"));
    }

    let mut entries = Vec::with_capacity(entries_total as usize);
    let mut pos = cd_offset;
    for _ in 0..entries_total {
        let header = slice(data, pos, CDFH_LEN)?;
        if le_u32(header, 0) != SIG_CDFH {
            exn::bail!(ErrorKind::malformed("bad central directory signature"));
        }
        let flags = le_u16(header, 8);
        let method = le_u16(header, 10);
        let crc32 = le_u32(header, 16);
        let compressed_size = le_u32(header, 20);
        let size = le_u32(header, 24);
        let name_len = le_u16(header, 28) as usize;
        let extra_len = le_u16(header, 30) as usize;
        let comment_len = le_u16(header, 32) as usize;
        let local_header_offset = le_u32(header, 42);

        if compressed_size == u32::MAX || size == u32::MAX || local_header_offset == u32::MAX {
            exn::bail!(ErrorKind::Unsupported("zip64".to_string()));
        }
        if flags & FLAG_ENCRYPTED != 0 {
            exn::bail!(ErrorKind::Unsupported("encrypted entry".to_string()));
        }

        let name = slice(data, pos + CDFH_LEN, name_len)?;
        let name = std::str::from_utf8(name)
            .ok()
            .ok_or_raise(|| ErrorKind::malformed("entry name is not valid UTF-8"))?
            .to_string();
        let method = Method::try_from(method)?;

        entries.push(Entry {
            name,
            method,
            crc32,
            compressed_size: compressed_size.into(),
            size: size.into(),
            local_header_offset: local_header_offset.into(),
        });
        pos += CDFH_LEN + name_len + extra_len + comment_len;
    }
    Ok(entries)
}

fn slice(data: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_raise(|| ErrorKind::malformed("truncated archive"))
}

fn rfind_sig(hay: &[u8], sig: u32) -> Option<usize> {
    let needle = sig.to_le_bytes();
    hay.windows(4).rposition(|window| window == needle)
}

#[inline(always)]
fn le_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

#[inline(always)]
fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}
