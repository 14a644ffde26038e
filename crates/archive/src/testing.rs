//! Archive construction helpers for tests.
//!
//! Only compiled for this crate's tests or with the `testing` feature, which
//! other crates enable in their dev-dependencies. Panics freely: if test
//! setup is wrong, the test should not pass.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

struct Pending {
    name: String,
    method: u16,
    crc32: u32,
    size: u32,
    payload: Vec<u8>,
}

/// Builds a ZIP archive in memory, one entry at a time.
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<Pending>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an uncompressed entry.
    pub fn stored(mut self, name: impl Into<String>, contents: &[u8]) -> Self {
        self.entries.push(Pending {
            name: name.into(),
            method: 0,
            crc32: crc32fast::hash(contents),
            size: u32::try_from(contents.len()).unwrap(),
            payload: contents.to_vec(),
        });
        self
    }

    /// Add a deflate-compressed entry.
    pub fn deflated(mut self, name: impl Into<String>, contents: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents).unwrap();
        self.entries.push(Pending {
            name: name.into(),
            method: 8,
            crc32: crc32fast::hash(contents),
            size: u32::try_from(contents.len()).unwrap(),
            payload: encoder.finish().unwrap(),
        });
        self
    }

    /// Add an explicit directory entry (name should end in `/`).
    pub fn directory(self, name: impl Into<String>) -> Self {
        self.stored(name, b"")
    }

    /// Add every `(name, contents)` pair as a stored entry.
    pub fn files<'a>(self, files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        files.into_iter().fold(self, |builder, (name, contents)| builder.stored(name, contents))
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        for entry in &self.entries {
            let offset = u32::try_from(out.len()).unwrap();
            let name = entry.name.as_bytes();
            let compressed = u32::try_from(entry.payload.len()).unwrap();
            let name_len = u16::try_from(name.len()).unwrap();

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&entry.method.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // mod time + date
            out.extend_from_slice(&entry.crc32.to_le_bytes());
            out.extend_from_slice(&compressed.to_le_bytes());
            out.extend_from_slice(&entry.size.to_le_bytes());
            out.extend_from_slice(&name_len.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra length
            out.extend_from_slice(name);
            out.extend_from_slice(&entry.payload);

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes()); // version made by
            central.extend_from_slice(&20u16.to_le_bytes()); // version needed
            central.extend_from_slice(&0u16.to_le_bytes()); // flags
            central.extend_from_slice(&entry.method.to_le_bytes());
            central.extend_from_slice(&0u32.to_le_bytes()); // mod time + date
            central.extend_from_slice(&entry.crc32.to_le_bytes());
            central.extend_from_slice(&compressed.to_le_bytes());
            central.extend_from_slice(&entry.size.to_le_bytes());
            central.extend_from_slice(&name_len.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes()); // extra length
            central.extend_from_slice(&0u16.to_le_bytes()); // comment length
            central.extend_from_slice(&0u16.to_le_bytes()); // disk number start
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
            central.extend_from_slice(&0u32.to_le_bytes()); // external attributes
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name);
        }

        let cd_offset = u32::try_from(out.len()).unwrap();
        let cd_size = u32::try_from(central.len()).unwrap();
        let count = u16::try_from(self.entries.len()).unwrap();
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // this disk
        out.extend_from_slice(&0u16.to_le_bytes()); // central directory disk
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length
        out
    }
}
