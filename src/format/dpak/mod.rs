//! Reader for the `DPAK` chunk container Torus Games embeds in its ROMs.
//!
//! Layout at the container offset (all little-endian):
//!
//! ```text
//! [4]  identifier ("DPAK")
//! [2]  entry count N
//! [10] reserved
//! N x { u32 chunk type, u32 data offset (from container start), u32 data size, u32 reserved }
//! ```
//!
//! Chunk payloads live anywhere after the container start; they are not
//! required to follow the directory or each other.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::debug;

use crate::error::{Error, Result};

pub const SIGNATURE: &[u8; 4] = b"DPAK";
pub const MUSIC_SIGNATURE: &[u8; 4] = b"MUSC";

const RESERVED_LEN: usize = 10;
const ENTRY_LEN: usize = 16;

pub struct DpakContainer {
    pub identifier: [u8; 4],
    pub reserved: [u8; RESERVED_LEN],
    pub entries: Vec<DirEntry>,
    pub chunks: Vec<Chunk>,
}

/// One directory entry as stored in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub chunk_type: u32,
    pub offset: u32,
    pub size: u32,
    pub reserved: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_type: u32,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn starts_with(&self, signature: &[u8]) -> bool {
        self.data.starts_with(signature)
    }
}

/// Offset of the first occurrence of `signature` in `data`.
///
/// An empty signature never matches.
pub fn locate(data: &[u8], signature: &[u8]) -> Option<usize> {
    if signature.is_empty() {
        return None;
    }
    data.windows(signature.len()).position(|w| w == signature)
}

/// Where directory offsets count from.
#[derive(Debug, Clone, Copy)]
enum OffsetBase {
    /// The `DPAK` identifier, as in ROM images.
    Container,
    /// The first byte after the directory, as written by [`DpakContainer::to_bytes`].
    Payload,
}

/// Reads the container starting at absolute position `offset` of `r`.
pub fn extract_chunks<R>(r: &mut R, offset: u64) -> Result<DpakContainer>
where
    R: Read + Seek,
{
    read_container(r, offset, OffsetBase::Container)
}

/// Reads a container produced by [`DpakContainer::to_bytes`] starting at `offset`.
pub fn extract_repacked<R>(r: &mut R, offset: u64) -> Result<DpakContainer>
where
    R: Read + Seek,
{
    read_container(r, offset, OffsetBase::Payload)
}

fn read_container<R>(r: &mut R, offset: u64, base: OffsetBase) -> Result<DpakContainer>
where
    R: Read + Seek,
{
    r.seek(SeekFrom::Start(offset))?;

    let mut identifier = [0; 4];
    r.read_exact(&mut identifier)?;
    let num_entries = r.read_u16::<LittleEndian>()?;
    let mut reserved = [0; RESERVED_LEN];
    r.read_exact(&mut reserved)?;

    debug!(offset, num_entries, "reading DPAK directory");

    let data_base = match base {
        OffsetBase::Container => offset,
        OffsetBase::Payload => offset + header_len(num_entries as usize) as u64,
    };

    let mut entries = Vec::with_capacity(num_entries as usize);
    let mut chunks = Vec::with_capacity(num_entries as usize);
    for _i in 0..num_entries {
        let entry = parse_entry(r)?;
        let resume = r.stream_position()?;

        r.seek(SeekFrom::Start(data_base + entry.offset as u64))?;
        let data = read_payload(r, entry.size)?;
        r.seek(SeekFrom::Start(resume))?;

        debug!(
            chunk_type = entry.chunk_type,
            size = entry.size,
            "extracted chunk"
        );
        chunks.push(Chunk {
            chunk_type: entry.chunk_type,
            data,
        });
        entries.push(entry);
    }

    Ok(DpakContainer {
        identifier,
        reserved,
        entries,
        chunks,
    })
}

fn header_len(num_entries: usize) -> usize {
    SIGNATURE.len() + 2 + RESERVED_LEN + ENTRY_LEN * num_entries
}

/// Reads `size` bytes, growing the buffer only as data actually arrives.
/// The declared size is untrusted.
fn read_payload<R: Read>(r: &mut R, size: u32) -> std::io::Result<Vec<u8>> {
    let mut data = vec![];
    r.by_ref().take(size as u64).read_to_end(&mut data)?;
    if data.len() != size as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("chunk declares {} bytes, {} available", size, data.len()),
        ));
    }
    Ok(data)
}

fn parse_entry(r: &mut dyn Read) -> std::io::Result<DirEntry> {
    Ok(DirEntry {
        chunk_type: r.read_u32::<LittleEndian>()?,
        offset: r.read_u32::<LittleEndian>()?,
        size: r.read_u32::<LittleEndian>()?,
        reserved: r.read_u32::<LittleEndian>()?,
    })
}

impl DpakContainer {
    /// Locates the first `DPAK` signature in a ROM image and extracts the container there.
    pub fn find(rom: &[u8]) -> Result<DpakContainer> {
        let offset = locate(rom, SIGNATURE).ok_or(Error::ContainerNotFound)?;
        extract_chunks(&mut Cursor::new(rom), offset as u64)
    }

    pub fn type_tags(&self) -> Vec<u32> {
        self.chunks.iter().map(|c| c.chunk_type).collect()
    }

    /// First chunk whose payload begins with `signature`.
    pub fn find_chunk(&self, signature: &[u8]) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.starts_with(signature))
    }

    pub fn music_chunk(&self) -> Result<&Chunk> {
        self.find_chunk(MUSIC_SIGNATURE)
            .ok_or_else(|| Error::ChunkNotFound {
                signature: String::from_utf8_lossy(MUSIC_SIGNATURE).into_owned(),
            })
    }

    /// Re-packs the container: header, directory, then every payload back to back
    /// in directory order. Directory offsets are rewritten relative to the start
    /// of the payload blob; read the result with [`extract_repacked`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload_len: usize = self.chunks.iter().map(|c| c.data.len()).sum();

        let mut out = Vec::with_capacity(header_len(self.chunks.len()) + payload_len);
        out.extend_from_slice(&self.identifier);
        out.extend_from_slice(&(self.chunks.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.reserved);

        let mut data_offset = 0;
        for (idx, chunk) in self.chunks.iter().enumerate() {
            let reserved = self.entries.get(idx).map(|e| e.reserved).unwrap_or(0);
            out.extend_from_slice(&chunk.chunk_type.to_le_bytes());
            out.extend_from_slice(&(data_offset as u32).to_le_bytes());
            out.extend_from_slice(&(chunk.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&reserved.to_le_bytes());
            data_offset += chunk.data.len();
        }

        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.data);
        }
        out
    }
}
