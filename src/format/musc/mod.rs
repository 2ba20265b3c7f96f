//! Parser for the `MUSC` sequenced-music chunk.
//!
//! Header (little-endian): magic `MUSC`, u32 song table offset, u32 sample table
//! offset. The song table holds a u32 song count followed by one u32 pointer per
//! song, relative to the song table. Every song shares the one sample table.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

mod info;

pub use info::info_song;

pub const MAGIC: &[u8; 4] = b"MUSC";

/// Patterns always have 64 rows in this format.
pub const ROW_COUNT: usize = 64;

/// Hard cap on sample descriptors per song.
pub const MAX_SAMPLES: usize = 256;

/// Length of the silent buffer standing in for unused or empty samples.
pub const PLACEHOLDER_LENGTH: usize = 100;

/// Bytes counted by the order length byte that are not order entries.
const ORDER_HEADER_LEN: u8 = 8;
/// Pattern indices are stored multiplied by this.
const PATTERN_INDEX_STRIDE: u8 = 8;
/// Sample pointers are 24-bit backward offsets with the 0xFF top byte dropped.
const SAMPLE_OFFSET_BIAS: i64 = 0x100_0000;

#[derive(Debug, Clone)]
pub struct RawSong {
    pub index: u32,
    pub version: [u8; 4],
    /// Pattern count as declared in the song header.
    pub pattern_count: u8,
    pub channel_count: u8,
    pub order: Vec<u8>,
    pub patterns: Vec<RawPattern>,
    pub samples: Vec<RawSample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPattern {
    /// `ROW_COUNT` rows of `channel_count` cells.
    pub rows: Vec<Vec<RawCell>>,
}

/// One pattern cell. Stored as `{effect, sample, note, param}`, where the
/// effect byte carries the effect type in its high nibble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCell {
    /// 0 = no note
    pub note: u8,
    /// One-based sample descriptor index, 0 = none
    pub sample: u8,
    pub effect_type: u8,
    pub effect_param: u8,
    /// Low nibble of the effect byte, meaning unknown. Kept so the cell re-encodes exactly.
    pub unknown: u8,
}

#[derive(Debug, Clone)]
pub struct RawSample {
    pub id: u16,
    /// Absolute offset of the PCM data inside the chunk
    pub pcm_offset: u32,
    /// Length in bytes
    pub length: u32,
    pub pitch: u8,
    pub volume: u8,
    pub loop_start: u32,
    pub loop_length: u32,
    /// Signed 8-bit PCM; `None` when the sample is unused or empty and
    /// should be written as a silent placeholder.
    pub pcm: Option<Vec<i8>>,
}

impl RawCell {
    pub fn from_bytes(buf: [u8; 4]) -> RawCell {
        let [effect, sample, note, effect_param] = buf;
        RawCell {
            note,
            sample,
            effect_type: effect >> 4,
            effect_param,
            unknown: effect & 0x0f,
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            (self.effect_type << 4) | (self.unknown & 0x0f),
            self.sample,
            self.note,
            self.effect_param,
        ]
    }

    pub fn is_empty(&self) -> bool {
        *self == RawCell::default()
    }
}

impl RawPattern {
    pub fn cells(&self) -> impl Iterator<Item = &RawCell> {
        self.rows.iter().flatten()
    }
}

impl RawSample {
    pub fn is_placeholder(&self) -> bool {
        self.pcm.is_none()
    }
}

impl RawSong {
    /// Sample indices (one-based, as stored in cells) referenced by any
    /// pattern reachable from the order table.
    pub fn referenced_samples(&self) -> BTreeSet<u16> {
        referenced_samples(&self.order, &self.patterns)
    }
}

fn referenced_samples(order: &[u8], patterns: &[RawPattern]) -> BTreeSet<u16> {
    let reachable: BTreeSet<u8> = order.iter().copied().collect();
    reachable
        .into_iter()
        .filter_map(|p| patterns.get(p as usize))
        .flat_map(|p| p.cells())
        .map(|c| c.sample as u16)
        .collect()
}

/// A `MUSC` chunk whose header and song table have been read.
pub struct MuscFile<'a> {
    data: &'a [u8],
    pub song_table_offset: u32,
    pub sample_table_offset: u32,
    song_offsets: Vec<u64>,
}

/// Parses every song of a `MUSC` chunk, failing on the first broken song.
pub fn parse(data: &[u8]) -> Result<Vec<RawSong>> {
    MuscFile::new(data)?.songs().collect()
}

impl<'a> MuscFile<'a> {
    pub fn new(data: &'a [u8]) -> Result<MuscFile<'a>> {
        let mut r = Cursor::new(data);

        let mut magic = [0; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::BadMagic {
                expected: *MAGIC,
                found: magic,
            });
        }

        let song_table_offset = r.read_u32::<LittleEndian>()?;
        let sample_table_offset = r.read_u32::<LittleEndian>()?;

        r.seek(SeekFrom::Start(song_table_offset as u64))?;
        let song_count = r.read_u32::<LittleEndian>()?;
        let mut song_offsets = vec![];
        for _i in 0..song_count {
            song_offsets.push(r.read_u32::<LittleEndian>()? as u64 + song_table_offset as u64);
        }

        debug!(
            song_count,
            song_table_offset, sample_table_offset, "parsed MUSC header"
        );

        Ok(MuscFile {
            data,
            song_table_offset,
            sample_table_offset,
            song_offsets,
        })
    }

    pub fn song_count(&self) -> usize {
        self.song_offsets.len()
    }

    /// Parses song `index`, or `None` past the end of the song table.
    pub fn song(&self, index: usize) -> Option<Result<RawSong>> {
        let offset = *self.song_offsets.get(index)?;
        Some(self.parse_song(index as u32, offset))
    }

    /// Songs in table order. Each song is parsed independently, so a broken
    /// song does not affect the ones after it.
    pub fn songs(&self) -> impl Iterator<Item = Result<RawSong>> + '_ {
        self.song_offsets
            .iter()
            .enumerate()
            .map(move |(idx, &offset)| self.parse_song(idx as u32, offset))
    }

    fn parse_song(&self, index: u32, song_offset: u64) -> Result<RawSong> {
        let mut r = Cursor::new(self.data);
        r.seek(SeekFrom::Start(song_offset))?;

        let mut version = [0; 4];
        r.read_exact(&mut version)?;
        let pattern_count = r.read_u8()?;
        r.read_u8()?; // unknown
        let channel_count = r.read_u8()?;
        r.read_u8()?; // padding

        // the length byte is also the first entry's start offset
        let order_len = r.read_u8()?.saturating_sub(ORDER_HEADER_LEN) / 2;
        r.seek(SeekFrom::Current(-1))?;

        let (order, pattern_start) = parse_order(&mut r, order_len, pattern_count)?;
        let pattern_start = pattern_start.ok_or(Error::EmptyOrderTable { song: index })?;
        let num_patterns = order.iter().copied().max().unwrap_or(0) as usize + 1;

        debug!(
            song = index,
            channel_count,
            pattern_count,
            order_len = order.len(),
            num_patterns,
            "parsing song"
        );

        r.seek(SeekFrom::Start(song_offset + pattern_start as u64))?;
        let mut patterns = Vec::with_capacity(num_patterns);
        for _i in 0..num_patterns {
            patterns.push(parse_pattern(&mut r, channel_count)?);
        }

        let used = referenced_samples(&order, &patterns);
        let samples = self.parse_samples(&used);

        Ok(RawSong {
            index,
            version,
            pattern_count,
            channel_count,
            order,
            patterns,
            samples,
        })
    }

    fn parse_samples(&self, used: &BTreeSet<u16>) -> Vec<RawSample> {
        let mut samples = vec![];
        let table = SampleTable::new(self.data, self.sample_table_offset);

        for (id, desc) in table.take(MAX_SAMPLES).enumerate() {
            let id = id as u16;
            // cells count samples from one
            let pcm = if used.contains(&(id + 1)) && desc.length > 0 {
                let start = desc.pcm_offset as usize;
                match self.data.get(start..start + desc.length as usize) {
                    Some(bytes) => Some(bytes.iter().map(|&b| b as i8).collect()),
                    None => {
                        warn!(
                            id,
                            offset = desc.pcm_offset,
                            length = desc.length,
                            "sample data out of range, ending sample table"
                        );
                        break;
                    }
                }
            } else {
                None
            };

            trace!(
                id,
                offset = desc.pcm_offset,
                length = desc.length,
                placeholder = pcm.is_none(),
                "sample"
            );

            samples.push(RawSample {
                id,
                pcm_offset: desc.pcm_offset,
                length: desc.length,
                pitch: desc.pitch,
                volume: desc.volume,
                loop_start: desc.loop_start,
                loop_length: desc.loop_length,
                pcm,
            });
        }
        samples
    }
}

/// Reads up to `len` order entries of `{start offset, pattern index * 8}`.
///
/// Stops at the first pattern index above `pattern_count`; such trailing
/// entries show up in shipped ROMs and point at garbage. Returns the accepted
/// indices and the start offset of the last entry read, rejected or not.
fn parse_order(
    r: &mut dyn Read,
    len: u8,
    pattern_count: u8,
) -> std::io::Result<(Vec<u8>, Option<u8>)> {
    let mut order = vec![];
    let mut start = None;
    for _i in 0..len {
        start = Some(r.read_u8()?);
        let pattern = r.read_u8()? / PATTERN_INDEX_STRIDE;
        if pattern > pattern_count {
            warn!(
                pattern,
                pattern_count,
                position = order.len(),
                "order entry out of range, truncating order table"
            );
            break;
        }
        order.push(pattern);
    }
    Ok((order, start))
}

fn parse_pattern(r: &mut dyn Read, num_channels: u8) -> std::io::Result<RawPattern> {
    let mut rows = Vec::with_capacity(ROW_COUNT);
    for _i in 0..ROW_COUNT {
        let mut cells = Vec::with_capacity(num_channels as usize);
        for _j in 0..num_channels {
            let mut buf = [0; 4];
            r.read_exact(&mut buf)?;
            cells.push(RawCell::from_bytes(buf));
        }
        rows.push(cells);
    }
    Ok(RawPattern { rows })
}

struct SampleDescriptor {
    pcm_offset: u32,
    length: u32,
    pitch: u8,
    volume: u8,
    loop_start: u32,
    loop_length: u32,
}

fn parse_sample_descriptor(r: &mut Cursor<&[u8]>) -> std::io::Result<SampleDescriptor> {
    r.read_u8()?; // reserved
    let raw_offset = r.read_u24::<LittleEndian>()? as i64;
    let pcm_offset = (raw_offset + r.position() as i64 - SAMPLE_OFFSET_BIAS).max(0) as u32;
    let length = r.read_u16::<LittleEndian>()? as u32 * 2;
    let pitch = r.read_u8()?;
    let volume = r.read_u8()?;
    let loop_start = r.read_u16::<LittleEndian>()? as u32 * 2;
    let loop_length = r.read_u16::<LittleEndian>()? as u32 * 2;

    Ok(SampleDescriptor {
        pcm_offset,
        length,
        pitch,
        volume,
        loop_start,
        loop_length,
    })
}

/// Sample descriptors in table order.
///
/// The table has no reliable length: the leading u32 does not match the
/// number of entries. It ends at the first descriptor that cannot be read
/// completely.
struct SampleTable<'a> {
    cursor: Cursor<&'a [u8]>,
    exhausted: bool,
}

impl<'a> SampleTable<'a> {
    fn new(data: &'a [u8], offset: u32) -> SampleTable<'a> {
        let mut cursor = Cursor::new(data);
        cursor.set_position(offset as u64);
        let exhausted = cursor.read_u32::<LittleEndian>().is_err();
        SampleTable { cursor, exhausted }
    }
}

impl Iterator for SampleTable<'_> {
    type Item = SampleDescriptor;

    fn next(&mut self) -> Option<SampleDescriptor> {
        if self.exhausted {
            return None;
        }
        match parse_sample_descriptor(&mut self.cursor) {
            Ok(desc) => Some(desc),
            Err(_) => {
                self.exhausted = true;
                None
            }
        }
    }
}
