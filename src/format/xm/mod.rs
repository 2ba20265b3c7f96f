//! FastTracker 2 Extended Module (XM 1.04) model and writer.
//!
//! The model only holds what the writer needs. Building goes through
//! [`XmModule::set_order`], [`XmModule::add_pattern`] and
//! [`XmModule::add_instrument`], which enforce the format limits, so a
//! module that was built successfully always serializes.
//!
//! Reference: <https://github.com/milkytracker/MilkyTracker/blob/master/resources/reference/xm-form.txt>

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::ValidationError;

mod write;
#[cfg(test)]
mod tests;

pub use write::{delta_encode_16, delta_encode_8};

pub const XM_MAGIC: &[u8; 17] = b"Extended Module: ";

/// Stored little-endian, so minor version first.
pub const XM_VERSION: u16 = 0x0104;

/// Header size field: itself, the 16-byte header block and the order table.
pub const HEADER_SIZE: u32 = 276;

pub const ORDER_TABLE_LEN: usize = 256;
pub const MAX_PATTERN_ROWS: usize = 256;
pub const MAX_SAMPLES_PER_INSTRUMENT: usize = 128;
pub const MAX_ENVELOPE_POINTS: usize = 12;
pub const NOTE_MAP_LEN: usize = 96;

/// Bytes per unpacked pattern cell.
pub const CELL_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct XmModule {
    pub name: String,
    pub tracker_name: String,
    pub version: u16,
    pub num_channels: u8,
    pub restart_position: u16,
    pub default_tempo: u16,
    pub default_bpm: u16,
    pub linear_frequency_table: bool,
    song_length: u16,
    order: [u8; ORDER_TABLE_LEN],
    patterns: Vec<XmPattern>,
    instruments: Vec<XmInstrument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmPattern {
    /// [row][channel]
    pub rows: Vec<Vec<XmNote>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmNote {
    /// 0 = none, 1-96 = C-0..B-7, 97 = key off
    pub note: u8,
    /// 0 = none
    pub instrument: u8,
    pub volume: u8,
    pub effect_type: u8,
    pub effect_param: u8,
}

#[derive(Debug, Clone)]
pub struct XmInstrument {
    pub name: String,
    pub samples: Vec<XmSample>,
    /// Sample index for each of the 96 notes
    pub sample_for_note: [u8; NOTE_MAP_LEN],
    pub volume_envelope: XmEnvelope,
    pub panning_envelope: XmEnvelope,
    pub vibrato_type: u8,
    pub vibrato_sweep: u8,
    pub vibrato_depth: u8,
    pub vibrato_rate: u8,
    pub volume_fadeout: u16,
}

/// Volume or panning envelope. Only the first 12 points are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmEnvelope {
    /// (tick, value)
    pub points: Vec<(u16, u16)>,
    pub sustain_point: u8,
    pub loop_start: u8,
    pub loop_end: u8,
    pub enabled: bool,
    pub sustain_enabled: bool,
    pub loop_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmSample {
    pub name: String,
    pub data: SampleData,
    pub volume: u8,
    pub fine_tune: i8,
    pub panning: u8,
    pub relative_note: i8,
    pub loop_type: LoopType,
    pub loop_start: u32,
    pub loop_length: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    Pcm8(Vec<i8>),
    Pcm16(Vec<i16>),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LoopType {
    None = 0,
    Forward = 1,
    PingPong = 2,
}

impl XmModule {
    pub fn new(name: &str, tracker_name: &str, num_channels: u8) -> XmModule {
        XmModule {
            name: String::from(name),
            tracker_name: String::from(tracker_name),
            version: XM_VERSION,
            num_channels,
            restart_position: 0,
            default_tempo: 6,
            default_bpm: 125,
            linear_frequency_table: true,
            song_length: 1,
            order: [0; ORDER_TABLE_LEN],
            patterns: vec![],
            instruments: vec![],
        }
    }

    /// Sets the playback order. Entries past `order.len()` are zeroed.
    pub fn set_order(&mut self, order: &[u8]) -> Result<(), ValidationError> {
        if order.len() > ORDER_TABLE_LEN {
            return Err(ValidationError::OrderTooLong(order.len()));
        }
        self.song_length = order.len() as u16;
        self.order = [0; ORDER_TABLE_LEN];
        self.order[..order.len()].copy_from_slice(order);
        Ok(())
    }

    pub fn add_pattern(&mut self, pattern: XmPattern) -> Result<(), ValidationError> {
        let num_rows = pattern.num_rows();
        if num_rows < 1 || num_rows > MAX_PATTERN_ROWS {
            return Err(ValidationError::InvalidRowCount(num_rows));
        }
        let expected = self.num_channels as usize;
        if let Some((row, notes)) = pattern
            .rows
            .iter()
            .enumerate()
            .find(|(_, notes)| notes.len() != expected)
        {
            return Err(ValidationError::ChannelMismatch {
                row,
                found: notes.len(),
                expected,
            });
        }
        let packed_size = pattern.packed_size();
        if packed_size > u16::MAX as usize {
            return Err(ValidationError::PatternTooLarge(packed_size));
        }
        self.patterns.push(pattern);
        Ok(())
    }

    pub fn add_instrument(&mut self, instrument: XmInstrument) -> Result<(), ValidationError> {
        if instrument.samples.len() > MAX_SAMPLES_PER_INSTRUMENT {
            return Err(ValidationError::TooManySamples(instrument.samples.len()));
        }
        self.instruments.push(instrument);
        Ok(())
    }

    pub fn song_length(&self) -> u16 {
        self.song_length
    }

    /// The meaningful part of the order table.
    pub fn order(&self) -> &[u8] {
        &self.order[..self.song_length as usize]
    }

    pub fn patterns(&self) -> &[XmPattern] {
        &self.patterns
    }

    pub fn instruments(&self) -> &[XmInstrument] {
        &self.instruments
    }
}

impl XmPattern {
    pub fn empty(num_rows: usize, num_channels: u8) -> XmPattern {
        XmPattern {
            rows: vec![vec![XmNote::default(); num_channels as usize]; num_rows],
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Size of the cell data; every cell is written unpacked.
    pub fn packed_size(&self) -> usize {
        self.rows.iter().map(|r| r.len() * CELL_LEN).sum()
    }
}

impl XmInstrument {
    pub fn new(name: &str) -> XmInstrument {
        XmInstrument {
            name: String::from(name),
            samples: vec![],
            sample_for_note: [0; NOTE_MAP_LEN],
            volume_envelope: XmEnvelope::default(),
            panning_envelope: XmEnvelope::default(),
            vibrato_type: 0,
            vibrato_sweep: 0,
            vibrato_depth: 0,
            vibrato_rate: 0,
            volume_fadeout: 0,
        }
    }
}

impl XmEnvelope {
    /// Type byte: bit 0 on, bit 1 sustain, bit 2 loop.
    pub fn flags(&self) -> u8 {
        (self.enabled as u8) | (self.sustain_enabled as u8) << 1 | (self.loop_enabled as u8) << 2
    }

    pub fn num_points(&self) -> u8 {
        self.points.len().min(MAX_ENVELOPE_POINTS) as u8
    }
}

impl XmSample {
    /// An 8-bit sample of `len` zero frames at volume 0.
    pub fn silent(name: &str, len: usize) -> XmSample {
        XmSample {
            name: String::from(name),
            data: SampleData::Pcm8(vec![0; len]),
            volume: 0,
            fine_tune: 0,
            panning: 128,
            relative_note: 0,
            loop_type: LoopType::None,
            loop_start: 0,
            loop_length: 0,
        }
    }

    pub fn is_16bit(&self) -> bool {
        matches!(self.data, SampleData::Pcm16(_))
    }

    /// Type byte: bit 4 = 16-bit, bits 0-1 = loop type.
    pub fn type_flags(&self) -> u8 {
        let loop_bits: u8 = self.loop_type.into();
        (self.is_16bit() as u8) << 4 | (loop_bits & 0x03)
    }
}

impl SampleData {
    /// Number of sample frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Pcm8(pcm) => pcm.len(),
            SampleData::Pcm16(pcm) => pcm.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        match self {
            SampleData::Pcm8(pcm) => pcm.len(),
            SampleData::Pcm16(pcm) => pcm.len() * 2,
        }
    }
}
