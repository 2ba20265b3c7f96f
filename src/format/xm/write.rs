use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::*;

const MODULE_NAME_LEN: usize = 20;
const INSTRUMENT_NAME_LEN: usize = 22;
const SAMPLE_NAME_LEN: usize = 22;
const PATTERN_HEADER_LEN: u32 = 9;
const NAME_TERMINATOR: u8 = 0x1a;

impl XmModule {
    pub fn write<W>(&self, w: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        write_header(w, self)?;
        for pattern in &self.patterns {
            write_pattern(w, pattern)?;
        }
        for instrument in &self.instruments {
            write_instrument(w, instrument)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = vec![];
        self.write(&mut out)?;
        Ok(out)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write(&mut w)?;
        w.flush()?;
        Ok(())
    }
}

fn write_header<W: Write>(w: &mut W, module: &XmModule) -> io::Result<()> {
    w.write_all(XM_MAGIC)?;
    w.write_all(&pad_ascii(&module.name, MODULE_NAME_LEN))?;
    w.write_u8(NAME_TERMINATOR)?;
    w.write_all(&pad_ascii(&module.tracker_name, MODULE_NAME_LEN))?;
    w.write_u16::<LittleEndian>(module.version)?;
    w.write_u32::<LittleEndian>(HEADER_SIZE)?;

    w.write_u16::<LittleEndian>(module.song_length)?;
    w.write_u16::<LittleEndian>(module.restart_position)?;
    w.write_u16::<LittleEndian>(module.num_channels as u16)?;
    w.write_u16::<LittleEndian>(module.patterns.len() as u16)?;
    w.write_u16::<LittleEndian>(module.instruments.len() as u16)?;
    w.write_u16::<LittleEndian>(module.linear_frequency_table as u16)?;
    w.write_u16::<LittleEndian>(module.default_tempo)?;
    w.write_u16::<LittleEndian>(module.default_bpm)?;

    w.write_all(&module.order)
}

fn write_pattern<W: Write>(w: &mut W, pattern: &XmPattern) -> io::Result<()> {
    w.write_u32::<LittleEndian>(PATTERN_HEADER_LEN)?;
    w.write_u8(0)?; // packing type
    w.write_u16::<LittleEndian>(pattern.num_rows() as u16)?;
    w.write_u16::<LittleEndian>(pattern.packed_size() as u16)?;

    // no note compression: all five bytes of every cell
    for note in pattern.rows.iter().flatten() {
        w.write_all(&[
            note.note,
            note.instrument,
            note.volume,
            note.effect_type,
            note.effect_param,
        ])?;
    }
    Ok(())
}

fn write_instrument<W: Write>(w: &mut W, instrument: &XmInstrument) -> io::Result<()> {
    let mut header = vec![];
    header.write_all(&pad_ascii(&instrument.name, INSTRUMENT_NAME_LEN))?;
    header.write_u8(0)?; // type
    header.write_u16::<LittleEndian>(instrument.samples.len() as u16)?;
    if !instrument.samples.is_empty() {
        header.extend_from_slice(&extra_header(instrument)?);
    }

    // the size field counts itself
    w.write_u32::<LittleEndian>(header.len() as u32 + 4)?;
    w.write_all(&header)?;

    for sample in &instrument.samples {
        write_sample_header(w, sample)?;
    }
    for sample in &instrument.samples {
        write_sample_data(w, sample)?;
    }
    Ok(())
}

/// Note map, envelopes, vibrato and fadeout. Starts with its own encoded length.
fn extra_header(instrument: &XmInstrument) -> io::Result<Vec<u8>> {
    let vol = &instrument.volume_envelope;
    let pan = &instrument.panning_envelope;

    let mut extra = vec![];
    extra.write_u32::<LittleEndian>(0)?; // patched below
    extra.write_all(&instrument.sample_for_note)?;
    write_envelope_points(&mut extra, vol)?;
    write_envelope_points(&mut extra, pan)?;

    extra.write_u8(vol.num_points())?;
    extra.write_u8(pan.num_points())?;
    extra.write_all(&[vol.sustain_point, vol.loop_start, vol.loop_end])?;
    extra.write_all(&[pan.sustain_point, pan.loop_start, pan.loop_end])?;
    extra.write_u8(vol.flags())?;
    extra.write_u8(pan.flags())?;

    extra.write_all(&[
        instrument.vibrato_type,
        instrument.vibrato_sweep,
        instrument.vibrato_depth,
        instrument.vibrato_rate,
    ])?;
    extra.write_u16::<LittleEndian>(instrument.volume_fadeout)?;
    extra.write_u16::<LittleEndian>(0)?; // reserved

    let size = extra.len() as u32;
    LittleEndian::write_u32(&mut extra[..4], size);
    Ok(extra)
}

fn write_envelope_points(w: &mut dyn Write, envelope: &XmEnvelope) -> io::Result<()> {
    let points = envelope.points.iter().copied().chain(std::iter::repeat((0, 0)));
    for (x, y) in points.take(MAX_ENVELOPE_POINTS) {
        w.write_u16::<LittleEndian>(x)?;
        w.write_u16::<LittleEndian>(y)?;
    }
    Ok(())
}

fn write_sample_header<W: Write>(w: &mut W, sample: &XmSample) -> io::Result<()> {
    w.write_u32::<LittleEndian>(sample.data.byte_len() as u32)?;
    w.write_u32::<LittleEndian>(sample.loop_start)?;
    w.write_u32::<LittleEndian>(sample.loop_length)?;
    w.write_u8(sample.volume)?;
    w.write_i8(sample.fine_tune)?;
    w.write_u8(sample.type_flags())?;
    w.write_u8(sample.panning)?;
    w.write_i8(sample.relative_note)?;
    w.write_u8(0)?; // reserved
    w.write_all(&pad_ascii(&sample.name, SAMPLE_NAME_LEN))
}

fn write_sample_data<W: Write>(w: &mut W, sample: &XmSample) -> io::Result<()> {
    match &sample.data {
        SampleData::Pcm8(pcm) => {
            for delta in delta_encode_8(pcm) {
                w.write_i8(delta)?;
            }
        }
        SampleData::Pcm16(pcm) => {
            for delta in delta_encode_16(pcm) {
                w.write_i16::<LittleEndian>(delta)?;
            }
        }
    }
    Ok(())
}

/// Delta-codes 8-bit PCM.
///
/// Each delta is clamped to the i8 range and the running reference advances
/// by the clamped delta, so a jump wider than 127 is spread over the
/// following samples instead of wrapping.
pub fn delta_encode_8(pcm: &[i8]) -> Vec<i8> {
    let mut prev: i16 = 0;
    pcm.iter()
        .map(|&v| {
            let delta = (v as i16 - prev).clamp(i8::MIN as i16, i8::MAX as i16);
            prev += delta;
            delta as i8
        })
        .collect()
}

/// Delta-codes 16-bit PCM against the previous original sample. Lossless,
/// since decoders accumulate with the same wrap-around.
pub fn delta_encode_16(pcm: &[i16]) -> Vec<i16> {
    let mut prev: i16 = 0;
    pcm.iter()
        .map(|&v| {
            let delta = v.wrapping_sub(prev);
            prev = v;
            delta
        })
        .collect()
}

/// ASCII bytes of `s` (other characters dropped), truncated or null-padded to `len`.
pub(crate) fn pad_ascii(s: &str, len: usize) -> Vec<u8> {
    let mut buf: Vec<u8> = s.bytes().filter(u8::is_ascii).take(len).collect();
    buf.resize(len, 0);
    buf
}
