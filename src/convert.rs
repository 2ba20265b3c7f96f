//! ROM → XM conversion: find the music, parse every song, write one module per song.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::format::dpak::DpakContainer;
use crate::format::musc::{MuscFile, RawPattern, RawSample, RawSong, PLACEHOLDER_LENGTH};
use crate::format::xm::{LoopType, SampleData, XmInstrument, XmModule, XmNote, XmPattern, XmSample};

pub struct ConvertConfig {
    /// Module names are this prefix plus the song index.
    pub module_name: String,
    pub tracker_name: String,
    /// Output files are named `<file_stem>_NN.xm`.
    pub file_stem: String,
    pub default_tempo: u16,
    pub default_bpm: u16,
    pub linear_frequency_table: bool,
    pub sample_panning: u8,
    pub sample_relative_note: i8,
    /// Also write the raw `MUSC` chunk as `music.bin`.
    pub save_music_chunk: bool,
    /// Also write the re-packed `DPAK` container as `container.bin`.
    pub save_container: bool,
}

impl Default for ConvertConfig {
    fn default() -> ConvertConfig {
        ConvertConfig {
            module_name: String::from("Torus Module"),
            tracker_name: String::from("Torus Games -> XM"),
            file_stem: String::from("Torus"),
            default_tempo: 6,
            default_bpm: 125,
            linear_frequency_table: true,
            sample_panning: 128,
            sample_relative_note: 24,
            save_music_chunk: true,
            save_container: false,
        }
    }
}

impl ConvertConfig {
    pub fn song_file_name(&self, index: u32) -> String {
        format!("{}_{:02}.xm", self.file_stem, index)
    }
}

/// Outcome of converting one song.
pub struct SongReport {
    pub index: u32,
    pub path: PathBuf,
    pub result: Result<()>,
}

/// Outcome of converting one ROM. Songs fail independently.
pub struct RomReport {
    pub songs: Vec<SongReport>,
}

impl RomReport {
    pub fn converted(&self) -> usize {
        self.songs.iter().filter(|s| s.result.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &SongReport> {
        self.songs.iter().filter(|s| s.result.is_err())
    }
}

/// Converts every song in a ROM image into `out_dir`, which must exist.
///
/// A missing container or music chunk is returned as an error for which
/// [`Error::is_not_found`](crate::Error::is_not_found) holds. Failures of
/// individual songs are collected in the report.
pub fn convert_rom(rom: &[u8], out_dir: &Path, config: &ConvertConfig) -> Result<RomReport> {
    let container = DpakContainer::find(rom)?;
    debug!(chunks = container.chunks.len(), "found DPAK container");
    let music = container.music_chunk()?;

    if config.save_container {
        fs::write(out_dir.join("container.bin"), container.to_bytes())?;
    }
    if config.save_music_chunk {
        fs::write(out_dir.join("music.bin"), &music.data)?;
    }

    convert_music(&music.data, out_dir, config)
}

/// Converts every song of a `MUSC` chunk into `out_dir`.
pub fn convert_music(data: &[u8], out_dir: &Path, config: &ConvertConfig) -> Result<RomReport> {
    let musc = MuscFile::new(data)?;

    let mut songs = Vec::with_capacity(musc.song_count());
    for (idx, song) in musc.songs().enumerate() {
        let index = idx as u32;
        let path = out_dir.join(config.song_file_name(index));
        let result = song
            .and_then(|song| song_to_module(song, config))
            .and_then(|module| module.save(&path));

        match &result {
            Ok(()) => debug!(song = index, path = %path.display(), "wrote module"),
            Err(e) => warn!(song = index, error = %e, "song conversion failed"),
        }
        songs.push(SongReport {
            index,
            path,
            result,
        });
    }

    Ok(RomReport { songs })
}

/// Builds the XM module for one song: every parsed pattern, the order table,
/// and one single-sample instrument per sample descriptor.
pub fn song_to_module(song: RawSong, config: &ConvertConfig) -> Result<XmModule> {
    let name = format!("{} {}", config.module_name, song.index);
    let mut module = XmModule::new(&name, &config.tracker_name, song.channel_count);
    module.default_tempo = config.default_tempo;
    module.default_bpm = config.default_bpm;
    module.linear_frequency_table = config.linear_frequency_table;

    for pattern in &song.patterns {
        module.add_pattern(convert_pattern(pattern))?;
    }
    module.set_order(&song.order)?;

    for sample in song.samples {
        module.add_instrument(convert_sample(sample, config))?;
    }

    Ok(module)
}

fn convert_pattern(pattern: &RawPattern) -> XmPattern {
    let rows = pattern
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| XmNote {
                    note: cell.note,
                    instrument: cell.sample,
                    volume: 0,
                    effect_type: cell.effect_type,
                    effect_param: cell.effect_param,
                })
                .collect()
        })
        .collect();
    XmPattern { rows }
}

fn convert_sample(sample: RawSample, config: &ConvertConfig) -> XmInstrument {
    let mut instrument = XmInstrument::new(&format!("INSTRUMENT_{:02}", sample.id));

    let xm_sample = match sample.pcm {
        Some(pcm) if sample.length > 0 => XmSample {
            name: format!("SAMPLE_{:02}", sample.id),
            data: SampleData::Pcm8(pcm),
            volume: sample.volume,
            fine_tune: sample.pitch as i8,
            panning: config.sample_panning,
            relative_note: config.sample_relative_note,
            loop_type: if sample.loop_length > 1 {
                LoopType::Forward
            } else {
                LoopType::None
            },
            loop_start: sample.loop_start,
            loop_length: sample.loop_length,
        },
        _ => XmSample::silent(&format!("EMPTY_{:02}", sample.id), PLACEHOLDER_LENGTH),
    };
    instrument.samples.push(xm_sample);

    instrument
}
