//! Converts the music stored in Torus Games ROM images to XM modules.
//!
//! The pipeline has three stages, each usable on its own:
//!
//! 1. [`format::dpak`] finds the `DPAK` container in a ROM and extracts its chunks.
//! 2. [`format::musc`] parses the `MUSC` chunk into one [`RawSong`] per song.
//! 3. [`format::xm`] builds an [`XmModule`] and serializes it as FastTracker 2 XM 1.04.
//!
//! [`convert`] ties the stages together for a whole ROM.

pub mod convert;
pub mod error;
pub mod format;

pub use convert::{convert_rom, song_to_module, ConvertConfig, RomReport, SongReport};
pub use error::{Error, Result, ValidationError};
pub use format::dpak::{Chunk, DpakContainer};
pub use format::musc::{MuscFile, RawCell, RawPattern, RawSample, RawSong};
pub use format::xm::{XmInstrument, XmModule, XmNote, XmPattern, XmSample};
