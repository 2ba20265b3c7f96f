use anyhow::{Context, Result};
use std::env;
use std::fs;
use torusxm::format::musc::{self, MuscFile};
use torusxm::DpakContainer;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut x = env::args();
    x.next();
    let filename = x.next().context("usage: muscdump <rom>")?;

    let rom = fs::read(&filename).with_context(|| format!("reading {}", filename))?;
    let container = DpakContainer::find(&rom)?;
    let music = container.music_chunk()?;
    let file = MuscFile::new(&music.data)?;

    println!(
        "{}: {} chunks, {} songs",
        filename,
        container.chunks.len(),
        file.song_count()
    );
    for song in file.songs() {
        match song {
            Ok(song) => println!("\n{}", musc::info_song(&song)),
            Err(e) => println!("\nError: {}", e),
        }
    }
    Ok(())
}
