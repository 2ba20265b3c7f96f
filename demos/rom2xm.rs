use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::Path;
use torusxm::{convert_rom, ConvertConfig};

fn convert_file(filename: &str, config: &ConvertConfig) -> Result<()> {
    let path = Path::new(filename);
    let rom = fs::read(path).with_context(|| format!("reading {}", filename))?;

    let stem = path.file_stem().context("input has no file name")?;
    let out_dir = path.with_file_name(stem);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    match convert_rom(&rom, &out_dir, config) {
        Ok(report) => {
            println!(
                "{}: {}/{} songs converted",
                filename,
                report.converted(),
                report.songs.len()
            );
            for song in report.failed() {
                if let Err(e) = &song.result {
                    println!("  song {:02}: {}", song.index, e);
                }
            }
        }
        Err(e) if e.is_not_found() => {
            println!("{}: {}, skipped", filename, e);
            let _ = fs::remove_dir(&out_dir);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let filenames: Vec<String> = env::args().skip(1).collect();
    if filenames.is_empty() {
        anyhow::bail!("usage: rom2xm <rom>...");
    }

    let config = ConvertConfig::default();
    let mut failures = 0;
    for filename in &filenames {
        if let Err(e) = convert_file(filename, &config) {
            println!("{}: error: {:#}", filename, e);
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} files failed", failures, filenames.len());
    }
    Ok(())
}
