use super::*;

static NOTE_NAMES: [&str; 12] = [
    "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
];

pub fn info_song(song: &RawSong) -> String {
    let mut ret = format!(
        "Song {:02}: version {}, {} channels, {} patterns declared\n",
        song.index,
        String::from_utf8_lossy(&song.version),
        song.channel_count,
        song.pattern_count
    );

    // samples

    ret.push_str("\nSamples:\n");
    ret.push_str(&info_samples(&song.samples));

    // sequence

    ret.push_str("\n\nSequence:\n");
    ret.push_str(&info_sequence(&song.order, song.patterns.len()));

    // patterns

    ret.push_str("\n\n");

    for (idx, pattern) in song.patterns.iter().enumerate() {
        ret.push_str(&format!("Pattern {:>02x}:\n", idx));
        ret.push_str(&info_pattern(pattern));
        ret.push('\n');
    }

    ret
}

fn info_samples(samples: &[RawSample]) -> String {
    let samples_strs: Vec<_> = samples
        .iter()
        .filter(|sample| !sample.is_placeholder())
        .map(|sample| {
            format!(
                "{:>02x} off: {:>06x}, len: {:>04x}, pitch: {:>02x}, vol: {:>02x}, loop: {:>04x}+{:>04x}",
                sample.id + 1,
                sample.pcm_offset,
                sample.length,
                sample.pitch,
                sample.volume,
                sample.loop_start,
                sample.loop_length
            )
        })
        .collect();
    samples_strs.join("\n")
}

/// Order table, eight positions per line, each line led by its first position.
/// Indices the song never parsed a pattern for are marked with `!`.
fn info_sequence(order: &[u8], num_patterns: usize) -> String {
    let row_strs: Vec<_> = order
        .chunks(8)
        .enumerate()
        .map(|(row, pats)| {
            let pat_strs: Vec<_> = pats
                .iter()
                .map(|&pat| {
                    let mark = if (pat as usize) < num_patterns { ' ' } else { '!' };
                    format!("{:>02x}{}", pat, mark)
                })
                .collect();
            format!("{:>02x}: {}", row * 8, pat_strs.join(" ").trim_end())
        })
        .collect();
    row_strs.join("\n")
}

fn info_pattern(pattern: &RawPattern) -> String {
    let mut ret = String::new();
    for (idx, row) in pattern.rows.iter().enumerate() {
        ret.push_str(&format!("{:>02x}      ", idx));
        let channel_strs: Vec<_> = row.iter().map(info_cell).collect();
        ret.push_str(&channel_strs.join("      "));
        ret.push('\n');
    }
    ret
}

fn info_cell(cell: &RawCell) -> String {
    if cell.is_empty() {
        String::from("...........")
    } else {
        format!(
            "{:>02x}|{}|{:1x}{:02x}",
            cell.sample,
            note_name(cell.note),
            cell.effect_type,
            cell.effect_param
        )
    }
}

fn note_name(note: u8) -> String {
    match note {
        0 => String::from("---"),
        1..=96 => {
            let n = (note - 1) as usize;
            format!("{}{}", NOTE_NAMES[n % 12], n / 12)
        }
        _ => format!("?{:02x}", note),
    }
}
