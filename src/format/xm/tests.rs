use super::write::pad_ascii;
use super::*;
use std::convert::TryFrom;

const PATTERNS_START: usize = 336;

fn u16_at(data: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([data[pos], data[pos + 1]])
}

fn u32_at(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn sample(data: SampleData) -> XmSample {
    XmSample {
        name: String::from("SAMPLE_00"),
        data,
        volume: 0x30,
        fine_tune: -3,
        panning: 128,
        relative_note: 24,
        loop_type: LoopType::Forward,
        loop_start: 2,
        loop_length: 4,
    }
}

#[test]
fn header_layout() {
    let mut module = XmModule::new("Torus Module 3", "Torus Games -> XM", 4);
    module.set_order(&[2, 0, 1]).unwrap();
    module.add_pattern(XmPattern::empty(64, 4)).unwrap();
    module.add_instrument(XmInstrument::new("INSTRUMENT_00")).unwrap();

    let data = module.to_bytes().unwrap();
    assert_eq!(&data[..17], b"Extended Module: ");
    assert_eq!(&data[17..31], b"Torus Module 3");
    assert!(data[31..37].iter().all(|&b| b == 0));
    assert_eq!(data[37], 0x1a);
    assert_eq!(&data[38..55], b"Torus Games -> XM");
    assert_eq!(&data[58..60], &[0x04, 0x01]);
    assert_eq!(u32_at(&data, 60), 276);

    assert_eq!(u16_at(&data, 64), 3); // song length
    assert_eq!(u16_at(&data, 66), 0); // restart
    assert_eq!(u16_at(&data, 68), 4); // channels
    assert_eq!(u16_at(&data, 70), 1); // patterns
    assert_eq!(u16_at(&data, 72), 1); // instruments
    assert_eq!(u16_at(&data, 74), 1); // linear frequencies
    assert_eq!(u16_at(&data, 76), 6);
    assert_eq!(u16_at(&data, 78), 125);

    assert_eq!(&data[80..83], &[2, 0, 1]);
    assert!(data[83..PATTERNS_START].iter().all(|&b| b == 0));
}

#[test]
fn names_are_truncated_and_ascii_only() {
    assert_eq!(pad_ascii("abc", 5), b"abc\0\0");
    assert_eq!(pad_ascii("abcdefgh", 5), b"abcde");
    assert_eq!(pad_ascii("aé b", 5), b"a b\0\0");
    assert_eq!(pad_ascii("", 2), b"\0\0");
}

#[test]
fn set_order_zero_fills_tail() {
    let mut module = XmModule::new("", "", 1);
    module.set_order(&[7; 10]).unwrap();
    module.set_order(&[1, 2]).unwrap();
    assert_eq!(module.order(), &[1, 2]);
    assert_eq!(module.song_length(), 2);

    let data = module.to_bytes().unwrap();
    assert_eq!(&data[80..82], &[1, 2]);
    assert!(data[82..PATTERNS_START].iter().all(|&b| b == 0));

    module.set_order(&[0; 256]).unwrap();
    assert_eq!(module.song_length(), 256);
}

#[test]
fn rejects_order_over_256() {
    let mut module = XmModule::new("", "", 1);
    assert_eq!(
        module.set_order(&[0; 257]),
        Err(ValidationError::OrderTooLong(257))
    );
}

#[test]
fn rejects_bad_patterns() {
    let mut module = XmModule::new("", "", 2);

    assert_eq!(
        module.add_pattern(XmPattern::empty(0, 2)),
        Err(ValidationError::InvalidRowCount(0))
    );
    assert_eq!(
        module.add_pattern(XmPattern::empty(257, 2)),
        Err(ValidationError::InvalidRowCount(257))
    );

    let mut pattern = XmPattern::empty(8, 2);
    pattern.rows[5].pop();
    assert_eq!(
        module.add_pattern(pattern),
        Err(ValidationError::ChannelMismatch {
            row: 5,
            found: 1,
            expected: 2
        })
    );

    let mut wide = XmModule::new("", "", 255);
    assert_eq!(
        wide.add_pattern(XmPattern::empty(256, 255)),
        Err(ValidationError::PatternTooLarge(256 * 255 * 5))
    );

    assert!(module.add_pattern(XmPattern::empty(256, 2)).is_ok());
    assert!(module.add_pattern(XmPattern::empty(1, 2)).is_ok());
    assert_eq!(module.patterns().len(), 2);
}

#[test]
fn rejects_more_than_128_samples() {
    let mut module = XmModule::new("", "", 1);
    let mut instrument = XmInstrument::new("big");
    instrument.samples = vec![XmSample::silent("s", 1); 129];
    assert_eq!(
        module.add_instrument(instrument.clone()),
        Err(ValidationError::TooManySamples(129))
    );

    instrument.samples.pop();
    assert!(module.add_instrument(instrument).is_ok());
}

#[test]
fn pattern_cells_are_unpacked() {
    let mut module = XmModule::new("", "", 2);
    let mut pattern = XmPattern::empty(2, 2);
    pattern.rows[0][1] = XmNote {
        note: 49,
        instrument: 1,
        volume: 0,
        effect_type: 0x0c,
        effect_param: 0x20,
    };
    pattern.rows[1][0] = XmNote {
        effect_type: 0x0f,
        effect_param: 0x06,
        ..Default::default()
    };
    module.add_pattern(pattern).unwrap();

    let data = module.to_bytes().unwrap();
    let p = &data[PATTERNS_START..];
    assert_eq!(u32_at(p, 0), 9);
    assert_eq!(p[4], 0);
    assert_eq!(u16_at(p, 5), 2);
    assert_eq!(u16_at(p, 7), 20);
    assert_eq!(p.len(), 9 + 20);
    assert_eq!(&p[9..14], &[0; 5]);
    assert_eq!(&p[14..19], &[49, 1, 0, 0x0c, 0x20]);
    assert_eq!(&p[19..24], &[0, 0, 0, 0x0f, 0x06]);
    assert_eq!(&p[24..29], &[0; 5]);
}

#[test]
fn instrument_without_samples_has_no_extra_header() {
    let mut module = XmModule::new("", "", 1);
    module.add_instrument(XmInstrument::new("EMPTY")).unwrap();

    let data = module.to_bytes().unwrap();
    let inst = &data[PATTERNS_START..];
    assert_eq!(inst.len(), 29);
    assert_eq!(u32_at(inst, 0), 29);
    assert_eq!(&inst[4..9], b"EMPTY");
    assert_eq!(inst[26], 0);
    assert_eq!(u16_at(inst, 27), 0);
}

#[test]
fn instrument_extra_header_describes_itself() {
    let mut instrument = XmInstrument::new("INSTRUMENT_01");
    instrument.sample_for_note[95] = 3;
    instrument.volume_envelope = XmEnvelope {
        points: vec![(0, 64), (16, 32), (32, 0)],
        sustain_point: 1,
        loop_start: 0,
        loop_end: 2,
        enabled: true,
        sustain_enabled: true,
        loop_enabled: false,
    };
    instrument.panning_envelope.points = vec![(0, 32); 14];
    instrument.panning_envelope.loop_enabled = true;
    instrument.vibrato_depth = 7;
    instrument.volume_fadeout = 0x0400;
    instrument.samples.push(sample(SampleData::Pcm8(vec![1, 2, 3, 4])));

    let mut module = XmModule::new("", "", 1);
    module.add_instrument(instrument).unwrap();
    let data = module.to_bytes().unwrap();
    let inst = &data[PATTERNS_START..];

    assert_eq!(u32_at(inst, 0), 243);
    assert_eq!(u16_at(inst, 27), 1);

    let extra = &inst[29..243];
    assert_eq!(u32_at(extra, 0), 214);
    assert_eq!(extra[4 + 95], 3);
    let vol_points = &extra[100..148];
    assert_eq!(u16_at(vol_points, 4), 16);
    assert_eq!(u16_at(vol_points, 6), 32);
    assert!(vol_points[12..].iter().all(|&b| b == 0));
    let pan_points = &extra[148..196];
    assert_eq!(u16_at(pan_points, 44), 0);
    assert_eq!(u16_at(pan_points, 46), 32);

    assert_eq!(extra[196], 3); // volume points
    assert_eq!(extra[197], 12); // panning points, capped
    assert_eq!(&extra[198..201], &[1, 0, 2]);
    assert_eq!(extra[204], 0b011);
    assert_eq!(extra[205], 0b100);
    assert_eq!(extra[208], 7);
    assert_eq!(u16_at(extra, 210), 0x0400);
    assert_eq!(u16_at(extra, 212), 0);

    // sample header then delta data
    let header = &inst[243..283];
    assert_eq!(u32_at(header, 0), 4);
    assert_eq!(u32_at(header, 4), 2);
    assert_eq!(u32_at(header, 8), 4);
    assert_eq!(header[12], 0x30);
    assert_eq!(header[13] as i8, -3);
    assert_eq!(header[14], 0x01);
    assert!(matches!(
        LoopType::try_from(header[14] & 0x03),
        Ok(LoopType::Forward)
    ));
    assert_eq!(header[15], 128);
    assert_eq!(header[16], 24);
    assert_eq!(header[17], 0);
    assert_eq!(&header[18..27], b"SAMPLE_00");

    assert_eq!(&inst[283..], &[1, 1, 1, 1]);
}

#[test]
fn sixteen_bit_sample_header_and_data() {
    let mut instrument = XmInstrument::new("wide");
    let mut s = sample(SampleData::Pcm16(vec![1000, -1000, 32767, -32768]));
    s.loop_type = LoopType::PingPong;
    instrument.samples.push(s);

    let mut module = XmModule::new("", "", 1);
    module.add_instrument(instrument).unwrap();
    let data = module.to_bytes().unwrap();
    let header = &data[PATTERNS_START + 243..];

    assert_eq!(u32_at(header, 0), 8);
    assert_eq!(header[14], 0x12);

    let pcm = &header[40..];
    assert_eq!(pcm.len(), 8);
    let deltas: Vec<i16> = pcm
        .chunks(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(deltas, delta_encode_16(&[1000, -1000, 32767, -32768]));
}

#[test]
fn delta_8_clamps_and_tracks_clamped_reference() {
    let pcm = [0, 127, -128, -128, 10];
    let deltas = delta_encode_8(&pcm);
    assert_eq!(deltas, vec![0, 127, -128, -127, 127]);

    let reference: Vec<i16> = deltas
        .iter()
        .scan(0i16, |acc, &d| {
            *acc += d as i16;
            Some(*acc)
        })
        .collect();
    // -128 is reached one sample late, 10 is undershot
    assert_eq!(reference, vec![0, 127, -1, -128, -1]);
}

#[test]
fn delta_8_small_steps_are_exact() {
    assert_eq!(delta_encode_8(&[5, 125, 5]), vec![5, 120, -120]);
    assert_eq!(delta_encode_8(&[-100, 27, -100]), vec![-100, 127, -127]);
    assert!(delta_encode_8(&[]).is_empty());
}

#[test]
fn delta_16_is_lossless() {
    let pcm = [0, 32767, -32768, 12, -12, 0];
    let deltas = delta_encode_16(&pcm);
    assert_eq!(deltas[1], 32767);
    assert_eq!(deltas[2], 1); // -32768 - 32767 wraps

    let mut acc = 0i16;
    let decoded: Vec<i16> = deltas
        .iter()
        .map(|&d| {
            acc = acc.wrapping_add(d);
            acc
        })
        .collect();
    assert_eq!(decoded, pcm.to_vec());
}

#[test]
fn silent_sample() {
    let s = XmSample::silent("EMPTY_03", 100);
    assert_eq!(s.volume, 0);
    assert_eq!(s.data.len(), 100);
    assert_eq!(s.type_flags(), 0);
    assert_eq!(delta_encode_8(&[0; 4]), vec![0; 4]);
}
