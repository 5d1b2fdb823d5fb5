//! Output formats, dithering and configuration round trips through JSON.

use crate::support::count_frames;
use mixdown_core::{Result, SampleFormat};
use mixdown_engine::{MemoryTrack, Mixer, MixerOptions, SampleSource, ToneTrack};

#[test]
fn int16_output_without_dither() {
    let track = MemoryTrack::new("a", 1000.0, vec![0.5; 100]);
    let tracks: [&dyn SampleSource; 1] = [&track];
    let options = MixerOptions::default()
        .with_channels(2)
        .with_rate(1000.0)
        .with_format(SampleFormat::Int16)
        .with_high_quality(false);
    let mut mixer = Mixer::new(&tracks, options).unwrap();

    let n = mixer.process(100).unwrap();
    assert_eq!(n, 100);
    let out = mixer.buffer().as_i16().unwrap();
    assert!(out[..2 * n].iter().all(|&s| s == 16384));
    assert_eq!(mixer.buffer().as_bytes().len(), 2 * 2 * mixer.buffer_size());
}

#[test]
fn int24_output_clips_overload() {
    let a = MemoryTrack::new("a", 1000.0, vec![0.75; 10]);
    let b = MemoryTrack::new("b", 1000.0, vec![0.75; 10]);
    let tracks: [&dyn SampleSource; 2] = [&a, &b];
    let options = MixerOptions::default()
        .with_channels(1)
        .with_rate(1000.0)
        .with_format(SampleFormat::Int24)
        .with_high_quality(false);
    let mut mixer = Mixer::new(&tracks, options).unwrap();

    let n = mixer.process(64).unwrap();
    assert_eq!(n, 10);
    let out = mixer.buffer().as_i24().unwrap();
    assert!(out[..n].iter().all(|&s| s == 8_388_607));
}

#[test]
fn shaped_dither_stays_near_signal() {
    let tone = ToneTrack {
        amplitude: 0.25,
        ..ToneTrack::new(44100.0, 1000.0, 0.1)
    };
    let tracks: [&dyn SampleSource; 1] = [&tone];
    let options = MixerOptions::default()
        .with_channels(1)
        .with_format(SampleFormat::Int16)
        .with_high_quality(true);
    let mut mixer = Mixer::new(&tracks, options).unwrap();

    let n = mixer.process(4096).unwrap();
    assert_eq!(n, 4096);
    let mut clean = vec![0.0f32; n];
    tone.get_floats(0, &mut clean).unwrap();
    for (i, &want) in clean.iter().enumerate() {
        let got = mixer.buffer().sample_f32(i).unwrap();
        assert!((got - want).abs() < 4.0 / 32768.0, "sample {i}");
    }
}

#[test]
fn tone_track_renders_its_duration() {
    let tone = ToneTrack::new(22050.0, 440.0, 0.5);
    let tracks: [&dyn SampleSource; 1] = [&tone];
    let options = MixerOptions::default().with_rate(44100.0).with_high_quality(false);
    let mut mixer = Mixer::new(&tracks, options).unwrap();

    let total = count_frames(&mut mixer, 1000);
    assert!((total as i64 - 22050).abs() <= 2, "got {total} frames");
}

#[test]
fn options_survive_json() -> Result<()> {
    let options = MixerOptions::default()
        .with_channels(1)
        .with_window(2.0, 0.5)
        .with_format(SampleFormat::Int24)
        .with_may_throw(true);
    let restored = MixerOptions::from_json(&options.to_json()?)?;
    assert_eq!(restored, options);

    let tracks_json = r#"[{ "name": "hum", "frequency": 60.0, "duration": 0.25 }]"#;
    let tones: Vec<ToneTrack> = serde_json::from_str(tracks_json)
        .map_err(|e| mixdown_core::MixError::Serialization(e.to_string()))?;
    assert_eq!(tones[0].rate, 44100.0);
    assert_eq!(tones[0].name, "hum");
    Ok(())
}
