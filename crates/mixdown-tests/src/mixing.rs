//! End-to-end mixing: timing, direction, rate conversion and repositioning.

use crate::support::{count_frames, drain, ramp, FlakyTrack};
use mixdown_core::{Envelope, MixError};
use mixdown_engine::{MemoryTrack, Mixer, MixerOptions, SampleSource, Warp};

fn mono(rate: f64, t0: f64, t1: f64) -> MixerOptions {
    MixerOptions::default()
        .with_channels(1)
        .with_rate(rate)
        .with_window(t0, t1)
}

#[test]
fn same_rate_forward_reproduces_samples() {
    let samples = ramp(44100);
    let track = MemoryTrack::new("a", 44100.0, samples.clone());
    let tracks: [&dyn SampleSource; 1] = [&track];
    let mut mixer = Mixer::new(&tracks, mono(44100.0, 0.0, 1.0)).unwrap();

    assert_eq!(drain(&mut mixer, 512, 1), samples);
}

#[test]
fn same_rate_reverse_reproduces_reversed_samples() {
    let samples = ramp(44100);
    let track = MemoryTrack::new("a", 44100.0, samples.clone());
    let tracks: [&dyn SampleSource; 1] = [&track];
    let mut mixer = Mixer::new(&tracks, mono(44100.0, 1.0, 0.0)).unwrap();

    let mut expected = samples;
    expected.reverse();
    assert_eq!(drain(&mut mixer, 512, 1), expected);
    assert_eq!(mixer.current_time(), 0.0);
}

#[test]
fn mixed_rates_fill_the_window() {
    let a = MemoryTrack::new("a", 44100.0, vec![0.25; 44100]);
    let b = MemoryTrack::new("b", 48000.0, vec![0.25; 48000]);
    let tracks: [&dyn SampleSource; 2] = [&a, &b];
    let mut mixer = Mixer::new(&tracks, mono(44100.0, 0.0, 1.0)).unwrap();

    let total = count_frames(&mut mixer, 512);
    assert!((total as i64 - 44100).abs() <= 1, "got {total} frames");
}

#[test]
fn reverse_resampled_track_fills_the_window() {
    let track = MemoryTrack::new("b", 48000.0, ramp(48000));
    let tracks: [&dyn SampleSource; 1] = [&track];
    let mut mixer = Mixer::new(&tracks, mono(44100.0, 1.0, 0.0)).unwrap();

    let mut total = 0;
    loop {
        let n = mixer.process(512).unwrap();
        let t = mixer.current_time();
        assert!((0.0..=1.0).contains(&t));
        if n == 0 {
            break;
        }
        total += n;
    }
    assert!((total as i64 - 44100).abs() <= 1, "got {total} frames");
}

#[test]
fn blocks_never_exceed_request_or_buffer_size() {
    let a = MemoryTrack::new("a", 44100.0, ramp(20000));
    let b = MemoryTrack::new("b", 22050.0, ramp(10000));
    let tracks: [&dyn SampleSource; 2] = [&a, &b];
    let options = mono(44100.0, 0.0, 1.0).with_buffer_size(700);
    let mut mixer = Mixer::new(&tracks, options).unwrap();

    for request in [1, 64, 699, 700, 701, 5000, 0, 333].iter().cycle().take(200) {
        let n = mixer.process(*request).unwrap();
        assert!(n <= *request);
        assert!(n <= 700);
    }
}

#[test]
fn speed_envelope_shortens_output() {
    let track = MemoryTrack::new("a", 44100.0, vec![0.5; 44100]);
    let tracks: [&dyn SampleSource; 1] = [&track];
    let speed = Envelope::new(2.0, 0.5, 4.0);
    let options = mono(44100.0, 0.0, 1.0).with_warp(Warp::Envelope(speed));
    let mut mixer = Mixer::new(&tracks, options).unwrap();
    assert!(mixer.resample_parameters().variable_rates);

    let total = count_frames(&mut mixer, 1024);
    assert!((total as i64 - 22050).abs() <= 1, "got {total} frames");
}

#[test]
fn varying_speed_envelope_in_both_directions() {
    // Unit speed for the first half second, then a ramp up to triple speed.
    let speed = Envelope::new(1.0, 0.5, 4.0)
        .with_point(0.0, 1.0)
        .with_point(0.5, 1.0)
        .with_point(1.0, 3.0);
    // ∫ 1/speed over [0, 1] = 0.5 + ln(3) / 4
    let expected = 44100.0 * (0.5 + 3.0f64.ln() / 4.0);

    let track = MemoryTrack::new("a", 44100.0, ramp(44100));
    let tracks: [&dyn SampleSource; 1] = [&track];
    for (t0, t1) in [(0.0, 1.0), (1.0, 0.0)] {
        let options = mono(44100.0, t0, t1).with_warp(Warp::Envelope(speed.clone()));
        let mut mixer = Mixer::new(&tracks, options).unwrap();

        let total = count_frames(&mut mixer, 1000);
        assert!(
            (total as f64 - expected).abs() <= 1.0,
            "window [{t0}, {t1}): got {total} frames, expected {expected:.1}"
        );
        assert_eq!(mixer.current_time(), t1);
    }
}

#[test]
fn reposition_matches_fresh_session() {
    let track = MemoryTrack::new("b", 48000.0, ramp(96000));
    let tracks: [&dyn SampleSource; 1] = [&track];
    let options = mono(44100.0, 0.0, 2.0).with_buffer_size(512);

    let mut moved = Mixer::new(&tracks, options.clone()).unwrap();
    for _ in 0..5 {
        moved.process(512).unwrap();
    }
    moved.reposition(0.5, true);
    assert_eq!(moved.current_time(), 0.5);
    assert_eq!(moved.queued(0), Some(0));

    let mut fresh = Mixer::new(&tracks, options.with_window(0.5, 2.0)).unwrap();
    assert_eq!(drain(&mut moved, 512, 1), drain(&mut fresh, 512, 1));
}

#[test]
fn reposition_same_rate_matches_fresh_session() {
    let track = MemoryTrack::new("a", 1000.0, ramp(3000));
    let tracks: [&dyn SampleSource; 1] = [&track];
    let options = mono(1000.0, 0.0, 3.0).with_buffer_size(128);

    let mut moved = Mixer::new(&tracks, options.clone()).unwrap();
    moved.process(128).unwrap();
    moved.reposition(1.25, false);

    let mut fresh = Mixer::new(&tracks, options.with_window(1.25, 3.0)).unwrap();
    let expected = drain(&mut fresh, 128, 1);
    assert_eq!(expected.len(), 1750);
    assert_eq!(drain(&mut moved, 128, 1), expected);
}

#[test]
fn set_times_and_speed_restarts_window() {
    let samples = ramp(1000);
    let track = MemoryTrack::new("a", 100.0, samples.clone());
    let tracks: [&dyn SampleSource; 1] = [&track];
    let mut mixer = Mixer::new(&tracks, mono(100.0, 0.0, 10.0)).unwrap();
    mixer.process(300).unwrap();

    mixer.set_times_and_speed(5.0, 2.0, -1.0, true);
    assert_eq!(mixer.speed(), 1.0);
    assert_eq!(mixer.current_time(), 5.0);

    let out = drain(&mut mixer, 64, 1);
    let expected: Vec<f32> = samples[200..500].iter().rev().copied().collect();
    assert_eq!(out, expected);
}

#[test]
fn keyboard_scrub_reverses_from_start_time() {
    let samples = ramp(44100);
    let track = MemoryTrack::new("a", 44100.0, samples.clone());
    let tracks: [&dyn SampleSource; 1] = [&track];
    let options = mono(44100.0, 0.0, 1.0)
        .with_warp(Warp::range(0.5, 2.0, 1.0))
        .with_high_quality(false);
    let mut mixer = Mixer::new(&tracks, options).unwrap();
    mixer.process(1024).unwrap();
    mixer.process(1024).unwrap();

    mixer.set_speed_for_keyboard_scrubbing(-1.0, 0.5);
    assert!(mixer.range().is_backwards());

    let out = drain(&mut mixer, 1024, 1);
    let expected: Vec<f32> = samples[..22050].iter().rev().copied().collect();
    assert_eq!(out, expected);
}

#[test]
fn failed_reads_become_silence() {
    let samples = ramp(1000);
    let track = FlakyTrack {
        inner: MemoryTrack::new("flaky", 100.0, samples.clone()),
        fail_from: 300,
        fail_to: 400,
    };
    let tracks: [&dyn SampleSource; 1] = [&track];
    let options = mono(100.0, 0.0, 10.0).with_buffer_size(100);
    let mut mixer = Mixer::new(&tracks, options).unwrap();

    let out = drain(&mut mixer, 100, 1);
    assert_eq!(out.len(), 1000);
    assert_eq!(&out[..300], &samples[..300]);
    assert!(out[300..400].iter().all(|&s| s == 0.0));
    assert_eq!(&out[400..], &samples[400..]);
}

#[test]
fn strict_mode_reports_failed_read() {
    let track = FlakyTrack {
        inner: MemoryTrack::new("flaky", 100.0, ramp(1000)),
        fail_from: 300,
        fail_to: 400,
    };
    let tracks: [&dyn SampleSource; 1] = [&track];
    let options = mono(100.0, 0.0, 10.0)
        .with_buffer_size(100)
        .with_may_throw(true);
    let mut mixer = Mixer::new(&tracks, options).unwrap();

    for _ in 0..3 {
        assert_eq!(mixer.process(100).unwrap(), 100);
    }
    match mixer.process(100) {
        Err(MixError::Read { track, position, .. }) => {
            assert_eq!(track, "flaky");
            assert_eq!(position, 300);
        }
        other => panic!("expected a read error, got {other:?}"),
    }
}

#[test]
fn clip_gaps_and_gain_envelope() {
    let gain = Envelope::new(1.0, 0.0, 1.0)
        .with_point(0.0, 0.0)
        .with_point(1.0, 1.0);
    let track = MemoryTrack::empty("clips", 10.0)
        .with_clip(0, vec![1.0; 4])
        .with_clip(6, vec![1.0; 4])
        .with_envelope(gain);
    let tracks: [&dyn SampleSource; 1] = [&track];
    let mut mixer = Mixer::new(&tracks, mono(10.0, 0.0, 1.0)).unwrap();

    let out = drain(&mut mixer, 64, 1);
    let expected = [0.0, 0.1, 0.2, 0.3, 0.0, 0.0, 0.6, 0.7, 0.8, 0.9];
    assert_eq!(out.len(), expected.len());
    for (got, want) in out.iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "{got} != {want}");
    }
}
