//! Channel routing: default roles, downmix matrices, gains and layouts.

use crate::support::{drain, ramp};
use mixdown_engine::{
    ChannelStrip, ChannelType, Downmix, MemoryTrack, Mixer, MixerOptions, SampleSource,
};

fn options(channels: usize, frames: usize) -> MixerOptions {
    MixerOptions::default()
        .with_channels(channels)
        .with_rate(1000.0)
        .with_window(0.0, frames as f64 / 1000.0)
}

#[test]
fn downmix_two_tracks_to_one_channel() {
    let a = MemoryTrack::new("a", 1000.0, vec![0.25; 100]);
    let b = MemoryTrack::new("b", 1000.0, vec![0.5; 100]);
    let tracks: [&dyn SampleSource; 2] = [&a, &b];

    let downmix = Downmix::new(2, 1);
    assert!(downmix.get(0, 0));
    assert!(!downmix.get(1, 0));

    let mut mixer = Mixer::new(&tracks, options(1, 100).with_downmix(downmix)).unwrap();
    assert!(mixer.downmix().is_some());
    let out = drain(&mut mixer, 64, 1);
    assert_eq!(out.len(), 100);
    assert!(out.iter().all(|&s| s == 0.25));
}

#[test]
fn downmix_custom_matrix() {
    let a = MemoryTrack::new("a", 1000.0, vec![0.25; 100]);
    let b = MemoryTrack::new("b", 1000.0, vec![0.5; 100]);
    let tracks: [&dyn SampleSource; 2] = [&a, &b];

    let mut downmix = Downmix::new(2, 2);
    downmix.set(0, 0, false);
    downmix.set(0, 1, true);

    let mut mixer = Mixer::new(&tracks, options(2, 100).with_downmix(downmix)).unwrap();
    let out = drain(&mut mixer, 100, 2);
    for frame in out.chunks(2) {
        assert_eq!(frame, [0.0, 0.75]);
    }
}

#[test]
fn mono_tracks_sum_into_every_channel() {
    let a = MemoryTrack::new("a", 1000.0, vec![0.25; 50]);
    let b = MemoryTrack::new("b", 1000.0, vec![0.125; 50]);
    let tracks: [&dyn SampleSource; 2] = [&a, &b];
    let mut mixer = Mixer::new(&tracks, options(2, 50)).unwrap();

    let out = drain(&mut mixer, 64, 2);
    assert_eq!(out.len(), 100);
    assert!(out.iter().all(|&s| s == 0.375));
}

#[test]
fn stereo_track_keeps_sides_apart() {
    let (left, right) = MemoryTrack::stereo("st", 1000.0, vec![0.25; 80], vec![-0.5; 80]);
    assert_eq!(left.channel_group_size(), 2);
    let tracks: [&dyn SampleSource; 2] = [&left, &right];
    let mut mixer = Mixer::new(&tracks, options(2, 80)).unwrap();

    let out = drain(&mut mixer, 32, 2);
    assert_eq!(out.len(), 160);
    for frame in out.chunks(2) {
        assert_eq!(frame, [0.25, -0.5]);
    }
}

#[test]
fn right_channel_folds_into_single_output() {
    let track = MemoryTrack::new("r", 1000.0, vec![0.5; 10]).with_channel(ChannelType::Right);
    let tracks: [&dyn SampleSource; 1] = [&track];
    let mut mixer = Mixer::new(&tracks, options(1, 10)).unwrap();

    let out = drain(&mut mixer, 16, 1);
    assert_eq!(out, vec![0.5; 10]);
}

#[test]
fn pan_moves_mono_track() {
    let track = MemoryTrack::new("p", 1000.0, vec![1.0; 20]).with_strip(ChannelStrip {
        gain: 1.0,
        pan: -0.5,
    });
    let tracks: [&dyn SampleSource; 1] = [&track];
    let mut mixer = Mixer::new(&tracks, options(2, 20)).unwrap();

    let out = drain(&mut mixer, 20, 2);
    for frame in out.chunks(2) {
        assert_eq!(frame, [1.0, 0.5]);
    }
}

#[test]
fn planar_and_interleaved_agree() {
    let (left, right) = MemoryTrack::stereo("st", 1000.0, ramp(300), ramp(300));
    let right = right.with_strip(ChannelStrip {
        gain: 0.5,
        pan: 0.0,
    });
    let tracks: [&dyn SampleSource; 2] = [&left, &right];

    let mut interleaved = Mixer::new(&tracks, options(2, 300)).unwrap();
    let mut planar = Mixer::new(&tracks, options(2, 300).with_interleaved(false)).unwrap();
    assert!(planar.channel_buffer(1).is_some());
    assert!(interleaved.channel_buffer(1).is_none());

    loop {
        let n = interleaved.process(128).unwrap();
        assert_eq!(planar.process(128).unwrap(), n);
        if n == 0 {
            break;
        }
        let mixed = interleaved.buffer().as_f32().unwrap();
        let l = planar.channel_buffer(0).unwrap().as_f32().unwrap();
        let r = planar.channel_buffer(1).unwrap().as_f32().unwrap();
        for i in 0..n {
            assert_eq!(mixed[2 * i], l[i]);
            assert_eq!(mixed[2 * i + 1], r[i]);
        }
    }
}
