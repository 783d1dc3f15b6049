//! End-to-end playback through the command actor, rendered with a
//! `PullSink` so positions are exact.

mod common;

use common::{SyntheticDecoder, TestEngine, start_engine, wait_until};
use sample_player_lib::audio::playback::pipeline::volume_to_gain;
use sample_player_lib::{EventKind, LoadKind, PlaybackError, PlaybackRegion, PlaybackState, RepeatMode};
use std::sync::Arc;
use std::time::Duration;

const TONE: &str = "tone.wav";

/// 10 000 samples whose value encodes their index.
fn ramp_decoder() -> Arc<SyntheticDecoder> {
    let decoder = SyntheticDecoder::new();
    decoder.add_wave(TONE, (0..10_000).map(|i| i as f32 / 10_000.0).collect(), 10_000);
    decoder
}

fn ramp_value(index: u64) -> f32 {
    index as f32 / 10_000.0
}

fn loaded_engine() -> TestEngine {
    let engine = start_engine(ramp_decoder());
    engine.preload(TONE);
    engine
}

#[test]
fn play_before_metadata_reports_not_loaded_then_succeeds() {
    let engine = start_engine(ramp_decoder());
    let manager = engine.context.manager();

    let err = manager.play_wave_by_path(TONE, false, None, None).unwrap_err();
    assert!(matches!(err, PlaybackError::NotLoadedYet { ref path } if path == TONE));
    assert!(err.is_retryable());
    assert!(!manager.is_playing());

    assert!(engine.events.wait_for(EventKind::MetadataLoaded, TONE).is_some());
    manager.play_wave_by_path(TONE, false, None, None).expect("second attempt plays");
    assert!(manager.is_playing());
    assert_eq!(manager.current_path().as_deref(), Some(TONE));
}

#[test]
fn off_mode_finishes_exactly_at_bounds_end() {
    let engine = loaded_engine();
    let manager = engine.context.manager();
    manager.play_wave_by_path(TONE, false, None, None).expect("plays");
    assert_eq!(manager.current_position(), Some(0));

    let rendered = engine.render(10_000);
    assert_eq!(rendered[0], ramp_value(0));
    assert_eq!(rendered[9_999], ramp_value(9_999));
    assert_eq!(manager.current_position(), Some(10_000));
    assert_eq!(manager.current_progress(), 1.0);
    assert!(manager.is_playing());

    // The next pull comes up short and ends the stream.
    engine.render(512);
    let finished = engine.events.wait_for(EventKind::Finished, TONE).expect("finished event");
    assert_eq!(finished.progress, 1.0);
    assert_eq!(finished.position, 10_000);
    assert_eq!(finished.duration, 10_000);
    assert!(!manager.is_playing());
    assert!(!manager.is_paused());
    assert_eq!(manager.current_path(), None);
    assert_eq!(manager.remembered_cursor(TONE), Some(0));

    let progress: Vec<f64> = engine
        .events
        .of_kind(EventKind::Progress)
        .iter()
        .map(|event| event.progress)
        .collect();
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn slice_repeat_loops_inside_the_selected_slice() {
    let engine = loaded_engine();
    let manager = engine.context.manager();

    // 10 samples per bin: markers at samples 3000 and 7000.
    let mut state = PlaybackState::new(TONE, 0, 10_000).with_repeat_mode(RepeatMode::Slice);
    state
        .update_bounds_and_slices(0, 10_000, &[300, 700], 10.0)
        .expect("valid bounds");
    state.navigate_to_slice(1).expect("slice exists");
    manager.play_with_state(&state).expect("plays");

    let current = manager.get_current_wave().expect("query").expect("a wave is playing");
    assert_eq!(current.region, PlaybackRegion::new(3_000, 7_000, true));
    assert_eq!((current.bounds_start, current.bounds_end), (0, 10_000));
    assert_eq!(manager.current_position(), Some(3_000));

    let rendered = engine.render(4_000);
    assert_eq!(rendered[0], ramp_value(3_000));
    assert_eq!(rendered[3_999], ramp_value(6_999));
    assert_eq!(manager.current_position(), Some(3_000));
    assert_eq!(manager.current_progress(), 0.0);

    let rendered = engine.render(2_000);
    assert_eq!(rendered[0], ramp_value(3_000));
    assert_eq!(manager.current_position(), Some(5_000));
    assert_eq!(manager.current_progress(), 0.5);

    std::thread::sleep(Duration::from_millis(30));
    assert!(manager.is_playing());
    assert_eq!(engine.events.count(EventKind::Finished, TONE), 0);
}

#[test]
fn switching_to_an_earlier_slice_starts_at_its_first_sample() {
    let engine = loaded_engine();
    let manager = engine.context.manager();

    let mut state = PlaybackState::new(TONE, 0, 10_000).with_repeat_mode(RepeatMode::Slice);
    state
        .update_bounds_and_slices(0, 10_000, &[300, 700], 10.0)
        .expect("valid bounds");
    state.navigate_to_slice(2).expect("slice exists");
    manager.play_with_state(&state).expect("plays");
    engine.render(1_000);
    assert_eq!(manager.current_position(), Some(8_000));

    let mut edit = state.clone();
    edit.slice_index = 0;
    manager.update_playback_state(&edit).expect("edit queued");

    let target = PlaybackRegion::new(0, 3_000, true);
    assert!(wait_until(|| {
        manager
            .get_current_wave()
            .ok()
            .flatten()
            .is_some_and(|wave| wave.region == target)
    }));
    assert_eq!(manager.current_position(), Some(0));
    let rendered = engine.render(3);
    assert_eq!(rendered, vec![ramp_value(0), ramp_value(1), ramp_value(2)]);

    let stored = manager.playback_state(TONE).expect("stored state");
    assert_eq!(stored.slice_index, 0);
    assert_eq!(stored.cursor, 0);

    // Moving forward again lands on that slice's start too.
    let mut edit = state.clone();
    edit.slice_index = 1;
    manager.update_playback_state(&edit).expect("edit queued");
    let target = PlaybackRegion::new(3_000, 7_000, true);
    assert!(wait_until(|| {
        manager
            .get_current_wave()
            .ok()
            .flatten()
            .is_some_and(|wave| wave.region == target)
    }));
    assert_eq!(engine.render(1)[0], ramp_value(3_000));
}

#[test]
fn volume_follows_the_logarithmic_curve() {
    let decoder = SyntheticDecoder::new();
    decoder.add_constant(TONE, 10_000, 1.0);
    let engine = start_engine(decoder);
    engine.preload(TONE);
    let manager = engine.context.manager();

    assert!(matches!(manager.set_volume(1.5), Err(PlaybackError::InvalidVolume(_))));
    assert!(matches!(manager.set_volume(-0.1), Err(PlaybackError::InvalidVolume(_))));
    assert_eq!(manager.get_volume(), 1.0);

    manager.play_wave_by_path(TONE, true, None, None).expect("plays");
    assert!(engine.render(256).iter().all(|s| *s == 1.0));

    manager.set_volume(0.0).expect("valid volume");
    assert!(engine.render(256).iter().all(|s| *s == 0.0));

    manager.set_volume(0.5).expect("valid volume");
    let half = engine.render(256);
    let expected = 10f32.powf(-30.0 / 20.0);
    assert!(half.iter().all(|s| (s - expected).abs() < 1e-6));

    let gains: Vec<f32> = (0..=10).map(|step| volume_to_gain(step as f32 / 10.0)).collect();
    assert_eq!(gains[0], 0.0);
    assert_eq!(gains[10], 1.0);
    assert!(gains.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn pause_and_resume_continue_from_the_cursor() {
    let engine = loaded_engine();
    let manager = engine.context.manager();
    manager.play_wave_by_path(TONE, false, None, None).expect("plays");
    engine.render(2_500);

    manager.pause_current().expect("pauses");
    assert!(manager.is_paused());
    assert!(!manager.is_playing());
    assert_eq!(manager.current_path().as_deref(), Some(TONE));
    assert_eq!(manager.remembered_cursor(TONE), Some(2_500));
    assert_eq!(manager.current_progress(), 0.25);
    let paused = engine.events.wait_for(EventKind::Paused, TONE).expect("paused event");
    assert_eq!(paused.position, 2_500);
    assert_eq!(paused.progress, 0.25);

    assert!(engine.render(128).iter().all(|s| *s == 0.0));
    let current = manager.get_current_wave().expect("query").expect("paused wave");
    assert!(!current.is_playing);

    manager.resume_current().expect("resumes");
    assert!(manager.is_playing());
    assert!(!manager.is_paused());
    let rendered = engine.render(10);
    assert_eq!(rendered[0], ramp_value(2_500));
    assert_eq!(manager.current_position(), Some(2_510));
}

#[test]
fn stop_emits_stopped_and_remembers_the_cursor() {
    let engine = loaded_engine();
    let manager = engine.context.manager();
    manager.play_wave_by_path(TONE, false, None, None).expect("plays");
    engine.render(1_000);

    manager.stop_current().expect("stops");
    let stopped = engine.events.wait_for(EventKind::Stopped, TONE).expect("stopped event");
    assert_eq!(stopped.position, 1_000);
    assert!(!manager.is_playing());
    assert_eq!(manager.current_path(), None);
    assert_eq!(manager.get_current_wave().expect("query"), None);

    // Playing again resumes from the remembered cursor.
    manager.play_wave_by_path(TONE, false, None, None).expect("plays again");
    assert_eq!(manager.current_position(), Some(1_000));
}

#[test]
fn seek_moves_playing_and_stopped_cursors() {
    let engine = loaded_engine();
    let manager = engine.context.manager();
    manager.play_wave_by_path(TONE, false, None, None).expect("plays");

    manager.seek_to_position(0.5).expect("seeks");
    assert_eq!(manager.current_position(), Some(5_000));
    assert_eq!(engine.render(1)[0], ramp_value(5_000));

    manager.stop_current().expect("stops");
    manager.seek_to_position(0.25).expect("seeks while stopped");
    assert_eq!(manager.remembered_cursor(TONE), Some(2_500));

    manager.seek_to_position(f64::NAN).expect("NaN is treated as zero");
    assert_eq!(manager.remembered_cursor(TONE), Some(0));
}

#[test]
fn set_cursor_by_path_validates_bounds() {
    let engine = loaded_engine();
    let manager = engine.context.manager();

    manager
        .set_cursor_position_by_path("other.wav", 0.5, 0, 8_000)
        .expect("cursor stored");
    assert_eq!(manager.remembered_cursor("other.wav"), Some(4_000));

    let err = manager.set_cursor_position_by_path(TONE, 0.5, 100, 100).unwrap_err();
    assert!(matches!(err, PlaybackError::InvalidBounds { start: 100, end: 100 }));

    manager.play_wave_by_path(TONE, false, None, None).expect("plays");
    manager
        .set_cursor_position_by_path(TONE, 0.75, 0, 10_000)
        .expect("cursor moved");
    assert_eq!(manager.current_position(), Some(7_500));
}

#[test]
fn play_rejects_bad_ranges() {
    let engine = loaded_engine();
    let manager = engine.context.manager();

    let err = manager.play_wave_by_path(TONE, false, Some(500), Some(100)).unwrap_err();
    assert!(matches!(err, PlaybackError::InvalidBounds { start: 500, end: 100 }));

    let err = manager
        .play_wave_by_path(TONE, false, Some(20_000), Some(30_000))
        .unwrap_err();
    assert!(matches!(err, PlaybackError::NoSamplesInRange { .. }));
    assert!(!manager.is_playing());

    let mut inverted = PlaybackState::new(TONE, 10, 5);
    assert!(inverted.validate().is_err());
    assert!(matches!(
        manager.play_with_state(&PlaybackState::new(TONE, 10, 5)),
        Err(PlaybackError::InvalidBounds { start: 10, end: 5 })
    ));
}

#[test]
fn decode_failure_surfaces_on_play() {
    let decoder = SyntheticDecoder::new();
    decoder.add_corrupt("broken.wav");
    let engine = start_engine(decoder);
    engine.preload("broken.wav");
    let manager = engine.context.manager();

    let err = manager.play_wave_by_path("broken.wav", false, None, None).unwrap_err();
    assert!(matches!(err, PlaybackError::PlaybackDecodeError { .. }));
    assert!(!manager.is_playing());
}

#[test]
fn switching_waves_stops_the_previous_one() {
    let decoder = ramp_decoder();
    decoder.add_constant("other.wav", 4_000, 0.5);
    let engine = start_engine(decoder);
    engine.preload(TONE);
    engine.preload("other.wav");
    let manager = engine.context.manager();

    manager.play_wave_by_path(TONE, false, None, None).expect("plays");
    engine.render(300);
    manager.play_wave_by_path("other.wav", false, None, None).expect("plays");

    let stopped = engine.events.wait_for(EventKind::Stopped, TONE).expect("previous stopped");
    assert_eq!(stopped.position, 300);
    assert_eq!(manager.current_path().as_deref(), Some("other.wav"));
    assert_eq!(engine.render(1)[0], 0.5);
}

#[test]
fn playing_another_wave_stops_the_paused_one() {
    let decoder = ramp_decoder();
    decoder.add_constant("other.wav", 4_000, 0.5);
    let engine = start_engine(decoder);
    engine.preload(TONE);
    engine.preload("other.wav");
    let manager = engine.context.manager();

    let state = PlaybackState::new(TONE, 0, 10_000).with_owner("deck-a");
    manager.play_with_state(&state).expect("plays");
    engine.render(2_000);
    manager.pause_current().expect("pauses");
    assert!(manager.playback_state(TONE).expect("stored").is_paused);

    manager.play_wave_by_path("other.wav", false, None, None).expect("plays");

    let stopped = engine.events.wait_for(EventKind::Stopped, TONE).expect("paused wave stopped");
    assert_eq!(stopped.position, 2_000);
    assert_eq!(stopped.progress, 0.2);
    assert!(stopped.is_for_owner("deck-a"));
    assert_eq!(engine.events.count(EventKind::Stopped, TONE), 1);

    let stored = manager.playback_state(TONE).expect("stored");
    assert!(!stored.is_playing);
    assert!(!stored.is_paused);
    assert!(!manager.is_paused());
    assert_eq!(manager.current_path().as_deref(), Some("other.wav"));

    // Nothing is left to resume.
    manager.resume_current().expect("resume is a no-op");
    assert_eq!(manager.current_path().as_deref(), Some("other.wav"));
}

#[test]
fn debounced_edits_restart_once_with_the_last_value() {
    let engine = loaded_engine();
    let manager = engine.context.manager();
    let state = PlaybackState::new(TONE, 0, 10_000);
    manager.play_with_state(&state).expect("plays");
    engine.render(1_000);
    assert_eq!(engine.events.count(EventKind::Started, TONE), 1);

    for end in [9_000, 7_000, 5_000] {
        let mut edit = state.clone().with_repeat_mode(RepeatMode::All);
        edit.bounds_end = end;
        manager.update_playback_state(&edit).expect("edit queued");
    }

    let target = PlaybackRegion::new(0, 5_000, true);
    assert!(wait_until(|| {
        manager
            .get_current_wave()
            .ok()
            .flatten()
            .is_some_and(|wave| wave.region == target)
    }));
    assert_eq!(engine.events.count(EventKind::Started, TONE), 2);
    assert_eq!(manager.current_position(), Some(1_000));
    let stored = manager.playback_state(TONE).expect("stored state");
    assert_eq!(stored.bounds_end, 5_000);
    assert_eq!(stored.repeat_mode, RepeatMode::All);

    // Re-submitting the committed layout changes nothing.
    let mut same = state.clone().with_repeat_mode(RepeatMode::All);
    same.bounds_end = 5_000;
    manager.update_playback_state(&same).expect("edit queued");
    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(engine.events.count(EventKind::Started, TONE), 2);

    let err = manager
        .update_playback_state(&PlaybackState::new(TONE, 50, 50))
        .unwrap_err();
    assert!(matches!(err, PlaybackError::InvalidBounds { .. }));
}

#[test]
fn owner_travels_with_the_session() {
    let engine = loaded_engine();
    let manager = engine.context.manager();
    let state = PlaybackState::new(TONE, 0, 10_000).with_owner("deck-a");
    manager.play_with_state(&state).expect("plays");

    let current = manager.get_current_wave().expect("query").expect("playing");
    assert_eq!(current.owner.as_deref(), Some("deck-a"));
    let started = engine.events.wait_for(EventKind::Started, TONE).expect("started");
    assert!(started.is_for_owner("deck-a"));
    assert!(!started.is_for_owner("deck-b"));
}

#[test]
fn peaks_need_full_samples() {
    let decoder = SyntheticDecoder::new();
    let mut samples = vec![0.0f32; 10_000];
    samples[2_000..2_100].fill(0.9);
    samples[7_000..7_100].fill(-0.5);
    decoder.add_wave("drums.wav", samples, 10_000);
    let engine = start_engine(decoder);
    let manager = engine.context.manager();

    let err = manager.detect_peaks_for_wave("drums.wav", 0.3).unwrap_err();
    assert!(matches!(err, PlaybackError::NotLoadedYet { .. }));
    assert!(engine.events.wait_for(EventKind::SamplesLoaded, "drums.wav").is_some());

    assert_eq!(manager.detect_peaks_for_wave("drums.wav", 0.3).expect("peaks"), vec![20, 70]);
    assert_eq!(manager.detect_peaks_for_wave("drums.wav", 0.8).expect("peaks"), vec![20]);
}

#[test]
fn display_data_combines_snapshot_and_playback() {
    let engine = start_engine(ramp_decoder());
    let manager = engine.context.manager();

    let first = manager.get_wave_display_data(TONE);
    assert_eq!(first.name, TONE);
    assert!(!first.is_ready);
    assert!(first.bins.is_empty());

    assert!(wait_until(|| manager.get_wave_display_data(TONE).is_ready));
    assert_eq!(engine.context.cache().load_count(TONE, LoadKind::Full), 1);

    manager.play_wave_by_path(TONE, false, None, None).expect("plays");
    engine.render(2_500);
    let data = manager.get_wave_display_data(TONE);
    assert!(data.is_playing);
    assert!(!data.has_failed);
    assert_eq!(data.sample_count, 10_000);
    assert_eq!(data.sample_rate, 10_000);
    assert_eq!(data.bins.len(), 100);
    assert_eq!(data.samples_per_bin, 100.0);
    assert_eq!((data.bounds_start, data.bounds_end), (0, 10_000));
    assert_eq!(data.progress, 0.25);
    assert_eq!(data.min_amplitude, 0.0);
    assert!(data.max_amplitude > 0.99);
}

#[test]
fn shutdown_stops_the_actor() {
    let engine = loaded_engine();
    let manager = engine.context.manager();
    manager.play_wave_by_path(TONE, true, None, None).expect("plays");

    engine.context.shutdown();
    assert!(matches!(manager.stop_current(), Err(PlaybackError::ActorStopped)));
    assert!(engine.render(16).iter().all(|s| *s == 0.0));
    // A second shutdown is a no-op.
    engine.context.shutdown();
}
