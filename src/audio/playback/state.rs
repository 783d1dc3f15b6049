use serde::{Deserialize, Serialize};

use crate::audio::errors::PlaybackError;
use crate::audio::types::{PlaybackRegion, RepeatMode};

/// What the user has set up for one wave: bounds, slice markers, repeat mode
/// and cursor. Pure data; the audio manager owns the live copies and hands
/// out clones.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub path: String,
    pub is_playing: bool,
    pub is_paused: bool,
    pub bounds_start: u64,
    pub bounds_end: u64,
    pub repeat_mode: RepeatMode,
    /// Marker positions in downsample-bin units.
    pub slice_markers: Vec<u64>,
    pub slice_index: usize,
    pub samples_per_bin: f64,
    /// Absolute sample position. Signed so a host can hand in a negative
    /// value, which `validate` repairs.
    pub cursor: i64,
    pub owner: Option<String>,
}

impl PlaybackState {
    pub fn new(path: &str, bounds_start: u64, bounds_end: u64) -> Self {
        PlaybackState {
            path: path.to_string(),
            is_playing: false,
            is_paused: false,
            bounds_start,
            bounds_end,
            repeat_mode: RepeatMode::Off,
            slice_markers: Vec::new(),
            slice_index: 0,
            samples_per_bin: 1.0,
            cursor: bounds_start as i64,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_repeat_mode(mut self, mode: RepeatMode) -> Self {
        self.repeat_mode = mode;
        self
    }

    /// Rejects inverted or empty bounds. Everything else is repaired in
    /// place: a negative cursor moves to the bounds start, the slice index
    /// and cursor are pulled back into range.
    pub fn validate(&mut self) -> Result<(), PlaybackError> {
        if self.bounds_end <= self.bounds_start {
            return Err(PlaybackError::InvalidBounds {
                start: self.bounds_start,
                end: self.bounds_end,
            });
        }
        if self.cursor < 0 {
            log::debug!(
                "Playback State: Negative cursor {} for '{}' reset to bounds start",
                self.cursor,
                self.path
            );
            self.cursor = self.bounds_start as i64;
        }
        self.slice_index = self.slice_index.min(self.marker_samples().len());
        self.clamp_cursor();
        Ok(())
    }

    fn bin_to_sample(&self, bin: u64) -> Option<u64> {
        if !self.samples_per_bin.is_finite() || self.samples_per_bin <= 0.0 {
            return None;
        }
        Some((bin as f64 * self.samples_per_bin).round() as u64)
    }

    /// Slice markers converted to sample positions, in order.
    pub fn marker_samples(&self) -> Vec<u64> {
        self.slice_markers
            .iter()
            .filter_map(|&bin| self.bin_to_sample(bin))
            .collect()
    }

    pub fn playback_region(&self) -> PlaybackRegion {
        match self.repeat_mode {
            RepeatMode::Off => PlaybackRegion::new(self.bounds_start, self.bounds_end, false),
            RepeatMode::All => PlaybackRegion::new(self.bounds_start, self.bounds_end, true),
            RepeatMode::Slice => {
                let markers = self.marker_samples();
                if markers.is_empty() {
                    return PlaybackRegion::new(self.bounds_start, self.bounds_end, true);
                }
                let index = self.slice_index.min(markers.len());
                let start = if index == 0 {
                    self.bounds_start
                } else {
                    markers[index - 1]
                };
                let end = markers.get(index).copied().unwrap_or(self.bounds_end);
                PlaybackRegion::new(start, end, true)
            }
        }
    }

    /// Number of markers at or before `sample`: the index of the slice that
    /// contains it.
    pub fn determine_slice_at_position(&self, sample: u64) -> usize {
        self.marker_samples()
            .iter()
            .take_while(|&&marker| marker <= sample)
            .count()
    }

    /// Selects slice `index` and snaps the cursor to its first sample. Expects
    /// markers normalized by `update_bounds_and_slices` (sorted, inside the
    /// bounds); then `determine_slice_at_position(cursor)` returns `index` in
    /// every repeat mode.
    pub fn navigate_to_slice(&mut self, index: usize) -> Result<(), PlaybackError> {
        let markers = self.marker_samples();
        if index > markers.len() {
            return Err(PlaybackError::InvalidSliceIndex {
                index,
                max: markers.len(),
            });
        }
        self.slice_index = index;
        let slice_start = if index == 0 {
            self.bounds_start
        } else {
            markers[index - 1]
        };
        self.set_cursor(slice_start);
        Ok(())
    }

    /// Single entry point for interactive edits of bounds and markers.
    /// Markers are converted with `samples_per_bin`, sorted, deduplicated and
    /// only kept when strictly inside the new bounds. The slice index and
    /// cursor are then pulled back into range. Inverted bounds leave the
    /// state untouched.
    pub fn update_bounds_and_slices(
        &mut self,
        bounds_start: u64,
        bounds_end: u64,
        slice_markers: &[u64],
        samples_per_bin: f64,
    ) -> Result<(), PlaybackError> {
        if bounds_end <= bounds_start {
            return Err(PlaybackError::InvalidBounds {
                start: bounds_start,
                end: bounds_end,
            });
        }
        self.bounds_start = bounds_start;
        self.bounds_end = bounds_end;
        self.samples_per_bin = samples_per_bin;

        let mut converted: Vec<(u64, u64)> = slice_markers
            .iter()
            .filter_map(|&bin| self.bin_to_sample(bin).map(|sample| (sample, bin)))
            .filter(|&(sample, _)| sample > bounds_start && sample < bounds_end)
            .collect();
        converted.sort_unstable();
        converted.dedup_by_key(|(sample, _)| *sample);
        self.slice_markers = converted.into_iter().map(|(_, bin)| bin).collect();

        self.slice_index = self.slice_index.min(self.slice_markers.len());
        self.clamp_cursor();
        Ok(())
    }

    /// The cursor as an absolute sample inside the active region.
    pub fn cursor_sample(&self) -> u64 {
        self.playback_region().clamp(self.cursor.max(0) as u64)
    }

    pub fn set_cursor(&mut self, sample: u64) {
        self.cursor = self.playback_region().clamp(sample) as i64;
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor_sample() as i64;
    }

    /// The editable part of the state: bounds, markers, repeat mode and
    /// slice index. Transport fields are reset so two edits compare equal
    /// when only the cursor or play flags differ.
    pub fn layout(&self) -> PlaybackState {
        PlaybackState {
            is_playing: false,
            is_paused: false,
            cursor: 0,
            ..self.clone()
        }
    }

    /// Cursor progress relative to the active region.
    pub fn progress(&self) -> f64 {
        self.playback_region().progress_at(self.cursor_sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 10 samples per bin: bins 300 and 700 sit at samples 3000 and 7000.
    fn sliced_state() -> PlaybackState {
        let mut state = PlaybackState::new("loop.wav", 0, 10_000).with_repeat_mode(RepeatMode::Slice);
        state
            .update_bounds_and_slices(0, 10_000, &[300, 700], 10.0)
            .unwrap();
        state
    }

    /// Small deterministic generator so the property checks need no extra crates.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound.max(1)
        }
    }

    #[test]
    fn region_follows_repeat_mode() {
        let mut state = PlaybackState::new("a.wav", 100, 900);
        assert_eq!(state.playback_region(), PlaybackRegion::new(100, 900, false));
        state.repeat_mode = RepeatMode::All;
        assert_eq!(state.playback_region(), PlaybackRegion::new(100, 900, true));
        state.repeat_mode = RepeatMode::Slice;
        assert_eq!(state.playback_region(), PlaybackRegion::new(100, 900, true));
    }

    #[test]
    fn slice_one_is_between_markers() {
        let mut state = sliced_state();
        state.navigate_to_slice(1).unwrap();
        assert_eq!(state.playback_region(), PlaybackRegion::new(3_000, 7_000, true));
        assert_eq!(state.cursor, 3_000);
    }

    #[test]
    fn slice_navigation_round_trips_in_every_mode() {
        for mode in [RepeatMode::Off, RepeatMode::All, RepeatMode::Slice] {
            let mut state = PlaybackState::new("a.wav", 1_000, 9_000).with_repeat_mode(mode);
            state
                .update_bounds_and_slices(1_000, 9_000, &[700, 50, 300, 300, 950], 10.0)
                .unwrap();
            assert_eq!(state.marker_samples(), vec![3_000, 7_000]);
            for index in 0..=2 {
                state.navigate_to_slice(index).unwrap();
                let cursor = state.cursor_sample();
                assert_eq!(state.determine_slice_at_position(cursor), index, "{mode:?} slice {index}");
            }
        }
    }

    #[test]
    fn slices_tile_the_bounds() {
        let mut rng = Lcg(7);
        for _ in 0..200 {
            let start = rng.next(5_000);
            let end = start + 1 + rng.next(20_000);
            let count = rng.next(12) as usize;
            let markers: Vec<u64> = (0..count).map(|_| rng.next(3_000)).collect();
            let mut state = PlaybackState::new("p.wav", start, end).with_repeat_mode(RepeatMode::Slice);
            state.update_bounds_and_slices(start, end, &markers, 10.0).unwrap();

            let n = state.slice_markers.len();
            let mut expected_start = start;
            for index in 0..=n {
                state.navigate_to_slice(index).unwrap();
                let region = state.playback_region();
                assert!(region.looping);
                assert_eq!(region.start, expected_start, "regions must be contiguous");
                assert!(region.end > region.start);
                assert!(region.end <= end);
                expected_start = region.end;
            }
            assert_eq!(expected_start, end, "last slice must end at the bounds end");
        }
    }

    #[test]
    fn navigate_then_determine_round_trips() {
        let mut rng = Lcg(42);
        for _ in 0..100 {
            let end = 1_000 + rng.next(50_000);
            let markers: Vec<u64> = (0..rng.next(10)).map(|_| rng.next(end / 4)).collect();
            let mut state = PlaybackState::new("r.wav", 0, end).with_repeat_mode(RepeatMode::Slice);
            state.update_bounds_and_slices(0, end, &markers, 4.0).unwrap();
            for index in 0..=state.slice_markers.len() {
                state.navigate_to_slice(index).unwrap();
                assert_eq!(state.determine_slice_at_position(state.cursor_sample()), index);
            }
        }
    }

    #[test]
    fn navigate_rejects_out_of_range_index() {
        let mut state = sliced_state();
        let before = state.clone();
        let err = state.navigate_to_slice(3).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidSliceIndex { index: 3, max: 2 }));
        assert_eq!(state, before);
    }

    #[test]
    fn edits_never_strand_the_cursor() {
        let mut rng = Lcg(99);
        let mut state = PlaybackState::new("e.wav", 0, 100_000);
        for step in 0..500 {
            state.repeat_mode = match step % 3 {
                0 => RepeatMode::Off,
                1 => RepeatMode::All,
                _ => RepeatMode::Slice,
            };
            state.slice_index = rng.next(8) as usize;
            state.cursor = rng.next(120_000) as i64;
            let start = rng.next(60_000);
            let end = start + 1 + rng.next(60_000);
            let markers: Vec<u64> = (0..rng.next(6)).map(|_| rng.next(12_000)).collect();
            state.update_bounds_and_slices(start, end, &markers, 10.0).unwrap();

            let region = state.playback_region();
            assert!(state.slice_index <= state.slice_markers.len());
            assert!(region.contains(state.cursor as u64), "cursor {} outside {:?}", state.cursor, region);
        }
    }

    #[test]
    fn shrinking_bounds_below_cursor_pulls_it_back() {
        let mut state = PlaybackState::new("s.wav", 0, 10_000);
        state.set_cursor(9_000);
        state.update_bounds_and_slices(0, 5_000, &[], 1.0).unwrap();
        assert_eq!(state.cursor, 4_999);
    }

    #[test]
    fn markers_are_normalised() {
        let mut state = PlaybackState::new("n.wav", 1_000, 5_000);
        state
            .update_bounds_and_slices(1_000, 5_000, &[450, 100, 200, 200, 600, 300], 10.0)
            .unwrap();
        // 100 is on the start boundary, 600 past the end.
        assert_eq!(state.slice_markers, vec![200, 300, 450]);
        assert_eq!(state.marker_samples(), vec![2_000, 3_000, 4_500]);
    }

    #[test]
    fn inverted_bounds_leave_state_unchanged() {
        let mut state = sliced_state();
        let before = state.clone();
        assert!(matches!(
            state.update_bounds_and_slices(500, 500, &[], 1.0),
            Err(PlaybackError::InvalidBounds { start: 500, end: 500 })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn validate_repairs_negative_cursor() {
        let mut state = PlaybackState::new("v.wav", 200, 800);
        state.cursor = -50;
        state.validate().unwrap();
        assert_eq!(state.cursor, 200);

        let mut bad = PlaybackState::new("v.wav", 800, 200);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn determine_slice_counts_markers_at_or_before() {
        let state = sliced_state();
        assert_eq!(state.determine_slice_at_position(0), 0);
        assert_eq!(state.determine_slice_at_position(2_999), 0);
        assert_eq!(state.determine_slice_at_position(3_000), 1);
        assert_eq!(state.determine_slice_at_position(9_999), 2);
    }

    #[test]
    fn progress_is_region_relative() {
        let mut state = sliced_state();
        state.navigate_to_slice(1).unwrap();
        state.set_cursor(5_000);
        assert_eq!(state.progress(), 0.5);
    }
}
