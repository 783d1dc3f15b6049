use rayon::prelude::*;
use serde::Serialize;

/// Per-bin minimum and maximum sample values. Both vectors always have the
/// same length.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct MinMaxBins {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl MinMaxBins {
    pub fn len(&self) -> usize {
        self.min.len()
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_empty()
    }

    /// Lowest minimum and highest maximum over all bins.
    pub fn amplitude_range(&self) -> (f32, f32) {
        if self.is_empty() {
            return (0.0, 0.0);
        }
        let low = self.min.par_iter().copied().reduce(|| f32::INFINITY, f32::min);
        let high = self.max.par_iter().copied().reduce(|| f32::NEG_INFINITY, f32::max);
        (low, high)
    }
}

#[inline]
fn bin_for(index: u64, total: u64, bins: usize) -> usize {
    ((index as u128 * bins as u128) / total.max(1) as u128).min(bins as u128 - 1) as usize
}

/// Reduces an in-memory buffer to at most `bins` min/max pairs.
pub fn downsample_min_max(samples: &[f32], bins: usize) -> MinMaxBins {
    if samples.is_empty() || bins == 0 {
        return MinMaxBins::default();
    }
    let bins = bins.min(samples.len());
    let total = samples.len() as u64;
    let pairs: Vec<(f32, f32)> = (0..bins)
        .into_par_iter()
        .map(|bin| {
            // First sample index whose bin is >= `bin`.
            let start = ((bin as u128 * total as u128).div_ceil(bins as u128)) as usize;
            let end = (((bin as u128 + 1) * total as u128).div_ceil(bins as u128)) as usize;
            samples[start..end.min(samples.len())]
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)))
        })
        .collect();
    let (min, max) = pairs.into_iter().unzip();
    MinMaxBins { min, max }
}

/// Reduces already computed bins to a coarser resolution, keeping the
/// envelope (min of mins, max of maxes).
pub fn reduce_bins(source: &MinMaxBins, target_bins: usize) -> MinMaxBins {
    if source.is_empty() || target_bins == 0 {
        return MinMaxBins::default();
    }
    if target_bins >= source.len() {
        return source.clone();
    }
    let mut out = MinMaxBins {
        min: vec![f32::INFINITY; target_bins],
        max: vec![f32::NEG_INFINITY; target_bins],
    };
    let total = source.len() as u64;
    for (i, (&lo, &hi)) in source.min.iter().zip(source.max.iter()).enumerate() {
        let bin = bin_for(i as u64, total, target_bins);
        out.min[bin] = out.min[bin].min(lo);
        out.max[bin] = out.max[bin].max(hi);
    }
    out
}

/// Streaming min/max reduction for files that are decoded chunk by chunk.
/// `expected_frames` comes from the file header; if the decoder delivers
/// more frames than announced they land in the last bin, if it delivers fewer
/// the untouched bins are flattened to silence.
#[derive(Debug)]
pub struct BinAccumulator {
    expected_frames: u64,
    seen: u64,
    bins: MinMaxBins,
}

impl BinAccumulator {
    pub fn new(expected_frames: u64, bins: usize) -> Self {
        let bins = bins.min(expected_frames.max(1) as usize).max(1);
        BinAccumulator {
            expected_frames: expected_frames.max(1),
            seen: 0,
            bins: MinMaxBins {
                min: vec![f32::INFINITY; bins],
                max: vec![f32::NEG_INFINITY; bins],
            },
        }
    }

    pub fn push(&mut self, chunk: &[f32]) {
        let bin_count = self.bins.len();
        for &sample in chunk {
            let bin = bin_for(self.seen, self.expected_frames, bin_count);
            let lo = &mut self.bins.min[bin];
            *lo = lo.min(sample);
            let hi = &mut self.bins.max[bin];
            *hi = hi.max(sample);
            self.seen += 1;
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.seen
    }

    pub fn finish(mut self) -> MinMaxBins {
        if self.seen == 0 {
            return MinMaxBins::default();
        }
        for (lo, hi) in self.bins.min.iter_mut().zip(self.bins.max.iter_mut()) {
            if lo.is_infinite() || hi.is_infinite() {
                *lo = 0.0;
                *hi = 0.0;
            }
        }
        self.bins
    }
}
