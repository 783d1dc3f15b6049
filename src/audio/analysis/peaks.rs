use super::downsample::MinMaxBins;

/// Absolute envelope of min/max bins: the larger magnitude of each pair.
pub fn envelope(bins: &MinMaxBins) -> Vec<f32> {
    bins.min
        .iter()
        .zip(bins.max.iter())
        .map(|(lo, hi)| lo.abs().max(hi.abs()))
        .collect()
}

/// Finds local maxima of `envelope` whose height is at least
/// `relative_threshold` times the global maximum, keeping at least
/// `min_spacing` bins between reported peaks. When two candidates are closer
/// than that, the louder one wins. Returns bin indices in ascending order.
pub fn detect_peaks(envelope: &[f32], relative_threshold: f32, min_spacing: usize) -> Vec<usize> {
    if envelope.len() < 3 {
        return Vec::new();
    }
    let global_max = envelope.iter().copied().fold(0.0f32, f32::max);
    if global_max <= f32::EPSILON {
        return Vec::new();
    }
    let cutoff = relative_threshold.clamp(0.0, 1.0) * global_max;

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..envelope.len() - 1 {
        let value = envelope[i];
        // `>=` on the left so a plateau reports its last bin.
        let is_local_max = value >= envelope[i - 1] && value > envelope[i + 1];
        if !is_local_max || value < cutoff {
            continue;
        }
        match peaks.last_mut() {
            Some(last) if i - *last < min_spacing => {
                if value > envelope[*last] {
                    *last = i;
                }
            }
            _ => peaks.push(i),
        }
    }
    peaks
}
