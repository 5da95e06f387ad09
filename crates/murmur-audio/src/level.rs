/// Gain applied to raw RMS before clamping, so typical speech lands in a
/// visible range on a 0..1 meter.
pub const METER_GAIN: f32 = 10.0;

/// Root mean square of a sample chunk. Empty input is 0.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Normalized meter level in `[0.0, 1.0]` for a sample chunk.
pub fn meter_level(samples: &[f32]) -> f32 {
    (rms(samples) * METER_GAIN).min(1.0)
}
