//! Transcription progress and ETA estimation.
//!
//! While a transcription runs, the controller ticks this tracker on a fixed
//! interval. Until the engine reports its first decoded segment, progress is
//! a guess from the model's historical speed; once real segment positions
//! arrive they take over, and the ETA is extrapolated from them.

/// Blends time-based and segment-based progress into one monotonic series.
#[derive(Debug)]
pub struct EtaTracker {
    /// Expected total transcription time in seconds, from history. Zero or
    /// negative when no usable estimate exists.
    estimate: f64,
    /// Latest percent reported by the engine's segment callback.
    observed: f64,
    /// Highest percent handed out so far. Reports never go backwards.
    reported: f64,
}

impl EtaTracker {
    pub fn new(estimate: f64) -> Self {
        EtaTracker {
            estimate,
            observed: 0.0,
            reported: 0.0,
        }
    }

    /// Feeds a segment-progress percent from the engine.
    pub fn observe_segment(&mut self, percent: f64) {
        self.observed = self.observed.max(percent);
    }

    /// Produces `(percent, eta_secs)` for the given elapsed wall time.
    ///
    /// Segment progress wins once any segment has been decoded; before that,
    /// elapsed time against the estimate drives the percent, capped at 95 so
    /// a slow run never claims completion it cannot see.
    pub fn sample(&mut self, elapsed: f64) -> (f64, f64) {
        let (percent, eta) = if self.observed > 0.0 {
            let expected_total = elapsed / (self.observed / 100.0);
            (self.observed, (expected_total - elapsed).max(0.0))
        } else if self.estimate > 0.0 {
            (
                (100.0 * elapsed / self.estimate).min(95.0),
                (self.estimate - elapsed).max(0.0),
            )
        } else {
            (0.0, 0.0)
        };

        self.reported = self.reported.max(percent);
        (self.reported, eta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_based_progress_before_segments() {
        let mut tracker = EtaTracker::new(5.0);
        let (percent, eta) = tracker.sample(2.5);
        assert_eq!(percent, 50.0);
        assert_eq!(eta, 2.5);
    }

    #[test]
    fn test_time_based_progress_caps_at_95() {
        let mut tracker = EtaTracker::new(5.0);
        let (percent, eta) = tracker.sample(10.0);
        assert_eq!(percent, 95.0);
        assert_eq!(eta, 0.0);
    }

    #[test]
    fn test_segment_progress_takes_over() {
        let mut tracker = EtaTracker::new(5.0);
        tracker.observe_segment(40.0);
        let (percent, eta) = tracker.sample(2.0);
        assert_eq!(percent, 40.0);
        // 40% in 2s extrapolates to 5s total, 3s left.
        assert!((eta - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_reported_percent_never_drops() {
        let mut tracker = EtaTracker::new(2.0);
        // Time-based estimate races ahead of the first real segment.
        let (percent, _) = tracker.sample(1.9);
        assert_eq!(percent, 95.0);

        tracker.observe_segment(30.0);
        let (percent, eta) = tracker.sample(2.0);
        assert_eq!(percent, 95.0);
        assert!(eta > 0.0);
    }

    #[test]
    fn test_segment_observations_never_drop() {
        let mut tracker = EtaTracker::new(5.0);
        tracker.observe_segment(60.0);
        tracker.observe_segment(20.0);
        let (percent, _) = tracker.sample(1.0);
        assert_eq!(percent, 60.0);
    }

    #[test]
    fn test_no_estimate_reports_nothing_until_segments() {
        let mut tracker = EtaTracker::new(0.0);
        assert_eq!(tracker.sample(3.0), (0.0, 0.0));

        tracker.observe_segment(50.0);
        let (percent, eta) = tracker.sample(4.0);
        assert_eq!(percent, 50.0);
        assert!((eta - 4.0).abs() < 1e-9);
    }
}
