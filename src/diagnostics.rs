// TASALIGN SOAK DIAGNOSTICS
// TIME-TO-DEGRADE: FIRST SAMPLE (AFTER WARMUP) THAT COMPLETES A STREAK OF
// FAILING SAMPLES. QUEUE ESTIMATE: BYTES BACKLOGGED BY THAT INSTANT GIVEN
// THE PER-CYCLE SHORTFALL AGAINST A KNOWN STABLE OPEN WIDTH. THE ESTIMATE
// IS UNCERTIFIED AND REPORTED AS SUCH.

use serde::{Deserialize, Serialize};

use crate::schedule::NS_PER_SEC;
use crate::telemetry::StatSample;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropWatchConfig {
    pub warmup_s: f64,
    pub fail_fc_pct: f64,
    pub fail_fps: f64,
    pub fail_consecutive: u32,
    // REFERENCE WIDTH KNOWN TO HOLD THE STREAM. NONE DISABLES THE QUEUE ESTIMATE.
    pub stable_open_ns: Option<u64>,
    pub link_bits_per_sec: f64,
}

impl Default for DropWatchConfig {
    fn default() -> Self {
        Self {
            warmup_s: 5.0,
            fail_fc_pct: 95.0,
            fail_fps: 9.5,
            fail_consecutive: 3,
            stable_open_ns: None,
            link_bits_per_sec: 1e9,
        }
    }
}

impl DropWatchConfig {
    fn is_fail(&self, s: &StatSample) -> bool {
        s.fc_pct() < self.fail_fc_pct || s.fps < self.fail_fps
    }
}

pub fn time_to_degrade(samples: &[StatSample], cfg: &DropWatchConfig) -> Option<f64> {
    let need = cfg.fail_consecutive.max(1);
    let mut streak = 0u32;
    for s in samples.iter().filter(|s| s.t_s >= cfg.warmup_s) {
        if cfg.is_fail(s) {
            streak += 1;
            if streak >= need {
                return Some(s.t_s);
            }
        } else {
            streak = 0;
        }
    }
    None
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueEstimate {
    pub stable_open_ns: u64,
    pub open_ns: u64,
    pub t_drop_s: Option<f64>,
    pub deficit_bytes_per_cycle: f64,
    pub deficit_bytes_per_sec: f64,
    pub queued_bytes: Option<f64>,
    pub certified: bool,
}

pub fn queue_estimate(
    cycle_ns: u64,
    open_ns: u64,
    stable_open_ns: u64,
    link_bits_per_sec: f64,
    t_drop_s: Option<f64>,
) -> QueueEstimate {
    let ns = NS_PER_SEC as f64;
    let cycle_s = cycle_ns as f64 / ns;
    let deficit_s = (stable_open_ns as f64 / ns - open_ns as f64 / ns).max(0.0);
    let link_bytes_per_sec = link_bits_per_sec / 8.0;
    let per_cycle = deficit_s * link_bytes_per_sec;
    let per_sec = if cycle_s > 0.0 { per_cycle / cycle_s } else { 0.0 };
    QueueEstimate {
        stable_open_ns,
        open_ns,
        t_drop_s,
        deficit_bytes_per_cycle: per_cycle,
        deficit_bytes_per_sec: per_sec,
        queued_bytes: t_drop_s.map(|t| per_sec * t),
        certified: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t: f64, fc: f64, fps: f64) -> StatSample {
        StatSample { t_s: t, frame_completeness: fc / 100.0, fps, jitter_us: 0.0, packet_rate: 0.0 }
    }

    #[test]
    fn warmup_failures_are_ignored() {
        let cfg = DropWatchConfig::default();
        let s: Vec<_> = (0..20).map(|i| at(i as f64 * 0.5, if i < 8 { 50.0 } else { 99.0 }, 10.0)).collect();
        assert_eq!(time_to_degrade(&s, &cfg), None);
    }

    #[test]
    fn streak_must_be_consecutive() {
        let cfg = DropWatchConfig::default();
        let fcs = [99.0, 90.0, 90.0, 99.0, 90.0, 90.0, 90.0, 90.0];
        let s: Vec<_> = fcs.iter().enumerate().map(|(i, fc)| at(6.0 + i as f64, *fc, 10.0)).collect();
        assert_eq!(time_to_degrade(&s, &cfg), Some(12.0));
    }

    #[test]
    fn fps_below_floor_counts_as_failure() {
        let cfg = DropWatchConfig { fail_consecutive: 1, ..Default::default() };
        let s = vec![at(6.0, 99.0, 10.0), at(7.0, 99.0, 9.0)];
        assert_eq!(time_to_degrade(&s, &cfg), Some(7.0));
    }

    #[test]
    fn queue_estimate_from_deficit() {
        // 1 us SHORT AT 1 GBIT/S = 125 BYTES PER CYCLE
        let q = queue_estimate(781_250, 145_000, 146_000, 1e9, Some(10.0));
        assert!((q.deficit_bytes_per_cycle - 125.0).abs() < 1e-6);
        assert!((q.deficit_bytes_per_sec - 160_000.0).abs() < 1e-3);
        assert!((q.queued_bytes.unwrap() - 1_600_000.0).abs() < 1e-2);
        assert!(!q.certified);
    }

    #[test]
    fn wider_than_stable_has_no_deficit() {
        let q = queue_estimate(781_250, 150_000, 146_000, 1e9, None);
        assert_eq!(q.deficit_bytes_per_cycle, 0.0);
        assert_eq!(q.queued_bytes, None);
    }
}
