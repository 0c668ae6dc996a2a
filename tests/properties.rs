// TASALIGN PROPERTY TESTS
// INVARIANTS OF THE SCHEDULE MODEL, TIME BASE, STATISTICS AND SEARCH GRID.

use proptest::prelude::*;

use tasalign::schedule::{BaseTime, GateLayout, GateMasks, Schedule, ScheduleEntry};
use tasalign::scorer::ScorerConfig;
use tasalign::search::neighborhood;
use tasalign::telemetry::{percentile, StatSample, StatSummary};
use tasalign::timebase::{activation_time, normalize_phase};

proptest! {
    #[test]
    fn build_accepts_exactly_matching_sums(
        durations in proptest::collection::vec(0u64..400_000, 1..8),
        masks in proptest::collection::vec(any::<u8>(), 8),
        cycle in 1u64..2_000_000,
    ) {
        let entries: Vec<ScheduleEntry> = durations
            .iter()
            .zip(&masks)
            .map(|(&d, &m)| ScheduleEntry::new(m, d))
            .collect();
        let sum: u64 = durations.iter().sum();
        let built = Schedule::build(cycle, entries, BaseTime::new(1, 0));
        prop_assert_eq!(built.is_ok(), sum == cycle);
        if let Ok(s) = built {
            prop_assert!(s.entries().iter().all(|e| e.duration_ns > 0));
            prop_assert_eq!(s.entries().iter().map(|e| e.duration_ns).sum::<u64>(), cycle);
        }
    }

    #[test]
    fn layouts_always_fill_the_cycle(open in 1u64..781_250, front_frac in 0.001f64..0.999) {
        let cycle = 781_250u64;
        let front = ((cycle - open) as f64 * front_frac) as u64;
        for layout in [GateLayout::OpenClose, GateLayout::OpenCloseOpen, GateLayout::CloseOpenClose] {
            if let Ok(entries) = layout.entries(cycle, open, front, GateMasks::default()) {
                let total: u64 = entries.iter().map(|e| e.duration_ns).sum();
                prop_assert_eq!(total, cycle);
            }
        }
    }

    #[test]
    fn phase_lands_inside_cycle(
        seconds in 0u64..4_000_000_000,
        nanos in 0u32..1_000_000_000,
        phase in -5_000_000i64..5_000_000,
        cycle in 1u64..2_000_000,
    ) {
        let p = normalize_phase(phase, cycle);
        prop_assert!(p < cycle);
        let now = BaseTime::new(seconds, nanos);
        let t = activation_time(now, 2, phase, cycle).unwrap();
        prop_assert!(t.nanoseconds < 1_000_000_000);
        prop_assert_eq!(t.total_ns() - now.total_ns(), 2_000_000_000u128 + p as u128);
    }

    #[test]
    fn percentile_is_monotone(mut vals in proptest::collection::vec(0.0f64..100.0, 1..64), a in 0.0f64..1.0, b in 0.0f64..1.0) {
        vals.sort_by(|x, y| x.total_cmp(y));
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(percentile(&vals, lo) <= percentile(&vals, hi));
        prop_assert_eq!(percentile(&vals, 0.0), vals[0]);
        prop_assert_eq!(percentile(&vals, 1.0), vals[vals.len() - 1]);
    }

    #[test]
    fn score_never_below_floor(readings in proptest::collection::vec((0.0f64..=1.0, 0.0f64..20.0), 0..32)) {
        let samples: Vec<StatSample> = readings
            .iter()
            .enumerate()
            .map(|(i, &(fc, fps))| StatSample {
                t_s: i as f64 * 0.2,
                frame_completeness: fc,
                fps,
                jitter_us: 5.0,
                packet_rate: 1280.0,
            })
            .collect();
        let summary = StatSummary::from_samples(&samples);
        let scorer = ScorerConfig::default();
        prop_assert!(scorer.score(&summary) >= scorer.min_score());
        prop_assert!(summary.fc_min_pct <= summary.fc_p01_pct);
        prop_assert!(summary.fc_p01_pct <= summary.fc_p05_pct);
    }

    #[test]
    fn neighborhood_has_zero_iff_step_divides(window in 1u64..50_000, step in 1u64..10_000) {
        let n = neighborhood(window, step);
        prop_assert_eq!(n[0], -(window as i64));
        prop_assert!(n.iter().all(|d| d.unsigned_abs() <= window));
        prop_assert_eq!(n.contains(&0), window % step == 0);
    }
}
