// TASALIGN SIMULATED LINK
// AN OFFLINE SWITCH + SENSOR PAIR. THE SENSOR SENDS ONE BURST PER CYCLE AT A
// FIXED POSITION IN ABSOLUTE (PTP) TIME; FRAME COMPLETENESS FOLLOWS HOW MUCH
// OF THAT BURST FALLS INSIDE THE OPEN TC0 WINDOW OF THE APPLIED SCHEDULE.
// DRIVEN BY THE SAME Pace AS THE REST OF THE RUN, SO IT PAIRS WITH ManualPace.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::applier::ScheduleApplier;
use crate::clock::Pace;
use crate::control::{ControlPlane, PatchOutput};
use crate::error::{Result, TasError};
use crate::retry::RetryPolicy;
use crate::schedule::{BaseTime, Schedule, NS_PER_SEC};
use crate::search::Rig;
use crate::sensor::{Sensor, SensorSetting, SensorControl};
use crate::telemetry::{Sampler, StatReading, StatsSource};
use crate::timebase::ClockSource;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimModel {
    pub cycle_ns: u64,
    // BURST START WITHIN THE CYCLE, ABSOLUTE TIME MOD cycle_ns
    pub burst_offset_ns: u64,
    pub burst_ns: u64,
    // QUEUEING HEADROOM: THIS MUCH OF THE BURST MAY MISS THE WINDOW UNHARMED
    pub slack_ns: u64,
    pub fps_nominal: f64,
    pub pps_nominal: f64,
    pub jitter_base_us: f64,
    // PEAK FC NOISE IN PERCENTAGE POINTS. 0 IS FULLY DETERMINISTIC.
    pub noise_pct: f64,
    pub seed: u64,
    pub epoch_sec: u64,
}

impl Default for SimModel {
    fn default() -> Self {
        Self {
            cycle_ns: 781_250,
            burst_offset_ns: 480_000,
            burst_ns: 110_000,
            slack_ns: 8_000,
            fps_nominal: 10.0,
            pps_nominal: 1280.0,
            jitter_base_us: 4.0,
            noise_pct: 0.0,
            seed: 0x5eed,
            epoch_sec: 1_700_000_000,
        }
    }
}

// LINEAR OVERLAP OF [a, a+la) AND [b, b+lb) ON A CIRCLE OF LENGTH c
fn circular_overlap(a: u64, la: u64, b: u64, lb: u64, c: u64) -> u64 {
    let (a, b, c) = (a as i128, b as i128, c as i128);
    let (la, lb) = (la as i128, lb as i128);
    let mut total = 0i128;
    for k in -1..=1 {
        let s = a + k * c;
        let lo = s.max(b);
        let hi = (s + la).min(b + lb);
        if hi > lo {
            total += hi - lo;
        }
    }
    total.min(lb) as u64
}

impl SimModel {
    // FRACTION OF THE BURST THAT GETS THROUGH, WITH SLACK, IN [0, 1]
    pub fn coverage(&self, schedule: Option<&Schedule>) -> f64 {
        let Some(s) = schedule else { return 1.0 };
        if self.burst_ns == 0 || s.cycle_ns() != self.cycle_ns {
            return 1.0;
        }
        let c = self.cycle_ns;
        let anchor = (s.activation().total_ns() % c as u128) as u64;
        let mut start = anchor;
        let mut open = 0u64;
        for e in s.entries() {
            if e.gate_mask & 1 == 1 {
                open += circular_overlap(start % c, e.duration_ns, self.burst_offset_ns % c, self.burst_ns, c);
            }
            start = (start + e.duration_ns) % c;
        }
        ((open.min(self.burst_ns) + self.slack_ns) as f64 / self.burst_ns as f64).min(1.0)
    }
}

#[derive(Default)]
struct SimState {
    applied: Option<Schedule>,
    history: Vec<Schedule>,
    patch_calls: usize,
    fail_patches: u32,
    stats_down: bool,
    clock_down: bool,
    // LAST VALUE SENT PER SENSOR CONFIG KEY
    sensor_params: BTreeMap<String, String>,
    sensor_calls: Vec<String>,
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
    rng: u64,
}

impl SimState {
    // xorshift64*
    fn next_unit(&mut self) -> f64 {
        let mut x = self.rng.max(1);
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        let v = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
        (v >> 11) as f64 / (1u64 << 53) as f64
    }
}

// HANDLE TO ONE SIMULATED LINK. CLONES SHARE STATE.
#[derive(Clone)]
pub struct SimLink {
    model: SimModel,
    state: Rc<RefCell<SimState>>,
    pace: Rc<dyn Pace>,
}

impl SimLink {
    pub fn new(model: SimModel, pace: Rc<dyn Pace>) -> Self {
        let state = SimState { rng: model.seed, ..Default::default() };
        Self { model, state: Rc::new(RefCell::new(state)), pace }
    }

    pub fn model(&self) -> &SimModel {
        &self.model
    }

    pub fn control_plane(&self) -> Box<dyn ControlPlane> {
        Box::new(SimPlane(self.clone()))
    }

    pub fn clock(&self) -> Box<dyn ClockSource> {
        Box::new(SimClock(self.clone()))
    }

    pub fn stats(&self) -> Box<dyn StatsSource> {
        Box::new(SimStats(self.clone()))
    }

    pub fn sensor_control(&self) -> Box<dyn SensorControl> {
        Box::new(SimSensor(self.clone()))
    }

    // ASSEMBLE A FULL RIG AGAINST THIS LINK
    pub fn rig(&self, policy: RetryPolicy, shutdown: Arc<AtomicBool>, sensor: Option<SensorSetting>) -> Rig {
        let applier = ScheduleApplier::new(
            self.control_plane(),
            self.clock(),
            self.pace.clone(),
            policy,
            "1",
            crate::timebase::DEFAULT_BASE_OFFSET_SEC,
        );
        let sampler = Sampler::new(self.stats(), self.pace.clone(), shutdown.clone());
        let sensor = sensor.map(|b| {
            Sensor::new(self.sensor_control(), self.pace.clone(), Duration::from_millis(2_000), b)
        });
        Rig { applier, sampler, sensor, pace: self.pace.clone(), shutdown }
    }

    pub fn fail_next_patches(&self, n: u32) {
        self.state.borrow_mut().fail_patches = n;
    }

    pub fn set_stats_down(&self, down: bool) {
        self.state.borrow_mut().stats_down = down;
    }

    pub fn set_clock_down(&self, down: bool) {
        self.state.borrow_mut().clock_down = down;
    }

    // RAISE `flag` ONCE `patches` PATCH CALLS HAVE BEEN MADE
    pub fn cancel_after_patches(&self, patches: usize, flag: Arc<AtomicBool>) {
        self.state.borrow_mut().cancel_after = Some((patches, flag));
    }

    pub fn applied(&self) -> Option<Schedule> {
        self.state.borrow().applied.clone()
    }

    // SUCCESSFUL PATCHES, OLDEST FIRST
    pub fn history(&self) -> Vec<Schedule> {
        self.state.borrow().history.clone()
    }

    pub fn patch_calls(&self) -> usize {
        self.state.borrow().patch_calls
    }

    pub fn phase_lock(&self) -> Option<bool> {
        self.sensor_param("phase_lock_enable").map(|v| v == "true")
    }

    pub fn sensor_param(&self, key: &str) -> Option<String> {
        self.state.borrow().sensor_params.get(key).cloned()
    }

    pub fn sensor_calls(&self) -> Vec<String> {
        self.state.borrow().sensor_calls.clone()
    }

    pub fn coverage(&self) -> f64 {
        self.model.coverage(self.state.borrow().applied.as_ref())
    }

    fn reading(&self) -> StatReading {
        let mut st = self.state.borrow_mut();
        let eff = self.model.coverage(st.applied.as_ref());
        let noise = if self.model.noise_pct > 0.0 {
            (st.next_unit() * 2.0 - 1.0) * self.model.noise_pct / 100.0
        } else {
            0.0
        };
        StatReading {
            frame_completeness: (eff + noise).clamp(0.0, 1.0),
            fps: self.model.fps_nominal * eff,
            jitter_us: self.model.jitter_base_us + (1.0 - eff) * 50.0,
            packet_rate: self.model.pps_nominal * eff,
        }
    }
}

struct SimPlane(SimLink);

impl ControlPlane for SimPlane {
    fn patch(&mut self, document: &str) -> Result<PatchOutput> {
        let schedule = Schedule::from_patch_document(document)?;
        let mut st = self.0.state.borrow_mut();
        st.patch_calls += 1;
        if let Some((after, flag)) = &st.cancel_after {
            if st.patch_calls >= *after {
                flag.store(true, Ordering::Relaxed);
            }
        }
        if st.fail_patches > 0 {
            st.fail_patches -= 1;
            return Ok(PatchOutput {
                exit_ok: true,
                stdout: "Failed to patch: resource busy".into(),
                stderr: String::new(),
            });
        }
        st.applied = Some(schedule.clone());
        st.history.push(schedule);
        Ok(PatchOutput::ok())
    }
}

struct SimClock(SimLink);

impl ClockSource for SimClock {
    fn now(&mut self) -> Result<BaseTime> {
        if self.0.state.borrow().clock_down {
            return Err(TasError::ClockUnavailable("simulated fetch timeout".into()));
        }
        let total = self.0.model.epoch_sec as u128 * NS_PER_SEC as u128 + self.0.pace.elapsed().as_nanos();
        BaseTime::from_total_ns(total)
    }
}

struct SimStats(SimLink);

impl StatsSource for SimStats {
    fn poll(&mut self) -> Result<StatReading> {
        if self.0.state.borrow().stats_down {
            return Err(TasError::MeasurementGap("simulated poll timeout".into()));
        }
        Ok(self.0.reading())
    }
}

struct SimSensor(SimLink);

impl SensorControl for SimSensor {
    fn set_config_param(&mut self, key: &str, value: &str) -> Result<()> {
        let mut st = self.0.state.borrow_mut();
        st.sensor_calls.push(format!("{} {}", key, value));
        st.sensor_params.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<()> {
        self.0.state.borrow_mut().sensor_calls.push("reinitialize".into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualPace;
    use crate::schedule::ScheduleEntry;

    fn sched(entries: Vec<ScheduleEntry>, phase_ns: u32) -> Schedule {
        Schedule::build(781_250, entries, BaseTime::new(1_700_000_002, phase_ns)).unwrap()
    }

    #[test]
    fn overlap_wraps_the_cycle() {
        assert_eq!(circular_overlap(700, 200, 0, 100, 800), 100);
        assert_eq!(circular_overlap(0, 100, 750, 100, 800), 50);
        assert_eq!(circular_overlap(100, 100, 400, 100, 800), 0);
    }

    #[test]
    fn aligned_window_covers_burst() {
        let m = SimModel { slack_ns: 0, ..Default::default() };
        // OPEN [470000, 620000) CONTAINS BURST [480000, 590000)
        let s = sched(
            vec![
                ScheduleEntry::new(254, 470_000),
                ScheduleEntry::new(255, 150_000),
                ScheduleEntry::new(254, 161_250),
            ],
            0,
        );
        assert_eq!(m.coverage(Some(&s)), 1.0);
        // SHIFT THE WINDOW 100US LATE: ONLY 20US OF THE BURST REMAINS COVERED
        let late = sched(s.entries().to_vec(), 100_000);
        assert!((m.coverage(Some(&late)) - 0.0).abs() < 0.2);
        assert!(m.coverage(None) == 1.0);
    }

    #[test]
    fn failing_patches_use_text_marker() {
        let pace = ManualPace::new();
        let link = SimLink::new(SimModel::default(), Rc::new(pace));
        link.fail_next_patches(1);
        let doc = sched(vec![ScheduleEntry::new(255, 781_250)], 0).to_patch_document("1");
        let mut plane = link.control_plane();
        let out = plane.patch(&doc).unwrap();
        assert!(out.exit_ok && !out.succeeded());
        assert!(plane.patch(&doc).unwrap().succeeded());
        assert_eq!(link.patch_calls(), 2);
        assert_eq!(link.history().len(), 1);
    }

    #[test]
    fn clock_follows_pace() {
        let pace = ManualPace::new();
        let link = SimLink::new(SimModel::default(), Rc::new(pace.clone()));
        let mut clock = link.clock();
        pace.advance(Duration::from_millis(1_500));
        assert_eq!(clock.now().unwrap(), BaseTime::new(1_700_000_001, 500_000_000));
        link.set_clock_down(true);
        assert!(matches!(clock.now(), Err(TasError::ClockUnavailable(_))));
    }
}
