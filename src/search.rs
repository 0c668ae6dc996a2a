// TASALIGN SEARCH CONTROLLER
// BOOTSTRAP -> COARSE GRID -> SEEDS -> FINE NEIGHBOURHOODS -> WINNER -> SOAK.
// STRICTLY ONE CANDIDATE AT A TIME: APPLY, SETTLE, SAMPLE, SCORE.
// ONLY CONTROL-PLANE APPLY FAILURES ARE ABSORBED PER CANDIDATE. EVERYTHING
// ELSE PROPAGATES TO THE CALLER, WHICH MUST RUN THIS UNDER THE SUPERVISOR.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::applier::ScheduleApplier;
use crate::clock::Pace;
use crate::diagnostics::{queue_estimate, time_to_degrade, DropWatchConfig, QueueEstimate};
use crate::error::{Result, TasError};
use crate::scorer::{Ranking, ScorerConfig};
use crate::schedule::{CloseSplit, GateLayout, GateMasks, GateProgram, Schedule, SplitRange};
use crate::sensor::{Sensor, SensorSetting};
use crate::telemetry::{Sampler, StatSample, StatSummary, SummaryDelta};
use crate::timebase::normalize_phase;

pub const DEFAULT_CYCLE_NS: u64 = 781_250;

// EVERYTHING THE SEARCH DRIVES. OWNED BY THE CALLER SO THE SUPERVISOR CAN
// REACH THE SWITCH AFTER THE SEARCH BODY HAS RETURNED OR UNWOUND.
pub struct Rig {
    pub applier: ScheduleApplier,
    pub sampler: Sampler,
    pub sensor: Option<Sensor>,
    pub pace: Rc<dyn Pace>,
    pub shutdown: Arc<AtomicBool>,
}

impl Rig {
    fn check_shutdown(&self) -> Result<()> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(TasError::Cancelled);
        }
        Ok(())
    }

    fn settle(&self, ms: u64) {
        if ms > 0 {
            self.pace.sleep(Duration::from_millis(ms));
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub cycle_ns: u64,
    pub layout: GateLayout,
    pub masks: GateMasks,
    pub open_widths_ns: Vec<u64>,
    // IGNORED UNLESS THE LAYOUT HAS A CLOSE-REGION SPLIT
    pub splits: Vec<CloseSplit>,
    // EXPANDS INTO CENTRE OFFSETS PER WIDTH, ADDED TO splits
    pub split_range: Option<SplitRange>,
    pub phase_step_ns: u64,

    // SENSOR AXES, OUTERMOST. NONE KEEPS THE BASELINE VALUE.
    pub timestamp_mode: Vec<Option<String>>,
    pub phase_lock: Vec<bool>,
    pub phase_lock_offset: Vec<Option<i64>>,

    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    pub coarse_window_ms: u64,
    pub fine_window_ms: u64,

    pub top_k: usize,
    pub fine_phase_window_ns: u64,
    pub fine_phase_step_ns: u64,
    // 0 KEEPS THE SEED'S VALUE ON THAT AXIS
    pub fine_open_window_ns: u64,
    pub fine_open_step_ns: u64,
    pub fine_front_window_ns: u64,
    pub fine_front_step_ns: u64,

    // 0 SKIPS THE STAGE
    pub bootstrap_ms: u64,
    pub bootstrap_poll_interval_ms: u64,
    pub soak_ms: u64,
    pub soak_poll_interval_ms: u64,
    pub soak_settle_ms: u64,

    pub coarse_ranking: Ranking,
    pub fine_ranking: Ranking,
    // 0 NEVER ABORTS
    pub abort_after_apply_failures: u32,
    pub drop_watch: DropWatchConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cycle_ns: DEFAULT_CYCLE_NS,
            layout: GateLayout::CloseOpenClose,
            masks: GateMasks::default(),
            open_widths_ns: vec![50_000, 60_000, 70_000, 80_000, 100_000, 120_000, 150_000],
            splits: vec![CloseSplit::CenterOffset(0)],
            split_range: None,
            phase_step_ns: 20_000,
            timestamp_mode: vec![None],
            phase_lock: vec![false],
            phase_lock_offset: vec![None],
            settle_ms: 200,
            poll_interval_ms: 200,
            coarse_window_ms: 600,
            fine_window_ms: 900,
            top_k: 3,
            fine_phase_window_ns: 20_000,
            fine_phase_step_ns: 1_000,
            fine_open_window_ns: 0,
            fine_open_step_ns: 1_000,
            fine_front_window_ns: 0,
            fine_front_step_ns: 1_000,
            bootstrap_ms: 60_000,
            bootstrap_poll_interval_ms: 250,
            soak_ms: 300_000,
            soak_poll_interval_ms: 500,
            soak_settle_ms: 1_000,
            coarse_ranking: Ranking::coarse_default(),
            fine_ranking: Ranking::fine_default(),
            abort_after_apply_failures: 5,
            drop_watch: DropWatchConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        let bad = |m: &str| Err(TasError::Config(m.to_string()));
        if self.cycle_ns == 0 {
            return bad("cycle_ns must be > 0");
        }
        if self.phase_step_ns == 0 {
            return bad("phase_step_ns must be > 0");
        }
        if self.open_widths_ns.is_empty() {
            return bad("open_widths_ns is empty");
        }
        if self.timestamp_mode.is_empty() || self.phase_lock.is_empty() || self.phase_lock_offset.is_empty() {
            return bad("sensor axes need at least one value each");
        }
        if self.layout.uses_split() && self.splits.is_empty() && self.split_range.is_none() {
            return bad("layout needs at least one close split");
        }
        if self.split_range.map_or(false, |r| r.step_ns == 0) {
            return bad("split_range.step_ns must be > 0");
        }
        // A SINGLE BAD APPLY MUST NEVER END THE SEARCH
        if self.abort_after_apply_failures == 1 {
            return bad("abort_after_apply_failures must be 0 (never) or >= 2");
        }
        if self.top_k == 0 {
            return bad("top_k must be > 0");
        }
        if self.coarse_ranking.0.is_empty() || self.fine_ranking.0.is_empty() {
            return bad("rankings need at least one key");
        }
        for w in [self.fine_phase_window_ns, self.fine_open_window_ns, self.fine_front_window_ns] {
            if w >= self.cycle_ns {
                return bad("fine window must be smaller than the cycle");
            }
        }
        Ok(())
    }

    pub fn needs_sensor(&self) -> bool {
        self.timestamp_mode.iter().any(Option::is_some)
            || self.phase_lock.iter().any(|&b| b)
            || self.phase_lock_offset.iter().any(Option::is_some)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Coarse,
    Fine,
}

// ONE POINT IN THE SEARCH SPACE. phase_ns IS ALREADY IN [0, cycle).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidatePoint {
    pub timestamp_mode: Option<String>,
    pub phase_lock: bool,
    pub phase_lock_offset: Option<i64>,
    pub open_ns: u64,
    pub close_front_ns: Option<u64>,
    pub phase_ns: u64,
}

pub type PointIdentity = (Option<String>, bool, Option<i64>, u64, Option<u64>);

impl CandidatePoint {
    // EVERYTHING EXCEPT PHASE
    pub fn identity(&self) -> PointIdentity {
        (
            self.timestamp_mode.clone(),
            self.phase_lock,
            self.phase_lock_offset,
            self.open_ns,
            self.close_front_ns,
        )
    }

    pub fn sensor_setting(&self) -> SensorSetting {
        SensorSetting {
            timestamp_mode: self.timestamp_mode.clone(),
            phase_lock: self.phase_lock,
            phase_lock_offset: self.phase_lock_offset,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchCandidate {
    pub id: usize,
    pub stage: Stage,
    // ID OF THE COARSE CANDIDATE THIS FINE POINT REFINES
    pub seed: Option<usize>,
    pub point: CandidatePoint,
    pub program: GateProgram,
    pub applied: Option<Schedule>,
    pub apply_error: Option<String>,
    pub summary: StatSummary,
    pub score: f64,
}

impl SearchCandidate {
    pub fn is_measured(&self) -> bool {
        !self.summary.is_degenerate()
    }
}

// APPEND-ONLY RECORD OF EVERY MEASURED POINT IN THE RUN
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct CandidateLog {
    entries: Vec<SearchCandidate>,
}

impl CandidateLog {
    fn push(&mut self, mut c: SearchCandidate) -> usize {
        let id = self.entries.len();
        c.id = id;
        self.entries.push(c);
        id
    }

    pub fn get(&self, id: usize) -> Option<&SearchCandidate> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchCandidate> {
        self.entries.iter()
    }

    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &SearchCandidate> {
        self.entries.iter().filter(move |c| c.stage == stage)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bootstrap {
    pub summary: StatSummary,
    pub packet_period_us: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SoakReport {
    pub duration_ms: u64,
    pub baseline: StatSummary,
    pub winner: StatSummary,
    pub delta: SummaryDelta,
    pub t_drop_s: Option<f64>,
    pub queue: Option<QueueEstimate>,
}

// MUTABLE STATE OF ONE RUN. THE CONTROLLER APPENDS. SUPERVISOR AND REPORT
// READ IT AFTER THE SEARCH BODY ENDS, HOWEVER IT ENDED.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunRecord {
    pub bootstrap: Option<Bootstrap>,
    pub candidates: CandidateLog,
    pub coarse_ranking: Vec<usize>,
    pub seeds: Vec<usize>,
    pub fine_ranking: Vec<usize>,
    pub winner: Option<usize>,
    pub soak: Option<SoakReport>,
}

impl RunRecord {
    pub fn winner(&self) -> Option<&SearchCandidate> {
        self.winner.and_then(|id| self.candidates.get(id))
    }
}

// PYTHON-STYLE range(-w, w + 1, step). 0 IS INCLUDED ONLY WHEN step DIVIDES w.
pub fn neighborhood(window_ns: u64, step_ns: u64) -> Vec<i64> {
    if window_ns == 0 || step_ns == 0 {
        return vec![0];
    }
    let w = window_ns as i64;
    let s = step_ns as i64;
    let mut out = Vec::new();
    let mut d = -w;
    while d <= w {
        out.push(d);
        d += s;
    }
    out
}

fn offset(base: u64, d: i64) -> Option<u64> {
    let v = base as i128 + d as i128;
    (v > 0 && v <= u64::MAX as i128).then_some(v as u64)
}

pub struct SearchController<'a> {
    cfg: &'a SearchConfig,
    scorer: ScorerConfig,
    safe: &'a GateProgram,
    apply_failures: u32,
}

impl<'a> SearchController<'a> {
    pub fn new(cfg: &'a SearchConfig, scorer: ScorerConfig, safe: &'a GateProgram) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg, scorer, safe, apply_failures: 0 })
    }

    pub fn program_for(&self, p: &CandidatePoint) -> Result<GateProgram> {
        let entries = self.cfg.layout.entries(
            self.cfg.cycle_ns,
            p.open_ns,
            p.close_front_ns.unwrap_or(0),
            self.cfg.masks,
        )?;
        GateProgram::new(self.cfg.cycle_ns, entries, p.phase_ns as i64)
    }

    // DISTINCT CLOSE-FRONT DURATIONS FOR ONE WIDTH. EMPTY SPLITS ARE SKIPPED.
    fn fronts(&self, open_ns: u64) -> Vec<Option<u64>> {
        let cfg = self.cfg;
        if !cfg.layout.uses_split() {
            return vec![None];
        }
        let close_total = cfg.cycle_ns - open_ns;
        let ranged = cfg.split_range.map(|r| r.splits(close_total)).unwrap_or_default();
        let mut fronts = Vec::new();
        for split in cfg.splits.iter().chain(ranged.iter()) {
            match split.front_ns(close_total) {
                Some(f) if !fronts.contains(&Some(f)) => fronts.push(Some(f)),
                Some(_) => {}
                None => debug!("split {:?} empty at open {} ns, skipped", split, open_ns),
            }
        }
        fronts
    }

    // SENSOR AXES OUTERMOST (A REINIT IS THE SLOWEST CHANGE), PHASE INNERMOST.
    pub fn coarse_points(&self) -> Vec<CandidatePoint> {
        let cfg = self.cfg;
        let mut points = Vec::new();
        for timestamp_mode in &cfg.timestamp_mode {
            for &phase_lock in &cfg.phase_lock {
                for &phase_lock_offset in &cfg.phase_lock_offset {
                    for &open_ns in &cfg.open_widths_ns {
                        if open_ns == 0 || open_ns >= cfg.cycle_ns {
                            warn!("open width {} ns outside cycle {} ns, skipped", open_ns, cfg.cycle_ns);
                            continue;
                        }
                        for close_front_ns in self.fronts(open_ns) {
                            for phase_ns in (0..cfg.cycle_ns).step_by(cfg.phase_step_ns as usize) {
                                points.push(CandidatePoint {
                                    timestamp_mode: timestamp_mode.clone(),
                                    phase_lock,
                                    phase_lock_offset,
                                    open_ns,
                                    close_front_ns,
                                    phase_ns,
                                });
                            }
                        }
                    }
                }
            }
        }
        points
    }

    // SEED KEEPS ITS SENSOR SETTING. PHASE WRAPS MOD CYCLE.
    pub fn fine_points(&self, seed: &CandidatePoint) -> Vec<CandidatePoint> {
        let cfg = self.cfg;
        let opens: Vec<u64> = neighborhood(cfg.fine_open_window_ns, cfg.fine_open_step_ns)
            .into_iter()
            .filter_map(|d| offset(seed.open_ns, d))
            .filter(|&o| o < cfg.cycle_ns)
            .collect();
        let front_deltas = match seed.close_front_ns {
            Some(_) => neighborhood(cfg.fine_front_window_ns, cfg.fine_front_step_ns),
            None => vec![0],
        };
        let phase_deltas = neighborhood(cfg.fine_phase_window_ns, cfg.fine_phase_step_ns);

        let mut points = Vec::new();
        for &open_ns in &opens {
            for &df in &front_deltas {
                let close_front_ns = match seed.close_front_ns {
                    Some(f) => match offset(f, df) {
                        Some(v) => Some(v),
                        None => continue,
                    },
                    None => None,
                };
                for &dp in &phase_deltas {
                    let phase_ns = normalize_phase(seed.phase_ns as i64 + dp, cfg.cycle_ns);
                    let p = CandidatePoint { open_ns, close_front_ns, phase_ns, ..seed.clone() };
                    if self.program_for(&p).is_ok() {
                        points.push(p);
                    }
                }
            }
        }
        points
    }

    pub fn run(&mut self, rig: &mut Rig, record: &mut RunRecord) -> Result<()> {
        if rig.sensor.is_none() && self.cfg.needs_sensor() {
            return Err(TasError::Config("sensor axes need a sensor endpoint".into()));
        }
        if let Some(sensor) = rig.sensor.as_mut() {
            sensor.restore_baseline()?;
        }

        if self.cfg.bootstrap_ms > 0 {
            let b = self.bootstrap(rig)?;
            record.bootstrap = Some(b);
        }

        self.coarse(rig, record)?;
        record.coarse_ranking = self.rank(record, Stage::Coarse, &self.cfg.coarse_ranking);
        record.seeds = self.select_seeds(record);
        info!(
            "coarse done: {} candidates, {} measured, {} seeds",
            record.candidates.stage(Stage::Coarse).count(),
            record.coarse_ranking.len(),
            record.seeds.len()
        );

        self.fine(rig, record)?;
        record.fine_ranking = self.rank(record, Stage::Fine, &self.cfg.fine_ranking);
        record.winner = record.fine_ranking.first().copied();

        let Some(winner) = record.winner().cloned() else {
            warn!("no measurable fine candidate, no winner");
            return Ok(());
        };
        info!(
            "winner #{} mode={:?} lock={} lock_offset={:?} open={} front={:?} phase={} score={:.2}",
            winner.id,
            winner.point.timestamp_mode,
            winner.point.phase_lock,
            winner.point.phase_lock_offset,
            winner.point.open_ns,
            winner.point.close_front_ns,
            winner.point.phase_ns,
            winner.score
        );

        if self.cfg.soak_ms > 0 {
            let soak = self.soak(rig, &winner)?;
            record.soak = Some(soak);
        }
        Ok(())
    }

    fn bootstrap(&self, rig: &mut Rig) -> Result<Bootstrap> {
        rig.check_shutdown()?;
        info!("bootstrap: all-open baseline {} ms", self.cfg.bootstrap_ms);
        rig.applier.apply_program(self.safe)?;
        rig.settle(self.cfg.soak_settle_ms);
        let summary = rig.sampler.sample_window(
            Duration::from_millis(self.cfg.bootstrap_ms),
            Duration::from_millis(self.cfg.bootstrap_poll_interval_ms),
        )?;
        let packet_period_us = summary.packet_period_us();
        info!(
            "[period] pps_mean={:.3} pkt_period_us_est={:.3}",
            summary.pps_mean,
            packet_period_us.unwrap_or(0.0)
        );
        Ok(Bootstrap { summary, packet_period_us })
    }

    fn coarse(&mut self, rig: &mut Rig, record: &mut RunRecord) -> Result<()> {
        let points: Vec<_> = self
            .coarse_points()
            .into_iter()
            .filter_map(|p| match self.program_for(&p) {
                Ok(prog) => Some((p, prog)),
                Err(e) => {
                    warn!("coarse point {:?} skipped: {}", p, e);
                    None
                }
            })
            .collect();
        let total = points.len();
        let window = Duration::from_millis(self.cfg.coarse_window_ms);
        for (i, (p, program)) in points.into_iter().enumerate() {
            let id = self.probe(rig, record, Stage::Coarse, None, p, program, window)?;
            self.log_progress(record, id, i + 1, total);
        }
        Ok(())
    }

    fn fine(&mut self, rig: &mut Rig, record: &mut RunRecord) -> Result<()> {
        let mut work = Vec::new();
        for &seed_id in &record.seeds {
            let Some(seed) = record.candidates.get(seed_id) else { continue };
            for p in self.fine_points(&seed.point) {
                if let Ok(program) = self.program_for(&p) {
                    work.push((seed_id, p, program));
                }
            }
        }
        let total = work.len();
        let window = Duration::from_millis(self.cfg.fine_window_ms);
        for (i, (seed_id, p, program)) in work.into_iter().enumerate() {
            let id = self.probe(rig, record, Stage::Fine, Some(seed_id), p, program, window)?;
            self.log_progress(record, id, i + 1, total);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn probe(
        &mut self,
        rig: &mut Rig,
        record: &mut RunRecord,
        stage: Stage,
        seed: Option<usize>,
        point: CandidatePoint,
        program: GateProgram,
        window: Duration,
    ) -> Result<usize> {
        rig.check_shutdown()?;
        if let Some(sensor) = rig.sensor.as_mut() {
            sensor.configure(&point.sensor_setting())?;
        }

        let mut candidate = SearchCandidate {
            id: 0,
            stage,
            seed,
            point,
            program,
            applied: None,
            apply_error: None,
            summary: StatSummary::default(),
            score: self.scorer.min_score(),
        };

        match rig.applier.apply_program(&candidate.program) {
            Ok(schedule) => {
                self.apply_failures = 0;
                candidate.applied = Some(schedule);
                rig.settle(self.cfg.settle_ms);
                candidate.summary = rig
                    .sampler
                    .sample_window(window, Duration::from_millis(self.cfg.poll_interval_ms))?;
                candidate.score = self.scorer.score(&candidate.summary);
            }
            Err(e) if e.is_candidate_local() => {
                self.apply_failures += 1;
                candidate.apply_error = Some(e.to_string());
                let limit = self.cfg.abort_after_apply_failures;
                if limit > 0 && self.apply_failures >= limit {
                    record.candidates.push(candidate);
                    warn!("{} consecutive apply failures, aborting search", self.apply_failures);
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
        Ok(record.candidates.push(candidate))
    }

    fn log_progress(&self, record: &RunRecord, id: usize, n: usize, total: usize) {
        let Some(c) = record.candidates.get(id) else { return };
        let stage = match c.stage {
            Stage::Coarse => "coarse",
            Stage::Fine => "fine",
        };
        let front = c.point.close_front_ns.map_or_else(|| "-".to_string(), |f| f.to_string());
        if let Some(err) = &c.apply_error {
            warn!(
                "[{} {}/{}] open={:.1}us front={} ph={:>6} APPLY FAILED: {}",
                stage,
                n,
                total,
                c.point.open_ns as f64 / 1000.0,
                front,
                c.point.phase_ns,
                err
            );
            return;
        }
        info!(
            "[{} {}/{}] lock={} open={:.1}us front={} ph={:>6} fc={:.2}% fps={:.2} n={} score={:.2}",
            stage,
            n,
            total,
            c.point.phase_lock,
            c.point.open_ns as f64 / 1000.0,
            front,
            c.point.phase_ns,
            c.summary.fc_mean_pct,
            c.summary.fps_mean,
            c.summary.sample_count,
            c.score
        );
    }

    // BEST FIRST. UNMEASURED CANDIDATES ARE NEVER RANKED.
    fn rank(&self, record: &RunRecord, stage: Stage, ranking: &Ranking) -> Vec<usize> {
        let mut ranked: Vec<&SearchCandidate> =
            record.candidates.stage(stage).filter(|c| c.is_measured()).collect();
        ranking.sort_by_key(&mut ranked, |c| (&c.summary, c.score));
        ranked.into_iter().map(|c| c.id).collect()
    }

    fn select_seeds(&self, record: &RunRecord) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut seeds = Vec::new();
        for &id in &record.coarse_ranking {
            if seeds.len() >= self.cfg.top_k {
                break;
            }
            let Some(c) = record.candidates.get(id) else { continue };
            if seen.insert(c.point.identity()) {
                seeds.push(id);
            }
        }
        seeds
    }

    fn soak_window(&self, rig: &mut Rig, program: &GateProgram, label: &str) -> Result<Vec<StatSample>> {
        rig.check_shutdown()?;
        info!("[soak {}] {} ms", label, self.cfg.soak_ms);
        rig.applier.apply_program(program)?;
        rig.settle(self.cfg.soak_settle_ms);
        rig.sampler.collect(
            Duration::from_millis(self.cfg.soak_ms),
            Duration::from_millis(self.cfg.soak_poll_interval_ms),
            Some(label),
        )
    }

    fn soak(&self, rig: &mut Rig, winner: &SearchCandidate) -> Result<SoakReport> {
        let base_samples = self.soak_window(rig, self.safe, "all-open")?;
        let baseline = StatSummary::from_samples(&base_samples);
        let win_samples = self.soak_window(rig, &winner.program, "winner")?;
        let best = StatSummary::from_samples(&win_samples);
        let delta = best.delta(&baseline);

        let watch = &self.cfg.drop_watch;
        let t_drop_s = time_to_degrade(&win_samples, watch);
        let queue = watch.stable_open_ns.map(|stable| {
            queue_estimate(self.cfg.cycle_ns, winner.point.open_ns, stable, watch.link_bits_per_sec, t_drop_s)
        });
        info!(
            "[soak delta] fc_mean={:+.3} p01={:+.3} p05={:+.3} fps_mean={:+.3} t_drop={:?}",
            delta.fc_mean_pct, delta.fc_p01_pct, delta.fc_p05_pct, delta.fps_mean, t_drop_s
        );
        Ok(SoakReport {
            duration_ms: self.cfg.soak_ms,
            baseline,
            winner: best,
            delta,
            t_drop_s,
            queue,
        })
    }
}
