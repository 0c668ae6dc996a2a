pub mod apply;
pub mod restore;
pub mod search;
pub mod simulate;
pub mod time;

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Local;
use clap::Args;
use tracing::warn;

use tasalign::applier::ScheduleApplier;
use tasalign::clock::{Pace, SystemPace};
use tasalign::config::RunConfig;
use tasalign::error::TasError;
use tasalign::report::{entries_label, RunReport};
use tasalign::schedule::SplitRange;
use tasalign::search::{Rig, RunRecord, SearchController, Stage};
use tasalign::sensor::{HttpSensor, Sensor};
use tasalign::supervisor::{Supervisor, Terminal};
use tasalign::telemetry::{HttpStats, Sampler};

// OVERRIDES APPLIED ON TOP OF THE CONFIG FILE
#[derive(Args, Clone, Debug, Default)]
pub struct SearchArgs {
    // OPEN WIDTHS IN MICROSECONDS, COMMA SEPARATED
    #[arg(long, value_delimiter = ',')]
    opens_us: Option<Vec<f64>>,

    #[arg(long)]
    phase_step_ns: Option<u64>,

    // SWEEP THE CLOSE SPLIT CENTRE +/- THIS MANY NS
    #[arg(long)]
    delta_range_ns: Option<u64>,

    // SPLIT SWEEP STEP, DEFAULT 1000
    #[arg(long, requires = "delta_range_ns")]
    delta_step_ns: Option<u64>,

    // PHASE-LOCK AXIS, E.G. false,true
    #[arg(long, value_delimiter = ',')]
    phase_lock: Option<Vec<bool>>,

    // SENSOR TIMESTAMP MODES, COMMA SEPARATED
    #[arg(long, value_delimiter = ',')]
    timestamp_mode: Option<Vec<String>>,

    // SENSOR PHASE-LOCK OFFSETS IN NS, COMMA SEPARATED
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    phase_lock_offset: Option<Vec<i64>>,

    #[arg(long)]
    top_k: Option<usize>,

    #[arg(long)]
    fine_window_ns: Option<u64>,

    #[arg(long)]
    fine_step_ns: Option<u64>,

    // 0 SKIPS THE BASELINE
    #[arg(long)]
    bootstrap_s: Option<u64>,

    // 0 SKIPS THE SOAK
    #[arg(long)]
    soak_s: Option<u64>,

    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl SearchArgs {
    pub fn apply_to(&self, cfg: &mut RunConfig) {
        let s = &mut cfg.search;
        if let Some(opens) = &self.opens_us {
            s.open_widths_ns = opens.iter().map(|us| (us * 1000.0).round() as u64).collect();
        }
        if let Some(v) = self.phase_step_ns {
            s.phase_step_ns = v;
        }
        if let Some(range_ns) = self.delta_range_ns {
            s.split_range = Some(SplitRange { range_ns, step_ns: self.delta_step_ns.unwrap_or(1_000) });
        }
        if let Some(v) = &self.phase_lock {
            s.phase_lock = v.clone();
        }
        if let Some(v) = &self.timestamp_mode {
            s.timestamp_mode = v.iter().cloned().map(Some).collect();
        }
        if let Some(v) = &self.phase_lock_offset {
            s.phase_lock_offset = v.iter().copied().map(Some).collect();
        }
        if let Some(v) = self.top_k {
            s.top_k = v;
        }
        if let Some(v) = self.fine_window_ns {
            s.fine_phase_window_ns = v;
        }
        if let Some(v) = self.fine_step_ns {
            s.fine_phase_step_ns = v;
        }
        if let Some(v) = self.bootstrap_s {
            s.bootstrap_ms = v * 1000;
        }
        if let Some(v) = self.soak_s {
            s.soak_ms = v * 1000;
        }
        if let Some(v) = &self.output_dir {
            cfg.output_dir = v.clone();
        }
    }
}

pub fn hardware_pace() -> Rc<dyn Pace> {
    Rc::new(SystemPace::new())
}

pub fn hardware_applier(cfg: &RunConfig, pace: Rc<dyn Pace>) -> ScheduleApplier {
    ScheduleApplier::new(
        Box::new(cfg.tool.keti_tsn()),
        Box::new(cfg.tool.keti_tsn()),
        pace,
        cfg.retry,
        cfg.tool.interface.clone(),
        cfg.tool.base_offset_sec,
    )
}

pub fn hardware_sensor(cfg: &RunConfig, pace: Rc<dyn Pace>) -> Result<Option<Sensor>> {
    let Some(url) = &cfg.endpoints.sensor_url else { return Ok(None) };
    let ctrl = HttpSensor::new(url.clone())?;
    Ok(Some(Sensor::new(
        Box::new(ctrl),
        pace,
        cfg.endpoints.sensor_settle(),
        cfg.endpoints.sensor_baseline.clone(),
    )))
}

pub fn hardware_rig(cfg: &RunConfig, shutdown: Arc<AtomicBool>) -> Result<Rig> {
    let pace = hardware_pace();
    let stats = HttpStats::new(cfg.endpoints.stats_url.clone(), cfg.endpoints.poll_timeout())?;
    Ok(Rig {
        applier: hardware_applier(cfg, pace.clone()),
        sampler: Sampler::new(Box::new(stats), pace.clone(), shutdown.clone()),
        sensor: hardware_sensor(cfg, pace.clone())?,
        pace,
        shutdown,
    })
}

// SEARCH UNDER THE SUPERVISOR, WRITE ARTIFACTS, PRINT THE SUMMARY
pub fn run_supervised(cfg: &RunConfig, rig: &mut Rig, prefix: &str) -> Result<()> {
    let safe = cfg.safe_program()?;
    let supervisor = Supervisor::new(safe.clone());
    let mut controller = SearchController::new(&cfg.search, cfg.scorer, &safe)?;
    let mut record = RunRecord::default();

    let started_at = Local::now();
    let done = supervisor.run(rig, &mut record, |rig, record| controller.run(rig, record));

    let report = RunReport {
        started_at,
        finished_at: Local::now(),
        config: cfg,
        record: &record,
        terminal: &done.terminal,
        error: done.outcome.as_ref().err().map(|e| e.to_string()),
    };
    match report.write(&cfg.output_dir, prefix) {
        Ok((json, md)) => {
            println!("JSON:            {}", json.display());
            println!("REPORT:          {}", md.display());
        }
        Err(e) => warn!("cannot write run artifacts: {}", e),
    }
    print_summary(&record, &done.terminal);

    if let Terminal::Unsafe(e) = &done.terminal {
        bail!("PORT STATE UNKNOWN AFTER CLEANUP: {}", e);
    }
    match done.outcome {
        Err(TasError::Cancelled) => {
            println!("CANCELLED. PORT RESTORED.");
            Ok(())
        }
        other => Ok(other?),
    }
}

pub fn print_summary(record: &RunRecord, terminal: &Terminal) {
    let coarse = record.candidates.stage(Stage::Coarse).count();
    let fine = record.candidates.stage(Stage::Fine).count();

    println!();
    println!("TASALIGN SUMMARY");
    println!("{}", "=".repeat(60));
    println!("CANDIDATES:      {} (coarse {}, fine {})", record.candidates.len(), coarse, fine);
    if let Some(b) = &record.bootstrap {
        println!("BASELINE:        fc={:.3}% fps={:.3} period={}", b.summary.fc_mean_pct, b.summary.fps_mean,
                 b.packet_period_us.map_or_else(|| "n/a".to_string(), |p| format!("{:.3}us", p)));
    }
    println!("SEEDS:           {:?}", record.seeds);

    if !record.fine_ranking.is_empty() {
        println!();
        println!("  {:>5} {:>8} {:>8} {:>8} {:>9} {:>9} {:>8} {:>9}",
                 "ID", "OPEN", "FRONT", "PHASE", "FC_MEAN", "FC_P01", "FPS_MIN", "SCORE");
        for c in record.fine_ranking.iter().take(5).filter_map(|&id| record.candidates.get(id)) {
            println!("  {:>5} {:>8} {:>8} {:>8} {:>9.3} {:>9.3} {:>8.3} {:>9.3}",
                     c.id,
                     c.point.open_ns,
                     c.point.close_front_ns.map_or_else(|| "-".to_string(), |f| f.to_string()),
                     c.point.phase_ns,
                     c.summary.fc_mean_pct,
                     c.summary.fc_p01_pct,
                     c.summary.fps_min,
                     c.score);
        }
        println!();
    }

    match record.winner() {
        Some(w) => {
            println!("WINNER:          #{} [{}] phase={}ns lock={}", w.id, entries_label(w), w.point.phase_ns, w.point.phase_lock);
            if w.point.timestamp_mode.is_some() || w.point.phase_lock_offset.is_some() {
                println!("SENSOR:          mode={} lock_offset={}",
                         w.point.timestamp_mode.as_deref().unwrap_or("-"),
                         w.point.phase_lock_offset.map_or_else(|| "-".to_string(), |o| o.to_string()));
            }
            println!("SCORE:           {:.3} (fc_mean={:.3}% p01={:.3}% fps_mean={:.3})",
                     w.score, w.summary.fc_mean_pct, w.summary.fc_p01_pct, w.summary.fps_mean);
        }
        None => println!("WINNER:          NONE"),
    }
    if let Some(s) = &record.soak {
        println!("SOAK DELTA:      fc_mean={:+.3} p01={:+.3} p05={:+.3} fps_mean={:+.3}",
                 s.delta.fc_mean_pct, s.delta.fc_p01_pct, s.delta.fc_p05_pct, s.delta.fps_mean);
        if let Some(t) = s.t_drop_s {
            println!("TIME TO DEGRADE: {:.3}s", t);
        }
        if let Some(q) = s.queue.as_ref().and_then(|q| q.queued_bytes) {
            println!("QUEUE ESTIMATE:  {:.0} B (UNCERTIFIED)", q);
        }
    }
    println!("PORT LEFT AS:    {:?}", terminal);
}
