// TASALIGN TELEMETRY
// POLLS THE LIVE STATS ENDPOINT OVER A WALL-CLOCK WINDOW AND SUMMARIZES.
// A FAILED POLL IS A GAP, NOT A ZERO SAMPLE: IT ONLY SHRINKS sample_count.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Pace;
use crate::error::{Result, TasError};

pub const DEFAULT_STATS_URL: &str = "http://127.0.0.1:8080/api/stats";
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 800;

// FLOOR FOR THE POLL INTERVAL: A ZERO INTERVAL WOULD SPIN
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
const SOAK_PROGRESS_EVERY: Duration = Duration::from_secs(10);

// ONE READING FROM THE STATS ENDPOINT, NOT YET PLACED IN TIME
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatReading {
    pub frame_completeness: f64,
    pub fps: f64,
    pub jitter_us: f64,
    pub packet_rate: f64,
}

impl StatReading {
    // REJECT NON-FINITE / NEGATIVE FIELDS. COMPLETENESS CLAMPS TO [0, 1].
    pub fn validated(self) -> Result<Self> {
        let fields = [self.frame_completeness, self.fps, self.jitter_us, self.packet_rate];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(TasError::MeasurementGap(format!("malformed reading {:?}", self)));
        }
        Ok(Self {
            frame_completeness: self.frame_completeness.min(1.0),
            ..self
        })
    }
}

// A READING TIMESTAMPED RELATIVE TO THE START OF ITS WINDOW
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatSample {
    pub t_s: f64,
    pub frame_completeness: f64,
    pub fps: f64,
    pub jitter_us: f64,
    pub packet_rate: f64,
}

impl StatSample {
    pub fn at(t_s: f64, r: StatReading) -> Self {
        Self {
            t_s,
            frame_completeness: r.frame_completeness,
            fps: r.fps,
            jitter_us: r.jitter_us,
            packet_rate: r.packet_rate,
        }
    }

    pub fn fc_pct(&self) -> f64 {
        self.frame_completeness * 100.0
    }
}

// NEAREST-RANK, 1-INDEXED FLOOR: sorted[max(0, floor(n*q) - 1)], CLAMPED.
// KEEP EXACTLY AS-IS: RUNS ARE COMPARED ACROSS DAYS ON THIS RULE.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (n as f64 * q.clamp(0.0, 1.0)).floor() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted[idx]
}

pub fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return 0.0;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn min_of(vals: &[f64]) -> f64 {
    vals.iter().copied().fold(f64::INFINITY, f64::min)
}

// WINDOW AGGREGATE. COMPLETENESS FIELDS ARE ON THE 0-100 SCALE.
// sample_count == 0 MEANS EVERY FIELD IS ZERO.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    pub sample_count: usize,
    pub fc_mean_pct: f64,
    pub fc_min_pct: f64,
    pub fc_p01_pct: f64,
    pub fc_p05_pct: f64,
    pub fps_mean: f64,
    pub fps_min: f64,
    pub jitter_mean_us: f64,
    pub pps_mean: f64,
}

impl StatSummary {
    pub fn from_samples(samples: &[StatSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let fc: Vec<f64> = samples.iter().map(|s| s.fc_pct()).collect();
        let fps: Vec<f64> = samples.iter().map(|s| s.fps).collect();
        let jitter: Vec<f64> = samples.iter().map(|s| s.jitter_us).collect();
        let pps: Vec<f64> = samples.iter().map(|s| s.packet_rate).collect();

        let mut fc_sorted = fc.clone();
        fc_sorted.sort_by(|a, b| a.total_cmp(b));

        Self {
            sample_count: samples.len(),
            fc_mean_pct: mean(&fc),
            fc_min_pct: fc_sorted[0],
            fc_p01_pct: percentile(&fc_sorted, 0.01),
            fc_p05_pct: percentile(&fc_sorted, 0.05),
            fps_mean: mean(&fps),
            fps_min: min_of(&fps),
            jitter_mean_us: mean(&jitter),
            pps_mean: mean(&pps),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.sample_count == 0
    }

    // 1E6 / PPS: PACKET PERIOD SEEN THROUGH AN ALWAYS-OPEN PORT
    pub fn packet_period_us(&self) -> Option<f64> {
        (self.pps_mean > 0.0).then(|| 1e6 / self.pps_mean)
    }

    pub fn delta(&self, baseline: &StatSummary) -> SummaryDelta {
        SummaryDelta {
            fc_mean_pct: self.fc_mean_pct - baseline.fc_mean_pct,
            fc_min_pct: self.fc_min_pct - baseline.fc_min_pct,
            fc_p01_pct: self.fc_p01_pct - baseline.fc_p01_pct,
            fc_p05_pct: self.fc_p05_pct - baseline.fc_p05_pct,
            fps_mean: self.fps_mean - baseline.fps_mean,
            fps_min: self.fps_min - baseline.fps_min,
            jitter_mean_us: self.jitter_mean_us - baseline.jitter_mean_us,
            pps_mean: self.pps_mean - baseline.pps_mean,
        }
    }
}

// PER-METRIC candidate - baseline
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryDelta {
    pub fc_mean_pct: f64,
    pub fc_min_pct: f64,
    pub fc_p01_pct: f64,
    pub fc_p05_pct: f64,
    pub fps_mean: f64,
    pub fps_min: f64,
    pub jitter_mean_us: f64,
    pub pps_mean: f64,
}

pub trait StatsSource {
    // ONE POLL. Err IS A MEASUREMENT GAP AND IS SWALLOWED BY THE SAMPLER.
    fn poll(&mut self) -> Result<StatReading>;
}

#[derive(Deserialize)]
struct StatsPayload {
    #[serde(default)]
    frame_completeness: f64,
    #[serde(default)]
    fps: f64,
    #[serde(default)]
    gap_stdev_us: f64,
    #[serde(default)]
    pps: f64,
}

impl From<StatsPayload> for StatReading {
    fn from(p: StatsPayload) -> Self {
        Self {
            frame_completeness: p.frame_completeness,
            fps: p.fps,
            jitter_us: p.gap_stdev_us,
            packet_rate: p.pps,
        }
    }
}

// PARSE ONE /api/stats BODY
pub fn parse_stats(body: &str) -> Result<StatReading> {
    let payload: StatsPayload = serde_json::from_str(body)
        .map_err(|e| TasError::MeasurementGap(format!("malformed stats: {}", e)))?;
    StatReading::from(payload).validated()
}

pub struct HttpStats {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpStats {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| TasError::Config(format!("cannot build stats client: {}", e)))?;
        Ok(Self { client, url: url.into() })
    }
}

impl StatsSource for HttpStats {
    fn poll(&mut self) -> Result<StatReading> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| TasError::MeasurementGap(e.to_string()))?;
        parse_stats(&body)
    }
}

pub struct Sampler {
    source: Box<dyn StatsSource>,
    pace: Rc<dyn Pace>,
    shutdown: Arc<AtomicBool>,
}

impl Sampler {
    pub fn new(source: Box<dyn StatsSource>, pace: Rc<dyn Pace>, shutdown: Arc<AtomicBool>) -> Self {
        Self { source, pace, shutdown }
    }

    // WALL-CLOCK DRIVEN: POLL EVERY `interval` UNTIL `duration` ELAPSES.
    // ONLY CANCELLATION ENDS A WINDOW EARLY.
    pub fn collect(&mut self, duration: Duration, interval: Duration, label: Option<&str>) -> Result<Vec<StatSample>> {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let start = self.pace.elapsed();
        let end = start + duration;
        let mut samples = Vec::new();
        let mut gaps = 0usize;
        let mut next_progress = start + SOAK_PROGRESS_EVERY;

        loop {
            let now = self.pace.elapsed();
            if now >= end {
                break;
            }
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(TasError::Cancelled);
            }
            match self.source.poll() {
                Ok(r) => samples.push(StatSample::at((now - start).as_secs_f64(), r)),
                Err(e) => {
                    gaps += 1;
                    debug!("{}", e);
                }
            }
            if let Some(label) = label {
                if now >= next_progress {
                    if let Some(last) = samples.last() {
                        info!(
                            "[{}] t+{}s fc={:.2}% fps={:.2}",
                            label,
                            (now - start).as_secs(),
                            last.fc_pct(),
                            last.fps
                        );
                    }
                    next_progress = now + SOAK_PROGRESS_EVERY;
                }
            }
            self.pace.sleep(interval);
        }

        if samples.is_empty() {
            debug!("{} ({} gaps)", TasError::NoSamples, gaps);
        }
        Ok(samples)
    }

    pub fn sample_window(&mut self, duration: Duration, interval: Duration) -> Result<StatSummary> {
        let samples = self.collect(duration, interval, None)?;
        Ok(StatSummary::from_samples(&samples))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::clock::ManualPace;

    fn sample(fc_pct: f64, fps: f64) -> StatSample {
        StatSample { t_s: 0.0, frame_completeness: fc_pct / 100.0, fps, jitter_us: 5.0, packet_rate: 1280.0 }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn five_sample_summary() {
        let samples: Vec<StatSample> = [99.9, 99.9, 98.0, 100.0, 97.5]
            .iter()
            .map(|&fc| sample(fc, 10.0))
            .collect();
        let s = StatSummary::from_samples(&samples);
        assert_eq!(s.sample_count, 5);
        assert!(close(s.fc_p01_pct, 97.5));
        assert!(close(s.fc_p05_pct, 97.5));
        assert!(close(s.fc_min_pct, 97.5));
        assert!(close(s.fc_mean_pct, 99.06));
        assert!(close(s.fps_mean, 10.0));
    }

    #[test]
    fn percentile_nearest_rank_rule() {
        let sorted: Vec<f64> = (1..=250).map(|v| v as f64).collect();
        // floor(2.5) - 1 = 1, floor(12.5) - 1 = 11
        assert_eq!(percentile(&sorted, 0.01), 2.0);
        assert_eq!(percentile(&sorted, 0.05), 12.0);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 250.0);
        assert_eq!(percentile(&sorted[..5], 0.01), 1.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn empty_window_is_all_zero() {
        let s = StatSummary::from_samples(&[]);
        assert_eq!(s, StatSummary::default());
        assert!(s.is_degenerate());
        assert_eq!(s.packet_period_us(), None);
    }

    #[test]
    fn parse_stats_fields() {
        let r = parse_stats(r#"{"frame_completeness":0.995,"fps":10.0,"gap_stdev_us":12.5,"pps":1280.0,"extra":1}"#)
            .unwrap();
        assert!(close(r.frame_completeness, 0.995));
        assert!(close(r.jitter_us, 12.5));
        assert!(close(r.packet_rate, 1280.0));
        assert!(parse_stats("<html>").is_err());
        assert!(parse_stats(r#"{"fps":-1.0}"#).is_err());
        let clamped = parse_stats(r#"{"frame_completeness":1.2}"#).unwrap();
        assert!(close(clamped.frame_completeness, 1.0));
    }

    struct Scripted {
        replies: Rc<RefCell<Vec<Option<f64>>>>,
    }

    impl StatsSource for Scripted {
        fn poll(&mut self) -> Result<StatReading> {
            let next = self.replies.borrow_mut().pop().flatten();
            match next {
                Some(fc) => Ok(StatReading { frame_completeness: fc, fps: 10.0, jitter_us: 1.0, packet_rate: 1280.0 }),
                None => Err(TasError::MeasurementGap("timeout".into())),
            }
        }
    }

    fn sampler(replies: Vec<Option<f64>>, pace: &ManualPace) -> (Sampler, Arc<AtomicBool>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let s = Sampler::new(
            Box::new(Scripted { replies: Rc::new(RefCell::new(replies)) }),
            Rc::new(pace.clone()),
            shutdown.clone(),
        );
        (s, shutdown)
    }

    #[test]
    fn window_is_wall_clock_driven() {
        let pace = ManualPace::new();
        let (mut s, _) = sampler(vec![Some(1.0); 100], &pace);
        let summary = s.sample_window(Duration::from_millis(1_800), Duration::from_millis(200)).unwrap();
        assert_eq!(summary.sample_count, 9);
        assert_eq!(pace.elapsed(), Duration::from_millis(1_800));
    }

    #[test]
    fn gaps_reduce_sample_count() {
        let pace = ManualPace::new();
        let (mut s, _) = sampler(vec![Some(1.0), None, Some(0.9), None, None], &pace);
        let summary = s.sample_window(Duration::from_millis(1_000), Duration::from_millis(200)).unwrap();
        assert_eq!(summary.sample_count, 2);
        assert!(close(summary.fc_min_pct, 90.0));
    }

    #[test]
    fn all_timeouts_give_degenerate_summary() {
        let pace = ManualPace::new();
        let (mut s, _) = sampler(vec![], &pace);
        let summary = s.sample_window(Duration::from_secs(2), Duration::from_millis(200)).unwrap();
        assert!(summary.is_degenerate());
    }

    #[test]
    fn unreachable_stats_endpoint_is_measurement_gap() {
        // BIND THEN DROP: NOTHING LISTENS ON THE PORT
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{}/api/v1/stats", port);
        let mut http = HttpStats::new(url, Duration::from_millis(800)).unwrap();
        assert!(matches!(http.poll(), Err(TasError::MeasurementGap(_))));

        // A DEAD ENDPOINT EMPTIES THE WINDOW, IT DOES NOT FAIL IT
        let pace = ManualPace::new();
        let mut s = Sampler::new(Box::new(http), Rc::new(pace.clone()), Arc::new(AtomicBool::new(false)));
        let summary = s.sample_window(Duration::from_secs(1), Duration::from_millis(250)).unwrap();
        assert_eq!(summary.sample_count, 0);
        assert!(summary.is_degenerate());
    }

    #[test]
    fn shutdown_cancels_window() {
        let pace = ManualPace::new();
        let (mut s, shutdown) = sampler(vec![Some(1.0); 10], &pace);
        shutdown.store(true, Ordering::Relaxed);
        let err = s.sample_window(Duration::from_secs(2), Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, TasError::Cancelled));
    }

    #[test]
    fn delta_is_candidate_minus_baseline() {
        let base = StatSummary { fc_mean_pct: 99.0, fps_mean: 10.0, ..Default::default() };
        let cand = StatSummary { fc_mean_pct: 99.5, fps_mean: 9.9, ..Default::default() };
        let d = cand.delta(&base);
        assert!(close(d.fc_mean_pct, 0.5));
        assert!(close(d.fps_mean, -0.1));
    }
}
