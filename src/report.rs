// TASALIGN RUN ARTIFACTS
// ONE JSON DOCUMENT PER RUN (CONFIG, EVERY CANDIDATE, RANKINGS, WINNER, SOAK)
// AND A MARKDOWN SUMMARY DERIVED FROM IT. FILE NAMES CARRY A LOCAL TIMESTAMP.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use crate::config::RunConfig;
use crate::error::Result;
use crate::search::{RunRecord, SearchCandidate};
use crate::supervisor::Terminal;

const TOP_ROWS: usize = 10;

#[derive(Serialize)]
pub struct RunReport<'a> {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub config: &'a RunConfig,
    pub record: &'a RunRecord,
    pub terminal: &'a Terminal,
    // NONE WHEN THE SEARCH BODY COMPLETED
    pub error: Option<String>,
}

pub fn stamp(t: &DateTime<Local>) -> String {
    t.format("%Y%m%d_%H%M%S").to_string()
}

impl RunReport<'_> {
    pub fn file_stem(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, stamp(&self.started_at))
    }

    // WRITES <dir>/<prefix>_<stamp>.json AND .md, RETURNS BOTH PATHS
    pub fn write(&self, dir: &Path, prefix: &str) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(dir)?;
        let stem = self.file_stem(prefix);
        let json_path = dir.join(format!("{}.json", stem));
        let md_path = dir.join(format!("{}.md", stem));

        let writer = BufWriter::new(File::create(&json_path)?);
        serde_json::to_writer_pretty(writer, self)?;
        fs::write(&md_path, self.render_markdown())?;
        info!("wrote {:?} and {:?}", json_path, md_path);
        Ok((json_path, md_path))
    }

    pub fn render_markdown(&self) -> String {
        let cfg = &self.config.search;
        let rec = self.record;
        let mut md = String::new();
        let _ = writeln!(md, "# TAS alignment run ({})", stamp(&self.started_at));
        md.push('\n');
        let _ = writeln!(md, "- cycle_ns: `{}`", cfg.cycle_ns);
        let _ = writeln!(md, "- layout: `{}`", cfg.layout.label());
        let _ = writeln!(md, "- open widths (ns): `{:?}`", cfg.open_widths_ns);
        let _ = writeln!(md, "- phase step / fine window / fine step (ns): `{}` / `{}` / `{}`",
            cfg.phase_step_ns, cfg.fine_phase_window_ns, cfg.fine_phase_step_ns);
        let _ = writeln!(md, "- coarse ranking: `{}`", cfg.coarse_ranking.keys());
        let _ = writeln!(md, "- fine ranking: `{}`", cfg.fine_ranking.keys());
        let _ = writeln!(md, "- candidates probed: `{}`", rec.candidates.len());
        let _ = writeln!(md, "- port left as: `{:?}`", self.terminal);
        if let Some(e) = &self.error {
            let _ = writeln!(md, "- run ended early: `{}`", e);
        }

        if let Some(b) = &rec.bootstrap {
            md.push_str("\n## Baseline (all-open)\n\n");
            let _ = writeln!(md, "- samples: `{}`", b.summary.sample_count);
            let _ = writeln!(md, "- fc_mean: `{:.3}%`, fps_mean: `{:.3}`, pps_mean: `{:.3}`",
                b.summary.fc_mean_pct, b.summary.fps_mean, b.summary.pps_mean);
            match b.packet_period_us {
                Some(p) => { let _ = writeln!(md, "- packet period estimate: `{:.3} us`", p); }
                None => md.push_str("- packet period estimate: `n/a`\n"),
            }
        }

        md.push_str("\n## Coarse top\n\n");
        self.table(&mut md, rec.coarse_ranking.iter().take(TOP_ROWS));
        md.push_str("\n## Fine top\n\n");
        self.table(&mut md, rec.fine_ranking.iter().take(TOP_ROWS));

        md.push_str("\n## Winner\n\n");
        match rec.winner() {
            Some(w) => {
                let _ = writeln!(md, "- candidate `#{}` (seed `#{}`)", w.id,
                    w.seed.map_or_else(|| "-".to_string(), |s| s.to_string()));
                let _ = writeln!(md, "- entries (mask/ns): `{}`", entries_label(w));
                let _ = writeln!(md, "- phase_ns: `{}`, phase_lock: `{}`", w.point.phase_ns, w.point.phase_lock);
                let _ = writeln!(md, "- timestamp_mode: `{}`, phase_lock_offset: `{}`",
                    w.point.timestamp_mode.as_deref().unwrap_or("-"),
                    w.point.phase_lock_offset.map_or_else(|| "-".to_string(), |o| o.to_string()));
                let _ = writeln!(md, "- score: `{:.3}`", w.score);
            }
            None => md.push_str("- none (safe schedule kept)\n"),
        }

        if let Some(s) = &rec.soak {
            let _ = writeln!(md, "\n## Soak ({} s)\n", s.duration_ms / 1000);
            md.push_str("| metric | all-open | winner | delta |\n|---|---:|---:|---:|\n");
            let rows = [
                ("fc_mean", s.baseline.fc_mean_pct, s.winner.fc_mean_pct, s.delta.fc_mean_pct),
                ("fc_min", s.baseline.fc_min_pct, s.winner.fc_min_pct, s.delta.fc_min_pct),
                ("fc_p01", s.baseline.fc_p01_pct, s.winner.fc_p01_pct, s.delta.fc_p01_pct),
                ("fc_p05", s.baseline.fc_p05_pct, s.winner.fc_p05_pct, s.delta.fc_p05_pct),
                ("fps_mean", s.baseline.fps_mean, s.winner.fps_mean, s.delta.fps_mean),
                ("fps_min", s.baseline.fps_min, s.winner.fps_min, s.delta.fps_min),
                ("jitter_mean_us", s.baseline.jitter_mean_us, s.winner.jitter_mean_us, s.delta.jitter_mean_us),
                ("pps_mean", s.baseline.pps_mean, s.winner.pps_mean, s.delta.pps_mean),
            ];
            for (name, b, w, d) in rows {
                let _ = writeln!(md, "| {} | {:.3} | {:.3} | {:+.3} |", name, b, w, d);
            }
            match s.t_drop_s {
                Some(t) => { let _ = writeln!(md, "\n- time to degrade: `{:.3} s`", t); }
                None => md.push_str("\n- time to degrade: `not observed`\n"),
            }
            if let Some(q) = &s.queue {
                let _ = writeln!(md, "- queue estimate (uncertified): deficit `{:.1} B/cycle`, `{:.1} B/s`, queued `{}`",
                    q.deficit_bytes_per_cycle, q.deficit_bytes_per_sec,
                    q.queued_bytes.map_or_else(|| "-".to_string(), |b| format!("{:.0} B", b)));
            }
        }
        md
    }

    fn table<'b>(&self, md: &mut String, ids: impl Iterator<Item = &'b usize>) {
        md.push_str("| # | lock | open_ns | front_ns | phase_ns | n | fc_mean | fc_p01 | fc_min | fps_mean | fps_min | score |\n");
        md.push_str("|---:|---|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|\n");
        for c in ids.filter_map(|&id| self.record.candidates.get(id)) {
            let s = &c.summary;
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} | {:.3} | {:.3} | {:.3} | {:.3} | {:.3} | {:.3} |",
                c.id,
                c.point.phase_lock,
                c.point.open_ns,
                c.point.close_front_ns.map_or_else(|| "-".to_string(), |f| f.to_string()),
                c.point.phase_ns,
                s.sample_count,
                s.fc_mean_pct,
                s.fc_p01_pct,
                s.fc_min_pct,
                s.fps_mean,
                s.fps_min,
                c.score
            );
        }
    }
}

pub fn entries_label(c: &SearchCandidate) -> String {
    c.program
        .entries
        .iter()
        .map(|e| format!("{}/{}", e.gate_mask, e.duration_ns))
        .collect::<Vec<_>>()
        .join(", ")
}
