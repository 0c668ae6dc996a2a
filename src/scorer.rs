// TASALIGN SCORER
// SCORE = FC_MEAN - max(0, FPS_FLOOR - FPS_MEAN) * PENALTY_WEIGHT
// RANKINGS ARE ORDERED TIE-BREAK KEY LISTS, CONFIGURED PER RUN.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::telemetry::StatSummary;

pub const DEFAULT_FPS_FLOOR: f64 = 9.5;
pub const DEFAULT_PENALTY_WEIGHT: f64 = 8.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub fps_floor: f64,
    pub penalty_weight: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self { fps_floor: DEFAULT_FPS_FLOOR, penalty_weight: DEFAULT_PENALTY_WEIGHT }
    }
}

impl ScorerConfig {
    pub fn score(&self, s: &StatSummary) -> f64 {
        let penalty = (self.fps_floor - s.fps_mean).max(0.0) * self.penalty_weight;
        s.fc_mean_pct - penalty
    }

    // SCORE OF THE ALL-ZERO SUMMARY. NO MEASURED WINDOW SCORES BELOW THIS.
    pub fn min_score(&self) -> f64 {
        self.score(&StatSummary::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankKey {
    Score,
    FcMean,
    FcMin,
    FcP01,
    FcP05,
    FpsMean,
    FpsMin,
    JitterMean,
}

impl RankKey {
    fn value(self, s: &StatSummary, score: f64) -> f64 {
        match self {
            Self::Score => score,
            Self::FcMean => s.fc_mean_pct,
            Self::FcMin => s.fc_min_pct,
            Self::FcP01 => s.fc_p01_pct,
            Self::FcP05 => s.fc_p05_pct,
            Self::FpsMean => s.fps_mean,
            Self::FpsMin => s.fps_min,
            Self::JitterMean => s.jitter_mean_us,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Desc,
    Asc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTerm {
    pub key: RankKey,
    #[serde(default)]
    pub direction: Direction,
}

impl RankTerm {
    pub fn desc(key: RankKey) -> Self {
        Self { key, direction: Direction::Desc }
    }
}

// ORDERED TIE-BREAK KEYS. THE FIRST TERM DOMINATES, LATER TERMS ONLY
// BREAK EXACT TIES.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ranking(pub Vec<RankTerm>);

impl Ranking {
    // (score, p01, min)
    pub fn coarse_default() -> Self {
        Self(vec![
            RankTerm::desc(RankKey::Score),
            RankTerm::desc(RankKey::FcP01),
            RankTerm::desc(RankKey::FcMin),
        ])
    }

    // (score, p01, min, fps_min)
    pub fn fine_default() -> Self {
        Self(vec![
            RankTerm::desc(RankKey::Score),
            RankTerm::desc(RankKey::FcP01),
            RankTerm::desc(RankKey::FcMin),
            RankTerm::desc(RankKey::FpsMin),
        ])
    }

    pub fn keys(&self) -> String {
        self.0
            .iter()
            .map(|t| match t.direction {
                Direction::Desc => format!("{:?}", t.key),
                Direction::Asc => format!("{:?}(asc)", t.key),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    // Less MEANS `a` RANKS BEFORE `b`
    pub fn compare(&self, a: (&StatSummary, f64), b: (&StatSummary, f64)) -> Ordering {
        for term in &self.0 {
            let va = term.key.value(a.0, a.1);
            let vb = term.key.value(b.0, b.1);
            let ord = match term.direction {
                Direction::Desc => vb.total_cmp(&va),
                Direction::Asc => va.total_cmp(&vb),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    // STABLE: EQUAL ITEMS KEEP PROBE ORDER
    pub fn sort_by_key<T>(&self, items: &mut [T], view: impl Fn(&T) -> (&StatSummary, f64)) {
        items.sort_by(|a, b| self.compare(view(a), view(b)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(fc_mean: f64, p01: f64, min: f64, fps_mean: f64, fps_min: f64) -> StatSummary {
        StatSummary {
            sample_count: 3,
            fc_mean_pct: fc_mean,
            fc_min_pct: min,
            fc_p01_pct: p01,
            fc_p05_pct: p01,
            fps_mean,
            fps_min,
            jitter_mean_us: 0.0,
            pps_mean: 0.0,
        }
    }

    #[test]
    fn no_penalty_above_floor() {
        let sc = ScorerConfig::default();
        assert_eq!(sc.score(&summary(99.0, 98.0, 97.0, 10.0, 9.8)), 99.0);
    }

    #[test]
    fn fps_collapse_is_penalized() {
        let sc = ScorerConfig::default();
        let s = sc.score(&summary(99.0, 98.0, 97.0, 8.5, 8.0));
        assert!((s - 91.0).abs() < 1e-9);
    }

    #[test]
    fn zero_summary_scores_minimum() {
        let sc = ScorerConfig::default();
        assert_eq!(sc.score(&StatSummary::default()), sc.min_score());
        assert_eq!(sc.min_score(), -76.0);
    }

    #[test]
    fn ties_break_on_later_keys() {
        let r = Ranking::fine_default();
        let a = summary(99.0, 98.0, 97.0, 10.0, 9.9);
        let b = summary(99.0, 98.0, 97.0, 10.0, 9.5);
        let c = summary(99.0, 98.5, 90.0, 10.0, 9.0);
        let mut items = vec![(a, 99.0), (b, 99.0), (c, 99.0)];
        r.sort_by_key(&mut items, |(s, sc)| (s, *sc));
        assert_eq!(items[0].0.fc_p01_pct, 98.5);
        assert_eq!(items[1].0.fps_min, 9.9);
        assert_eq!(items[2].0.fps_min, 9.5);
    }

    #[test]
    fn ascending_term_prefers_lower_jitter() {
        let r = Ranking(vec![RankTerm { key: RankKey::JitterMean, direction: Direction::Asc }]);
        let mut lo = StatSummary::default();
        lo.jitter_mean_us = 2.0;
        let mut hi = StatSummary::default();
        hi.jitter_mean_us = 9.0;
        assert_eq!(r.compare((&lo, 0.0), (&hi, 0.0)), Ordering::Less);
    }

    #[test]
    fn ranking_parses_from_json() {
        let r: Ranking = serde_json::from_str(r#"[{"key":"fc_p01"},{"key":"fc_mean"},{"key":"fps_min","direction":"desc"}]"#).unwrap();
        assert_eq!(r.0.len(), 3);
        assert_eq!(r.0[0].key, RankKey::FcP01);
        assert_eq!(r.keys(), "FcP01,FcMean,FpsMin");
    }
}
