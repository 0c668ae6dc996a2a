// TASALIGN SCHEDULE MODEL
// VALIDATED GATE-CONTROL-LIST CYCLES. Schedule::build IS THE ONLY WAY TO
// CONSTRUCT ONE; EVERY OTHER MODULE GOES THROUGH IT.

use std::fmt::Write as _;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TasError};

pub const NS_PER_SEC: u64 = 1_000_000_000;

// GATE MASKS (BIT = TRAFFIC CLASS, 1 = OPEN)
pub const GATE_ALL_OPEN: u8 = 0xFF;
pub const GATE_TC0_CLOSED: u8 = 0xFE;

// ONE GATE-CONTROL-LIST STEP
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub gate_mask: u8,
    pub duration_ns: u64,
}

impl ScheduleEntry {
    pub fn new(gate_mask: u8, duration_ns: u64) -> Self {
        Self { gate_mask, duration_ns }
    }
}

// ABSOLUTE PTP INSTANT (SECONDS, NANOSECONDS)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaseTime {
    pub seconds: u64,
    pub nanoseconds: u32,
}

impl BaseTime {
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        Self { seconds, nanoseconds }
    }

    pub fn total_ns(&self) -> u128 {
        self.seconds as u128 * NS_PER_SEC as u128 + self.nanoseconds as u128
    }

    pub fn from_total_ns(total_ns: u128) -> Result<Self> {
        let seconds = u64::try_from(total_ns / NS_PER_SEC as u128)
            .map_err(|_| TasError::InvalidSchedule("base time overflows u64 seconds".into()))?;
        let nanoseconds = (total_ns % NS_PER_SEC as u128) as u32;
        Ok(Self { seconds, nanoseconds })
    }
}

// DROP ZERO-WIDTH STEPS BEFORE THE SUM CHECK.
// A ZERO-WIDTH "NO-OP" STEP NEVER COUNTS TOWARD THE CYCLE.
pub fn normalize_entries(entries: Vec<ScheduleEntry>) -> Vec<ScheduleEntry> {
    entries.into_iter().filter(|e| e.duration_ns > 0).collect()
}

// IMMUTABLE, VALIDATED GATE SCHEDULE ANCHORED AT AN ACTIVATION INSTANT
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Schedule {
    cycle_ns: u64,
    entries: Vec<ScheduleEntry>,
    activation: BaseTime,
}

impl Schedule {
    pub fn build(cycle_ns: u64, entries: Vec<ScheduleEntry>, activation: BaseTime) -> Result<Self> {
        if cycle_ns == 0 {
            return Err(TasError::InvalidSchedule("cycle_ns must be > 0".into()));
        }
        if activation.nanoseconds as u64 >= NS_PER_SEC {
            return Err(TasError::InvalidSchedule(format!(
                "activation nanoseconds {} out of range",
                activation.nanoseconds
            )));
        }

        let entries = normalize_entries(entries);
        if entries.is_empty() {
            return Err(TasError::InvalidSchedule("no non-zero entries".into()));
        }

        let mut sum: u64 = 0;
        for e in &entries {
            sum = sum.checked_add(e.duration_ns).ok_or_else(|| {
                TasError::InvalidSchedule("entry durations overflow u64".into())
            })?;
        }
        if sum != cycle_ns {
            return Err(TasError::InvalidSchedule(format!(
                "entries sum to {} ns, cycle is {} ns",
                sum, cycle_ns
            )));
        }

        Ok(Self { cycle_ns, entries, activation })
    }

    pub fn cycle_ns(&self) -> u64 {
        self.cycle_ns
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn activation(&self) -> BaseTime {
        self.activation
    }

    // TOTAL TIME PER CYCLE DURING WHICH ALL BITS OF `mask` ARE OPEN
    pub fn open_ns(&self, mask: u8) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.gate_mask & mask == mask)
            .map(|e| e.duration_ns)
            .sum()
    }

    // CONTROL-PLANE PATCH DOCUMENT. ONE gate-parameter-table KEYED BY INTERFACE.
    pub fn to_patch_document(&self, interface: &str) -> String {
        let mut doc = String::new();
        let _ = writeln!(
            doc,
            "- ? \"/ietf-interfaces:interfaces/interface[name='{}']/ieee802-dot1q-bridge:bridge-port/ieee802-dot1q-sched-bridge:gate-parameter-table\"",
            interface
        );
        doc.push_str("  : gate-enabled: true\n");
        let _ = writeln!(doc, "    admin-gate-states: {}", GATE_ALL_OPEN);
        doc.push_str("    admin-cycle-time:\n");
        let _ = writeln!(doc, "      numerator: {}", self.cycle_ns);
        let _ = writeln!(doc, "      denominator: {}", NS_PER_SEC);
        doc.push_str("    admin-base-time:\n");
        let _ = writeln!(doc, "      seconds: {}", self.activation.seconds);
        let _ = writeln!(doc, "      nanoseconds: {}", self.activation.nanoseconds);
        doc.push_str("    admin-control-list:\n");
        doc.push_str("      gate-control-entry:\n");
        for (i, e) in self.entries.iter().enumerate() {
            let _ = writeln!(doc, "        - index: {}", i);
            doc.push_str("          operation-name: set-gate-states\n");
            let _ = writeln!(doc, "          gate-states-value: {}", e.gate_mask);
            let _ = writeln!(doc, "          time-interval-value: {}", e.duration_ns);
        }
        doc.push_str("    config-change: true\n");
        doc
    }

    // INVERSE OF to_patch_document. RE-VALIDATES THROUGH build().
    pub fn from_patch_document(doc: &str) -> Result<Self> {
        let bad = |m: String| TasError::InvalidSchedule(m);
        let cycle_re = Regex::new(r"numerator:\s*(\d+)").map_err(|e| bad(e.to_string()))?;
        let base_re = Regex::new(r"admin-base-time:\s*\n\s*seconds:\s*(\d+)\s*\n\s*nanoseconds:\s*(\d+)")
            .map_err(|e| bad(e.to_string()))?;
        let entry_re = Regex::new(r"gate-states-value:\s*(\d+)\s*\n\s*time-interval-value:\s*(\d+)")
            .map_err(|e| bad(e.to_string()))?;

        let cycle_ns: u64 = cycle_re
            .captures(doc)
            .and_then(|c| c[1].parse().ok())
            .ok_or_else(|| bad("missing admin-cycle-time numerator".into()))?;
        let base = base_re
            .captures(doc)
            .ok_or_else(|| bad("missing admin-base-time".into()))?;
        let seconds: u64 = base[1].parse().map_err(|_| bad(format!("bad seconds {:?}", &base[1])))?;
        let nanoseconds: u32 = base[2]
            .parse()
            .map_err(|_| bad(format!("bad nanoseconds {:?}", &base[2])))?;

        let mut entries = Vec::new();
        for c in entry_re.captures_iter(doc) {
            let gate_mask: u8 = c[1]
                .parse()
                .map_err(|_| bad(format!("gate mask {} out of range", &c[1])))?;
            let duration_ns: u64 = c[2]
                .parse()
                .map_err(|_| bad(format!("bad interval {:?}", &c[2])))?;
            entries.push(ScheduleEntry::new(gate_mask, duration_ns));
        }
        Self::build(cycle_ns, entries, BaseTime::new(seconds, nanoseconds))
    }
}

// SCHEDULE SHAPE NOT YET ANCHORED IN TIME. THE PHASE MEETS THE BASE TIME
// AT APPLY TIME SO EVERY RETRY RE-ANCHORS THE SAME PROGRAM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateProgram {
    pub cycle_ns: u64,
    pub entries: Vec<ScheduleEntry>,
    pub phase_ns: i64,
}

impl GateProgram {
    pub fn new(cycle_ns: u64, entries: Vec<ScheduleEntry>, phase_ns: i64) -> Result<Self> {
        let program = Self { cycle_ns, entries, phase_ns };
        program.anchor(BaseTime::default())?;
        Ok(program)
    }

    pub fn always_open(cycle_ns: u64) -> Result<Self> {
        Self::new(cycle_ns, vec![ScheduleEntry::new(GATE_ALL_OPEN, cycle_ns)], 0)
    }

    pub fn anchor(&self, activation: BaseTime) -> Result<Schedule> {
        Schedule::build(self.cycle_ns, self.entries.clone(), activation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateMasks {
    pub open: u8,
    pub closed: u8,
}

impl Default for GateMasks {
    fn default() -> Self {
        Self { open: GATE_ALL_OPEN, closed: GATE_TC0_CLOSED }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateLayout {
    // OPEN, CLOSE
    OpenClose,
    // OPEN/2, CLOSE, OPEN/2 (WRAPS AROUND THE CYCLE BOUNDARY)
    OpenCloseOpen,
    // CLOSE FRONT, OPEN, CLOSE BACK
    CloseOpenClose,
}

impl GateLayout {
    pub fn label(self) -> &'static str {
        match self {
            Self::OpenClose => "open_close",
            Self::OpenCloseOpen => "open_close_open",
            Self::CloseOpenClose => "close_open_close",
        }
    }

    // ONLY CLOSE/OPEN/CLOSE HAS A FREE CLOSE-REGION SPLIT
    pub fn uses_split(self) -> bool {
        matches!(self, Self::CloseOpenClose)
    }

    pub fn entries(
        self,
        cycle_ns: u64,
        open_ns: u64,
        close_front_ns: u64,
        masks: GateMasks,
    ) -> Result<Vec<ScheduleEntry>> {
        if open_ns == 0 || open_ns >= cycle_ns {
            return Err(TasError::InvalidSchedule(format!(
                "open width {} ns outside (0, {})",
                open_ns, cycle_ns
            )));
        }
        let close_total = cycle_ns - open_ns;
        let entries = match self {
            Self::OpenClose => vec![
                ScheduleEntry::new(masks.open, open_ns),
                ScheduleEntry::new(masks.closed, close_total),
            ],
            Self::OpenCloseOpen => {
                let o1 = open_ns / 2;
                vec![
                    ScheduleEntry::new(masks.open, o1),
                    ScheduleEntry::new(masks.closed, close_total),
                    ScheduleEntry::new(masks.open, open_ns - o1),
                ]
            }
            Self::CloseOpenClose => {
                if close_front_ns == 0 || close_front_ns >= close_total {
                    return Err(TasError::InvalidSchedule(format!(
                        "close front {} ns leaves no back region of {} ns",
                        close_front_ns, close_total
                    )));
                }
                vec![
                    ScheduleEntry::new(masks.closed, close_front_ns),
                    ScheduleEntry::new(masks.open, open_ns),
                    ScheduleEntry::new(masks.closed, close_total - close_front_ns),
                ]
            }
        };
        Ok(entries)
    }
}

// HOW THE CLOSE REGION OF A CLOSE/OPEN/CLOSE CYCLE IS DIVIDED
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseSplit {
    FrontRatio(f64),
    FrontNs(u64),
    CenterOffset(i64),
}

impl CloseSplit {
    // RESOLVE TO AN ABSOLUTE FRONT DURATION. NONE IF FRONT OR BACK WOULD BE EMPTY.
    pub fn front_ns(self, close_total_ns: u64) -> Option<u64> {
        let front: i128 = match self {
            Self::FrontRatio(r) => {
                if !r.is_finite() {
                    return None;
                }
                (close_total_ns as f64 * r).round() as i128
            }
            Self::FrontNs(ns) => ns as i128,
            Self::CenterOffset(d) => (close_total_ns / 2) as i128 + d as i128,
        };
        if front <= 0 || front >= close_total_ns as i128 {
            return None;
        }
        Some(front as u64)
    }
}

// CENTRE +/- range_ns IN step_ns STEPS, CLAMPED SO FRONT AND BACK STAY >= 1NS
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRange {
    pub range_ns: u64,
    pub step_ns: u64,
}

impl SplitRange {
    pub fn splits(self, close_total_ns: u64) -> Vec<CloseSplit> {
        if self.step_ns == 0 || close_total_ns < 2 || close_total_ns > i64::MAX as u64 {
            return Vec::new();
        }
        let close = close_total_ns as i64;
        let center = close / 2;
        let range = self.range_ns.min(i64::MAX as u64) as i64;
        let step = self.step_ns.min(i64::MAX as u64) as i64;
        let end = range.min(close - center - 1);
        let mut out = Vec::new();
        let mut d = -range.min(center - 1);
        while d <= end {
            out.push(CloseSplit::CenterOffset(d));
            match d.checked_add(step) {
                Some(next) => d = next,
                None => break,
            }
        }
        out
    }
}
