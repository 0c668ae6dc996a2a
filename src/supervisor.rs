// TASALIGN SAFETY SUPERVISOR
// RUNS THE SEARCH BODY IN A SCOPED REGION AND ALWAYS LEAVES THE PORT IN A
// KNOWN STATE: THE WINNER IF ONE WAS DECIDED, OTHERWISE THE SAFE SCHEDULE.
// COVERS Ok, Err (INCLUDING Cancelled) AND PANIC. NO RETRY BEYOND THE
// APPLIER'S OWN BOUNDED POLICY.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::schedule::GateProgram;
use crate::search::{RunRecord, Rig, SearchCandidate};

// WHAT THE PORT WAS LEFT RUNNING
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    // CANDIDATE ID OF THE RE-APPLIED WINNER
    Winner(usize),
    Safe,
    // NEITHER APPLY SUCCEEDED. THE PORT STATE IS UNKNOWN.
    Unsafe(String),
}

impl Terminal {
    pub fn is_known_good(&self) -> bool {
        !matches!(self, Self::Unsafe(_))
    }
}

pub struct Supervised {
    pub outcome: Result<()>,
    pub terminal: Terminal,
}

pub struct Supervisor {
    safe: GateProgram,
}

impl Supervisor {
    pub fn new(safe: GateProgram) -> Self {
        Self { safe }
    }

    pub fn safe(&self) -> &GateProgram {
        &self.safe
    }

    pub fn run<F>(&self, rig: &mut Rig, record: &mut RunRecord, body: F) -> Supervised
    where
        F: FnOnce(&mut Rig, &mut RunRecord) -> Result<()>,
    {
        let caught = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *rig, &mut *record)));
        let terminal = self.release(rig, record.winner());
        match caught {
            Ok(outcome) => {
                if let Err(e) = &outcome {
                    warn!("search ended early: {}", e);
                }
                Supervised { outcome, terminal }
            }
            Err(payload) => {
                error!("search panicked, port left as {:?}", terminal);
                panic::resume_unwind(payload)
            }
        }
    }

    // ONE TERMINAL APPLY. SAFE SCHEDULE ONLY AS A FALLBACK.
    pub fn release(&self, rig: &mut Rig, winner: Option<&SearchCandidate>) -> Terminal {
        let terminal = match winner {
            Some(w) => match rig.applier.apply_program(&w.program) {
                Ok(_) => {
                    info!("cleanup: winner #{} re-applied", w.id);
                    Terminal::Winner(w.id)
                }
                Err(e) => {
                    warn!("cleanup: winner re-apply failed ({}), falling back to safe schedule", e);
                    self.apply_safe(rig)
                }
            },
            None => self.apply_safe(rig),
        };

        if let Some(sensor) = rig.sensor.as_mut() {
            let restored = match (&terminal, winner) {
                (Terminal::Winner(_), Some(w)) => sensor.configure(&w.point.sensor_setting()),
                _ => sensor.restore_baseline(),
            };
            if let Err(e) = restored {
                error!("cleanup: sensor restore failed: {}", e);
            }
        }
        terminal
    }

    fn apply_safe(&self, rig: &mut Rig) -> Terminal {
        match rig.applier.apply_program(&self.safe) {
            Ok(_) => {
                info!("cleanup: safe schedule applied");
                Terminal::Safe
            }
            Err(e) => {
                error!("cleanup: safe schedule apply failed: {}", e);
                Terminal::Unsafe(e.to_string())
            }
        }
    }
}
