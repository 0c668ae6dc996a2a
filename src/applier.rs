// TASALIGN SCHEDULE APPLIER
// SERIALIZE → INVOKE CONTROL PLANE → INTERPRET, UNDER A BOUNDED RETRY POLICY.
// apply_program RE-READS THE SWITCH CLOCK ON EVERY ATTEMPT: A BASE TIME
// COMPUTED BEFORE A 200MS BACKOFF MAY ALREADY BE TOO CLOSE TO PROGRAM.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::clock::Pace;
use crate::control::ControlPlane;
use crate::error::Result;
use crate::retry::{Outcome, RetryPolicy};
use crate::schedule::{BaseTime, GateProgram, Schedule};
use crate::timebase::{resolve_activation, ClockSource};

pub struct ScheduleApplier {
    plane: Box<dyn ControlPlane>,
    clock: Box<dyn ClockSource>,
    pace: Rc<dyn Pace>,
    policy: RetryPolicy,
    interface: String,
    base_offset_sec: u64,
}

impl ScheduleApplier {
    pub fn new(
        plane: Box<dyn ControlPlane>,
        clock: Box<dyn ClockSource>,
        pace: Rc<dyn Pace>,
        policy: RetryPolicy,
        interface: impl Into<String>,
        base_offset_sec: u64,
    ) -> Self {
        Self {
            plane,
            clock,
            pace,
            policy,
            interface: interface.into(),
            base_offset_sec,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn now(&mut self) -> Result<BaseTime> {
        self.clock.now()
    }

    // PUSH AN ALREADY-ANCHORED SCHEDULE AS-IS
    pub fn apply(&mut self, schedule: &Schedule) -> Result<()> {
        let document = schedule.to_patch_document(&self.interface);
        let plane = &mut self.plane;
        let result = self.policy.run(self.pace.as_ref(), |attempt| {
            Ok(patch_once(plane.as_mut(), &document, attempt))
        });
        if let Err(e) = &result {
            warn!("apply failed: {}", e);
        }
        result
    }

    // ANCHOR THE PROGRAM AGAINST A FRESH CLOCK READ PER ATTEMPT. RETURNS WHAT WAS PUSHED.
    pub fn apply_program(&mut self, program: &GateProgram) -> Result<Schedule> {
        let offset = self.base_offset_sec;
        let interface = self.interface.as_str();
        let plane = &mut self.plane;
        let clock = &mut self.clock;
        let result = self.policy.run(self.pace.as_ref(), |attempt| {
            let activation =
                resolve_activation(clock.as_mut(), offset, program.phase_ns, program.cycle_ns)?;
            let schedule = program.anchor(activation)?;
            let document = schedule.to_patch_document(interface);
            Ok(match patch_once(plane.as_mut(), &document, attempt) {
                Outcome::Done(()) => Outcome::Done(schedule),
                Outcome::Retry(reason) => Outcome::Retry(reason),
            })
        });
        if let Err(e) = &result {
            warn!("apply failed: {}", e);
        }
        result
    }
}

fn patch_once(plane: &mut dyn ControlPlane, document: &str, attempt: u32) -> Outcome<()> {
    match plane.patch(document) {
        Ok(out) if out.succeeded() => {
            debug!("patch ok (attempt {})", attempt);
            Outcome::Done(())
        }
        Ok(out) => Outcome::Retry(out.failure_reason()),
        Err(e) => Outcome::Retry(e.to_string()),
    }
}
