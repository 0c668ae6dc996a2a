// TASALIGN TIME BASE
// READS THE SWITCH'S LIVE PTP CLOCK AND COMPUTES FUTURE ACTIVATION INSTANTS.
// CLOCK FAILURES PROPAGATE; THEY ARE NEVER RETRIED HERE.

use regex::Regex;

use crate::error::{Result, TasError};
use crate::schedule::{BaseTime, NS_PER_SEC};

// SAFETY MARGIN SO THE CONTROL PLANE CAN PROGRAM THE LIST BEFORE IT ACTIVATES
pub const DEFAULT_BASE_OFFSET_SEC: u64 = 2;

pub trait ClockSource {
    fn now(&mut self) -> Result<BaseTime>;
}

// PHASE IS MODULO THE CYCLE. NEGATIVE REFINEMENT OFFSETS WRAP INTO [0, cycle).
pub fn normalize_phase(phase_ns: i64, cycle_ns: u64) -> u64 {
    if cycle_ns == 0 {
        return 0;
    }
    (phase_ns as i128).rem_euclid(cycle_ns as i128) as u64
}

pub fn activation_time(now: BaseTime, offset_sec: u64, phase_ns: i64, cycle_ns: u64) -> Result<BaseTime> {
    let total_ns = now.total_ns()
        + offset_sec as u128 * NS_PER_SEC as u128
        + normalize_phase(phase_ns, cycle_ns) as u128;
    BaseTime::from_total_ns(total_ns)
}

// FRESH READ ON EVERY CALL. A STALE BASE IS NEVER REUSED.
pub fn resolve_activation(
    clock: &mut dyn ClockSource,
    offset_sec: u64,
    phase_ns: i64,
    cycle_ns: u64,
) -> Result<BaseTime> {
    let now = clock.now()?;
    activation_time(now, offset_sec, phase_ns, cycle_ns)
}

// PARSE `current-time:\n nanoseconds: N\n seconds: S` FROM fetch OUTPUT
pub fn parse_current_time(text: &str) -> Result<BaseTime> {
    let re = Regex::new(r"current-time:\s*\n\s*nanoseconds:\s*(\d+)\s*\n\s*seconds:\s*(\d+)")
        .map_err(|e| TasError::ClockUnavailable(e.to_string()))?;
    let caps = re
        .captures(text)
        .ok_or_else(|| TasError::ClockUnavailable("cannot parse switch current-time".into()))?;
    let nanoseconds: u32 = caps[1]
        .parse()
        .map_err(|_| TasError::ClockUnavailable(format!("bad nanoseconds field {:?}", &caps[1])))?;
    let seconds: u64 = caps[2]
        .parse()
        .map_err(|_| TasError::ClockUnavailable(format!("bad seconds field {:?}", &caps[2])))?;
    if nanoseconds as u64 >= NS_PER_SEC {
        return Err(TasError::ClockUnavailable(format!(
            "nanoseconds field {} out of range",
            nanoseconds
        )));
    }
    Ok(BaseTime { seconds, nanoseconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_adds_offset_and_phase() {
        let now = BaseTime::new(1_000, 999_900_000);
        let t = activation_time(now, 2, 180_000, 781_250).unwrap();
        // 1000.9999s + 2s + 180us = 1003.00008s
        assert_eq!(t, BaseTime::new(1_003, 80_000));
    }

    #[test]
    fn negative_phase_wraps() {
        assert_eq!(normalize_phase(-1_000, 781_250), 780_250);
        assert_eq!(normalize_phase(781_250, 781_250), 0);
        assert_eq!(normalize_phase(781_251 * 3, 781_250), 3);
        let t = activation_time(BaseTime::new(10, 0), 0, -1_000, 781_250).unwrap();
        assert_eq!(t, BaseTime::new(10, 780_250));
    }

    #[test]
    fn parses_fetch_output() {
        let out = "ietf-system:system-state:\n  clock:\n    current-time:\n      nanoseconds: 123456789\n      seconds: 1735689600\n";
        assert_eq!(parse_current_time(out).unwrap(), BaseTime::new(1_735_689_600, 123_456_789));
    }

    #[test]
    fn unparseable_fetch_output_is_clock_unavailable() {
        let err = parse_current_time("Failed: timeout").unwrap_err();
        assert!(matches!(err, TasError::ClockUnavailable(_)));
        let err = parse_current_time("current-time:\n nanoseconds: 1000000000\n seconds: 1\n").unwrap_err();
        assert!(matches!(err, TasError::ClockUnavailable(_)));
    }

    struct Broken;

    impl ClockSource for Broken {
        fn now(&mut self) -> Result<BaseTime> {
            Err(TasError::ClockUnavailable("unreachable".into()))
        }
    }

    #[test]
    fn resolve_propagates_clock_failure() {
        let err = resolve_activation(&mut Broken, 2, 0, 781_250).unwrap_err();
        assert!(matches!(err, TasError::ClockUnavailable(_)));
    }
}
