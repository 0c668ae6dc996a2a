use anyhow::Result;

use tasalign::config::RunConfig;

use super::{hardware_applier, hardware_pace, hardware_sensor};

pub fn run_restore(cfg: &RunConfig) -> Result<()> {
    let pace = hardware_pace();
    let mut applier = hardware_applier(cfg, pace.clone());
    let applied = applier.apply_program(&cfg.safe_program()?)?;
    println!("SAFE SCHEDULE:   all-open, base {}.{:09}", applied.activation().seconds, applied.activation().nanoseconds);

    if let Some(mut sensor) = hardware_sensor(cfg, pace)? {
        sensor.restore_baseline()?;
        println!("SENSOR:          baseline restored");
    }
    Ok(())
}
