use anyhow::Result;

use tasalign::config::RunConfig;
use tasalign::timebase::{activation_time, ClockSource};

pub fn run_time(cfg: &RunConfig) -> Result<()> {
    let mut clock = cfg.tool.keti_tsn();
    let now = clock.now()?;
    let next = activation_time(now, cfg.tool.base_offset_sec, 0, cfg.search.cycle_ns)?;
    println!("SWITCH TIME:     {}.{:09}", now.seconds, now.nanoseconds);
    println!("NEXT BASE:       {}.{:09} (+{}s)", next.seconds, next.nanoseconds, cfg.tool.base_offset_sec);
    Ok(())
}
