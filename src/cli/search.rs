use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;

use tasalign::config::RunConfig;

use super::{hardware_rig, run_supervised, SearchArgs};

pub fn run_search(mut cfg: RunConfig, args: &SearchArgs, shutdown: Arc<AtomicBool>) -> Result<()> {
    args.apply_to(&mut cfg);
    cfg.search.validate()?;

    println!("TASALIGN v{}", env!("CARGO_PKG_VERSION"));
    println!("CYCLE:           {} ns", cfg.search.cycle_ns);
    println!("LAYOUT:          {}", cfg.search.layout.label());
    println!("OPEN WIDTHS:     {:?} ns", cfg.search.open_widths_ns);
    println!("PHASE STEP:      {} ns (fine +/-{} @ {})", cfg.search.phase_step_ns,
             cfg.search.fine_phase_window_ns, cfg.search.fine_phase_step_ns);
    println!("PHASE LOCK AXIS: {:?}", cfg.search.phase_lock);
    println!("STATS:           {}", cfg.endpoints.stats_url);
    println!("SENSOR:          {}", cfg.endpoints.sensor_url.as_deref().unwrap_or("(none)"));
    println!();
    println!("TASALIGN IS SEARCHING (CTRL+C RESTORES THE PORT AND EXITS)");

    let mut rig = hardware_rig(&cfg, shutdown)?;
    run_supervised(&cfg, &mut rig, "tas_search")
}
