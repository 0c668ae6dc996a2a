use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use tasalign::clock::{ManualPace, Pace};
use tasalign::config::RunConfig;
use tasalign::sim::SimLink;

use super::{run_supervised, SearchArgs};

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    search: SearchArgs,

    // PEAK FC NOISE IN PERCENTAGE POINTS
    #[arg(long)]
    noise_pct: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    // SIMULATED BURST START WITHIN THE CYCLE
    #[arg(long)]
    burst_offset_ns: Option<u64>,
}

pub fn run_simulate(mut cfg: RunConfig, args: &SimulateArgs, shutdown: Arc<AtomicBool>) -> Result<()> {
    args.search.apply_to(&mut cfg);
    cfg.search.validate()?;

    let mut model = cfg.sim.clone();
    model.cycle_ns = cfg.search.cycle_ns;
    if let Some(v) = args.noise_pct {
        model.noise_pct = v;
    }
    if let Some(v) = args.seed {
        model.seed = v;
    }
    if let Some(v) = args.burst_offset_ns {
        model.burst_offset_ns = v;
    }

    println!("TASALIGN v{} (SIMULATED LINK, VIRTUAL TIME)", env!("CARGO_PKG_VERSION"));
    println!("CYCLE:           {} ns", model.cycle_ns);
    println!("BURST:           {} ns @ {} ns (slack {} ns)", model.burst_ns, model.burst_offset_ns, model.slack_ns);
    println!("NOISE:           {:.3} pct (seed {})", model.noise_pct, model.seed);
    println!();

    let pace = ManualPace::new();
    let shared: Rc<dyn Pace> = Rc::new(pace.clone());
    let link = SimLink::new(model, shared);
    let mut rig = link.rig(cfg.retry, shutdown, Some(cfg.endpoints.sensor_baseline.clone()));

    run_supervised(&cfg, &mut rig, "tas_sim")?;

    println!("VIRTUAL TIME:    {:.1}s", pace.elapsed().as_secs_f64());
    println!("PATCH CALLS:     {}", link.patch_calls());
    println!("FINAL COVERAGE:  {:.3}", link.coverage());
    Ok(())
}
