use anyhow::Result;
use clap::Args;

use tasalign::config::RunConfig;
use tasalign::schedule::{BaseTime, GateProgram, ScheduleEntry};
use tasalign::timebase::activation_time;

use super::{hardware_applier, hardware_pace};

// LAST KNOWN GOOD PROFILE ON THE 781.25US BENCH
#[derive(Args, Clone, Debug)]
pub struct ApplyArgs {
    #[arg(long, default_value_t = 305_625)]
    front_ns: u64,

    #[arg(long, default_value_t = 150_000)]
    open_ns: u64,

    #[arg(long, default_value_t = 325_625)]
    back_ns: u64,

    #[arg(long, default_value_t = 180_000)]
    phase_ns: i64,

    // PRINT THE PATCH DOCUMENT WITHOUT TOUCHING THE SWITCH
    #[arg(long)]
    dry_run: bool,
}

pub fn run_apply(cfg: &RunConfig, args: &ApplyArgs) -> Result<()> {
    let masks = cfg.search.masks;
    let cycle_ns = args.front_ns + args.open_ns + args.back_ns;
    let program = GateProgram::new(
        cycle_ns,
        vec![
            ScheduleEntry::new(masks.closed, args.front_ns),
            ScheduleEntry::new(masks.open, args.open_ns),
            ScheduleEntry::new(masks.closed, args.back_ns),
        ],
        args.phase_ns,
    )?;

    if args.dry_run {
        // ANCHORED AT T=0: THE REAL BASE IS ONLY KNOWN AT APPLY TIME
        let base = activation_time(BaseTime::default(), cfg.tool.base_offset_sec, args.phase_ns, cycle_ns)?;
        print!("{}", program.anchor(base)?.to_patch_document(&cfg.tool.interface));
        return Ok(());
    }

    let mut applier = hardware_applier(cfg, hardware_pace());
    let applied = applier.apply_program(&program)?;
    println!("APPLIED:         {}/{}/{} ns (cycle {} ns)", args.front_ns, args.open_ns, args.back_ns, cycle_ns);
    println!("BASE:            {}.{:09}", applied.activation().seconds, applied.activation().nanoseconds);
    Ok(())
}
