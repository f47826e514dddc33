//! `fanwatch masks`: List event names and their kernel values.

use clap::Args;
use fanwatch_common::types::EventMask;

/// Arguments for the `masks` command.
#[derive(Args, Debug)]
pub struct MasksArgs {
    /// Only list events that require a permission decision.
    #[arg(long)]
    pub perm: bool,
}

/// Executes the `masks` command.
///
/// # Errors
///
/// This command does not fail.
#[allow(clippy::unnecessary_wraps)]
pub fn execute(args: &MasksArgs) -> anyhow::Result<()> {
    println!("{:<22} {:>12}", "NAME", "VALUE");
    for (name, flag) in EventMask::named_flags() {
        if args.perm && !flag.requires_response() {
            continue;
        }
        println!("{name:<22} {:>#12x}", flag.bits());
    }
    Ok(())
}
