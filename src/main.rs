mod cli;

use anyhow::{Context, Result};
use avrmc::{
    compute_stack_usage,
    disassemble::disassemble,
    engine::{Device, ExplorationStrategy, ModelCheckOptions, Verdict},
    firmware::load_file,
};
use cli::{args, expect_arg};
use env_logger::Env;
use log::info;
use std::{io, path::Path, str::FromStr};

fn main() -> Result<()> {
    let matches = args().get_matches();

    init_logger(expect_arg(&matches, "verbose"));

    match matches.subcommand() {
        Some(("disassemble", args)) => {
            let input = Path::new(expect_arg(args, "input-file"));
            let firmware = load_file(input)?;

            disassemble(firmware.image(), &mut io::stdout().lock())
                .context("failed to write disassembly")?;
        }
        Some(("stack", args)) => {
            let input = Path::new(expect_arg(args, "input-file"));
            let device = Device::by_name(expect_arg(args, "device"))
                .context("unsupported device")?;
            let strategy = ExplorationStrategy::from_str(expect_arg(args, "strategy"))
                .context("unsupported exploration strategy")?;

            let options = ModelCheckOptions {
                strategy,
                max_steps: args.get_one::<u64>("max-steps").copied(),
                deduplicate: args.get_flag("dedup"),
                ..Default::default()
            };

            let firmware = load_file(input)?;

            info!(
                "analyzing {} ({} bytes) for {}",
                input.display(),
                firmware.len(),
                device.name
            );

            let verdict = compute_stack_usage(firmware.image(), device, options)
                .with_context(|| format!("stack analysis of {} failed", input.display()))?;

            match verdict {
                Verdict::Complete(usage) => println!("maximum stack usage: {} bytes", usage),
                Verdict::Incomplete { partial, steps } => println!(
                    "maximum stack usage: at least {} bytes (budget exhausted after {} steps)",
                    partial, steps
                ),
            }
        }
        _ => unreachable!(),
    }

    Ok(())
}

fn init_logger(level: &str) {
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}
