use avrmc::{
    engine::{model_checker::defaults, system::DEVICE_NAMES, ExplorationStrategy},
    util::parse_number,
};
use clap::{crate_authors, crate_description, crate_name, crate_version, Arg, ArgAction, ArgMatches, Command};
use strum::VariantNames;

pub const LOGGING_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn expect_arg<'a>(m: &'a ArgMatches, arg: &str) -> &'a str {
    m.get_one::<String>(arg)
        .unwrap_or_else(|| panic!("argument \"{}\" has to be set in CLI at all times", arg))
}

fn is_u64(v: &str) -> Result<u64, String> {
    parse_number(v)
}

pub fn args() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .author(crate_authors!(", "))
        .about(crate_description!())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("configure logging level to use")
                .value_name("LEVEL")
                .value_parser(LOGGING_LEVELS)
                .default_value(LOGGING_LEVELS[2])
                .global(true),
        )
        .subcommand(
            Command::new("disassemble")
                .about("Disassemble an AVR firmware image")
                .arg(
                    Arg::new("input-file")
                        .value_name("FILE")
                        .help("Intel HEX or raw binary firmware to be disassembled")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("stack")
                .about("Compute an upper bound on the stack usage of AVR firmware")
                .arg(
                    Arg::new("input-file")
                        .value_name("FILE")
                        .help("Intel HEX or raw binary firmware to be analyzed")
                        .required(true),
                )
                .arg(
                    Arg::new("device")
                        .help("Target microcontroller")
                        .short('d')
                        .long("device")
                        .value_name("DEVICE")
                        .value_parser(DEVICE_NAMES)
                        .default_value(DEVICE_NAMES[2]),
                )
                .arg(
                    Arg::new("strategy")
                        .help("Order in which pending paths are explored")
                        .short('s')
                        .long("strategy")
                        .value_name("STRATEGY")
                        .value_parser(ExplorationStrategy::VARIANTS.to_vec())
                        .default_value(Into::<&'static str>::into(defaults::STRATEGY)),
                )
                .arg(
                    Arg::new("max-steps")
                        .help("Number of instructions after which exploration is aborted")
                        .short('n')
                        .long("max-steps")
                        .value_name("NUMBER")
                        .value_parser(is_u64),
                )
                .arg(
                    Arg::new("dedup")
                        .help("Drop states that have been explored before")
                        .long("dedup")
                        .action(ArgAction::SetTrue),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_consistent() {
        args().debug_assert();
    }

    #[test]
    fn parses_stack_options() {
        let matches = args()
            .try_get_matches_from([
                "avrmc", "-v", "debug", "stack", "fw.hex", "--strategy", "breadth-first",
                "--max-steps", "0x100", "--dedup",
            ])
            .unwrap();

        assert_eq!(expect_arg(&matches, "verbose"), "debug");

        let (name, stack) = matches.subcommand().unwrap();
        assert_eq!(name, "stack");
        assert_eq!(expect_arg(stack, "input-file"), "fw.hex");
        assert_eq!(expect_arg(stack, "device"), "attiny85");
        assert_eq!(expect_arg(stack, "strategy"), "breadth-first");
        assert_eq!(stack.get_one::<u64>("max-steps"), Some(&0x100));
        assert!(stack.get_flag("dedup"));
    }
}
