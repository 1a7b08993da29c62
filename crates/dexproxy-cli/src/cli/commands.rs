//! Command builders for the CLI.
//!
//! Each command is built using the shared arg builders from `args.rs`.

use clap::Command;

use super::args::*;

/// Build the complete CLI with all subcommands.
pub fn build_cli() -> Command {
    Command::new("dexproxy")
        .about("Synthesize proxy classes as DEX containers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(verbose_arg())
        .subcommand(synth_command())
        .subcommand(dump_command())
}

/// Synthesize proxies from a capability description.
pub fn synth_command() -> Command {
    Command::new("synth")
        .about("Synthesize proxy classes into a DEX container")
        .override_usage(
            "\
  dexproxy synth <INPUT> [-o <FILE>]
  dexproxy synth <INPUT> --protocol <PROTOCOL> --handler <TYPE>",
        )
        .after_help(
            r#"EXAMPLES:
  dexproxy synth calc.json                        # writes classes.dex
  dexproxy synth calc.json -o calc.dex --verify   # re-read after writing
  dexproxy synth api.json --protocol name --handler 'Lcom/example/Handler;'"#,
        )
        .arg(input_path_arg())
        .arg(output_file_arg())
        .arg(protocol_arg())
        .arg(handler_arg())
        .arg(field_arg())
        .arg(verify_arg())
}

/// Show the contents of a DEX file.
pub fn dump_command() -> Command {
    Command::new("dump")
        .about("Show the contents of a DEX file")
        .after_help(
            r#"EXAMPLES:
  dexproxy dump classes.dex
  dexproxy dump classes.dex --color never"#,
        )
        .arg(dex_path_arg())
        .arg(color_arg())
}
