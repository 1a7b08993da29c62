//! Shared argument builders for CLI commands.
//!
//! Each function returns a `clap::Arg` that can be composed into commands.

use std::path::PathBuf;

use clap::{Arg, ArgAction, value_parser};

/// Capability description in JSON (positional).
pub fn input_path_arg() -> Arg {
    Arg::new("input")
        .value_name("INPUT")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Capability description (JSON object or array of objects)")
}

/// DEX file to inspect (positional).
pub fn dex_path_arg() -> Arg {
    Arg::new("dex")
        .value_name("FILE")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("DEX file to dump")
}

/// Write output to file (-o/--output).
pub fn output_file_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("FILE")
        .default_value("classes.dex")
        .value_parser(value_parser!(PathBuf))
        .help("Write the container to FILE")
}

/// Method identity protocol (--protocol).
pub fn protocol_arg() -> Arg {
    Arg::new("protocol")
        .long("protocol")
        .value_name("PROTOCOL")
        .default_value("reflect")
        .value_parser(["reflect", "index", "name"])
        .help("How proxied methods identify themselves to the handler")
}

/// Handler type descriptor (--handler).
pub fn handler_arg() -> Arg {
    Arg::new("handler")
        .long("handler")
        .value_name("TYPE")
        .help("Handler type descriptor (default: Ljava/lang/reflect/InvocationHandler;)")
}

/// Handler field name (--field).
pub fn field_arg() -> Arg {
    Arg::new("field")
        .long("field")
        .value_name("NAME")
        .help("Name of the instance field holding the handler")
}

/// Verify the written container (--verify).
pub fn verify_arg() -> Arg {
    Arg::new("verify")
        .long("verify")
        .action(ArgAction::SetTrue)
        .help("Re-read and verify the container after writing")
}

/// Color output control (--color).
pub fn color_arg() -> Arg {
    Arg::new("color")
        .long("color")
        .value_name("WHEN")
        .default_value("auto")
        .value_parser(["auto", "always", "never"])
        .help("Colorize output")
}

/// Verbosity level (-v, -vv).
pub fn verbose_arg() -> Arg {
    Arg::new("verbose")
        .short('v')
        .action(ArgAction::Count)
        .global(true)
        .help("Verbosity level (-v for debug, -vv for trace logging)")
}
