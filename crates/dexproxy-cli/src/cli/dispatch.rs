//! Dispatch logic: extract params from ArgMatches and convert to command args.
//!
//! `*Params` structs mirror the command `*Args` but hold raw CLI choices;
//! the `From` impls resolve those choices (color detection, handler protocol).

use std::path::PathBuf;

use clap::ArgMatches;
use log::LevelFilter;

use super::ColorChoice;
use crate::commands::dump::DumpArgs;
use crate::commands::synth::{ProtocolChoice, SynthArgs};

pub struct SynthParams {
    pub input: PathBuf,
    pub output: PathBuf,
    pub protocol: ProtocolChoice,
    pub handler: Option<String>,
    pub field: Option<String>,
    pub verify: bool,
}

impl SynthParams {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            input: m.get_one::<PathBuf>("input").cloned().unwrap_or_default(),
            output: m
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("classes.dex")),
            protocol: parse_protocol(m),
            handler: m.get_one::<String>("handler").cloned(),
            field: m.get_one::<String>("field").cloned(),
            verify: m.get_flag("verify"),
        }
    }
}

impl From<SynthParams> for SynthArgs {
    fn from(p: SynthParams) -> Self {
        Self {
            input: p.input,
            output: p.output,
            protocol: p.protocol,
            handler: p.handler,
            field: p.field,
            verify: p.verify,
        }
    }
}

pub struct DumpParams {
    pub dex: PathBuf,
    pub color: ColorChoice,
}

impl DumpParams {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            dex: m.get_one::<PathBuf>("dex").cloned().unwrap_or_default(),
            color: parse_color(m),
        }
    }
}

impl From<DumpParams> for DumpArgs {
    fn from(p: DumpParams) -> Self {
        Self {
            dex: p.dex,
            color: p.color.should_colorize(),
        }
    }
}

/// Log level for the `-v` count on the top-level matches.
pub fn verbosity(m: &ArgMatches) -> LevelFilter {
    match m.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn parse_color(m: &ArgMatches) -> ColorChoice {
    match m.get_one::<String>("color").map(|s| s.as_str()) {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

fn parse_protocol(m: &ArgMatches) -> ProtocolChoice {
    match m.get_one::<String>("protocol").map(|s| s.as_str()) {
        Some("index") => ProtocolChoice::Index,
        Some("name") => ProtocolChoice::Name,
        _ => ProtocolChoice::Reflect,
    }
}
