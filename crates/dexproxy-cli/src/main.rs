mod cli;
mod commands;

use cli::{DumpParams, SynthParams, build_cli, verbosity};

fn main() {
    let matches = build_cli().get_matches();

    let _ = env_logger::builder()
        .format_timestamp(None)
        .filter_level(verbosity(&matches))
        .parse_default_env()
        .try_init();

    match matches.subcommand() {
        Some(("synth", m)) => {
            let params = SynthParams::from_matches(m);
            commands::synth::run(params.into());
        }
        Some(("dump", m)) => {
            let params = DumpParams::from_matches(m);
            commands::dump::run(params.into());
        }
        _ => unreachable!("clap should have caught this"),
    }
}
