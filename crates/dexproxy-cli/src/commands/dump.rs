use std::path::PathBuf;

use dexproxy_bytecode::{DexError, DexFile, dump};
use dexproxy_core::Colors;

pub struct DumpArgs {
    pub dex: PathBuf,
    pub color: bool,
}

pub fn run(args: DumpArgs) {
    match execute(&args) {
        Ok(text) => print!("{}", text),
        Err(e) => {
            eprintln!("error: {}: {}", args.dex.display(), e);
            std::process::exit(1);
        }
    }
}

pub fn execute(args: &DumpArgs) -> Result<String, DexError> {
    let file = DexFile::from_path(&args.dex)?;
    dump(&file, Colors::new(args.color))
}
