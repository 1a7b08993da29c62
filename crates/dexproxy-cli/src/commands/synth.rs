use std::path::{Path, PathBuf};

use dexproxy_bytecode::{DexError, DexFile};
use dexproxy_compiler::{
    HandlerBinding, HandlerProtocol, MethodIdentity, SynthError, Synthesized, Synthesizer,
};
use dexproxy_core::InterfaceDescription;

/// Identity protocol selected on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolChoice {
    #[default]
    Reflect,
    Index,
    Name,
}

pub struct SynthArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub protocol: ProtocolChoice,
    pub handler: Option<String>,
    pub field: Option<String>,
    pub verify: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid capability description: {0}")]
    Description(#[from] serde_json::Error),
    #[error(transparent)]
    Synth(#[from] SynthError),
    #[error("written container failed verification: {0}")]
    Verify(#[from] DexError),
    #[error("--protocol {0} requires --handler")]
    MissingHandler(&'static str),
}

pub fn run(args: SynthArgs) {
    match execute(&args) {
        Ok(out) => println!(
            "wrote {} bytes to {} (fingerprint {:08x})",
            out.len(),
            args.output.display(),
            out.fingerprint()
        ),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Read the descriptions, synthesize them and write the container.
///
/// With `verify`, nothing is written unless the container reads back clean.
pub fn execute(args: &SynthArgs) -> Result<Synthesized, CliError> {
    let json = std::fs::read_to_string(&args.input).map_err(|source| CliError::Io {
        path: args.input.clone(),
        source,
    })?;
    let descriptions = InterfaceDescription::list_from_json(&json)?;
    log::debug!(
        "loaded {} description(s) from {}",
        descriptions.len(),
        args.input.display()
    );

    let synthesizer = Synthesizer::new(binding(args)?);
    let out = match descriptions.as_slice() {
        [single] => synthesizer.synthesize(single)?,
        many => synthesizer.synthesize_batch(many)?,
    };

    write_container(&args.output, out.bytes(), args.verify)?;
    Ok(out)
}

fn binding(args: &SynthArgs) -> Result<HandlerBinding, CliError> {
    let protocol = match args.protocol {
        ProtocolChoice::Reflect => {
            let mut protocol = HandlerProtocol::reflect();
            if let Some(handler) = &args.handler {
                protocol.handler_type = handler.clone();
            }
            protocol
        }
        ProtocolChoice::Index => {
            let handler = args.handler.as_ref().ok_or(CliError::MissingHandler("index"))?;
            HandlerProtocol::new(handler.clone(), MethodIdentity::Index)
        }
        ProtocolChoice::Name => {
            let handler = args.handler.as_ref().ok_or(CliError::MissingHandler("name"))?;
            HandlerProtocol::new(handler.clone(), MethodIdentity::Name)
        }
    };

    let binding = HandlerBinding::new(protocol);
    Ok(match &args.field {
        Some(field) => binding.with_field(field.clone()),
        None => binding,
    })
}

/// Write `bytes` to `path`, reading them back through the verifier first
/// when `verify` is set.
pub fn write_container(path: &Path, bytes: &[u8], verify: bool) -> Result<(), CliError> {
    if verify {
        DexFile::from_bytes(bytes.to_vec())?.verify()?;
        log::info!("verified {} bytes", bytes.len());
    }
    std::fs::write(path, bytes).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}
