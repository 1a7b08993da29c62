//! Proxy synthesis facade.
//!
//! Drives the pipeline for one or more capability descriptions:
//! descriptions → method specs → pools and symbolic methods → class
//! definitions → container bytes.

use std::num::NonZeroUsize;
use std::thread;

use dexproxy_core::{
    AccessFlags, InterfaceDescription, MethodDescription, MethodSpec, ProtoDescriptor,
    TypeDescriptor, is_simple_name,
};

use crate::emit::encoder::CONSTRUCTOR_NAME;
use crate::emit::{
    ClassDefinition, HandlerBinding, Intern, MethodIdentity, PoolBuilder, ProxyContext,
    SharedPoolBuilder, assemble, encode, encode_constructor, write,
};
use crate::error::{Result, SynthError};

const STATIC_INITIALIZER: &str = "<clinit>";

/// Bytes of a synthesized container.
#[derive(Clone, PartialEq, Eq)]
pub struct Synthesized {
    bytes: Vec<u8>,
    fingerprint: u32,
}

impl Synthesized {
    fn new(bytes: Vec<u8>) -> Self {
        let fingerprint = crc32fast::hash(&bytes);
        Self { bytes, fingerprint }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// CRC-32 of the bytes. Equal descriptions give equal fingerprints.
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Synthesized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesized")
            .field("len", &self.bytes.len())
            .field("fingerprint", &format_args!("{:08x}", self.fingerprint))
            .finish()
    }
}

/// Synthesizes proxy containers with one handler binding.
#[derive(Clone, Debug, Default)]
pub struct Synthesizer {
    binding: HandlerBinding,
}

impl Synthesizer {
    pub fn new(binding: HandlerBinding) -> Self {
        Self { binding }
    }

    pub fn binding(&self) -> &HandlerBinding {
        &self.binding
    }

    /// Synthesize one proxy class into its own container.
    pub fn synthesize(&self, description: &InterfaceDescription) -> Result<Synthesized> {
        let mut pool = PoolBuilder::new();
        let class = build_class(description, &self.binding, &mut pool)?;
        let pools = pool.finish()?;
        let bytes = write(std::slice::from_ref(&class), &pools)?;
        Ok(Synthesized::new(bytes))
    }

    /// Synthesize several proxy classes into one container.
    ///
    /// Classes are built on scoped threads, at most one per available core at
    /// a time, interning into a shared pool. The first failing class (in
    /// input order) fails the batch.
    pub fn synthesize_batch(&self, descriptions: &[InterfaceDescription]) -> Result<Synthesized> {
        let pool = SharedPoolBuilder::new();
        let binding = &self.binding;
        let workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);

        let mut built: Vec<Result<ClassDefinition>> = Vec::with_capacity(descriptions.len());
        for chunk in descriptions.chunks(workers) {
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|description| {
                        let mut pool = &pool;
                        scope.spawn(move || build_class(description, binding, &mut pool))
                    })
                    .collect();
                built.extend(handles.into_iter().map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                }));
            });
        }
        let classes = built.into_iter().collect::<Result<Vec<_>>>()?;

        let pools = pool.into_inner().finish()?;
        let bytes = write(&classes, &pools)?;
        log::debug!(
            "synthesized batch of {} classes ({} bytes)",
            classes.len(),
            bytes.len()
        );
        Ok(Synthesized::new(bytes))
    }
}

/// Synthesize one proxy class and return the container bytes.
pub fn synthesize(description: &InterfaceDescription, binding: &HandlerBinding) -> Result<Vec<u8>> {
    Synthesizer::new(binding.clone())
        .synthesize(description)
        .map(Synthesized::into_bytes)
}

/// Method specs to proxy, in declaration order.
///
/// Static, private and constructor methods are skipped since a proxy cannot
/// override them. A `final` method is a conflict for the same reason, but
/// one the caller asked for explicitly.
pub fn derive_specs(description: &InterfaceDescription) -> Result<Vec<MethodSpec>> {
    let mut specs = Vec::with_capacity(description.methods.len());
    for method in &description.methods {
        let access = method.access_flags();
        if access.intersects(AccessFlags::STATIC | AccessFlags::PRIVATE)
            || method.name == CONSTRUCTOR_NAME
            || method.name == STATIC_INITIALIZER
        {
            log::trace!("skipping {}: not overridable", method.name);
            continue;
        }
        let spec = method_spec(method, access)?;
        if access.contains(AccessFlags::FINAL) {
            return Err(SynthError::conflict(
                format!("{}->{}", description.name, spec.signature()),
                "final methods cannot be proxied",
            ));
        }
        specs.push(spec);
    }
    Ok(specs)
}

fn method_spec(method: &MethodDescription, access: AccessFlags) -> Result<MethodSpec> {
    let display = format!(
        "{}({}){}",
        method.name,
        method.params.concat(),
        method.returns
    );
    if !is_simple_name(&method.name) {
        return Err(SynthError::unsupported(display, "invalid method name"));
    }

    let mut params = Vec::with_capacity(method.params.len());
    for (position, param) in method.params.iter().enumerate() {
        let ty = TypeDescriptor::parse(param)
            .map_err(|e| SynthError::unsupported(&display, format!("parameter {position}: {e}")))?;
        if ty.is_void() {
            return Err(SynthError::unsupported(
                display,
                format!("parameter {position} has type `V`"),
            ));
        }
        params.push(ty);
    }
    let return_type = TypeDescriptor::parse(&method.returns)
        .map_err(|e| SynthError::unsupported(&display, format!("return type: {e}")))?;

    Ok(MethodSpec::new(
        method.name.clone(),
        ProtoDescriptor::new(return_type, params),
        access,
    ))
}

fn class_descriptor(what: &str, class: &str, text: &str) -> Result<()> {
    match TypeDescriptor::parse(text) {
        Ok(ty) if ty.as_str().starts_with('L') => Ok(()),
        Ok(_) => Err(SynthError::Encoding(format!(
            "{class}: {what} `{text}` is not a class descriptor"
        ))),
        Err(e) => Err(SynthError::Encoding(format!("{class}: {what}: {e}"))),
    }
}

fn build_class(
    description: &InterfaceDescription,
    binding: &HandlerBinding,
    pool: &mut impl Intern,
) -> Result<ClassDefinition> {
    let class = description.name.as_str();
    class_descriptor("class name", class, class)?;
    class_descriptor("superclass", class, &description.superclass)?;
    for interface in &description.interfaces {
        class_descriptor("interface", class, interface)?;
    }
    if !is_simple_name(&binding.field) {
        return Err(SynthError::Encoding(format!(
            "invalid handler field name `{}`",
            binding.field
        )));
    }
    if let MethodIdentity::MethodArray { field } = &binding.protocol.identity
        && !is_simple_name(field)
    {
        return Err(SynthError::Encoding(format!(
            "invalid method array field name `{field}`"
        )));
    }

    let specs = derive_specs(description)?;
    let ctx = ProxyContext { class, binding };

    let mut methods = Vec::with_capacity(specs.len() + 1);
    methods.push(encode_constructor(&description.superclass, &ctx, pool)?);
    for (ordinal, spec) in specs.iter().enumerate() {
        methods.push(encode(spec, ordinal as u32, &ctx, pool)?);
    }

    let mut definition = assemble(
        &ctx,
        &description.superclass,
        &description.interfaces,
        methods,
        pool,
    )?;
    if let Some(source) = &description.source_file {
        definition.source_file = Some(pool.intern_string(source)?);
    }
    log::debug!("built {class} with {} proxied methods", specs.len());
    Ok(definition)
}
