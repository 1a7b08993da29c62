//! Class layout assembly.
//!
//! Groups the encoded methods of one proxy into a [`ClassDefinition`]: the
//! constructor becomes a direct method, every proxied method a virtual one,
//! in declaration order. Handler fields are added according to the
//! binding's protocol.

use std::collections::HashSet;

use dexproxy_core::AccessFlags;

use super::encoder::{EncodedMethod, MethodIdentity, ProxyContext, REFLECT_METHOD_ARRAY};
use super::pool::{FieldIdx, Intern, StringIdx, TypeIdx};
use crate::error::{Result, SynthError};

/// A field declared by a class, with its final access flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDefinition {
    pub field: FieldIdx,
    pub access: AccessFlags,
}

/// A method declared by a class, with its final access flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDefinition {
    pub access: AccessFlags,
    pub encoded: EncodedMethod,
}

/// One class ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDefinition {
    pub descriptor: String,
    pub class: TypeIdx,
    pub access: AccessFlags,
    pub superclass: Option<TypeIdx>,
    pub interfaces: Vec<TypeIdx>,
    pub source_file: Option<StringIdx>,
    pub static_fields: Vec<FieldDefinition>,
    pub instance_fields: Vec<FieldDefinition>,
    pub direct_methods: Vec<MethodDefinition>,
    pub virtual_methods: Vec<MethodDefinition>,
}

impl ClassDefinition {
    /// Direct methods followed by virtual methods.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.direct_methods.iter().chain(&self.virtual_methods)
    }

    /// Type indices this class depends on inside a container.
    pub fn supertypes(&self) -> impl Iterator<Item = TypeIdx> + '_ {
        self.superclass.into_iter().chain(self.interfaces.iter().copied())
    }
}

const PROXY_CLASS_ACCESS: AccessFlags = AccessFlags::PUBLIC.union(AccessFlags::FINAL);
const HANDLER_FIELD_ACCESS: AccessFlags = AccessFlags::PRIVATE.union(AccessFlags::FINAL);
const METHOD_ARRAY_ACCESS: AccessFlags = AccessFlags::PRIVATE.union(AccessFlags::STATIC);

/// Access flags of a proxied method: the declared visibility (public unless
/// protected) and the varargs bit. `abstract`, `native` and the rest go.
pub fn proxied_access(declared: AccessFlags) -> AccessFlags {
    let visibility = if declared.contains(AccessFlags::PROTECTED)
        && !declared.contains(AccessFlags::PUBLIC)
    {
        AccessFlags::PROTECTED
    } else {
        AccessFlags::PUBLIC
    };
    visibility | declared.intersection(AccessFlags::VARARGS)
}

/// Assemble one proxy class.
///
/// `methods` holds the constructor and the proxied methods in declaration
/// order. Two methods with the same name and prototype are a conflict;
/// overloads are fine. So is an interface listed twice.
pub fn assemble(
    ctx: &ProxyContext<'_>,
    superclass: &str,
    interfaces: &[String],
    methods: Vec<EncodedMethod>,
    pool: &mut impl Intern,
) -> Result<ClassDefinition> {
    let mut listed = HashSet::new();
    for interface in interfaces {
        if !listed.insert(interface.as_str()) {
            return Err(SynthError::conflict(
                format!("{} implements {interface}", ctx.class),
                "interface listed more than once",
            ));
        }
    }

    let mut seen = HashSet::new();
    for method in &methods {
        if !seen.insert((&method.spec.name, &method.spec.proto)) {
            return Err(SynthError::conflict(
                format!("{}->{}", ctx.class, method.spec.signature()),
                "declared more than once",
            ));
        }
    }

    let class = pool.intern_type(ctx.class)?;
    let superclass = Some(pool.intern_type(superclass)?);
    let interfaces = interfaces
        .iter()
        .map(|iface| pool.intern_type(iface))
        .collect::<Result<Vec<_>>>()?;

    let binding = ctx.binding;
    let mut static_fields = Vec::new();
    if let MethodIdentity::MethodArray { field } = &binding.protocol.identity {
        static_fields.push(FieldDefinition {
            field: pool.intern_field(ctx.class, field, REFLECT_METHOD_ARRAY)?,
            access: METHOD_ARRAY_ACCESS,
        });
    }
    let instance_fields = vec![FieldDefinition {
        field: pool.intern_field(ctx.class, &binding.field, &binding.protocol.handler_type)?,
        access: HANDLER_FIELD_ACCESS,
    }];

    let (constructors, proxied): (Vec<_>, Vec<_>) =
        methods.into_iter().partition(EncodedMethod::is_constructor);
    let direct_methods = constructors
        .into_iter()
        .map(|encoded| MethodDefinition {
            access: AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR,
            encoded,
        })
        .collect();
    let virtual_methods: Vec<MethodDefinition> = proxied
        .into_iter()
        .map(|encoded| MethodDefinition {
            access: proxied_access(encoded.spec.access),
            encoded,
        })
        .collect();

    log::debug!(
        "assembled {}: {} proxied methods",
        ctx.class,
        virtual_methods.len()
    );

    Ok(ClassDefinition {
        descriptor: ctx.class.to_string(),
        class,
        access: PROXY_CLASS_ACCESS,
        superclass,
        interfaces,
        source_file: None,
        static_fields,
        instance_fields,
        direct_methods,
        virtual_methods,
    })
}
