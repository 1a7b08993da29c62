//! Instruction encoder for the delegation pattern.
//!
//! Every proxied method runs the same sequence: load the handler, load the
//! method identity, pack the arguments into an `Object[]`, call the handler
//! and convert its result back to the declared return type.
//!
//! Register frame of a proxied method:
//!
//! ```text
//! v0  handler, then the handler's result
//! v1  method identity
//! v2  argument array
//! v3  array size / element index
//! v4  boxed argument
//! v5  this
//! v6… parameters (J and D take two registers)
//! ```
//!
//! Instructions are emitted in symbolic form ([`Insn`]) that refers to
//! provisional pool indices. Operand widths are chosen when the writer
//! lowers them with final indices.

use dexproxy_bytecode::InvokeKind;
use dexproxy_core::{
    AccessFlags, MethodSpec, OBJECT_ARRAY, Primitive, ProtoDescriptor, TypeDescriptor,
};

use super::pool::{FieldIdx, Intern, MethodIdx, StringIdx, TypeIdx};
use crate::error::{Result, SynthError};

pub const INVOCATION_HANDLER: &str = "Ljava/lang/reflect/InvocationHandler;";
pub const REFLECT_METHOD: &str = "Ljava/lang/reflect/Method;";
pub const REFLECT_METHOD_ARRAY: &str = "[Ljava/lang/reflect/Method;";
pub const STRING: &str = "Ljava/lang/String;";

/// Name of the instance field holding the handler.
pub const DEFAULT_HANDLER_FIELD: &str = "$__handler";
/// Name of the static `Method[]` field of the reflective protocol.
pub const DEFAULT_METHOD_ARRAY_FIELD: &str = "$__methodArray";

pub const CONSTRUCTOR_NAME: &str = "<init>";

const RESULT: u8 = 0;
const IDENTITY: u8 = 1;
const ARGS: u8 = 2;
const SCRATCH: u8 = 3;
const BOXED: u8 = 4;
const THIS: u8 = 5;
const TEMPORARIES: u32 = 5;

/// Arguments of the handler call: handler, proxy, identity, array.
const HANDLER_OUTS: u16 = 4;

/// How a proxied method identifies itself to the handler.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MethodIdentity {
    /// Element of a static `Method[]` field on the proxy, filled in by the
    /// framework after loading. Indexed by declaration order.
    MethodArray { field: String },
    /// Declaration index as an `int`.
    Index,
    /// `name(params)ret` as a string constant.
    Name,
}

impl MethodIdentity {
    /// Type of the identity argument in the handler's invoke method.
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::MethodArray { .. } => REFLECT_METHOD,
            Self::Index => "I",
            Self::Name => STRING,
        }
    }
}

/// The handler type and the method the proxy calls on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerProtocol {
    pub handler_type: String,
    pub handler_is_interface: bool,
    pub invoke_name: String,
    pub identity: MethodIdentity,
}

impl HandlerProtocol {
    /// `java.lang.reflect.InvocationHandler` with a `Method[]` identity.
    pub fn reflect() -> Self {
        Self::new(
            INVOCATION_HANDLER,
            MethodIdentity::MethodArray {
                field: DEFAULT_METHOD_ARRAY_FIELD.to_string(),
            },
        )
    }

    /// Interface handler with an `invoke` method and the given identity.
    pub fn new(handler_type: impl Into<String>, identity: MethodIdentity) -> Self {
        Self {
            handler_type: handler_type.into(),
            handler_is_interface: true,
            invoke_name: "invoke".to_string(),
            identity,
        }
    }

    /// `(Object, identity, Object[])Object`.
    pub fn invoke_proto(&self) -> Result<ProtoDescriptor> {
        Ok(ProtoDescriptor::new(
            TypeDescriptor::object(),
            vec![
                TypeDescriptor::object(),
                descriptor(self.identity.descriptor())?,
                descriptor(OBJECT_ARRAY)?,
            ],
        ))
    }

    fn invoke_kind(&self) -> InvokeKind {
        if self.handler_is_interface {
            InvokeKind::Interface
        } else {
            InvokeKind::Virtual
        }
    }
}

/// Where a proxy keeps its handler and how it calls it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerBinding {
    pub field: String,
    pub protocol: HandlerProtocol,
}

impl HandlerBinding {
    pub fn new(protocol: HandlerProtocol) -> Self {
        Self {
            field: DEFAULT_HANDLER_FIELD.to_string(),
            protocol,
        }
    }

    pub fn reflect() -> Self {
        Self::new(HandlerProtocol::reflect())
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

impl Default for HandlerBinding {
    fn default() -> Self {
        Self::reflect()
    }
}

/// A handler binding applied to one proxy class.
#[derive(Clone, Copy, Debug)]
pub struct ProxyContext<'a> {
    pub class: &'a str,
    pub binding: &'a HandlerBinding,
}

/// Symbolic instruction with provisional pool indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Insn {
    ReturnVoid,
    Return { reg: u8 },
    ReturnWide { reg: u8 },
    ReturnObject { reg: u8 },
    MoveResult { dst: u8 },
    MoveResultWide { dst: u8 },
    MoveResultObject { dst: u8 },
    MoveObject { dst: u8, src: u16 },
    /// Lowered to `const/4`, `const/16` or `const`.
    Const { dst: u8, value: i32 },
    /// Lowered to `const-string` or `const-string/jumbo`.
    ConstString { dst: u8, string: StringIdx },
    CheckCast { reg: u8, ty: TypeIdx },
    NewArray { dst: u8, size: u8, ty: TypeIdx },
    AgetObject { dst: u8, array: u8, index: u8 },
    AputObject { src: u8, array: u8, index: u8 },
    IgetObject { dst: u8, object: u8, field: FieldIdx },
    IputObject { src: u8, object: u8, field: FieldIdx },
    SgetObject { dst: u8, field: FieldIdx },
    /// Lowered to the `35c` form when possible, `/range` otherwise.
    Invoke {
        kind: InvokeKind,
        method: MethodIdx,
        args: Vec<u16>,
    },
}

/// A method body ready for layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedMethod {
    pub spec: MethodSpec,
    /// This method's own reference.
    pub method: MethodIdx,
    pub registers: u16,
    pub ins: u16,
    pub outs: u16,
    pub code: Vec<Insn>,
}

impl EncodedMethod {
    pub fn is_constructor(&self) -> bool {
        self.spec.name == CONSTRUCTOR_NAME
    }
}

fn descriptor(text: &str) -> Result<TypeDescriptor> {
    TypeDescriptor::parse(text).map_err(|e| SynthError::Encoding(e.to_string()))
}

fn handler_type(ctx: &ProxyContext<'_>) -> Result<TypeDescriptor> {
    let ty = descriptor(&ctx.binding.protocol.handler_type)?;
    if !ty.as_str().starts_with('L') {
        return Err(SynthError::Encoding(format!(
            "handler type `{ty}` is not a class descriptor"
        )));
    }
    Ok(ty)
}

/// `Wrapper.valueOf(p)Wrapper`.
fn box_proto(p: Primitive) -> Result<ProtoDescriptor> {
    Ok(ProtoDescriptor::new(
        descriptor(p.wrapper())?,
        vec![TypeDescriptor::primitive_type(p)],
    ))
}

/// `Wrapper.pValue()p`.
fn unbox_proto(p: Primitive) -> ProtoDescriptor {
    ProtoDescriptor::new(TypeDescriptor::primitive_type(p), Vec::new())
}

/// Encode the delegation body of one proxied method.
///
/// `ordinal` is the method's position among the proxied methods; the
/// `MethodArray` and `Index` identities are derived from it.
pub fn encode(
    spec: &MethodSpec,
    ordinal: u32,
    ctx: &ProxyContext<'_>,
    pool: &mut impl Intern,
) -> Result<EncodedMethod> {
    let signature = spec.signature();
    if let Some(position) = spec.params().iter().position(TypeDescriptor::is_void) {
        return Err(SynthError::unsupported(
            signature,
            format!("parameter {position} has type `V`"),
        ));
    }

    let param_registers = spec.proto.param_registers();
    let registers = u16::try_from(TEMPORARIES + 1 + param_registers).map_err(|_| {
        SynthError::unsupported(&signature, "parameters exceed the register file")
    })?;
    let ordinal = i32::try_from(ordinal)
        .map_err(|_| SynthError::Encoding(format!("method ordinal {ordinal} out of range")))?;

    let protocol = &ctx.binding.protocol;
    let handler = handler_type(ctx)?;
    let mut code = Vec::new();

    let handler_field = pool.intern_field(ctx.class, &ctx.binding.field, handler.as_str())?;
    code.push(Insn::IgetObject {
        dst: RESULT,
        object: THIS,
        field: handler_field,
    });

    match &protocol.identity {
        MethodIdentity::MethodArray { field } => {
            let methods = pool.intern_field(ctx.class, field, REFLECT_METHOD_ARRAY)?;
            code.push(Insn::SgetObject {
                dst: IDENTITY,
                field: methods,
            });
            code.push(Insn::Const {
                dst: SCRATCH,
                value: ordinal,
            });
            code.push(Insn::AgetObject {
                dst: IDENTITY,
                array: IDENTITY,
                index: SCRATCH,
            });
        }
        MethodIdentity::Index => code.push(Insn::Const {
            dst: IDENTITY,
            value: ordinal,
        }),
        MethodIdentity::Name => {
            let name = pool.intern_string(&signature)?;
            code.push(Insn::ConstString {
                dst: IDENTITY,
                string: name,
            });
        }
    }

    let object_array = pool.intern_type(OBJECT_ARRAY)?;
    code.push(Insn::Const {
        dst: SCRATCH,
        value: spec.params().len() as i32,
    });
    code.push(Insn::NewArray {
        dst: ARGS,
        size: SCRATCH,
        ty: object_array,
    });

    let mut reg = THIS as u16 + 1;
    for (i, param) in spec.params().iter().enumerate() {
        code.push(Insn::Const {
            dst: SCRATCH,
            value: i as i32,
        });
        match param.primitive() {
            Some(p) => {
                let value_of = pool.intern_method(p.wrapper(), "valueOf", &box_proto(p)?)?;
                let args = if p.is_wide() {
                    vec![reg, reg + 1]
                } else {
                    vec![reg]
                };
                code.push(Insn::Invoke {
                    kind: InvokeKind::Static,
                    method: value_of,
                    args,
                });
                code.push(Insn::MoveResultObject { dst: BOXED });
                code.push(store(BOXED));
            }
            None => match u8::try_from(reg) {
                Ok(src) => code.push(store(src)),
                Err(_) => {
                    code.push(Insn::MoveObject { dst: BOXED, src: reg });
                    code.push(store(BOXED));
                }
            },
        }
        reg += param.register_width();
    }

    let invoke = pool.intern_method(
        &protocol.handler_type,
        &protocol.invoke_name,
        &protocol.invoke_proto()?,
    )?;
    code.push(Insn::Invoke {
        kind: protocol.invoke_kind(),
        method: invoke,
        args: vec![RESULT as u16, THIS as u16, IDENTITY as u16, ARGS as u16],
    });

    let ret = spec.return_type();
    if ret.is_void() {
        code.push(Insn::ReturnVoid);
    } else {
        code.push(Insn::MoveResultObject { dst: RESULT });
        match ret.primitive() {
            None => {
                let ty = pool.intern_type(ret.as_str())?;
                code.push(Insn::CheckCast { reg: RESULT, ty });
                code.push(Insn::ReturnObject { reg: RESULT });
            }
            Some(p) => {
                let wrapper = pool.intern_type(p.wrapper())?;
                code.push(Insn::CheckCast {
                    reg: RESULT,
                    ty: wrapper,
                });
                let unbox = pool.intern_method(p.wrapper(), p.unbox_method(), &unbox_proto(p))?;
                code.push(Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    method: unbox,
                    args: vec![RESULT as u16],
                });
                if p.is_wide() {
                    code.push(Insn::MoveResultWide { dst: RESULT });
                    code.push(Insn::ReturnWide { reg: RESULT });
                } else {
                    code.push(Insn::MoveResult { dst: RESULT });
                    code.push(Insn::Return { reg: RESULT });
                }
            }
        }
    }

    let method = pool.intern_method(ctx.class, &spec.name, &spec.proto)?;
    log::trace!(
        "encoded {}->{signature}: {} instructions, {registers} registers",
        ctx.class,
        code.len()
    );

    Ok(EncodedMethod {
        spec: spec.clone(),
        method,
        registers,
        ins: registers - TEMPORARIES as u16,
        outs: HANDLER_OUTS,
        code,
    })
}

fn store(src: u8) -> Insn {
    Insn::AputObject {
        src,
        array: ARGS,
        index: SCRATCH,
    }
}

/// Encode `<init>(Handler)V`: call the superclass no-argument constructor and
/// store the handler.
pub fn encode_constructor(
    superclass: &str,
    ctx: &ProxyContext<'_>,
    pool: &mut impl Intern,
) -> Result<EncodedMethod> {
    let handler = handler_type(ctx)?;
    let spec = MethodSpec::new(
        CONSTRUCTOR_NAME,
        ProtoDescriptor::new(TypeDescriptor::void(), vec![handler.clone()]),
        AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR,
    );

    let super_init = pool.intern_method(
        superclass,
        CONSTRUCTOR_NAME,
        &ProtoDescriptor::new(TypeDescriptor::void(), Vec::new()),
    )?;
    let field = pool.intern_field(ctx.class, &ctx.binding.field, handler.as_str())?;
    let method = pool.intern_method(ctx.class, CONSTRUCTOR_NAME, &spec.proto)?;

    let code = vec![
        Insn::Invoke {
            kind: InvokeKind::Direct,
            method: super_init,
            args: vec![0],
        },
        Insn::IputObject {
            src: 1,
            object: 0,
            field,
        },
        Insn::ReturnVoid,
    ];

    Ok(EncodedMethod {
        spec,
        method,
        registers: 2,
        ins: 2,
        outs: 1,
        code,
    })
}
