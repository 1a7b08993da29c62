//! DEX emission for proxy classes.
//!
//! The pipeline runs in two passes:
//! - `encoder` and `layout` produce symbolic methods and class definitions,
//!   interning every reference into a [`PoolBuilder`]
//! - `writer` sorts the pools, lowers instructions with final indices and
//!   serializes the container

pub mod encoder;
pub mod layout;
pub mod pool;
mod writer;

#[cfg(test)]
mod writer_tests;

pub use encoder::{
    EncodedMethod, HandlerBinding, HandlerProtocol, Insn, MethodIdentity, ProxyContext, encode,
    encode_constructor,
};
pub use layout::{ClassDefinition, assemble};
pub use pool::{Intern, PoolBuilder, Pools, SharedPoolBuilder};
pub use writer::{lower, write};
