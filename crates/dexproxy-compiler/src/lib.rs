//! dexproxy compiler: proxy class synthesis into DEX containers.
//!
//! This crate provides the synthesis pipeline:
//! - `emit::pool` - deduplicating pools with DEX-order finalization
//! - `emit::encoder` - the handler delegation pattern as Dalvik instructions
//! - `emit::layout` - class definitions from encoded methods
//! - `emit::writer` - container serialization, checksum and signature
//! - `synth` - the facade driven by capability descriptions

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod emit;
mod error;
pub mod synth;

#[cfg(test)]
mod synth_tests;
#[cfg(test)]
pub mod test_utils;

pub use emit::{HandlerBinding, HandlerProtocol, MethodIdentity};
pub use error::{Result, SynthError};
pub use synth::{Synthesized, Synthesizer, derive_specs, synthesize};
