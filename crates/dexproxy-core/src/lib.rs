#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core data model for dexproxy.
//!
//! Two layers:
//! - **Description layer**: serde-facing capability descriptions, exactly as
//!   a reflection collaborator hands them over (raw descriptor strings)
//! - **Typed layer**: validated descriptors, prototypes and method specs that
//!   the synthesis pipeline consumes

mod access;
mod colors;
mod descriptor;
mod description;
mod method;
mod names;


pub use access::AccessFlags;
pub use colors::Colors;
pub use descriptor::{DescriptorError, Primitive, ProtoDescriptor, TypeDescriptor};
pub use description::{AccessKeyword, InterfaceDescription, MethodDescription};
pub use method::MethodSpec;
pub use names::{is_simple_name, is_simple_name_char};

/// Descriptor of `java.lang.Object`.
pub const OBJECT: &str = "Ljava/lang/Object;";

/// Descriptor of `java.lang.Object[]`, the argument array handed to handlers.
pub const OBJECT_ARRAY: &str = "[Ljava/lang/Object;";
