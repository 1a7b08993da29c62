use std::fmt;

use crate::access::AccessFlags;
use crate::descriptor::{ProtoDescriptor, TypeDescriptor};

/// Shape of one method to proxy: name, prototype and declared access flags.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MethodSpec {
    pub name: String,
    pub proto: ProtoDescriptor,
    pub access: AccessFlags,
}

impl MethodSpec {
    pub fn new(name: impl Into<String>, proto: ProtoDescriptor, access: AccessFlags) -> Self {
        Self {
            name: name.into(),
            proto,
            access,
        }
    }

    pub fn params(&self) -> &[TypeDescriptor] {
        &self.proto.params
    }

    pub fn return_type(&self) -> &TypeDescriptor {
        &self.proto.return_type
    }

    /// `name(params)ret`, the identity used for conflict detection and by
    /// the name-based handler protocol.
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.proto)
    }
}

impl fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodSpec({} {})", self.access, self.signature())
    }
}
