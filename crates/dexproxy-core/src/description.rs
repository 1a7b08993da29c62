//! Capability descriptions: the raw input handed over by an introspection
//! collaborator (or read from JSON by the CLI).
//!
//! Descriptor strings are kept verbatim here. Validation happens when the
//! synthesizer derives method specs, so that a bad descriptor is reported
//! against the method that carries it.

use serde::{Deserialize, Serialize};

use crate::access::AccessFlags;

/// Interface or class to proxy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescription {
    /// Descriptor of the proxy class to generate.
    pub name: String,
    #[serde(default = "default_superclass")]
    pub superclass: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default)]
    pub methods: Vec<MethodDescription>,
}

/// One method signature in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescription {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "default_return")]
    pub returns: String,
    #[serde(default = "default_access")]
    pub access: Vec<AccessKeyword>,
}

/// Access modifiers as written in descriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKeyword {
    Public,
    Protected,
    Private,
    Static,
    Final,
    Synchronized,
    Bridge,
    Varargs,
    Native,
    Abstract,
    Synthetic,
}

impl AccessKeyword {
    pub fn flag(self) -> AccessFlags {
        match self {
            Self::Public => AccessFlags::PUBLIC,
            Self::Protected => AccessFlags::PROTECTED,
            Self::Private => AccessFlags::PRIVATE,
            Self::Static => AccessFlags::STATIC,
            Self::Final => AccessFlags::FINAL,
            Self::Synchronized => AccessFlags::SYNCHRONIZED,
            Self::Bridge => AccessFlags::BRIDGE,
            Self::Varargs => AccessFlags::VARARGS,
            Self::Native => AccessFlags::NATIVE,
            Self::Abstract => AccessFlags::ABSTRACT,
            Self::Synthetic => AccessFlags::SYNTHETIC,
        }
    }
}

fn default_superclass() -> String {
    crate::OBJECT.to_string()
}

fn default_return() -> String {
    "V".to_string()
}

fn default_access() -> Vec<AccessKeyword> {
    vec![AccessKeyword::Public, AccessKeyword::Abstract]
}

impl InterfaceDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: default_superclass(),
            interfaces: Vec::new(),
            source_file: None,
            methods: Vec::new(),
        }
    }

    /// Parse a description from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse either a single description or an array of them.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(InterfaceDescription),
            Many(Vec<InterfaceDescription>),
        }

        Ok(match serde_json::from_str(json)? {
            OneOrMany::One(desc) => vec![desc],
            OneOrMany::Many(list) => list,
        })
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = superclass.into();
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn source_file(mut self, name: impl Into<String>) -> Self {
        self.source_file = Some(name.into());
        self
    }

    /// Append a public abstract method.
    pub fn method(mut self, name: &str, params: &[&str], returns: &str) -> Self {
        self.methods.push(MethodDescription::new(name, params, returns));
        self
    }

    pub fn with_method(mut self, method: MethodDescription) -> Self {
        self.methods.push(method);
        self
    }
}

impl MethodDescription {
    pub fn new(name: &str, params: &[&str], returns: &str) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            returns: returns.to_string(),
            access: default_access(),
        }
    }

    pub fn with_access(mut self, access: &[AccessKeyword]) -> Self {
        self.access = access.to_vec();
        self
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access
            .iter()
            .fold(AccessFlags::NONE, |acc, kw| acc | kw.flag())
    }
}
