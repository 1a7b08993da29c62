//! Type and method descriptors in DEX textual form.
//!
//! Grammar (subset of the DEX `TypeDescriptor` production):
//!
//! ```text
//! Type      = 'V' | Field
//! Field     = Primitive | Class | '['{1,255} (Primitive | Class)
//! Primitive = 'Z' | 'B' | 'S' | 'C' | 'I' | 'J' | 'F' | 'D'
//! Class     = 'L' Segment ('/' Segment)* ';'
//! Segment   = SimpleName
//! ```

use std::fmt;

use crate::names::is_simple_name;

/// Maximum number of array dimensions a descriptor may carry.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("empty type descriptor")]
    Empty,
    #[error("invalid type descriptor `{descriptor}`: {reason}")]
    Invalid {
        descriptor: String,
        reason: &'static str,
    },
    #[error("invalid method descriptor `{0}`")]
    InvalidMethod(String),
}

fn invalid(descriptor: &str, reason: &'static str) -> DescriptorError {
    DescriptorError::Invalid {
        descriptor: descriptor.to_string(),
        reason,
    }
}

/// Primitive value types, i.e. everything the encoder must box and unbox.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'Z' => Self::Boolean,
            'B' => Self::Byte,
            'S' => Self::Short,
            'C' => Self::Char,
            'I' => Self::Int,
            'J' => Self::Long,
            'F' => Self::Float,
            'D' => Self::Double,
            _ => return None,
        })
    }

    pub fn descriptor_char(self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Byte => 'B',
            Self::Short => 'S',
            Self::Char => 'C',
            Self::Int => 'I',
            Self::Long => 'J',
            Self::Float => 'F',
            Self::Double => 'D',
        }
    }

    /// Takes two registers.
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// Descriptor of the `java.lang` wrapper class.
    pub fn wrapper(self) -> &'static str {
        match self {
            Self::Boolean => "Ljava/lang/Boolean;",
            Self::Byte => "Ljava/lang/Byte;",
            Self::Short => "Ljava/lang/Short;",
            Self::Char => "Ljava/lang/Character;",
            Self::Int => "Ljava/lang/Integer;",
            Self::Long => "Ljava/lang/Long;",
            Self::Float => "Ljava/lang/Float;",
            Self::Double => "Ljava/lang/Double;",
        }
    }

    /// Name of the wrapper's unboxing accessor (`intValue`, ...).
    pub fn unbox_method(self) -> &'static str {
        match self {
            Self::Boolean => "booleanValue",
            Self::Byte => "byteValue",
            Self::Short => "shortValue",
            Self::Char => "charValue",
            Self::Int => "intValue",
            Self::Long => "longValue",
            Self::Float => "floatValue",
            Self::Double => "doubleValue",
        }
    }
}

/// A validated type descriptor such as `I`, `V`, `Ljava/lang/String;` or `[[J`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDescriptor(String);

impl TypeDescriptor {
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        if text.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if text == "V" {
            return Ok(Self(text.to_string()));
        }

        let dims = text.bytes().take_while(|&b| b == b'[').count();
        if dims > MAX_ARRAY_DIMENSIONS {
            return Err(invalid(text, "more than 255 array dimensions"));
        }
        let element = &text[dims..];
        validate_element(text, element)?;
        Ok(Self(text.to_string()))
    }

    pub fn void() -> Self {
        Self("V".to_string())
    }

    pub fn object() -> Self {
        Self(crate::OBJECT.to_string())
    }

    pub fn primitive_type(p: Primitive) -> Self {
        Self(p.descriptor_char().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_void(&self) -> bool {
        self.0 == "V"
    }

    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    pub fn is_reference(&self) -> bool {
        self.0.starts_with('L') || self.is_array()
    }

    /// `Some` for the eight primitive descriptors.
    pub fn primitive(&self) -> Option<Primitive> {
        let mut chars = self.0.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Primitive::from_char(c),
            _ => None,
        }
    }

    /// Registers a value of this type occupies: 0 for void, 2 for `J`/`D`.
    pub fn register_width(&self) -> u16 {
        if self.is_void() {
            0
        } else if self.primitive().is_some_and(Primitive::is_wide) {
            2
        } else {
            1
        }
    }

    /// Shorty character: references collapse to `L`.
    pub fn shorty_char(&self) -> char {
        if self.is_reference() {
            'L'
        } else {
            self.0.chars().next().unwrap_or('V')
        }
    }

    /// Dotted Java name (`java.lang.String`, `int[]`) for dumps and messages.
    pub fn java_name(&self) -> String {
        let dims = self.0.bytes().take_while(|&b| b == b'[').count();
        let element = &self.0[dims..];
        let mut name = match element.chars().next() {
            Some('L') => element[1..element.len() - 1].replace('/', "."),
            Some('V') => "void".to_string(),
            Some(c) => match Primitive::from_char(c) {
                Some(Primitive::Boolean) => "boolean".to_string(),
                Some(Primitive::Byte) => "byte".to_string(),
                Some(Primitive::Short) => "short".to_string(),
                Some(Primitive::Char) => "char".to_string(),
                Some(Primitive::Int) => "int".to_string(),
                Some(Primitive::Long) => "long".to_string(),
                Some(Primitive::Float) => "float".to_string(),
                Some(Primitive::Double) => "double".to_string(),
                None => element.to_string(),
            },
            None => String::new(),
        };
        for _ in 0..dims {
            name.push_str("[]");
        }
        name
    }
}

fn validate_element(full: &str, element: &str) -> Result<(), DescriptorError> {
    let mut chars = element.chars();
    match chars.next() {
        None => Err(invalid(full, "missing array element type")),
        Some('V') => Err(invalid(full, "void is only valid as a return type")),
        Some('L') => validate_class_name(full, element),
        Some(c) if Primitive::from_char(c).is_some() => {
            if chars.next().is_some() {
                Err(invalid(full, "trailing characters after primitive"))
            } else {
                Ok(())
            }
        }
        Some(_) => Err(invalid(full, "unknown type character")),
    }
}

fn validate_class_name(full: &str, element: &str) -> Result<(), DescriptorError> {
    let Some(body) = element[1..].strip_suffix(';') else {
        return Err(invalid(full, "class descriptor must end with `;`"));
    };
    if body.is_empty() {
        return Err(invalid(full, "empty class name"));
    }
    for segment in body.split('/') {
        if segment.is_empty() {
            return Err(invalid(full, "empty package or class segment"));
        }
        if !is_simple_name(segment) {
            return Err(invalid(full, "illegal character in class name"));
        }
    }
    Ok(())
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self.0)
    }
}

impl AsRef<str> for TypeDescriptor {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for TypeDescriptor {
    type Error = DescriptorError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        Self::parse(text)
    }
}

/// A method prototype: return type plus ordered parameter types.
///
/// Construction through [`ProtoDescriptor::new`] does not reject `V` in
/// parameter position; the instruction encoder does, so that the failure
/// carries the method name. [`ProtoDescriptor::parse`] is strict.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtoDescriptor {
    pub return_type: TypeDescriptor,
    pub params: Vec<TypeDescriptor>,
}

impl ProtoDescriptor {
    pub fn new(return_type: TypeDescriptor, params: Vec<TypeDescriptor>) -> Self {
        Self {
            return_type,
            params,
        }
    }

    /// Parse `(ILjava/lang/String;)V`.
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let bad = || DescriptorError::InvalidMethod(text.to_string());
        let rest = text.strip_prefix('(').ok_or_else(bad)?;
        let close = rest.find(')').ok_or_else(bad)?;
        let (params_text, ret_text) = (&rest[..close], &rest[close + 1..]);

        let mut params = Vec::new();
        let mut cursor = 0;
        while cursor < params_text.len() {
            let len = field_len(&params_text[cursor..]).ok_or_else(bad)?;
            let param = TypeDescriptor::parse(&params_text[cursor..cursor + len])
                .map_err(|_| bad())?;
            if param.is_void() {
                return Err(bad());
            }
            params.push(param);
            cursor += len;
        }

        let return_type = TypeDescriptor::parse(ret_text).map_err(|_| bad())?;
        Ok(Self::new(return_type, params))
    }

    /// Shorty form: return char followed by one char per parameter.
    pub fn shorty(&self) -> String {
        std::iter::once(self.return_type.shorty_char())
            .chain(self.params.iter().map(TypeDescriptor::shorty_char))
            .collect()
    }

    /// Registers the parameters occupy (without `this`).
    ///
    /// Widened to `u32`: a prototype may list more parameter slots than a
    /// frame can address, and callers range-check the total.
    pub fn param_registers(&self) -> u32 {
        self.params
            .iter()
            .map(|param| u32::from(param.register_width()))
            .sum()
    }
}

/// Length in bytes of the first field descriptor in `text`.
fn field_len(text: &str) -> Option<usize> {
    let dims = text.bytes().take_while(|&b| b == b'[').count();
    let rest = &text[dims..];
    match rest.bytes().next()? {
        b'L' => rest.find(';').map(|end| dims + end + 1),
        _ => Some(dims + rest.chars().next()?.len_utf8()),
    }
}

impl fmt::Display for ProtoDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            f.write_str(param.as_str())?;
        }
        write!(f, "){}", self.return_type)
    }
}

impl fmt::Debug for ProtoDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtoDescriptor({self})")
    }
}
