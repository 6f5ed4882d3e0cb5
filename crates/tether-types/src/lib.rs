//! Type vocabulary for Tether
//!
//! Defines the descriptor-level representations shared by every part of the
//! bridge: the signature tags the foreign runtime uses to tell overloads
//! apart, the primitive kinds a property can carry, the structured keys of a
//! proxy's method table, and the class-signature strings the foreign side
//! reports when a class is first seen.

mod signature;

pub use signature::{parse_class_signatures, parse_descriptor_list, MemberSignature, SignatureError};

use std::borrow::Cow;
use std::fmt;

/// A foreign type tag in descriptor spelling (`I`, `Ljava/lang/String;`, `[D`, ...)
///
/// Tags are self-delimiting, so concatenating them never makes two different
/// tag sequences collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(Cow<'static, str>);

impl TypeTag {
    pub const BOOLEAN: TypeTag = TypeTag(Cow::Borrowed("Z"));
    pub const BYTE: TypeTag = TypeTag(Cow::Borrowed("B"));
    pub const CHAR: TypeTag = TypeTag(Cow::Borrowed("C"));
    pub const SHORT: TypeTag = TypeTag(Cow::Borrowed("S"));
    pub const INT: TypeTag = TypeTag(Cow::Borrowed("I"));
    pub const LONG: TypeTag = TypeTag(Cow::Borrowed("J"));
    pub const FLOAT: TypeTag = TypeTag(Cow::Borrowed("F"));
    pub const DOUBLE: TypeTag = TypeTag(Cow::Borrowed("D"));
    pub const VOID: TypeTag = TypeTag(Cow::Borrowed("V"));
    pub const STRING: TypeTag = TypeTag(Cow::Borrowed("Ljava/lang/String;"));
    /// Root reference type; also the tag of `null` and of erased values
    pub const OBJECT: TypeTag = TypeTag(Cow::Borrowed("Ljava/lang/Object;"));

    /// Build a tag from an already-spelled descriptor
    pub fn new(descriptor: impl Into<String>) -> Self {
        TypeTag(Cow::Owned(descriptor.into()))
    }

    /// Reference tag for a class name in either `a.b.C` or `a/b/C` spelling
    pub fn object(class_name: &str) -> Self {
        TypeTag::new(format!("L{};", class_name.replace('.', "/")))
    }

    /// Array tag whose elements carry `element`
    pub fn array_of(element: &TypeTag) -> Self {
        TypeTag::new(format!("[{}", element.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    pub fn is_void(&self) -> bool {
        self.0 == "V"
    }

    /// Element tag of an array tag
    pub fn element(&self) -> Option<TypeTag> {
        self.0.strip_prefix('[').map(|rest| TypeTag::new(rest))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of kinds a property descriptor can be declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Object,
    Array,
}

impl PropertyKind {
    /// Kind of a field declared with the given descriptor.
    /// Returns `None` for `V`, which no field can carry.
    pub fn from_descriptor(tag: &TypeTag) -> Option<PropertyKind> {
        let kind = match tag.as_str() {
            "Z" => PropertyKind::Bool,
            "B" => PropertyKind::Byte,
            "C" => PropertyKind::Char,
            "S" => PropertyKind::Short,
            "I" => PropertyKind::Int,
            "J" => PropertyKind::Long,
            "F" => PropertyKind::Float,
            "D" => PropertyKind::Double,
            "V" => return None,
            "Ljava/lang/String;" => PropertyKind::String,
            s if s.starts_with('[') => PropertyKind::Array,
            _ => PropertyKind::Object,
        };
        Some(kind)
    }

    /// Lower-case name used in logs and conversion errors
    pub fn name(self) -> &'static str {
        match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Byte => "byte",
            PropertyKind::Char => "char",
            PropertyKind::Short => "short",
            PropertyKind::Int => "int",
            PropertyKind::Long => "long",
            PropertyKind::Float => "float",
            PropertyKind::Double => "double",
            PropertyKind::String => "string",
            PropertyKind::Object => "object",
            PropertyKind::Array => "array",
        }
    }

    /// Check if this kind is one of the eight numeric/boolean primitives
    pub fn is_primitive(self) -> bool {
        !matches!(
            self,
            PropertyKind::String | PropertyKind::Object | PropertyKind::Array
        )
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key of a proxy's method table: member name plus the ordered argument tags.
///
/// Two calls with the same name and the same tag sequence are the same key,
/// whatever the argument values were.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub name: String,
    pub tags: Vec<TypeTag>,
}

impl MemberKey {
    pub fn new(name: impl Into<String>, tags: Vec<TypeTag>) -> Self {
        Self {
            name: name.into(),
            tags,
        }
    }

    /// Key for a call without arguments
    pub fn nullary(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn arity(&self) -> usize {
        self.tags.len()
    }
}

/// Renders the flat `name-tags` spelling the foreign side logs with
impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.name)?;
        for tag in &self.tags {
            f.write_str(tag.as_str())?;
        }
        Ok(())
    }
}
