//! Component identification keys.
//!
//! [`ComponentKey`] uniquely identifies a registration within one container.
//! A key is either a type, a free-form name, or a type narrowed by a
//! [`Qualifier`]. [`TypeInfo`] is the reflection-free type metadata the
//! resolver compares.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arbor_support::rendering::shorten_type_name;

/// Identity and display name of a Rust type.
///
/// Equality and hashing use only the [`TypeId`].
///
/// # Examples
/// ```
/// use arbor_container::key::TypeInfo;
///
/// let info = TypeInfo::of::<String>();
/// assert_eq!(info.type_name(), "alloc::string::String");
/// assert_eq!(info.short_name(), "String");
/// ```
#[derive(Clone, Copy)]
pub struct TypeInfo {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeInfo {
    /// Metadata for type `T`. Works for trait objects too.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without module paths, for messages.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeInfo({})", self.type_name)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Narrows a type key so several registrations of one type can coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Qualifier(pub &'static str);

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Uniquely identifies a component inside one container.
///
/// # Examples
/// ```
/// use arbor_container::key::{ComponentKey, TypeInfo};
///
/// let by_type = ComponentKey::of::<String>();
/// assert_eq!(by_type.type_info(), Some(TypeInfo::of::<String>()));
///
/// let by_name = ComponentKey::from("database");
/// assert_eq!(by_name.name(), Some("database"));
///
/// let primary = ComponentKey::qualified::<String>("primary");
/// assert_ne!(primary, by_type);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ComponentKey {
    /// The type itself is the key.
    Type(TypeInfo),
    /// A free-form name.
    Name(Arc<str>),
    /// A type plus a qualifier.
    Qualified(TypeInfo, Qualifier),
}

impl ComponentKey {
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        ComponentKey::Type(TypeInfo::of::<T>())
    }

    #[inline]
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        ComponentKey::Name(name.into())
    }

    #[inline]
    pub fn qualified<T: ?Sized + 'static>(qualifier: &'static str) -> Self {
        ComponentKey::Qualified(TypeInfo::of::<T>(), Qualifier(qualifier))
    }

    /// The type carried by the key, if any.
    pub fn type_info(&self) -> Option<TypeInfo> {
        match self {
            ComponentKey::Type(info) | ComponentKey::Qualified(info, _) => Some(*info),
            ComponentKey::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ComponentKey::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn qualifier(&self) -> Option<Qualifier> {
        match self {
            ComponentKey::Qualified(_, qualifier) => Some(*qualifier),
            _ => None,
        }
    }

    /// Human-readable form with shortened type names.
    pub fn short(&self) -> String {
        match self {
            ComponentKey::Type(info) => info.short_name(),
            ComponentKey::Name(name) => format!("\"{name}\""),
            ComponentKey::Qualified(info, qualifier) => {
                format!("{} {qualifier}", info.short_name())
            }
        }
    }
}

impl From<&str> for ComponentKey {
    fn from(name: &str) -> Self {
        ComponentKey::Name(Arc::from(name))
    }
}

impl From<String> for ComponentKey {
    fn from(name: String) -> Self {
        ComponentKey::Name(Arc::from(name))
    }
}

impl From<TypeInfo> for ComponentKey {
    fn from(info: TypeInfo) -> Self {
        ComponentKey::Type(info)
    }
}

impl From<&ComponentKey> for ComponentKey {
    fn from(key: &ComponentKey) -> Self {
        key.clone()
    }
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKey::Type(info) => write!(f, "ComponentKey({})", info.type_name()),
            ComponentKey::Name(name) => write!(f, "ComponentKey(\"{name}\")"),
            ComponentKey::Qualified(info, qualifier) => {
                write!(f, "ComponentKey({} {qualifier})", info.type_name())
            }
        }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKey::Type(info) => f.write_str(info.type_name()),
            ComponentKey::Name(name) => write!(f, "\"{name}\""),
            ComponentKey::Qualified(info, qualifier) => {
                write!(f, "{} {qualifier}", info.type_name())
            }
        }
    }
}
