//! Type keys and requested-type descriptors.
//!
//! A [`TypeKey`] is the normalized lookup key a locator stores records
//! under. A [`TypeSpec`] is what callers request: a plain type, a union
//! of alternatives, an optional or annotated wrapper, or a parametrized
//! generic with its origin. [`normalize`] flattens a spec into the
//! ordered key sequence to try.
//!
//! Rust type aliases share a `TypeId`, so alias expansion needs no work
//! here: `type Conn = PgConnection` and `PgConnection` are already the
//! same key.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use tazriq_support::rendering::shorten_type_name;

/// Uniquely identifies a requested type in a locator.
///
/// # Examples
/// ```
/// use tazriq_core::key::TypeKey;
///
/// let key = TypeKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(TypeKey::of::<String>(), key);
/// ```
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeKey {
    /// Creates a key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] of this key.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// Two keys are the same lookup slot iff the TypeId matches.
impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.type_name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shorten_type_name(self.type_name))
    }
}

/// A requested-type descriptor, as produced by declaring a recipe's
/// return type or a parameter's annotation.
#[derive(Clone, Debug)]
pub enum TypeSpec {
    /// A concrete type.
    Key(TypeKey),
    /// A union of alternatives, tried in declaration order.
    Union(Vec<TypeSpec>),
    /// An optional wrapper; the none-branch is skipped.
    Optional(Box<TypeSpec>),
    /// An annotated wrapper; unwraps to its sole wrapped spec.
    Annotated(Box<TypeSpec>, &'static str),
    /// A parametrized generic, also addressable by its origin.
    Generic { key: TypeKey, origin: TypeKey },
}

impl TypeSpec {
    /// Spec for a concrete type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeSpec::Key(TypeKey::of::<T>())
    }

    /// Spec for `Option`-shaped requests: resolves like `T`.
    #[inline]
    pub fn optional<T: ?Sized + 'static>() -> Self {
        TypeSpec::Optional(Box::new(TypeSpec::of::<T>()))
    }

    /// Spec for an annotated type; the label is documentation only.
    #[inline]
    pub fn annotated<T: ?Sized + 'static>(label: &'static str) -> Self {
        TypeSpec::Annotated(Box::new(TypeSpec::of::<T>()), label)
    }

    /// Spec for a union of alternatives tried in order.
    pub fn union(specs: impl IntoIterator<Item = TypeSpec>) -> Self {
        TypeSpec::Union(specs.into_iter().collect())
    }

    /// Spec for a parametrized generic `T` whose origin `O` is also a
    /// valid registration target (e.g. `Repository<User>` / `Repository`).
    #[inline]
    pub fn generic<T: ?Sized + 'static, O: ?Sized + 'static>() -> Self {
        TypeSpec::Generic {
            key: TypeKey::of::<T>(),
            origin: TypeKey::of::<O>(),
        }
    }

    /// Normalizes this spec into lookup keys, in try order.
    pub fn keys(&self, with_origin: bool) -> Vec<TypeKey> {
        normalize(std::slice::from_ref(self), with_origin)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Key(key) => write!(f, "{key}"),
            TypeSpec::Union(branches) => {
                let rendered: Vec<String> =
                    branches.iter().map(|branch| branch.to_string()).collect();
                write!(f, "{}", rendered.join(" | "))
            }
            TypeSpec::Optional(inner) => write!(f, "Option<{inner}>"),
            TypeSpec::Annotated(inner, _) => write!(f, "{inner}"),
            TypeSpec::Generic { key, .. } => write!(f, "{key}"),
        }
    }
}

/// Flattens requested-type descriptors into the ordered key sequence.
///
/// Unions expand into their branches in declaration order (that order
/// becomes lookup-try order), optional and annotated wrappers unwrap,
/// and generics additionally yield their origin when `with_origin` is
/// set (registration wants it, lookup does not). Pure and infallible;
/// duplicates keep their first position.
pub fn normalize(specs: &[TypeSpec], with_origin: bool) -> Vec<TypeKey> {
    let mut keys = Vec::new();

    for spec in specs {
        flatten(spec, with_origin, &mut keys);
    }

    keys
}

fn flatten(spec: &TypeSpec, with_origin: bool, keys: &mut Vec<TypeKey>) {
    match spec {
        TypeSpec::Key(key) => push_unique(keys, *key),
        TypeSpec::Union(branches) => {
            for branch in branches {
                flatten(branch, with_origin, keys);
            }
        }
        TypeSpec::Optional(inner) | TypeSpec::Annotated(inner, _) => {
            flatten(inner, with_origin, keys);
        }
        TypeSpec::Generic { key, origin } => {
            push_unique(keys, *key);
            if with_origin {
                push_unique(keys, *origin);
            }
        }
    }
}

fn push_unique(keys: &mut Vec<TypeKey>, key: TypeKey) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}
