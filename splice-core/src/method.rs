//! Method identity.
//!
//! A [`MethodKey`] names one interceptable call site class by the declaring
//! type and the method name. Matching is purely structural, so keys built by
//! the patch layer, by a module and by the trampoline compare equal as long as
//! the two names agree.

use std::{
    collections::{BTreeSet, btree_set},
    fmt,
    str::FromStr,
};

/// Identifies an interceptable method by `(declaring type, method name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    declaring_type: String,
    method: String,
}

impl MethodKey {
    /// Create a key from a declaring type name and a method name.
    pub fn new(declaring_type: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method: method.into(),
        }
    }

    /// The declaring type name.
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// The method name.
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.method)
    }
}

/// Error returned when parsing a `Type::method` string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected `Type::method`, got {0:?}")]
pub struct ParseMethodKeyError(String);

impl FromStr for MethodKey {
    type Err = ParseMethodKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once("::") {
            Some((ty, method)) if !ty.is_empty() && !method.is_empty() => {
                Ok(MethodKey::new(ty, method))
            }
            _ => Err(ParseMethodKeyError(s.to_string())),
        }
    }
}

/// The set of methods a module declares interest in.
///
/// Computed once when a module is loaded and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookSet(BTreeSet<MethodKey>);

impl HookSet {
    /// An empty hook set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns `true` if `key` is in the set.
    pub fn contains(&self, key: &MethodKey) -> bool {
        self.0.contains(key)
    }

    /// Iterate in key order.
    pub fn iter(&self) -> btree_set::Iter<'_, MethodKey> {
        self.0.iter()
    }

    /// Number of hooked methods.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is hooked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<MethodKey> for HookSet {
    fn from_iter<I: IntoIterator<Item = MethodKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a HookSet {
    type Item = &'a MethodKey;
    type IntoIter = btree_set::Iter<'a, MethodKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for HookSet {
    type Item = MethodKey;
    type IntoIter = btree_set::IntoIter<MethodKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Every method known to exist in the target binary.
///
/// Modules are validated against the surface at load time; a hook on a
/// method outside it rejects the whole module.
#[derive(Debug, Clone, Default)]
pub struct MethodSurface(BTreeSet<MethodKey>);

impl MethodSurface {
    /// An empty surface.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Add a method, returning the surface for chaining.
    pub fn with(mut self, key: MethodKey) -> Self {
        self.0.insert(key);
        self
    }

    /// Add a method.
    pub fn insert(&mut self, key: MethodKey) {
        self.0.insert(key);
    }

    /// Returns `true` if the target binary has this method.
    pub fn contains(&self, key: &MethodKey) -> bool {
        self.0.contains(key)
    }

    /// Returns `true` if any method is declared on `declaring_type`.
    pub fn has_type(&self, declaring_type: &str) -> bool {
        self.0.iter().any(|k| k.declaring_type() == declaring_type)
    }

    /// Keys of `hooks` that are not part of this surface.
    pub fn missing<'a>(&self, hooks: &'a HookSet) -> Vec<&'a MethodKey> {
        hooks.iter().filter(|k| !self.contains(k)).collect()
    }

    /// Number of known methods.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no methods are known.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<MethodKey> for MethodSurface {
    fn from_iter<I: IntoIterator<Item = MethodKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
