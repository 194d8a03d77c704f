use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifier is the key under which a workspace lives in a Registry.
///
/// Every handle the workflows pass around is an Identifier. Anything that may or may not name
/// a workspace (an optional handle, a user supplied string) goes through [`Resolve`] first, so
/// there is never any doubt about whether a cleanup call received a name or nothing at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Create an Identifier. Empty names are allowed here but never resolve to anything.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Anything that can name a workspace, or name nothing.
///
/// Empty names and `None` resolve to `None`; lifecycle operations treat those as no-ops.
pub trait Resolve {
    fn resolve(&self) -> Option<Identifier>;
}

impl Resolve for Identifier {
    fn resolve(&self) -> Option<Identifier> {
        if self.is_empty() {
            None
        } else {
            Some(self.clone())
        }
    }
}

impl Resolve for str {
    fn resolve(&self) -> Option<Identifier> {
        Identifier::from(self).resolve()
    }
}

impl Resolve for String {
    fn resolve(&self) -> Option<Identifier> {
        self.as_str().resolve()
    }
}

impl<T: Resolve + ?Sized> Resolve for &T {
    fn resolve(&self) -> Option<Identifier> {
        (**self).resolve()
    }
}

impl<T: Resolve> Resolve for Option<T> {
    fn resolve(&self) -> Option<Identifier> {
        self.as_ref().and_then(|handle| handle.resolve())
    }
}

/// Turn a handle into the Identifier it names, if any
pub fn resolve(handle: &impl Resolve) -> Option<Identifier> {
    handle.resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_handles() {
        let id = Identifier::new("sample");
        assert_eq!(resolve(&id), Some(Identifier::new("sample")));
        assert_eq!(resolve(&Some(id.clone())), Some(id.clone()));
        assert_eq!(resolve(&"sample"), Some(id));
    }

    #[test]
    fn test_empty_handles_resolve_to_nothing() {
        assert_eq!(resolve(&Identifier::new("")), None);
        assert_eq!(resolve(&""), None);
        assert_eq!(resolve(&String::new()), None);
        assert_eq!(resolve(&None::<Identifier>), None);
        assert_eq!(resolve(&Some(Identifier::new(""))), None);
    }
}
