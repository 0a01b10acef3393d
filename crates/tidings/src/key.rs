//! Event keys and their classification into routes.
//!
//! A key is either a name, an integer id or an opaque [`Symbol`]. Name keys
//! carry wildcard syntax:
//!
//! - `"*"` subscribes to every event ([`Route::Global`])
//! - `"user.*"` / `"user:*"` subscribe to every name starting with `"user."` /
//!   `"user:"` ([`Route::Namespace`])
//! - anything else matches by equality ([`Route::Exact`])

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Reserved key that subscribes to every published event.
pub const GLOBAL_WILDCARD: &str = "*";

/// Characters that delimit namespaces inside a name key.
pub const NAMESPACE_SEPARATORS: [char; 2] = ['.', ':'];

/// Counter for minting symbol identities.
static SYMBOL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// An opaque, unique event key.
///
/// Two symbols are equal only if one is a clone of the other, regardless of
/// their descriptions.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

impl Symbol {
    /// Mint a fresh symbol. The description is only used for display.
    pub fn new(description: impl AsRef<str>) -> Self {
        Self {
            id: SYMBOL_COUNTER.fetch_add(1, Ordering::Relaxed),
            description: Arc::from(description.as_ref()),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({}#{})", self.description, self.id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

/// Identifier for an event category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// String key; the only form that participates in wildcard matching
    Name(Arc<str>),
    /// Integer key
    Id(i64),
    /// Opaque unique key
    Symbol(Symbol),
}

impl EventKey {
    /// Get the key as a string, if it is a name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Collect every namespace prefix of this key, shortest first.
    ///
    /// Each prefix runs from the start of the name up to and including one
    /// separator: `"a.b:c"` yields `["a.", "a.b:"]`. Non-name keys have none.
    pub fn namespace_prefixes(&self) -> Vec<&str> {
        let Some(name) = self.as_name() else {
            return Vec::new();
        };
        name.char_indices()
            .filter(|(_, c)| NAMESPACE_SEPARATORS.contains(c))
            .map(|(idx, c)| &name[..idx + c.len_utf8()])
            .collect()
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::Id(id) => write!(f, "#{}", id),
            Self::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

impl From<&str> for EventKey {
    fn from(name: &str) -> Self {
        Self::Name(Arc::from(name))
    }
}

impl From<String> for EventKey {
    fn from(name: String) -> Self {
        Self::Name(Arc::from(name))
    }
}

impl From<&String> for EventKey {
    fn from(name: &String) -> Self {
        Self::Name(Arc::from(name.as_str()))
    }
}

impl From<i64> for EventKey {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<i32> for EventKey {
    fn from(id: i32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl From<u32> for EventKey {
    fn from(id: u32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl From<Symbol> for EventKey {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

impl From<&Symbol> for EventKey {
    fn from(symbol: &Symbol) -> Self {
        Self::Symbol(symbol.clone())
    }
}

/// Which registration table a key resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// Every event, handlers receive the originating key
    Global,
    /// Every name starting with the prefix (separator included)
    Namespace(Arc<str>),
    /// Strict equality
    Exact(EventKey),
}

impl Route {
    /// Classify a key by its syntax.
    pub fn classify(key: EventKey) -> Self {
        let EventKey::Name(name) = &key else {
            return Self::Exact(key);
        };

        if &**name == GLOBAL_WILDCARD {
            return Self::Global;
        }

        if let Some(prefix) = name.strip_suffix('*') {
            if prefix.ends_with(NAMESPACE_SEPARATORS) {
                return Self::Namespace(Arc::from(prefix));
            }
        }

        Self::Exact(key)
    }

    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "{}", GLOBAL_WILDCARD),
            Self::Namespace(prefix) => write!(f, "{}*", prefix),
            Self::Exact(key) => write!(f, "{}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("*" => Route::Global ; "global token")]
    #[test_case("user.*" => Route::Namespace(Arc::from("user.")) ; "dot namespace")]
    #[test_case("user:*" => Route::Namespace(Arc::from("user:")) ; "colon namespace")]
    #[test_case("a.b:*" => Route::Namespace(Arc::from("a.b:")) ; "nested namespace")]
    #[test_case("user*" => Route::Exact(EventKey::from("user*")) ; "star without separator")]
    #[test_case("user.created" => Route::Exact(EventKey::from("user.created")) ; "plain name")]
    #[test_case(".*" => Route::Namespace(Arc::from(".")) ; "bare separator")]
    fn test_classify_name(name: &str) -> Route {
        Route::classify(EventKey::from(name))
    }

    #[test]
    fn test_classify_non_name_is_exact() {
        let symbol = Symbol::new("ready");
        assert_eq!(
            Route::classify(EventKey::from(7i64)),
            Route::Exact(EventKey::Id(7))
        );
        assert_eq!(
            Route::classify(EventKey::from(&symbol)),
            Route::Exact(EventKey::Symbol(symbol))
        );
    }

    #[test]
    fn test_namespace_prefixes_left_to_right() {
        let key = EventKey::from("app:user.profile.updated");
        assert_eq!(
            key.namespace_prefixes(),
            vec!["app:", "app:user.", "app:user.profile."]
        );
    }

    #[test]
    fn test_namespace_prefixes_none_for_plain_or_non_name() {
        assert!(EventKey::from("ping").namespace_prefixes().is_empty());
        assert!(EventKey::from(3i64).namespace_prefixes().is_empty());
    }

    #[test]
    fn test_symbol_identity() {
        let a = Symbol::new("same");
        let b = Symbol::new("same");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.description(), "same");
    }

    #[test]
    fn test_route_display_round_trips_syntax() {
        assert_eq!(Route::classify("user.*".into()).to_string(), "user.*");
        assert_eq!(Route::classify("*".into()).to_string(), "*");
        assert_eq!(Route::classify(42i64.into()).to_string(), "#42");
    }
}
