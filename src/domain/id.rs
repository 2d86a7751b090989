//! Domain identifier types with proper encapsulation.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Service name - newtype for type safety.
///
/// Unique key of a supervised service. The inner String is private to ensure
/// all construction goes through the defined constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    /// Create a new `ServiceName` from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the service name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for ServiceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Deref for ServiceName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn display_matches_inner_value() {
        let name = ServiceName::new("market_data");
        assert_eq!(name.to_string(), "market_data");
        assert_eq!(name.as_str(), "market_data");
    }

    #[test]
    fn lookup_by_str_through_borrow() {
        let mut map = HashMap::new();
        map.insert(ServiceName::from("risk_manager"), 7);
        assert_eq!(map.get("risk_manager"), Some(&7));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ServiceName::from("web_api")).unwrap();
        assert_eq!(json, "\"web_api\"");
    }
}
