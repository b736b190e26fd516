use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a stream: its name and optional namespace.
///
/// A missing namespace is a distinct, valid identity: `users` and `public.users` are two streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl StreamDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn namespace_is_part_of_identity() {
        let mut seen = HashSet::new();
        seen.insert(StreamDescriptor::new("users"));
        seen.insert(StreamDescriptor::with_namespace("users", "public"));
        seen.insert(StreamDescriptor::new("users"));

        assert_eq!(seen.len(), 2);
        assert_eq!(
            StreamDescriptor::with_namespace("users", "public").to_string(),
            "public.users"
        );
    }

    #[test]
    fn absent_namespace_is_omitted_on_the_wire() {
        let json = serde_json::to_value(StreamDescriptor::new("users")).unwrap();

        assert_eq!(json, serde_json::json!({"name": "users"}));
    }
}
