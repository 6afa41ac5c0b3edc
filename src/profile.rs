//! Normalized user profiles merged from identity-provider and registry views.

use serde::Serialize;
use serde_json::{Map, Value};

/// Keys allowed into a merged profile; anything else a source carries is
/// dropped. Order here is presentation-stable, not precedence.
const PROFILE_KEYS: &[&str] = &[
    "id",
    "external_id",
    "email",
    "username",
    "first_name",
    "last_name",
    "confirmed",
    "blocked",
    "role",
    "created_at",
];

/// Read-only merged view of a user across sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Merge profile sources with an explicit precedence order: `sources` runs
/// from lowest to highest precedence, and a later non-null value replaces an
/// earlier one. Only allow-listed keys survive.
#[must_use]
pub fn merge_profiles(sources: &[&Map<String, Value>]) -> UserProfile {
    let mut merged = Map::new();
    for key in PROFILE_KEYS {
        for source in sources {
            if let Some(value) = source.get(*key) {
                if !value.is_null() {
                    merged.insert((*key).to_string(), value.clone());
                }
            }
        }
    }
    UserProfile(merged)
}

/// Flatten any serializable source into a field map for merging. Sources
/// that do not serialize to an object contribute nothing.
#[must_use]
pub fn source_fields<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_profiles, source_fields};
    use serde_json::{json, Map, Value};

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn later_sources_win_on_collision() {
        let registry = map(json!({"username": "legacy-name", "role": "editor"}));
        let identity = map(json!({"username": "ada", "email": "ada@example.com"}));

        let profile = merge_profiles(&[&registry, &identity]);
        assert_eq!(profile.get("username"), Some(&json!("ada")));
        assert_eq!(profile.get("role"), Some(&json!("editor")));
        assert_eq!(profile.get("email"), Some(&json!("ada@example.com")));
    }

    #[test]
    fn keys_outside_the_allow_list_are_dropped() {
        let source = map(json!({
            "email": "ada@example.com",
            "password_hash": "secret",
            "opaque_internal": 42
        }));

        let profile = merge_profiles(&[&source]);
        assert_eq!(profile.get("email"), Some(&json!("ada@example.com")));
        assert!(profile.get("password_hash").is_none());
        assert!(profile.get("opaque_internal").is_none());
    }

    #[test]
    fn null_values_do_not_mask_earlier_sources() {
        let registry = map(json!({"first_name": "Ada"}));
        let identity = map(json!({"first_name": null}));

        let profile = merge_profiles(&[&registry, &identity]);
        assert_eq!(profile.get("first_name"), Some(&json!("Ada")));
    }

    #[test]
    fn source_fields_flattens_serializable_structs() {
        #[derive(serde::Serialize)]
        struct Source {
            email: String,
        }
        let fields = source_fields(&Source {
            email: "ada@example.com".to_string(),
        });
        assert_eq!(fields.get("email"), Some(&json!("ada@example.com")));
    }

    #[test]
    fn empty_sources_yield_an_empty_profile() {
        let profile = merge_profiles(&[]);
        assert!(profile.fields().is_empty());
    }
}
