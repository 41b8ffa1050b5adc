use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api_connection::ApiConnectionError;
use crate::config::RuntimeConfig;
use crate::store::{DocumentPath, DocumentStore, StoreError};

/// Per-user settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(rename = "geminiKey", default)]
    pub gemini_key: String,
}

pub fn load_settings(
    store: &dyn DocumentStore,
    namespace: &str,
    user_id: &str,
) -> Result<UserSettings, StoreError> {
    let path = DocumentPath::user_settings(namespace, user_id);
    let Some(document) = store.get(&path)? else {
        return Ok(UserSettings::default());
    };
    match serde_json::from_value(document.data) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            warn!(path = %path, error = %e, "ignoring unreadable settings document");
            Ok(UserSettings::default())
        }
    }
}

pub fn save_settings(
    store: &mut dyn DocumentStore,
    namespace: &str,
    user_id: &str,
    settings: &UserSettings,
) -> Result<(), StoreError> {
    let path = DocumentPath::user_settings(namespace, user_id);
    let data = serde_json::to_value(settings).map_err(|source| StoreError::Corrupt {
        path: path.to_string().into(),
        source,
    })?;
    store.set(&path, data)
}

/// The user's own key wins over the deployment default.
pub fn choose_api_key(
    settings: &UserSettings,
    runtime: &RuntimeConfig,
) -> Result<String, ApiConnectionError> {
    let user_key = settings.gemini_key.trim();
    if !user_key.is_empty() {
        return Ok(user_key.to_string());
    }
    runtime
        .generative_api_key
        .clone()
        .ok_or_else(|| {
            ApiConnectionError::MissingApiKey(
                "save one with `set-key` or set GEMINI_API_KEY".to_string(),
            )
        })
}

/// Keeps the first four characters of a secret visible.
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "*".repeat(secret.chars().count())
    } else {
        format!("{}…", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigResolver;
    use crate::store::InMemoryStore;
    use serde_json::json;
    use std::collections::HashMap;

    fn runtime_with_key(key: Option<&str>) -> RuntimeConfig {
        let mut resolver = ConfigResolver::new(HashMap::new());
        if let Some(key) = key {
            resolver.set_global("VITE_GEMINI_API_KEY", key);
        }
        RuntimeConfig::resolve(&resolver)
    }

    #[test]
    fn user_key_takes_precedence() {
        let settings = UserSettings {
            gemini_key: "user-key".to_string(),
        };
        let key = choose_api_key(&settings, &runtime_with_key(Some("default"))).unwrap();
        assert_eq!(key, "user-key");
    }

    #[test]
    fn falls_back_to_default_key() {
        let key = choose_api_key(&UserSettings::default(), &runtime_with_key(Some("default"))).unwrap();
        assert_eq!(key, "default");
    }

    #[test]
    fn no_key_anywhere_is_missing() {
        let result = choose_api_key(&UserSettings::default(), &runtime_with_key(None));
        assert!(matches!(result, Err(ApiConnectionError::MissingApiKey(_))));
    }

    #[test]
    fn settings_round_trip_through_store() {
        let mut store = InMemoryStore::new();
        assert_eq!(load_settings(&store, "ns", "u1").unwrap(), UserSettings::default());

        let settings = UserSettings {
            gemini_key: "abc".to_string(),
        };
        save_settings(&mut store, "ns", "u1", &settings).unwrap();
        assert_eq!(load_settings(&store, "ns", "u1").unwrap(), settings);
        assert_eq!(load_settings(&store, "ns", "u2").unwrap(), UserSettings::default());

        let stored = store.get(&DocumentPath::user_settings("ns", "u1")).unwrap().unwrap();
        assert_eq!(stored.data, json!({"geminiKey": "abc"}));
    }

    #[test]
    fn masks_secrets() {
        assert_eq!(mask_secret("AIzaSyExample"), "AIza…");
        assert_eq!(mask_secret("abc"), "***");
    }
}
