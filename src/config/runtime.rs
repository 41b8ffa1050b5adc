use tracing::{info, warn};

use crate::settings::mask_secret;

use super::sources::{ConfigResolver, EnvLookup};
use super::structured::{parse_structured_config, ConnectionDescriptor};

pub const CONNECTION_KEY: &str = "FIREBASE_CONFIG";
pub const NAMESPACE_KEY: &str = "APP_ID";
pub const BOOTSTRAP_CREDENTIAL_KEY: &str = "INITIAL_AUTH_TOKEN";
pub const GENERATIVE_API_KEY: &str = "GEMINI_API_KEY";

pub const DEFAULT_NAMESPACE: &str = "jihyun-hospital-app";

/// Configuration derived once at startup. Never persisted.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub connection: Option<ConnectionDescriptor>,
    /// Why `connection` is `None`, when it is.
    pub connection_error: Option<String>,
    pub namespace_id: String,
    pub bootstrap_credential: Option<String>,
    pub generative_api_key: Option<String>,
}

impl RuntimeConfig {
    pub fn resolve<E: EnvLookup>(resolver: &ConfigResolver<E>) -> Self {
        let raw_connection = resolver.resolve(CONNECTION_KEY);
        let (connection, connection_error) = match parse_structured_config(raw_connection.as_deref()) {
            Ok(descriptor) => {
                info!(project_id = ?descriptor.project_id(), "connection descriptor resolved");
                (Some(descriptor), None)
            }
            Err(e) => {
                warn!(error = %e, "connection descriptor unavailable; persistence disabled");
                (None, Some(e.to_string()))
            }
        };

        Self {
            connection,
            connection_error,
            namespace_id: resolver
                .resolve(NAMESPACE_KEY)
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            bootstrap_credential: resolver.resolve(BOOTSTRAP_CREDENTIAL_KEY),
            generative_api_key: resolver.resolve(GENERATIVE_API_KEY),
        }
    }

    pub fn persistence_enabled(&self) -> bool {
        self.connection.is_some()
    }

    /// The bootstrap credential is resolved and reported only; sessions are
    /// still named by the caller-supplied user id.
    pub fn describe_bootstrap(&self) -> String {
        match self.bootstrap_credential.as_deref() {
            Some(credential) => format!(
                "{} (resolved, not used; sessions use --user-id)",
                mask_secret(credential)
            ),
            None => "none".to_string(),
        }
    }
}
