pub mod runtime;
pub mod sources;
pub mod structured;

pub use runtime::RuntimeConfig;
pub use sources::{ConfigResolver, EnvLookup, ProcessEnv, Source};
pub use structured::{parse_structured_config, ConfigError, ConnectionDescriptor};
