use std::collections::HashMap;
use std::env;

use tracing::debug;

/// Prefix injected by the build tool in front of every public variable.
pub const ENV_PREFIX: &str = "VITE_";

/// Where a configuration value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Explicit in-memory overrides held by the resolver.
    Global,
    /// `VITE_<KEY>` in the environment.
    PrefixedEnv,
    /// `<KEY>` in the environment.
    PlainEnv,
}

impl Source {
    pub const RESOLUTION_ORDER: [Source; 3] = [Source::Global, Source::PrefixedEnv, Source::PlainEnv];
}

/// Read access to an environment. Any failure to read is reported as `None`.
pub trait EnvLookup {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        // NotPresent and NotUnicode both count as "not found".
        env::var(name).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigResolver<E = ProcessEnv> {
    globals: HashMap<String, String>,
    env: E,
}

impl ConfigResolver<ProcessEnv> {
    pub fn from_process_env() -> Self {
        Self::new(ProcessEnv)
    }
}

impl<E: EnvLookup> ConfigResolver<E> {
    pub fn new(env: E) -> Self {
        Self {
            globals: HashMap::new(),
            env,
        }
    }

    pub fn with_global(mut self, name: &str, value: &str) -> Self {
        self.set_global(name, value);
        self
    }

    pub fn set_global(&mut self, name: &str, value: &str) {
        self.globals.insert(name.to_uppercase(), value.to_string());
    }

    /// Returns the first non-blank value for `key`, or `None` when every source is empty.
    pub fn resolve(&self, key: &str) -> Option<String> {
        self.resolve_with_source(key).map(|(value, _)| value)
    }

    pub fn resolve_with_source(&self, key: &str) -> Option<(String, Source)> {
        let plain = key.to_uppercase();
        let prefixed = format!("{ENV_PREFIX}{plain}");

        for source in Source::RESOLUTION_ORDER {
            let candidate = match source {
                Source::Global => self.globals.get(&prefixed).cloned(),
                Source::PrefixedEnv => self.env.var(&prefixed),
                Source::PlainEnv => self.env.var(&plain),
            };
            if let Some(value) = candidate.filter(|v| !v.trim().is_empty()) {
                debug!(key = %plain, source = ?source, "configuration value resolved");
                return Some((value, source));
            }
        }

        debug!(key = %plain, "configuration value not found in any source");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn global_beats_environment() {
        let resolver = ConfigResolver::new(env_of(&[("VITE_APP_ID", "b"), ("APP_ID", "c")]))
            .with_global("VITE_APP_ID", "a");
        assert_eq!(resolver.resolve("APP_ID").as_deref(), Some("a"));
        assert_eq!(
            resolver.resolve_with_source("APP_ID").map(|(_, s)| s),
            Some(Source::Global)
        );
    }

    #[test]
    fn prefixed_env_beats_plain_env() {
        let resolver = ConfigResolver::new(env_of(&[("VITE_APP_ID", "b"), ("APP_ID", "c")]));
        assert_eq!(resolver.resolve("APP_ID").as_deref(), Some("b"));
    }

    #[test]
    fn falls_through_to_plain_env() {
        let resolver = ConfigResolver::new(env_of(&[("GEMINI_API_KEY", "k")]));
        assert_eq!(
            resolver.resolve_with_source("GEMINI_API_KEY"),
            Some(("k".to_string(), Source::PlainEnv))
        );
    }

    #[test]
    fn blank_values_are_skipped() {
        let resolver = ConfigResolver::new(env_of(&[("VITE_APP_ID", "   "), ("APP_ID", "c")]))
            .with_global("VITE_APP_ID", "");
        assert_eq!(resolver.resolve("APP_ID").as_deref(), Some("c"));
    }

    #[test]
    fn lowercase_key_is_normalized() {
        let resolver = ConfigResolver::new(HashMap::new()).with_global("vite_app_id", "a");
        assert_eq!(resolver.resolve("app_id").as_deref(), Some("a"));
    }

    #[test]
    fn missing_key_is_none() {
        let resolver = ConfigResolver::new(HashMap::new());
        assert_eq!(resolver.resolve("NOT_CONFIGURED_ANYWHERE"), None);
    }

    #[cfg(unix)]
    #[test]
    fn process_env_treats_non_unicode_as_missing() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        env::set_var(
            "VITE_MEAL_PLANNER_TEST_NON_UNICODE",
            OsString::from_vec(vec![0x66, 0x6f, 0x80, 0x6f]),
        );
        env::set_var("MEAL_PLANNER_TEST_NON_UNICODE", "plain");

        let resolver = ConfigResolver::from_process_env();
        assert_eq!(
            resolver.resolve_with_source("MEAL_PLANNER_TEST_NON_UNICODE"),
            Some(("plain".to_string(), Source::PlainEnv))
        );
        assert_eq!(resolver.resolve("MEAL_PLANNER_TEST_NEVER_SET"), None);
        assert_eq!(resolver.resolve(""), None);
        assert_eq!(resolver.resolve("A=B"), None);
        assert_eq!(resolver.resolve("A\0B"), None);

        env::remove_var("VITE_MEAL_PLANNER_TEST_NON_UNICODE");
        env::remove_var("MEAL_PLANNER_TEST_NON_UNICODE");
    }

    #[test]
    fn unprefixed_global_is_not_a_source() {
        let resolver = ConfigResolver::new(HashMap::new()).with_global("APP_ID", "a");
        assert_eq!(resolver.resolve("APP_ID"), None);
    }
}
