//! Credential source resolution
//!
//! Runs once at startup and picks exactly one source, first match wins:
//!
//! 1. fixed API key from the environment
//! 2. multi-account pool file in the working directory
//! 3. single refresh token from the environment
//! 4. single refresh token from the home-directory credential file
//! 5. the client's own Authorization header
//!
//! A file that is missing, unreadable or not valid JSON counts as absent and
//! resolution moves on to the next source.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use common::Secret;
use droid_auth::token_file::{self, CredentialObject};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;

/// Spellings accepted for fixed keys in the pool file, in lookup order.
const FIXED_KEY_FIELDS: [&str; 3] = ["FACTORY_API_KEY", "factory_api_key", "factory_api_keys"];

/// Spellings accepted for refresh tokens in the pool file, in lookup order.
const REFRESH_TOKEN_FIELDS: [&str; 3] =
    ["DROID_REFRESH_KEY", "droid_refresh_key", "droid_refresh_keys"];

/// Which credential source is active. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    FixedKey,
    Pool,
    RefreshTokenEnv,
    RefreshTokenFile,
    ClientSupplied,
}

impl CredentialSource {
    pub fn label(&self) -> &'static str {
        match self {
            CredentialSource::FixedKey => "fixed_key",
            CredentialSource::Pool => "pool",
            CredentialSource::RefreshTokenEnv => "refresh_token_env",
            CredentialSource::RefreshTokenFile => "refresh_token_file",
            CredentialSource::ClientSupplied => "client_supplied",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One pool entry as read from the pool file.
#[derive(Debug)]
pub enum AccountSpec {
    FixedKey { label: String, key: Secret<String> },
    Refresh { label: String, refresh_token: Secret<String> },
}

impl AccountSpec {
    pub fn label(&self) -> &str {
        match self {
            AccountSpec::FixedKey { label, .. } | AccountSpec::Refresh { label, .. } => label,
        }
    }
}

/// Outcome of resolution: the active source plus what it needs to run.
#[derive(Debug)]
pub enum Resolution {
    FixedKey(Secret<String>),
    Pool {
        path: PathBuf,
        accounts: Vec<AccountSpec>,
    },
    RefreshTokenEnv {
        refresh_token: Secret<String>,
        /// Rotated tokens are written here
        persist_path: PathBuf,
    },
    RefreshTokenFile {
        refresh_token: Secret<String>,
        access_token: Option<Secret<String>>,
        last_updated: Option<SystemTime>,
        path: PathBuf,
    },
    ClientSupplied,
}

impl Resolution {
    pub fn source(&self) -> CredentialSource {
        match self {
            Resolution::FixedKey(_) => CredentialSource::FixedKey,
            Resolution::Pool { .. } => CredentialSource::Pool,
            Resolution::RefreshTokenEnv { .. } => CredentialSource::RefreshTokenEnv,
            Resolution::RefreshTokenFile { .. } => CredentialSource::RefreshTokenFile,
            Resolution::ClientSupplied => CredentialSource::ClientSupplied,
        }
    }
}

/// Everything resolution looks at, gathered once.
///
/// Strategies only read from here, never from the process environment, so
/// each one can be tested in isolation.
#[derive(Debug, Clone, Default)]
pub struct ResolveInputs {
    pub fixed_key: Option<String>,
    pub refresh_token: Option<String>,
    pub pool_file: PathBuf,
    pub home_file: Option<PathBuf>,
}

impl ResolveInputs {
    /// Read the configured env vars and resolve file locations.
    ///
    /// A relative pool file path is taken relative to the working directory.
    pub fn from_env(config: &Config) -> Self {
        let sources = &config.sources;
        let pool_file = if sources.pool_file.is_absolute() {
            sources.pool_file.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&sources.pool_file))
                .unwrap_or_else(|_| sources.pool_file.clone())
        };
        let home_file = sources
            .home_file
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".factory").join("auth.json")));

        Self {
            fixed_key: std::env::var(&sources.fixed_key_env).ok(),
            refresh_token: std::env::var(&sources.refresh_token_env).ok(),
            pool_file,
            home_file,
        }
    }
}

/// One step of the priority chain.
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Some` if this source is configured and usable.
    fn attempt(&self, inputs: &ResolveInputs) -> Option<Resolution>;
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Fixed API key from the environment.
pub struct FixedKeyEnv;

impl ResolveStrategy for FixedKeyEnv {
    fn name(&self) -> &'static str {
        "fixed_key_env"
    }

    fn attempt(&self, inputs: &ResolveInputs) -> Option<Resolution> {
        non_blank(inputs.fixed_key.as_deref()).map(|key| Resolution::FixedKey(Secret::new(key)))
    }
}

/// Multi-account pool file.
pub struct PoolFile;

impl ResolveStrategy for PoolFile {
    fn name(&self) -> &'static str {
        "pool_file"
    }

    fn attempt(&self, inputs: &ResolveInputs) -> Option<Resolution> {
        let object = token_file::load(&inputs.pool_file)?;
        let accounts = build_pool_accounts(&object, &source_label(&inputs.pool_file));
        if accounts.is_empty() {
            debug!(path = %inputs.pool_file.display(), "pool file has no accounts");
            return None;
        }
        Some(Resolution::Pool {
            path: inputs.pool_file.clone(),
            accounts,
        })
    }
}

/// Single refresh token from the environment.
///
/// Rotated tokens are persisted to the pool file location, merged with
/// whatever that file already holds.
pub struct RefreshTokenEnv;

impl ResolveStrategy for RefreshTokenEnv {
    fn name(&self) -> &'static str {
        "refresh_token_env"
    }

    fn attempt(&self, inputs: &ResolveInputs) -> Option<Resolution> {
        non_blank(inputs.refresh_token.as_deref()).map(|token| Resolution::RefreshTokenEnv {
            refresh_token: Secret::new(token),
            persist_path: inputs.pool_file.clone(),
        })
    }
}

/// Single refresh token from the home-directory credential file.
pub struct HomeCredentialFile;

impl ResolveStrategy for HomeCredentialFile {
    fn name(&self) -> &'static str {
        "home_credential_file"
    }

    fn attempt(&self, inputs: &ResolveInputs) -> Option<Resolution> {
        let path = inputs.home_file.as_ref()?;
        let object = token_file::load(path)?;
        let Some(refresh_token) = token_file::string_field(&object, "refresh_token") else {
            debug!(path = %path.display(), "credential file has no refresh_token");
            return None;
        };
        Some(Resolution::RefreshTokenFile {
            refresh_token: Secret::new(refresh_token),
            access_token: token_file::string_field(&object, "access_token").map(Secret::new),
            last_updated: token_file::last_updated(&object),
            path: path.clone(),
        })
    }
}

/// Ordered list of strategies, evaluated first-success-wins.
pub struct CredentialSourceResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl Default for CredentialSourceResolver {
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(FixedKeyEnv),
            Box::new(PoolFile),
            Box::new(RefreshTokenEnv),
            Box::new(HomeCredentialFile),
        ])
    }
}

impl CredentialSourceResolver {
    pub fn with_strategies(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    /// Pick the active source. Falls back to `ClientSupplied`; never fails.
    pub fn resolve(&self, inputs: &ResolveInputs) -> Resolution {
        for strategy in &self.strategies {
            if let Some(resolution) = strategy.attempt(inputs) {
                info!(
                    source = %resolution.source(),
                    strategy = strategy.name(),
                    "credential source selected"
                );
                return resolution;
            }
            debug!(strategy = strategy.name(), "credential source not configured");
        }
        info!("no credential source configured, using client authorization headers");
        Resolution::ClientSupplied
    }
}

/// Label prefix for pool accounts: the pool file's name.
fn source_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Normalize a key field: a string (optionally comma-separated) or an array
/// of strings. Entries are trimmed; blanks and non-strings are dropped.
pub fn normalize_key_list(raw: &Value) -> Vec<String> {
    match raw {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// First spelling holding a non-empty value.
fn first_present<'a>(object: &'a CredentialObject, fields: &[&str]) -> Option<&'a Value> {
    fields.iter().find_map(|field| match object.get(*field) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(value) => Some(value),
    })
}

/// Build pool accounts: all fixed keys first, then all refresh tokens,
/// labelled `<source>:<factory|refresh>:<n>` with 1-based ordinals.
pub fn build_pool_accounts(object: &CredentialObject, source: &str) -> Vec<AccountSpec> {
    let fixed_keys = first_present(object, &FIXED_KEY_FIELDS)
        .map(normalize_key_list)
        .unwrap_or_default();
    let refresh_tokens = first_present(object, &REFRESH_TOKEN_FIELDS)
        .map(normalize_key_list)
        .unwrap_or_default();

    let fixed = fixed_keys
        .into_iter()
        .enumerate()
        .map(|(i, key)| AccountSpec::FixedKey {
            label: format!("{source}:factory:{}", i + 1),
            key: Secret::new(key),
        });
    let refresh = refresh_tokens
        .into_iter()
        .enumerate()
        .map(|(i, token)| AccountSpec::Refresh {
            label: format!("{source}:refresh:{}", i + 1),
            refresh_token: Secret::new(token),
        });

    fixed.chain(refresh).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn pool_path(&self) -> PathBuf {
            self.dir.path().join("auth.json")
        }

        fn home_path(&self) -> PathBuf {
            self.dir.path().join("home").join(".factory").join("auth.json")
        }

        fn write_pool(&self, contents: &str) {
            std::fs::write(self.pool_path(), contents).unwrap();
        }

        fn write_home(&self, contents: &str) {
            let path = self.home_path();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        fn inputs(&self) -> ResolveInputs {
            ResolveInputs {
                fixed_key: None,
                refresh_token: None,
                pool_file: self.pool_path(),
                home_file: Some(self.home_path()),
            }
        }
    }

    fn resolve(inputs: &ResolveInputs) -> Resolution {
        CredentialSourceResolver::default().resolve(inputs)
    }

    #[test]
    fn source_labels() {
        assert_eq!(CredentialSource::FixedKey.label(), "fixed_key");
        assert_eq!(CredentialSource::Pool.to_string(), "pool");
        assert_eq!(CredentialSource::RefreshTokenEnv.label(), "refresh_token_env");
        assert_eq!(CredentialSource::RefreshTokenFile.label(), "refresh_token_file");
        assert_eq!(CredentialSource::ClientSupplied.label(), "client_supplied");
    }

    #[test]
    fn fixed_key_wins_over_every_other_source() {
        let fx = Fixture::new();
        fx.write_pool(r#"{"factory_api_keys": ["fk-pool"], "droid_refresh_keys": ["rt-pool"]}"#);
        fx.write_home(r#"{"refresh_token": "rt-home"}"#);
        let inputs = ResolveInputs {
            fixed_key: Some("  fk-env  ".into()),
            refresh_token: Some("rt-env".into()),
            ..fx.inputs()
        };

        match resolve(&inputs) {
            Resolution::FixedKey(key) => assert_eq!(key.expose(), "fk-env"),
            other => panic!("expected fixed key, got {other:?}"),
        }
    }

    #[test]
    fn blank_fixed_key_is_ignored() {
        let fx = Fixture::new();
        let inputs = ResolveInputs {
            fixed_key: Some("   ".into()),
            ..fx.inputs()
        };
        assert_eq!(resolve(&inputs).source(), CredentialSource::ClientSupplied);
    }

    #[test]
    fn pool_file_builds_fixed_keys_then_refresh_tokens() {
        let fx = Fixture::new();
        fx.write_pool(r#"{"FACTORY_API_KEY": "fk-1, fk-2", "droid_refresh_key": "rt-1"}"#);

        let Resolution::Pool { path, accounts } = resolve(&fx.inputs()) else {
            panic!("expected pool");
        };
        assert_eq!(path, fx.pool_path());
        assert_eq!(accounts.len(), 3);
        let labels: Vec<_> = accounts.iter().map(AccountSpec::label).collect();
        assert_eq!(
            labels,
            vec!["auth.json:factory:1", "auth.json:factory:2", "auth.json:refresh:1"]
        );
        match &accounts[1] {
            AccountSpec::FixedKey { key, .. } => assert_eq!(key.expose(), "fk-2"),
            other => panic!("expected fixed key, got {other:?}"),
        }
        match &accounts[2] {
            AccountSpec::Refresh { refresh_token, .. } => {
                assert_eq!(refresh_token.expose(), "rt-1")
            }
            other => panic!("expected refresh token, got {other:?}"),
        }
    }

    #[test]
    fn pool_wins_over_refresh_token_env() {
        let fx = Fixture::new();
        fx.write_pool(r#"{"droid_refresh_keys": ["rt-a", "rt-b"]}"#);
        let inputs = ResolveInputs {
            refresh_token: Some("rt-env".into()),
            ..fx.inputs()
        };
        assert_eq!(resolve(&inputs).source(), CredentialSource::Pool);
    }

    #[test]
    fn invalid_json_pool_file_falls_through() {
        let fx = Fixture::new();
        fx.write_pool("{ not json");
        let inputs = ResolveInputs {
            refresh_token: Some("rt-env".into()),
            ..fx.inputs()
        };

        match resolve(&inputs) {
            Resolution::RefreshTokenEnv {
                refresh_token,
                persist_path,
            } => {
                assert_eq!(refresh_token.expose(), "rt-env");
                assert_eq!(persist_path, fx.pool_path());
            }
            other => panic!("expected refresh token env, got {other:?}"),
        }
    }

    #[test]
    fn pool_file_without_accounts_falls_through() {
        let fx = Fixture::new();
        fx.write_pool(r#"{"access_token": "at", "refresh_token": "rt", "factory_api_keys": []}"#);
        assert_eq!(resolve(&fx.inputs()).source(), CredentialSource::ClientSupplied);
    }

    #[test]
    fn refresh_token_env_is_trimmed() {
        let fx = Fixture::new();
        let inputs = ResolveInputs {
            refresh_token: Some("\trt-env\n".into()),
            ..fx.inputs()
        };
        let Resolution::RefreshTokenEnv { refresh_token, .. } = resolve(&inputs) else {
            panic!("expected refresh token env");
        };
        assert_eq!(refresh_token.expose(), "rt-env");
    }

    #[test]
    fn home_file_seeds_access_token_and_timestamp() {
        let fx = Fixture::new();
        fx.write_home(
            r#"{"access_token": " at-home ", "refresh_token": "rt-home",
                "last_updated": "2026-01-01T00:00:00.000Z", "other": 1}"#,
        );

        match resolve(&fx.inputs()) {
            Resolution::RefreshTokenFile {
                refresh_token,
                access_token,
                last_updated,
                path,
            } => {
                assert_eq!(refresh_token.expose(), "rt-home");
                assert_eq!(access_token.unwrap().expose(), "at-home");
                assert!(last_updated.is_some());
                assert_eq!(path, fx.home_path());
            }
            other => panic!("expected refresh token file, got {other:?}"),
        }
    }

    #[test]
    fn home_file_without_refresh_token_falls_through() {
        let fx = Fixture::new();
        fx.write_home(r#"{"access_token": "at-home", "refresh_token": "  "}"#);
        assert_eq!(resolve(&fx.inputs()).source(), CredentialSource::ClientSupplied);
    }

    #[test]
    fn invalid_json_home_file_falls_through() {
        let fx = Fixture::new();
        fx.write_home("[[[");
        assert_eq!(resolve(&fx.inputs()).source(), CredentialSource::ClientSupplied);
    }

    #[test]
    fn nothing_configured_is_client_supplied() {
        let inputs = ResolveInputs {
            pool_file: PathBuf::from("/nonexistent/auth.json"),
            home_file: None,
            ..Default::default()
        };
        assert_eq!(resolve(&inputs).source(), CredentialSource::ClientSupplied);
    }

    #[test]
    fn custom_strategy_order() {
        let fx = Fixture::new();
        fx.write_pool(r#"{"factory_api_key": "fk-pool"}"#);
        let inputs = ResolveInputs {
            fixed_key: Some("fk-env".into()),
            ..fx.inputs()
        };

        let resolver = CredentialSourceResolver::with_strategies(vec![Box::new(PoolFile)]);
        assert_eq!(resolver.resolve(&inputs).source(), CredentialSource::Pool);
    }

    #[test]
    fn normalize_accepts_string_csv_and_array() {
        assert_eq!(normalize_key_list(&json!("k1")), vec!["k1"]);
        assert_eq!(normalize_key_list(&json!(" k1 ,, k2 ,")), vec!["k1", "k2"]);
        assert_eq!(
            normalize_key_list(&json!([" k1 ", "", 7, null, "k2"])),
            vec!["k1", "k2"]
        );
        assert!(normalize_key_list(&json!("   ")).is_empty());
        assert!(normalize_key_list(&json!({"k": "v"})).is_empty());
        assert!(normalize_key_list(&json!(42)).is_empty());
    }

    #[test]
    fn first_spelling_with_a_value_wins() {
        let object = json!({
            "FACTORY_API_KEY": "",
            "factory_api_key": "fk-lower",
            "factory_api_keys": ["fk-plural"]
        });
        let accounts = build_pool_accounts(object.as_object().unwrap(), "auth.json");
        assert_eq!(accounts.len(), 1);
        match &accounts[0] {
            AccountSpec::FixedKey { key, .. } => assert_eq!(key.expose(), "fk-lower"),
            other => panic!("expected fixed key, got {other:?}"),
        }
    }

    #[test]
    fn from_env_reads_configured_variables() {
        let _lock = crate::ENV_MUTEX.lock().unwrap();

        let mut config = Config::default();
        config.sources.fixed_key_env = "DROID_GATEWAY_TEST_FIXED_KEY".into();
        config.sources.refresh_token_env = "DROID_GATEWAY_TEST_REFRESH_KEY".into();
        config.sources.home_file = Some(PathBuf::from("/etc/droid/auth.json"));

        // SAFETY: serialized by ENV_MUTEX; the variable names are unique to this test
        unsafe {
            std::env::set_var("DROID_GATEWAY_TEST_FIXED_KEY", "fk-env");
            std::env::remove_var("DROID_GATEWAY_TEST_REFRESH_KEY");
        }
        let inputs = ResolveInputs::from_env(&config);
        unsafe { std::env::remove_var("DROID_GATEWAY_TEST_FIXED_KEY") };

        assert_eq!(inputs.fixed_key.as_deref(), Some("fk-env"));
        assert!(inputs.refresh_token.is_none());
        assert!(inputs.pool_file.is_absolute());
        assert!(inputs.pool_file.ends_with("auth.json"));
        assert_eq!(inputs.home_file, Some(PathBuf::from("/etc/droid/auth.json")));
    }
}
