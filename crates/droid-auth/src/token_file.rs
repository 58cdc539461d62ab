//! Credential file persistence
//!
//! The credential file is a JSON object with three reserved fields
//! (`access_token`, `refresh_token`, `last_updated`). Everything else in the
//! object belongs to whoever else writes the file and survives every save.
//!
//! Saves merge into the existing object and are written atomically (temp
//! file + rename). A tokio Mutex serializes saves through the same
//! `TokenFile`; with concurrent writers the last save wins.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// JSON object as stored on disk.
pub type CredentialObject = Map<String, Value>;

/// Read a credential file.
///
/// Returns `None` when the file is missing, unreadable, not valid JSON, or
/// not a JSON object. Never fails.
pub fn load(path: &Path) -> Option<CredentialObject> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "credential file not found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read credential file");
            return None;
        }
    };
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(object)) => Some(object),
        Ok(_) => {
            warn!(path = %path.display(), "credential file is not a JSON object");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse credential file");
            None
        }
    }
}

/// Non-blank, trimmed string field of a credential object.
pub fn string_field(object: &CredentialObject, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Future timestamps within this allowance are accepted as written.
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);

/// Parse the `last_updated` field (RFC 3339) written by `TokenFile::save`.
///
/// A timestamp further in the future than `MAX_CLOCK_SKEW` is discarded, so
/// a token seeded from it counts as stale instead of looking fresh until the
/// clock catches up.
pub fn last_updated(object: &CredentialObject) -> Option<SystemTime> {
    let raw = object.get("last_updated")?.as_str()?;
    let ts = SystemTime::from(DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc));
    if ts > SystemTime::now() + MAX_CLOCK_SKEW {
        warn!(last_updated = raw, "ignoring credential timestamp in the future");
        return None;
    }
    Some(ts)
}

/// Persists rotated tokens to one credential file.
#[derive(Debug)]
pub struct TokenFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TokenFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save a token pair, logging and swallowing any failure.
    ///
    /// A failed save never undoes the in-memory refresh; the process keeps
    /// using the new token and re-refreshes after a restart.
    pub async fn save(&self, access_token: &str, refresh_token: &str) {
        match self.try_save(access_token, refresh_token).await {
            Ok(()) => debug!(path = %self.path.display(), "tokens saved"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to save tokens"),
        }
    }

    /// Save a token pair, merging into the existing object if there is one.
    pub async fn try_save(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;
        }

        let mut object = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(existing)) => existing,
                _ => {
                    warn!(path = %self.path.display(), "existing credential file is not a JSON object, overwriting");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };

        object.insert("access_token".into(), Value::String(access_token.to_owned()));
        object.insert("refresh_token".into(), Value::String(refresh_token.to_owned()));
        object.insert(
            "last_updated".into(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        write_atomic(&self.path, &Value::Object(object)).await
    }
}

/// Write JSON to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains OAuth tokens.
async fn write_atomic(path: &Path, data: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn save_merges_into_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{"foo":"bar"}"#).unwrap();

        let before = Utc::now();
        TokenFile::new(path.clone()).try_save("A", "B").await.unwrap();

        let json = read_json(&path);
        assert_eq!(json["foo"], "bar");
        assert_eq!(json["access_token"], "A");
        assert_eq!(json["refresh_token"], "B");
        let stamp = DateTime::parse_from_rfc3339(json["last_updated"].as_str().unwrap()).unwrap();
        assert!(stamp.with_timezone(&Utc) >= before - chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn save_overwrites_stale_token_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(
            &path,
            r#"{"access_token":"old","refresh_token":"old_rt","last_updated":"2020-01-01T00:00:00.000Z","nested":{"keep":[1,2]}}"#,
        )
        .unwrap();

        TokenFile::new(path.clone()).try_save("new", "new_rt").await.unwrap();

        let json = read_json(&path);
        assert_eq!(json["access_token"], "new");
        assert_eq!(json["refresh_token"], "new_rt");
        assert_ne!(json["last_updated"], "2020-01-01T00:00:00.000Z");
        assert_eq!(json["nested"], serde_json::json!({"keep": [1, 2]}));
    }

    #[tokio::test]
    async fn save_writes_exactly_three_fields_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");

        TokenFile::new(path.clone()).try_save("A", "B").await.unwrap();

        let json = read_json(&path);
        let object = json.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["access_token", "last_updated", "refresh_token"]);
    }

    #[tokio::test]
    async fn save_replaces_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, "not json {{").unwrap();

        TokenFile::new(path.clone()).try_save("A", "B").await.unwrap();

        let json = read_json(&path);
        assert_eq!(json.as_object().unwrap().len(), 3);
        assert_eq!(json["access_token"], "A");
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".factory").join("auth.json");

        TokenFile::new(path.clone()).try_save("A", "B").await.unwrap();
        assert_eq!(read_json(&path)["refresh_token"], "B");
    }

    #[tokio::test]
    async fn save_swallows_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let file = TokenFile::new(blocker.join("auth.json"));

        assert!(file.try_save("A", "B").await.is_err());
        // The logging variant must not panic or propagate
        file.save("A", "B").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn saved_file_is_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        TokenFile::new(path.clone()).try_save("A", "B").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_saves_leave_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{"foo":"bar"}"#).unwrap();
        let file = Arc::new(TokenFile::new(path.clone()));

        let mut handles = vec![];
        for i in 0..10 {
            let file = file.clone();
            handles.push(tokio::spawn(async move {
                file.try_save(&format!("at_{i}"), &format!("rt_{i}"))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let json = read_json(&path);
        assert_eq!(json["foo"], "bar");
        let access = json["access_token"].as_str().unwrap();
        let refresh = json["refresh_token"].as_str().unwrap();
        assert_eq!(access.trim_start_matches("at_"), refresh.trim_start_matches("rt_"));
    }

    #[test]
    fn load_returns_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{"refresh_token":" rt_1 ","other":1}"#).unwrap();

        let object = load(&path).unwrap();
        assert_eq!(string_field(&object, "refresh_token").as_deref(), Some("rt_1"));
        assert_eq!(object["other"], 1);
    }

    #[test]
    fn load_absent_on_missing_invalid_or_non_object() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("missing.json")).is_none());

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, "{oops").unwrap();
        assert!(load(&invalid).is_none());

        let array = dir.path().join("array.json");
        std::fs::write(&array, "[1,2,3]").unwrap();
        assert!(load(&array).is_none());
    }

    #[test]
    fn string_field_ignores_blank_and_non_string() {
        let object: CredentialObject =
            serde_json::from_str(r#"{"a":"   ","b":42,"c":"ok"}"#).unwrap();
        assert!(string_field(&object, "a").is_none());
        assert!(string_field(&object, "b").is_none());
        assert!(string_field(&object, "missing").is_none());
        assert_eq!(string_field(&object, "c").as_deref(), Some("ok"));
    }

    #[test]
    fn last_updated_parses_rfc3339() {
        let object: CredentialObject =
            serde_json::from_str(r#"{"last_updated":"2024-05-01T12:00:00.000Z"}"#).unwrap();
        let ts = last_updated(&object).unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap();
        assert_eq!(ts, SystemTime::from(expected.with_timezone(&Utc)));

        let garbage: CredentialObject =
            serde_json::from_str(r#"{"last_updated":"yesterday"}"#).unwrap();
        assert!(last_updated(&garbage).is_none());
    }

    #[test]
    fn last_updated_rejects_future_timestamps() {
        let future: CredentialObject =
            serde_json::from_str(r#"{"last_updated":"2099-01-01T00:00:00Z"}"#).unwrap();
        assert!(last_updated(&future).is_none());

        let skewed = Utc::now() + chrono::Duration::seconds(60);
        let mut object = CredentialObject::new();
        object.insert(
            "last_updated".into(),
            Value::String(skewed.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        assert!(last_updated(&object).is_some(), "small skew is tolerated");
    }
}
