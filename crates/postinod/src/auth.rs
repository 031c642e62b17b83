//! AUTH PLAIN support: the credential decode and the pluggable stores
//! that credentials are checked against.

use crate::envelope::AuthCredentials;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    File,
    Sql,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    /// Path of the `user,pass` records for `type = "file"`.
    pub file: Option<PathBuf>,
    /// SQLite database path for `type = "sql"`.
    pub database: Option<PathBuf>,
    /// Table with `username` and `password` columns for `type = "sql"`.
    pub table: Option<String>,
}

impl AuthSettings {
    pub fn build_store(&self) -> anyhow::Result<Option<Arc<dyn AuthStore>>> {
        match self.auth_type {
            AuthType::None => Ok(None),
            AuthType::File => {
                let path = self
                    .file
                    .clone()
                    .context("auth type \"file\" requires auth.file to be set")?;
                Ok(Some(Arc::new(FileAuthStore { path })))
            }
            AuthType::Sql => {
                let database = self
                    .database
                    .clone()
                    .context("auth type \"sql\" requires auth.database to be set")?;
                let table = self
                    .table
                    .clone()
                    .context("auth type \"sql\" requires auth.table to be set")?;
                // only values are bound in the lookup; the table name is
                // interpolated, so it must be a plain identifier
                anyhow::ensure!(
                    !table.is_empty()
                        && table
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_'),
                    "auth.table {table:?} is not a valid identifier"
                );
                Ok(Some(Arc::new(SqliteAuthStore { database, table })))
            }
        }
    }
}

#[async_trait]
pub trait AuthStore: Send + Sync + std::fmt::Debug {
    /// Ok(false) means the credentials were checked and rejected; Err
    /// means the store itself failed (missing file, bad database).
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<bool>;
}

/// Flat-file store: one `user,pass` record per line, scanned on every
/// authenticate call so edits take effect without a reload.
#[derive(Debug)]
pub struct FileAuthStore {
    pub path: PathBuf,
}

#[async_trait]
impl AuthStore for FileAuthStore {
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<bool> {
        let path = self.path.clone();
        let username = username.to_string();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("opening auth file {}", path.display()))?;
            for line in text.lines() {
                if let Some((user, pass)) = line.split_once(',') {
                    if user == username && pass.trim_end() == password {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        })
        .await?
    }
}

/// SQLite-backed store performing a single-row lookup with bound
/// parameters.
#[derive(Debug)]
pub struct SqliteAuthStore {
    pub database: PathBuf,
    pub table: String,
}

#[async_trait]
impl AuthStore for SqliteAuthStore {
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<bool> {
        let database = self.database.clone();
        let query = format!(
            "SELECT username FROM {} WHERE username = ? AND password = ?",
            self.table
        );
        let username = username.to_string();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let connection = sqlite::open(&database)
                .with_context(|| format!("opening auth database {}", database.display()))?;
            let mut statement = connection.prepare(&query).context("preparing auth lookup")?;
            statement.bind((1, username.as_str()))?;
            statement.bind((2, password.as_str()))?;
            Ok(matches!(statement.next()?, sqlite::State::Row))
        })
        .await?
    }
}

/// Decode the base64 payload of AUTH PLAIN: `authzid \0 authcid \0
/// passwd`. Only authcid and passwd are used; authzid is ignored.
/// Returns None when the base64 or the UTF-8 inside it is invalid.
pub fn decode_plain(input: &str) -> Option<AuthCredentials> {
    let bytes = data_encoding::BASE64.decode(input.trim().as_bytes()).ok()?;
    let mut username = Vec::new();
    let mut password = Vec::new();
    let mut nul_count = 0usize;
    for byte in bytes {
        if byte == 0 {
            nul_count += 1;
            continue;
        }
        match nul_count {
            1 => username.push(byte),
            2 => password.push(byte),
            _ => {}
        }
    }
    Some(AuthCredentials {
        username: String::from_utf8(username).ok()?,
        password: String::from_utf8(password).ok()?,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn decode_plain_splits_on_nul() {
        // \0agni\0pass
        let creds = decode_plain("AGFnbmkAcGFzcw==").unwrap();
        assert_eq!(creds.username, "agni");
        assert_eq!(creds.password, "pass");

        assert!(decode_plain("not base64!").is_none());

        // an authzid before the first NUL is ignored
        let encoded = data_encoding::BASE64.encode(b"admin\0agni\0pass");
        let creds = decode_plain(&encoded).unwrap();
        assert_eq!(creds.username, "agni");
        assert_eq!(creds.password, "pass");
    }

    #[tokio::test]
    async fn file_store_scans_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "agni,pass").unwrap();
        writeln!(file, "other,secret").unwrap();
        file.flush().unwrap();

        let store = FileAuthStore {
            path: file.path().to_path_buf(),
        };
        assert!(store.authenticate("agni", "pass").await.unwrap());
        assert!(store.authenticate("other", "secret").await.unwrap());
        assert!(!store.authenticate("agni", "wrong").await.unwrap());
        assert!(!store.authenticate("missing", "pass").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_open_failure_is_an_error() {
        let store = FileAuthStore {
            path: "/nonexistent/users".into(),
        };
        assert!(store.authenticate("agni", "pass").await.is_err());
    }

    #[tokio::test]
    async fn sqlite_store_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("auth.db");
        let connection = sqlite::open(&db_path).unwrap();
        connection
            .execute(
                "CREATE TABLE users (username TEXT, password TEXT);
                 INSERT INTO users VALUES ('agni', 'pass');",
            )
            .unwrap();
        drop(connection);

        let store = SqliteAuthStore {
            database: db_path,
            table: "users".to_string(),
        };
        assert!(store.authenticate("agni", "pass").await.unwrap());
        assert!(!store.authenticate("agni", "nope").await.unwrap());
        // bound parameters keep injection attempts inert
        assert!(!store
            .authenticate("agni' --", "' OR '1'='1")
            .await
            .unwrap());
    }

    #[test]
    fn store_config_validation() {
        let settings = AuthSettings {
            auth_type: AuthType::File,
            ..AuthSettings::default()
        };
        assert!(settings.build_store().is_err());

        let settings = AuthSettings {
            auth_type: AuthType::Sql,
            database: Some("/tmp/db".into()),
            table: Some("users; DROP TABLE users".to_string()),
            ..AuthSettings::default()
        };
        assert!(settings.build_store().is_err());

        assert!(AuthSettings::default().build_store().unwrap().is_none());
    }
}
