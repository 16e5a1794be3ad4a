//! Environment-style key-value store backed by a dotenv file
//!
//! Reads go through `dotenvy`'s parser so quoting and comments behave the
//! same as when the file is loaded into a process environment. Lines the
//! parser rejects are skipped with a warning. Writes are per-key upserts:
//! the entry for that key is replaced (or appended) and every other entry
//! of the file is left as it was. A quoted value may span several lines, so
//! entries are tracked as logical lines rather than physical ones.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::persistence::write_atomic;

#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
}

impl EnvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a key. A missing file reads as an empty store.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(contents) = self.read_contents().await.map_err(|e| {
            Error::Configuration(format!("reading env store {}: {e}", self.path.display()))
        })?
        else {
            return Ok(None);
        };

        for item in dotenvy::from_read_iter(contents.as_bytes()) {
            match item {
                Ok((name, value)) if name == key => return Ok(Some(value)),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "skipping unparseable env store line"
                    );
                }
            }
        }
        Ok(None)
    }

    /// Create or update a single key, preserving the rest of the file.
    pub async fn upsert(&self, key: &str, value: &str) -> Result<()> {
        let contents = self
            .read_contents()
            .await
            .map_err(|e| {
                Error::Persistence(format!("reading env store {}: {e}", self.path.display()))
            })?
            .unwrap_or_default();

        let entry = format!("{key}={}", quote(value));
        let mut replaced = false;
        let mut lines: Vec<String> = logical_lines(&contents)
            .into_iter()
            .map(|line| {
                if line_defines(line, key) {
                    replaced = true;
                    entry.clone()
                } else {
                    line.to_owned()
                }
            })
            .collect();
        if !replaced {
            lines.push(entry);
        }

        let mut updated = lines.join("\n");
        updated.push('\n');

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Persistence(format!("creating env store directory {}: {e}", dir.display()))
            })?;
        }
        write_atomic(&self.path, updated.as_bytes()).await?;

        debug!(path = %self.path.display(), key, replaced, "upserted env store key");
        Ok(())
    }

    async fn read_contents(&self) -> std::io::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Split the file into entries. A newline only ends an entry when no quote
/// is open; comments run to the end of the physical line. Escapes follow
/// dotenvy's line reader, which honours a backslash inside either quote.
fn logical_lines(contents: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut open: Option<char> = None;
    let mut escaped = false;
    let mut comment = false;
    let mut prev: Option<char> = None;

    for (i, c) in contents.char_indices() {
        if c == '\n' && (open.is_none() || comment) {
            entries.push(&contents[start..i]);
            start = i + 1;
            open = None;
            escaped = false;
            comment = false;
            prev = None;
            continue;
        }
        if comment {
            continue;
        }
        if escaped {
            escaped = false;
        } else {
            match (open, c) {
                (_, '\\') => escaped = true,
                (None, '#') if prev.is_none_or(char::is_whitespace) => comment = true,
                (None, '\'' | '"') => open = Some(c),
                (Some(quote), c) if c == quote => open = None,
                _ => {}
            }
        }
        prev = Some(c);
    }
    if start < contents.len() {
        entries.push(&contents[start..]);
    }
    entries
}

/// Whether `line` assigns `key`, allowing an `export ` prefix and spaces
/// around the `=`.
fn line_defines(line: &str, key: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    match line.split_once('=') {
        Some((name, _)) => name.trim_end() == key,
        None => false,
    }
}

/// Single quotes keep the value literal for dotenv parsers. Values with a
/// quote, backslash or newline use an escaped double-quoted form so every
/// entry stays on one physical line.
fn quote(value: &str) -> String {
    if !value.contains(['\'', '\\', '\n']) {
        return format!("'{value}'");
    }
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvStore::new(dir.path().join(".env"));
        assert_eq!(store.get("BLING_CLIENT_ID").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_parses_dotenv_syntax() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# bling app\nBLING_CLIENT_ID=abc123\nexport BLING_CLIENT_SECRET=\"s3cr3t\"\n",
        )
        .unwrap();

        let store = EnvStore::new(&path);
        assert_eq!(
            store.get("BLING_CLIENT_ID").await.unwrap().as_deref(),
            Some("abc123")
        );
        assert_eq!(
            store.get("BLING_CLIENT_SECRET").await.unwrap().as_deref(),
            Some("s3cr3t")
        );
        assert_eq!(store.get("BLING_USUARIO").await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvStore::new(dir.path().join("nested").join(".env"));

        store.upsert("OAUTH_SCOPE", "98308 318257556").await.unwrap();

        assert_eq!(
            store.get("OAUTH_SCOPE").await.unwrap().as_deref(),
            Some("98308 318257556")
        );
    }

    #[tokio::test]
    async fn upsert_replaces_only_the_target_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "BLING_CLIENT_ID=abc123\n# comment stays\nOAUTH_ACCESS_TOKEN='old'\nBLING_USUARIO=loja\n",
        )
        .unwrap();

        let store = EnvStore::new(&path);
        store.upsert("OAUTH_ACCESS_TOKEN", "new").await.unwrap();
        store.upsert("OAUTH_REFRESH_TOKEN", "rt_1").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "BLING_CLIENT_ID=abc123\n# comment stays\nOAUTH_ACCESS_TOKEN='new'\nBLING_USUARIO=loja\nOAUTH_REFRESH_TOKEN='rt_1'\n"
        );
    }

    #[tokio::test]
    async fn quoted_values_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvStore::new(dir.path().join(".env"));

        store.upsert("A", "it's $HOME").await.unwrap();
        store.upsert("B", "2024-01-01T06:00:00-03:00").await.unwrap();

        assert_eq!(store.get("A").await.unwrap().as_deref(), Some("it's $HOME"));
        assert_eq!(
            store.get("B").await.unwrap().as_deref(),
            Some("2024-01-01T06:00:00-03:00")
        );
    }

    #[test]
    fn line_matching_ignores_prefixes_of_other_keys() {
        assert!(line_defines("OAUTH_SCOPE=x", "OAUTH_SCOPE"));
        assert!(line_defines("export OAUTH_SCOPE = x", "OAUTH_SCOPE"));
        assert!(!line_defines("OAUTH_SCOPE_EXTRA=x", "OAUTH_SCOPE"));
        assert!(!line_defines("# OAUTH_SCOPE", "OAUTH_SCOPE"));
    }

    #[tokio::test]
    async fn unparseable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "some note without equals\nBLING_CLIENT_ID=abc\n").unwrap();

        let store = EnvStore::new(&path);
        assert_eq!(
            store.get("BLING_CLIENT_ID").await.unwrap().as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn multiline_values_are_written_on_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let store = EnvStore::new(&path);

        store.upsert("OAUTH_SCOPE", "a\nb").await.unwrap();
        store.upsert("BLING_CLIENT_ID", "abc").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "OAUTH_SCOPE=\"a\\nb\"\nBLING_CLIENT_ID='abc'\n"
        );
        assert_eq!(store.get("OAUTH_SCOPE").await.unwrap().as_deref(), Some("a\nb"));

        store.upsert("OAUTH_SCOPE", "c").await.unwrap();
        assert_eq!(store.get("OAUTH_SCOPE").await.unwrap().as_deref(), Some("c"));
        assert_eq!(
            store.get("BLING_CLIENT_ID").await.unwrap().as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn upsert_replaces_an_existing_multiline_entry_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "OAUTH_SCOPE='a\nb'\nBLING_CLIENT_SECRET=\"x\ny\"\nBLING_CLIENT_ID='abc'\n",
        )
        .unwrap();

        let store = EnvStore::new(&path);
        store.upsert("OAUTH_SCOPE", "c").await.unwrap();
        store.upsert("BLING_CLIENT_SECRET", "s3cr3t").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "OAUTH_SCOPE='c'\nBLING_CLIENT_SECRET='s3cr3t'\nBLING_CLIENT_ID='abc'\n"
        );
        assert_eq!(
            store.get("BLING_CLIENT_ID").await.unwrap().as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn logical_lines_follow_quotes_and_comments() {
        assert_eq!(
            logical_lines("# don't split\nA='x\ny'\nB=1 # it's fine\nC=2"),
            vec!["# don't split", "A='x\ny'", "B=1 # it's fine", "C=2"]
        );
        assert_eq!(logical_lines("A=\"x\\\"\ny\"\n"), vec!["A=\"x\\\"\ny\""]);
    }
}
