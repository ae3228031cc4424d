//! Persistent response cache, one directory per named cache.
//!
//! Entries are addressed by the SHA-256 of their URL (fragment removed) and
//! stored as `<key>.json` metadata next to a `<key>.body` file holding the raw
//! bytes. Cache names carry a version; bumping the version and activating
//! drops every older cache.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{FetchedResponse, OfflineError};

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    cached_at: DateTime<Utc>,
}

pub struct ResponseCache {
    name: String,
    dir: PathBuf,
}

impl ResponseCache {
    /// Open (creating if needed) the cache `name` under `root`.
    pub fn open(root: &Path, name: &str) -> Result<Self, OfflineError> {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding every named cache.
    pub fn root(&self) -> &Path {
        self.dir.parent().unwrap_or(&self.dir)
    }

    pub fn match_url(&self, url: &Url) -> Result<Option<FetchedResponse>, OfflineError> {
        let key = cache_key(url);
        let meta_path = self.meta_path(&key);
        if !meta_path.exists() {
            return Ok(None);
        }

        let meta: EntryMeta = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
        let body = match std::fs::read(self.body_path(&key)) {
            Ok(body) => Bytes::from(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(url = %url, "Cached response has no body, ignoring entry");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let status = StatusCode::from_u16(meta.status).unwrap_or(StatusCode::OK);
        let url = Url::parse(&meta.url).unwrap_or_else(|_| url.clone());
        Ok(Some(FetchedResponse {
            url,
            status,
            headers: decode_headers(&meta.headers),
            body,
        }))
    }

    /// Store `response` under `url`. Any old metadata is removed first and
    /// the metadata is renamed into place last, so a partly written entry is
    /// never matched.
    pub fn put(&self, url: &Url, response: &FetchedResponse) -> Result<(), OfflineError> {
        let key = cache_key(url);
        let meta = EntryMeta {
            url: normalize(url).to_string(),
            status: response.status.as_u16(),
            headers: encode_headers(&response.headers),
            cached_at: Utc::now(),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)?;

        let meta_path = self.meta_path(&key);
        if meta_path.exists() {
            std::fs::remove_file(&meta_path)?;
        }
        write_replacing(&self.body_path(&key), &response.body)?;
        write_replacing(&meta_path, &meta_bytes)?;
        debug!(cache = %self.name, url = %meta.url, bytes = response.body.len(), "Cached response");
        Ok(())
    }

    pub fn delete(&self, url: &Url) -> Result<bool, OfflineError> {
        let key = cache_key(url);
        let meta_path = self.meta_path(&key);
        let existed = meta_path.exists();
        if existed {
            std::fs::remove_file(meta_path)?;
        }
        let body_path = self.body_path(&key);
        if body_path.exists() {
            std::fs::remove_file(body_path)?;
        }
        Ok(existed)
    }

    /// URLs of every cached entry, sorted.
    pub fn keys(&self) -> Result<Vec<String>, OfflineError> {
        let mut urls = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(OfflineError::from)
                .and_then(|raw| Ok(serde_json::from_str::<EntryMeta>(&raw)?))
            {
                Ok(meta) => urls.push(meta.url),
                Err(e) => warn!(?path, error = %e, "Skipping unreadable cache entry"),
            }
        }
        urls.sort();
        Ok(urls)
    }

    /// Names of all caches under `root`.
    pub fn cache_names(root: &Path) -> Result<Vec<String>, OfflineError> {
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete_cache(root: &Path, name: &str) -> Result<bool, OfflineError> {
        let dir = root.join(name);
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(dir)?;
        Ok(true)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.body", key))
    }
}

/// Write to `<path>.tmp` and rename over `path`.
fn write_replacing(path: &Path, contents: &[u8]) -> Result<(), OfflineError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn normalize(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

/// Content-addressed key for a URL.
fn cache_key(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(url).as_str().as_bytes());
    hex::encode(hasher.finalize())
}

fn encode_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

fn decode_headers(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.append(name, value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header;

    fn response(url: &Url, body: &'static str) -> FetchedResponse {
        FetchedResponse::synthetic(url.clone(), StatusCode::OK, "text/css", body)
    }

    #[test]
    fn test_put_and_match() {
        let root = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(root.path(), "static-v1").unwrap();
        let url = Url::parse("http://localhost:5000/static/app.css").unwrap();

        assert!(cache.match_url(&url).unwrap().is_none());
        cache.put(&url, &response(&url, "body{}")).unwrap();

        let cached = cache.match_url(&url).unwrap().unwrap();
        assert_eq!(cached.status, StatusCode::OK);
        assert_eq!(cached.text(), "body{}");
        assert_eq!(cached.headers[header::CONTENT_TYPE], "text/css");
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let root = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(root.path(), "static-v1").unwrap();
        let url = Url::parse("http://localhost:5000/api/programs").unwrap();
        cache.put(&url, &response(&url, "v1")).unwrap();

        let fresh =
            FetchedResponse::synthetic(url.clone(), StatusCode::CREATED, "application/json", "v2");
        cache.put(&url, &fresh).unwrap();

        let cached = cache.match_url(&url).unwrap().unwrap();
        assert_eq!(cached.status, StatusCode::CREATED);
        assert_eq!(cached.text(), "v2");
        assert_eq!(cache.keys().unwrap(), vec![url.to_string()]);
    }

    #[test]
    fn test_failed_overwrite_is_not_matched() {
        let root = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(root.path(), "static-v1").unwrap();
        let url = Url::parse("http://localhost:5000/app.css").unwrap();
        cache.put(&url, &response(&url, "old")).unwrap();

        // A directory in place of the metadata temp file makes the write fail
        let key = cache_key(&url);
        std::fs::create_dir(cache.dir.join(format!("{}.json.tmp", key))).unwrap();
        assert!(cache.put(&url, &response(&url, "new")).is_err());

        assert!(cache.match_url(&url).unwrap().is_none());
    }

    #[test]
    fn test_fragment_ignored() {
        let root = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(root.path(), "static-v1").unwrap();
        let url = Url::parse("http://localhost:5000/").unwrap();
        cache.put(&url, &response(&url, "shell")).unwrap();

        let with_fragment = Url::parse("http://localhost:5000/#programs").unwrap();
        assert!(cache.match_url(&with_fragment).unwrap().is_some());
    }

    #[test]
    fn test_query_is_part_of_key() {
        let root = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(root.path(), "static-v1").unwrap();
        let url = Url::parse("http://localhost:5000/app.js?v=1").unwrap();
        cache.put(&url, &response(&url, "v1")).unwrap();

        let other = Url::parse("http://localhost:5000/app.js?v=2").unwrap();
        assert!(cache.match_url(&other).unwrap().is_none());
    }

    #[test]
    fn test_delete_and_keys() {
        let root = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(root.path(), "static-v1").unwrap();
        let a = Url::parse("http://localhost:5000/a.js").unwrap();
        let b = Url::parse("http://localhost:5000/b.js").unwrap();
        cache.put(&a, &response(&a, "a")).unwrap();
        cache.put(&b, &response(&b, "b")).unwrap();

        assert_eq!(cache.keys().unwrap(), vec![a.to_string(), b.to_string()]);
        assert!(cache.delete(&a).unwrap());
        assert!(!cache.delete(&a).unwrap());
        assert_eq!(cache.keys().unwrap(), vec![b.to_string()]);
    }

    #[test]
    fn test_cache_names_and_delete_cache() {
        let root = tempfile::tempdir().unwrap();
        ResponseCache::open(root.path(), "static-v1").unwrap();
        let current = ResponseCache::open(root.path(), "static-v2").unwrap();

        assert_eq!(
            ResponseCache::cache_names(current.root()).unwrap(),
            vec!["static-v1", "static-v2"]
        );
        assert!(ResponseCache::delete_cache(root.path(), "static-v1").unwrap());
        assert!(!ResponseCache::delete_cache(root.path(), "static-v1").unwrap());
        assert_eq!(ResponseCache::cache_names(root.path()).unwrap(), vec!["static-v2"]);
    }

    #[test]
    fn test_cache_key_is_hex_sha256() {
        let key = cache_key(&Url::parse("http://localhost:5000/").unwrap());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
