// ── API directory cache ──
//
// Maps an API name to the server-provided `logical name -> base URL`
// table. Entries are written once per API name by whichever call first
// resolves it and read by every client of that name afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

/// One API's directory: logical name -> concrete base URL.
pub type DirectoryEntries = HashMap<String, Url>;

/// Shared, read-mostly store of resolved directories.
///
/// A registry owns one of these and hands an `Arc` to every client it
/// builds. Resolution is single-flight per API name: callers that miss
/// the cache serialize on a per-name async lock and re-check before
/// fetching.
#[derive(Debug, Default)]
pub struct Directory {
    entries: DashMap<String, Arc<DirectoryEntries>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved directory for `api`, if it has been fetched.
    pub fn get(&self, api: &str) -> Option<Arc<DirectoryEntries>> {
        self.entries.get(api).map(|r| Arc::clone(r.value()))
    }

    /// Whether `api` has a resolved directory.
    pub fn contains(&self, api: &str) -> bool {
        self.entries.contains_key(api)
    }

    /// Store the directory for `api`, replacing any previous one.
    pub fn insert(&self, api: &str, entries: DirectoryEntries) -> Arc<DirectoryEntries> {
        let entries = Arc::new(entries);
        self.entries.insert(api.to_owned(), Arc::clone(&entries));
        entries
    }

    /// Look up `target` (then `{target}_url`) in the directory for `api`.
    pub fn lookup(&self, api: &str, target: &str) -> Option<Url> {
        let entries = self.get(api)?;
        lookup_in(&entries, target)
    }

    /// Forget the directory for `api`; the next targeted call refetches it.
    pub fn remove(&self, api: &str) {
        self.entries.remove(api);
    }

    /// Drop every resolved directory. Intended for test isolation.
    pub fn reset(&self) {
        self.entries.clear();
        self.locks.clear();
    }

    pub(crate) fn resolution_lock(&self, api: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(api.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

/// Look up `target`, falling back to `{target}_url`.
pub fn lookup_in(entries: &DirectoryEntries, target: &str) -> Option<Url> {
    entries
        .get(target)
        .or_else(|| entries.get(&format!("{target}_url")))
        .cloned()
}

/// Parse a directory payload (a flat JSON object of name -> URL).
///
/// Relative URLs are joined against `root`, the endpoint the directory was
/// fetched from. Non-string values are ignored.
pub fn parse_entries(root: &Url, payload: &Value) -> Result<DirectoryEntries, String> {
    let Value::Object(map) = payload else {
        return Err(format!("expected a JSON object, got {payload}"));
    };

    let mut entries = DirectoryEntries::with_capacity(map.len());
    for (name, value) in map {
        let Some(raw) = value.as_str() else {
            continue;
        };
        let url = Url::parse(raw)
            .or_else(|_| root.join(raw))
            .map_err(|e| format!("invalid url for {name}: {e}"))?;
        entries.insert(name.clone(), url);
    }
    Ok(entries)
}
