use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use self_cell::self_cell;

use crate::error::{Error, ErrorKind};
use crate::template::{CompiledTemplate, TemplateConfig};

type LoadFunc = dyn for<'a> Fn(&'a str) -> Result<Option<TemplateSource>, Error> + Send + Sync;
type UptodateFunc = dyn Fn() -> bool + Send + Sync;

/// The result of a loader callback.
///
/// Carries the template source and an optional freshness callback.  When the
/// environment has `auto_reload` enabled the callback is invoked on cache
/// hits; returning `false` makes the engine discard the cached template and
/// load it again.
pub struct TemplateSource {
    pub(crate) source: String,
    pub(crate) uptodate: Option<Arc<UptodateFunc>>,
}

impl TemplateSource {
    /// Creates a template source without freshness tracking.
    pub fn new(source: impl Into<String>) -> TemplateSource {
        TemplateSource {
            source: source.into(),
            uptodate: None,
        }
    }

    /// Attaches a freshness callback to the source.
    pub fn with_uptodate<F>(mut self, f: F) -> TemplateSource
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.uptodate = Some(Arc::new(f));
        self
    }
}

impl From<String> for TemplateSource {
    fn from(source: String) -> TemplateSource {
        TemplateSource::new(source)
    }
}

self_cell! {
    pub(crate) struct LoadedTemplate {
        owner: (Arc<str>, Box<str>),
        #[covariant]
        dependent: CompiledTemplate,
    }
}

impl fmt::Debug for LoadedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.borrow_dependent(), f)
    }
}

struct CacheEntry {
    template: Arc<LoadedTemplate>,
    uptodate: Option<Arc<UptodateFunc>>,
}

/// Statistics of the loader template cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// The fraction of lookups that were answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Storage for parsed templates.
///
/// Explicitly added templates persist in a plain map.  Loader produced
/// templates go through a small LRU cache (most recently used in front)
/// protected by a mutex; concurrent renders share it.
pub(crate) struct TemplateStore {
    pub template_config: TemplateConfig,
    loader: Option<Arc<LoadFunc>>,
    persistent: BTreeMap<Arc<str>, Arc<LoadedTemplate>>,
    cache: Mutex<Vec<(Arc<str>, CacheEntry)>>,
    cache_size: usize,
    auto_reload: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut l = f.debug_list();
        for key in self.persistent.keys() {
            l.entry(key);
        }
        l.finish()
    }
}

impl TemplateStore {
    pub fn new(template_config: TemplateConfig) -> TemplateStore {
        TemplateStore {
            template_config,
            loader: None,
            persistent: BTreeMap::new(),
            cache: Mutex::new(Vec::new()),
            cache_size: 50,
            auto_reload: false,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn insert(&mut self, name: &str, source: &str) -> Result<(), Error> {
        let name: Arc<str> = name.into();
        let template = ok!(self.compile(name.clone(), source.to_string()));
        self.persistent.insert(name, template);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) {
        self.persistent.remove(name);
        self.cache.lock().unwrap().retain(|(key, _)| &**key != name);
    }

    pub fn clear(&mut self) {
        self.persistent.clear();
        self.cache.lock().unwrap().clear();
    }

    pub fn set_loader<F>(&mut self, f: F)
    where
        F: for<'a> Fn(&'a str) -> Result<Option<TemplateSource>, Error> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(f));
    }

    pub fn set_cache_size(&mut self, size: usize) {
        self.cache_size = size;
        let mut cache = self.cache.lock().unwrap();
        while cache.len() > size {
            cache.pop();
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn set_auto_reload(&mut self, yes: bool) {
        self.auto_reload = yes;
    }

    pub fn auto_reload(&self) -> bool {
        self.auto_reload
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Fetches a template, consulting the persistent map first, then the
    /// cache, then the loader.
    pub fn get(&self, name: &str) -> Result<Arc<LoadedTemplate>, Error> {
        if let Some(rv) = self.persistent.get(name) {
            return Ok(rv.clone());
        }

        if self.cache_size > 0 {
            let mut cache = self.cache.lock().unwrap();
            if let Some(idx) = cache.iter().position(|(key, _)| &**key == name) {
                let fresh = !self.auto_reload
                    || cache[idx]
                        .1
                        .uptodate
                        .as_ref()
                        .map_or(true, |uptodate| uptodate());
                if fresh {
                    // move to the front to mark as most recently used
                    let entry = cache.remove(idx);
                    let rv = entry.1.template.clone();
                    cache.insert(0, entry);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(rv);
                }
                cache.remove(idx);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let loaded = match self.loader {
            Some(ref loader) => ok!(loader(name)),
            None => None,
        };
        let loaded = match loaded {
            Some(loaded) => loaded,
            None => return Err(Error::new_not_found(name)),
        };

        let name: Arc<str> = name.into();
        let template = ok!(self.compile(name.clone(), loaded.source));

        if self.cache_size > 0 {
            let mut cache = self.cache.lock().unwrap();
            cache.insert(
                0,
                (
                    name,
                    CacheEntry {
                        template: template.clone(),
                        uptodate: loaded.uptodate,
                    },
                ),
            );
            while cache.len() > self.cache_size {
                cache.pop();
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(template)
    }

    pub fn compile(&self, name: Arc<str>, source: String) -> Result<Arc<LoadedTemplate>, Error> {
        LoadedTemplate::try_new(
            (name, source.into_boxed_str()),
            |(name, source)| -> Result<_, Error> {
                CompiledTemplate::new(name, source, &self.template_config)
            },
        )
        .map(Arc::new)
    }

    pub fn iter_persistent(&self) -> impl Iterator<Item = (&str, &Arc<LoadedTemplate>)> {
        self.persistent.iter().map(|(name, tmpl)| (&**name, tmpl))
    }
}

/// Safely joins two paths.
pub(crate) fn safe_join(base: &Path, template: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in template.split('/') {
        if segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}

/// Helper to load templates from a given directory.
///
/// This creates a dynamic loader which looks up templates in the given
/// directory.  Templates that start with a dot (`.`) or are contained in a
/// folder starting with a dot cannot be loaded.  The loader attaches a
/// modification-time freshness token so
/// [`set_auto_reload`](crate::Environment::set_auto_reload) can pick up
/// changed files.
///
/// # Example
///
/// ```rust
/// # use tempera::{path_loader, Environment};
/// fn create_env() -> Environment<'static> {
///     let mut env = Environment::new();
///     env.set_loader(path_loader("path/to/templates"));
///     env
/// }
/// ```
pub fn path_loader<'x, P: AsRef<Path> + 'x>(
    dir: P,
) -> impl for<'a> Fn(&'a str) -> Result<Option<TemplateSource>, Error> + Send + Sync + 'static {
    let dir = dir.as_ref().to_path_buf();
    move |name| {
        let path = match safe_join(&dir, name) {
            Some(path) => path,
            None => return Ok(None),
        };
        match fs::read_to_string(&path) {
            Ok(source) => {
                let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();
                Ok(Some(TemplateSource::new(source).with_uptodate(move || {
                    mtime.map_or(false, |mtime| {
                        fs::metadata(&path).and_then(|m| m.modified()).ok() == Some(mtime)
                    })
                })))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::new(
                ErrorKind::TemplateLoad,
                "could not read template",
            )
            .with_source(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_safe_join() {
        assert_eq!(
            safe_join(Path::new("foo"), "bar/baz"),
            Some(PathBuf::from("foo").join("bar").join("baz"))
        );
        assert_eq!(safe_join(Path::new("foo"), ".bar/baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/.baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/../baz"), None);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            evictions: 0,
        };
        assert_eq!(stats.hit_rate(), 0.75);
    }
}
