//! Parsed-template cache.

use super::{Template, TemplateError};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Template loading configuration.
#[derive(Clone, Debug)]
pub struct TemplateConfig {
    /// Keep parsed templates between renders. When off every render
    /// re-reads the file and its includes.
    pub cache: bool,

    /// Maximum number of cached templates.
    pub cache_size: usize,

    /// Directory relative include paths resolve against.
    pub include_root: Option<PathBuf>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            cache: true,
            cache_size: 256,
            include_root: None,
        }
    }
}

/// Loads templates by path, keeping recently used ones parsed.
pub struct TemplateCache {
    config: TemplateConfig,
    cache: Mutex<LruCache<PathBuf, Arc<Template>>>,
}

impl TemplateCache {
    pub fn new(config: TemplateConfig) -> Self {
        let size = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            cache: Mutex::new(LruCache::new(size)),
        }
    }

    /// Get the template at `path`, loading it on a miss.
    pub fn get(&self, path: &Path) -> Result<Arc<Template>, TemplateError> {
        if self.config.cache {
            if let Some(template) = self.cache.lock().get(path) {
                return Ok(Arc::clone(template));
            }
        }

        let template = Arc::new(Template::load(path, self.config.include_root.as_deref())?);
        if self.config.cache {
            self.cache
                .lock()
                .put(path.to_path_buf(), Arc::clone(&template));
        }
        Ok(template)
    }

    /// Load (or reuse) the template at `path` and render it.
    pub fn render_file(&self, path: &Path, data: &Value) -> Result<String, TemplateError> {
        Ok(self.get(path)?.render(data))
    }

    /// Drop every cached template.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
