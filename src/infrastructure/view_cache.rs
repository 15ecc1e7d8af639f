//! In-process rendered-page cache
//!
//! Bounded LRU of rendered HTML keyed by logical path and variant. Expired
//! pages are dropped on lookup and swept on every insert.

use crate::config::Config;
use crate::core::traits::PageCache;
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

/// (logical path, variant)
type PageKey = (String, String);

struct CachedPage {
    html: String,
    expires_at: Instant,
}

impl CachedPage {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

pub struct ViewCache {
    ttl: Duration,
    pages: RwLock<LruCache<PageKey, CachedPage>>,
}

#[injectable(PageCache)]
impl ViewCache {
    #[inject]
    pub fn create(config: Ref<Config>) -> ViewCache {
        ViewCache::new(config.view_cache_ttl, config.view_cache_capacity)
    }
}

impl ViewCache {
    /// A zero capacity falls back to the default.
    pub fn new(ttl: Duration, capacity: usize) -> ViewCache {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        ViewCache {
            ttl,
            pages: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of pages currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.pages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn remove_where<F>(pages: &mut LruCache<PageKey, CachedPage>, matches: F) -> usize
    where
        F: Fn(&PageKey, &CachedPage) -> bool,
    {
        let keys: Vec<PageKey> = pages
            .iter()
            .filter(|(key, page)| matches(key, page))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            pages.pop(key);
        }
        keys.len()
    }
}

/// `/companions/?subject=x` and `/companions` name the same logical path.
pub fn logical_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

#[async_trait]
impl PageCache for ViewCache {
    async fn get(&self, path: &str, variant: &str) -> Option<String> {
        if self.ttl.is_zero() {
            return None;
        }
        let key = (logical_path(path), variant.to_owned());
        let mut pages = self.pages.write().await;
        if pages.peek(&key)?.is_expired() {
            pages.pop(&key);
            return None;
        }
        pages.get(&key).map(|page| page.html.clone())
    }

    async fn put(&self, path: &str, variant: &str, html: String) {
        if self.ttl.is_zero() {
            return;
        }
        let mut pages = self.pages.write().await;
        let expired = Self::remove_where(&mut pages, |_, page| page.is_expired());
        if expired > 0 {
            debug!("dropped {expired} expired pages");
        }
        pages.push(
            (logical_path(path), variant.to_owned()),
            CachedPage {
                html,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn revalidate(&self, path: &str) {
        let path = logical_path(path);
        let mut pages = self.pages.write().await;
        let removed = Self::remove_where(&mut pages, |(page_path, _), _| *page_path == path);
        if removed > 0 {
            debug!("revalidated {path} ({removed} cached variants)");
        }
    }
}
