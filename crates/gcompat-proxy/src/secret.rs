use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;

use crate::error::SecretError;

pub const DEFAULT_SECRET_TTL: Duration = Duration::from_secs(5 * 60);

/// Produces the credential sent to the upstream.
///
/// `get` is awaited inside the request future, so a dropped request abandons
/// any pending lookup. Callers treat an error as "no credential".
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get(&self) -> Result<String, SecretError>;
}

#[derive(Clone)]
pub struct StaticSecretSource {
    value: String,
}

impl StaticSecretSource {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn get(&self) -> Result<String, SecretError> {
        Ok(self.value.clone())
    }
}

struct Sources {
    env_var: String,
    file_path: Option<PathBuf>,
}

struct CacheEntry {
    value: String,
    resolved_at: Instant,
    generation: u64,
}

/// Secret resolved from, in order: explicit config value, environment
/// variable, file contents. The first non-empty value wins and is cached for
/// `ttl`.
///
/// The cache is a swapped snapshot tagged with a generation. Invalidation bumps
/// the generation, so a lookup that was already in flight cannot bring a stale
/// value back.
pub struct MultiSourceSecret {
    explicit: ArcSwap<String>,
    sources: ArcSwap<Sources>,
    ttl: Duration,
    cache: ArcSwapOption<CacheEntry>,
    generation: AtomicU64,
}

impl MultiSourceSecret {
    /// A zero `ttl` selects [`DEFAULT_SECRET_TTL`].
    pub fn new(
        explicit: impl Into<String>,
        env_var: impl Into<String>,
        file_path: Option<PathBuf>,
        ttl: Duration,
    ) -> Self {
        Self {
            explicit: ArcSwap::from_pointee(explicit.into()),
            sources: ArcSwap::from_pointee(Sources {
                env_var: env_var.into(),
                file_path,
            }),
            ttl: if ttl.is_zero() { DEFAULT_SECRET_TTL } else { ttl },
            cache: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn invalidate_cache(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.store(None);
    }

    /// Replaces the explicit config value and drops the cached secret.
    pub fn set_explicit_value(&self, value: impl Into<String>) {
        self.explicit.store(Arc::new(value.into()));
        self.invalidate_cache();
    }

    /// Repoints the environment variable and file lookups and drops the cached
    /// secret.
    pub fn set_sources(&self, env_var: impl Into<String>, file_path: Option<PathBuf>) {
        self.sources.store(Arc::new(Sources {
            env_var: env_var.into(),
            file_path,
        }));
        self.invalidate_cache();
    }

    async fn resolve(&self) -> Result<String, SecretError> {
        let explicit = self.explicit.load().trim().to_string();
        if !explicit.is_empty() {
            return Ok(explicit);
        }

        let sources = self.sources.load_full();
        if !sources.env_var.is_empty() {
            if let Ok(value) = std::env::var(&sources.env_var) {
                let value = value.trim();
                if !value.is_empty() {
                    return Ok(value.to_string());
                }
            }
        }

        let Some(path) = sources.file_path.as_ref() else {
            return Ok(String::new());
        };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(contents.trim().to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(SecretError::Read {
                path: path.clone(),
                source,
            }),
        }
    }
}

#[async_trait]
impl SecretSource for MultiSourceSecret {
    async fn get(&self) -> Result<String, SecretError> {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(entry) = self.cache.load_full() {
            if entry.generation == generation && entry.resolved_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }

        let value = self.resolve().await?;
        self.cache.store(Some(Arc::new(CacheEntry {
            value: value.clone(),
            resolved_at: Instant::now(),
            generation,
        })));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_env(name: &str, value: &str) {
        // Each test uses its own variable name.
        unsafe { std::env::set_var(name, value) };
    }

    #[tokio::test]
    async fn static_source_returns_value() {
        let source = StaticSecretSource::new("k");
        assert_eq!(source.get().await.unwrap(), "k");
    }

    #[tokio::test]
    async fn explicit_value_beats_env_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("key");
        std::fs::write(&file, "from-file\n").unwrap();
        set_env("GCOMPAT_TEST_SECRET_EXPLICIT", "from-env");

        let source = MultiSourceSecret::new(
            "  from-config ",
            "GCOMPAT_TEST_SECRET_EXPLICIT",
            Some(file),
            Duration::ZERO,
        );
        assert_eq!(source.get().await.unwrap(), "from-config");
        assert_eq!(source.ttl(), DEFAULT_SECRET_TTL);
    }

    #[tokio::test]
    async fn env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("key");
        std::fs::write(&file, "from-file").unwrap();
        set_env("GCOMPAT_TEST_SECRET_ENV", "from-env");

        let source =
            MultiSourceSecret::new("", "GCOMPAT_TEST_SECRET_ENV", Some(file), Duration::ZERO);
        assert_eq!(source.get().await.unwrap(), "from-env");
    }

    #[tokio::test]
    async fn file_contents_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("key");
        std::fs::write(&file, "\n  from-file \n").unwrap();

        let source =
            MultiSourceSecret::new("", "GCOMPAT_TEST_SECRET_UNSET_1", Some(file), Duration::ZERO);
        assert_eq!(source.get().await.unwrap(), "from-file");
    }

    #[tokio::test]
    async fn all_sources_empty_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = MultiSourceSecret::new(
            "",
            "GCOMPAT_TEST_SECRET_UNSET_2",
            Some(dir.path().join("missing")),
            Duration::ZERO,
        );
        assert_eq!(source.get().await.unwrap(), "");
    }

    #[tokio::test]
    async fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a string.
        let source = MultiSourceSecret::new(
            "",
            "GCOMPAT_TEST_SECRET_UNSET_3",
            Some(dir.path().to_path_buf()),
            Duration::ZERO,
        );
        assert!(matches!(
            source.get().await,
            Err(SecretError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn cached_within_ttl_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("key");
        std::fs::write(&file, "first").unwrap();
        let source =
            MultiSourceSecret::new("", "GCOMPAT_TEST_SECRET_UNSET_4", Some(file.clone()), Duration::ZERO);

        assert_eq!(source.get().await.unwrap(), "first");
        std::fs::write(&file, "second").unwrap();
        assert_eq!(source.get().await.unwrap(), "first");

        source.invalidate_cache();
        assert_eq!(source.get().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn expired_entry_is_resolved_again() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("key");
        std::fs::write(&file, "first").unwrap();
        let source = MultiSourceSecret::new(
            "",
            "GCOMPAT_TEST_SECRET_UNSET_5",
            Some(file.clone()),
            Duration::from_millis(20),
        );

        assert_eq!(source.get().await.unwrap(), "first");
        std::fs::write(&file, "second").unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(source.get().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn set_explicit_value_takes_effect_immediately() {
        let source =
            MultiSourceSecret::new("old", "GCOMPAT_TEST_SECRET_UNSET_6", None, Duration::ZERO);
        assert_eq!(source.get().await.unwrap(), "old");
        source.set_explicit_value("new");
        assert_eq!(source.get().await.unwrap(), "new");
    }

    #[tokio::test]
    async fn set_sources_repoints_file_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        std::fs::write(&old, "old-key").unwrap();
        std::fs::write(&new, "rotated-key").unwrap();
        let source =
            MultiSourceSecret::new("", "GCOMPAT_TEST_SECRET_UNSET_8", Some(old), Duration::ZERO);
        assert_eq!(source.get().await.unwrap(), "old-key");

        source.set_sources("GCOMPAT_TEST_SECRET_UNSET_8", Some(new));
        assert_eq!(source.get().await.unwrap(), "rotated-key");

        set_env("GCOMPAT_TEST_SECRET_SOURCES", "from-env");
        source.set_sources("GCOMPAT_TEST_SECRET_SOURCES", None);
        assert_eq!(source.get().await.unwrap(), "from-env");
    }

    #[tokio::test]
    async fn stale_generation_entry_is_ignored() {
        let source =
            MultiSourceSecret::new("old", "GCOMPAT_TEST_SECRET_UNSET_7", None, Duration::ZERO);
        // Simulate a lookup that finished after an invalidation.
        source.cache.store(Some(Arc::new(CacheEntry {
            value: "stale".to_string(),
            resolved_at: Instant::now(),
            generation: 0,
        })));
        source.generation.fetch_add(1, Ordering::AcqRel);
        assert_eq!(source.get().await.unwrap(), "old");
    }
}
