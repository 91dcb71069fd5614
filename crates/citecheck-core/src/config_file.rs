use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_NEGATIVE_TTL, DEFAULT_POSITIVE_TTL, QueryCache};
use crate::db::SourceKind;
use crate::{Config, ConfigError};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub sources: Option<SourcesConfig>,
    pub scoring: Option<ScoringConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub cache: Option<CacheConfig>,
    pub parsing: Option<ParsingSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub s2_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Source names in query order: "crossref", "semantic_scholar", "arxiv".
    pub enabled: Option<Vec<String>>,
    pub candidate_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub title_weight: Option<f64>,
    pub author_weight: Option<f64>,
    pub year_weight: Option<f64>,
    pub verify_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
    pub db_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub base_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: Option<bool>,
    pub positive_ttl_secs: Option<u64>,
    pub negative_ttl_secs: Option<u64>,
}

/// Segmentation and parsing knobs. Applied by the parsing crate's config builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsingSection {
    pub fallback_fraction: Option<f64>,
    pub min_entry_chars: Option<usize>,
    pub max_authors: Option<usize>,
    pub section_headers: Option<Vec<String>>,
    pub end_headers: Option<Vec<String>>,
}

/// Platform config directory path: `<config_dir>/citecheck/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citecheck").join("config.toml"))
}

/// Load config by cascading CWD `.citecheck.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".citecheck.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Overlay value if set, otherwise the base value.
fn pick<S, T>(base: &Option<S>, overlay: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            s2_api_key: pick(&base.api_keys, &overlay.api_keys, |a| a.s2_api_key.clone()),
            crossref_mailto: pick(&base.api_keys, &overlay.api_keys, |a| {
                a.crossref_mailto.clone()
            }),
        }),
        sources: Some(SourcesConfig {
            enabled: pick(&base.sources, &overlay.sources, |s| s.enabled.clone()),
            candidate_limit: pick(&base.sources, &overlay.sources, |s| s.candidate_limit),
        }),
        scoring: Some(ScoringConfig {
            title_weight: pick(&base.scoring, &overlay.scoring, |s| s.title_weight),
            author_weight: pick(&base.scoring, &overlay.scoring, |s| s.author_weight),
            year_weight: pick(&base.scoring, &overlay.scoring, |s| s.year_weight),
            verify_threshold: pick(&base.scoring, &overlay.scoring, |s| s.verify_threshold),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(&base.concurrency, &overlay.concurrency, |c| c.num_workers),
            db_timeout_secs: pick(&base.concurrency, &overlay.concurrency, |c| {
                c.db_timeout_secs
            }),
            max_retries: pick(&base.concurrency, &overlay.concurrency, |c| c.max_retries),
            base_backoff_ms: pick(&base.concurrency, &overlay.concurrency, |c| {
                c.base_backoff_ms
            }),
            max_backoff_ms: pick(&base.concurrency, &overlay.concurrency, |c| c.max_backoff_ms),
        }),
        cache: Some(CacheConfig {
            enabled: pick(&base.cache, &overlay.cache, |c| c.enabled),
            positive_ttl_secs: pick(&base.cache, &overlay.cache, |c| c.positive_ttl_secs),
            negative_ttl_secs: pick(&base.cache, &overlay.cache, |c| c.negative_ttl_secs),
        }),
        parsing: Some(ParsingSection {
            fallback_fraction: pick(&base.parsing, &overlay.parsing, |p| p.fallback_fraction),
            min_entry_chars: pick(&base.parsing, &overlay.parsing, |p| p.min_entry_chars),
            max_authors: pick(&base.parsing, &overlay.parsing, |p| p.max_authors),
            section_headers: pick(&base.parsing, &overlay.parsing, |p| {
                p.section_headers.clone()
            }),
            end_headers: pick(&base.parsing, &overlay.parsing, |p| p.end_headers.clone()),
        }),
    }
}

impl ConfigFile {
    /// Apply every value set in this file on top of `config`.
    ///
    /// Unknown source names are rejected; range checks are left to
    /// [`Config::validate`].
    pub fn apply_to(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(keys) = &self.api_keys {
            if let Some(key) = &keys.s2_api_key {
                config.s2_api_key = Some(key.clone());
            }
            if let Some(mailto) = &keys.crossref_mailto {
                config.crossref_mailto = Some(mailto.clone());
            }
        }
        if let Some(sources) = &self.sources {
            if let Some(enabled) = &sources.enabled {
                config.sources = enabled
                    .iter()
                    .map(|s| s.parse::<SourceKind>())
                    .collect::<Result<Vec<_>, _>>()?;
            }
            if let Some(k) = sources.candidate_limit {
                config.candidate_limit = k;
            }
        }
        if let Some(scoring) = &self.scoring {
            if let Some(w) = scoring.title_weight {
                config.weights.title = w;
            }
            if let Some(w) = scoring.author_weight {
                config.weights.authors = w;
            }
            if let Some(w) = scoring.year_weight {
                config.weights.year = w;
            }
            if let Some(t) = scoring.verify_threshold {
                config.verify_threshold = t;
            }
        }
        if let Some(c) = &self.concurrency {
            if let Some(n) = c.num_workers {
                config.num_workers = n;
            }
            if let Some(secs) = c.db_timeout_secs {
                config.db_timeout_secs = secs;
            }
            if let Some(n) = c.max_retries {
                config.retry.max_retries = n;
            }
            if let Some(ms) = c.base_backoff_ms {
                config.retry.base_backoff = Duration::from_millis(ms);
            }
            if let Some(ms) = c.max_backoff_ms {
                config.retry.max_backoff = Duration::from_millis(ms);
            }
        }
        if let Some(cache) = &self.cache {
            if cache.enabled == Some(false) {
                config.query_cache = None;
            } else if cache.positive_ttl_secs.is_some() || cache.negative_ttl_secs.is_some() {
                let positive = cache
                    .positive_ttl_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_POSITIVE_TTL);
                let negative = cache
                    .negative_ttl_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_NEGATIVE_TTL);
                config.query_cache = Some(Arc::new(QueryCache::new(positive, negative)));
            }
        }
        Ok(())
    }
}
