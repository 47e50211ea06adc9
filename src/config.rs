//! Configuration types — the closed set of recognized pipeline options.

use std::time::Duration;

use crate::error::ConfigError;

/// Pipeline paging and parallelism options.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Conversations per page.
    pub page_size: usize,
    /// Pages processed concurrently (1..=4).
    pub parallel_pages: usize,
    /// Extractor version; bumping invalidates Task ids and triggers
    /// re-materialization on the next run.
    pub extractor_version: String,
    /// Whether custom prompt overrides from user settings are honored.
    pub custom_overrides_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            parallel_pages: 1,
            extractor_version: "v1".to_string(),
            custom_overrides_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let page_size = parse_env("TRIAGE_PAGE_SIZE", defaults.page_size)?;
        let parallel_pages: usize =
            parse_env("TRIAGE_PARALLEL_PAGES", defaults.parallel_pages)?;
        if !(1..=4).contains(&parallel_pages) {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_PARALLEL_PAGES".into(),
                message: format!("must be 1..=4, got {parallel_pages}"),
            });
        }

        Ok(Self {
            page_size,
            parallel_pages,
            extractor_version: std::env::var("TRIAGE_EXTRACTOR_VERSION")
                .unwrap_or(defaults.extractor_version),
            custom_overrides_enabled: parse_env(
                "TRIAGE_CUSTOM_PROMPTS_ENABLED",
                defaults.custom_overrides_enabled,
            )?,
        })
    }
}

/// LLM gateway pacing, retry, and timeout options.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Minimum delay between classification calls.
    pub min_delay_classification: Duration,
    /// Minimum delay between extraction calls.
    pub min_delay_extraction: Duration,
    /// Maximum retries for rate-limited/transient errors.
    pub max_retries: u32,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_delay_classification: Duration::from_millis(1500),
            min_delay_extraction: Duration::from_millis(2000),
            max_retries: 3,
            timeout: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let classification_ms: u64 = parse_env(
            "TRIAGE_LLM_MIN_DELAY_CLASSIFICATION_MS",
            defaults.min_delay_classification.as_millis() as u64,
        )?;
        let extraction_ms: u64 = parse_env(
            "TRIAGE_LLM_MIN_DELAY_EXTRACTION_MS",
            defaults.min_delay_extraction.as_millis() as u64,
        )?;
        let timeout_secs: u64 =
            parse_env("TRIAGE_LLM_TIMEOUT_SECONDS", defaults.timeout.as_secs())?;

        Ok(Self {
            min_delay_classification: Duration::from_millis(classification_ms),
            min_delay_extraction: Duration::from_millis(extraction_ms),
            max_retries: parse_env("TRIAGE_LLM_MAX_RETRIES", defaults.max_retries)?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Accuracy metrics windowing and retention.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Window for active metric queries, in days.
    pub window_days: u32,
    /// Raw event retention horizon, in days.
    pub retention_days: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            retention_days: 730,
        }
    }
}

impl MetricsConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            window_days: parse_env("TRIAGE_METRICS_WINDOW_DAYS", defaults.window_days)?,
            retention_days: parse_env(
                "TRIAGE_METRICS_RETENTION_DAYS",
                defaults.retention_days,
            )?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}
