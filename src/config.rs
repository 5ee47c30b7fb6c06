//! Configuration loader: merges defaults, .env, a TOML file and env vars.

use std::path::Path;
use std::time::Duration;

use common::config::CrawlerConfig;
use common::{Error, YearMonth};

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const MAX_DOWNLOAD_DELAY_SECS: f64 = 3600.0;

fn parse_non_negative_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number >= 0")))?;
    if parsed < 0.0 {
        return Err(Error::Config(format!("{env_name} must be a number >= 0")));
    }
    Ok(parsed)
}

fn parse_positive<T>(raw: &str, env_name: &str) -> Result<T, Error>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed = raw
        .trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed <= T::default() {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

/// Split a comma separated region list, dropping blanks.
pub fn parse_regions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn validate_config(config: &CrawlerConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();
    let crawl = &config.crawl;
    let http = &config.http;

    if crawl.regions.is_empty() {
        issues.push("crawl.regions must contain at least one region".into());
    }
    for region in &crawl.regions {
        if region.is_empty() || !region.chars().all(|c| c.is_ascii_digit()) {
            issues.push(format!("crawl.regions: '{}' is not a numeric region ID", region));
        }
    }
    if crawl.end_month < crawl.start_month {
        issues.push(format!(
            "crawl.end_month ({}) must not be before crawl.start_month ({})",
            crawl.end_month, crawl.start_month
        ));
    }
    if crawl.output_dir.as_os_str().is_empty() {
        issues.push("crawl.output_dir must not be empty".into());
    }
    if let Some(delay) = crawl.download_delay_secs {
        if !(delay >= 0.0 && delay.is_finite()) {
            issues.push("crawl.download_delay_secs must be a number >= 0".into());
        } else if delay > MAX_DOWNLOAD_DELAY_SECS || Duration::try_from_secs_f64(delay).is_err() {
            issues.push(format!(
                "crawl.download_delay_secs must be at most {} seconds",
                MAX_DOWNLOAD_DELAY_SECS
            ));
        }
    }
    if crawl.max_empty_page_attempts == 0 {
        issues.push("crawl.max_empty_page_attempts must be > 0".into());
    }
    if crawl.max_concurrent_spiders == 0 {
        issues.push("crawl.max_concurrent_spiders must be > 0".into());
    }

    if !(http.base_url.starts_with("http://") || http.base_url.starts_with("https://")) {
        issues.push("http.base_url must start with http:// or https://".into());
    }
    if http.user_agent.trim().is_empty() {
        issues.push("http.user_agent must not be empty".into());
    }
    if http.request_timeout_secs == 0 {
        issues.push("http.request_timeout_secs must be > 0".into());
    }
    if http.max_requests_per_sec == 0 {
        issues.push("http.max_requests_per_sec must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load crawler configuration from an optional TOML file and environment.
///
/// `path` overrides the default `config.toml`; an explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<CrawlerConfig, Error> {
    // 1. Load .env file from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults, then the TOML file if present.
    let mut config = CrawlerConfig::default();

    let config_path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
        tracing::debug!("Loaded {}", config_path.display());
    } else if path.is_some() {
        return Err(Error::Config(format!(
            "Config file {} does not exist",
            config_path.display()
        )));
    }

    // 3. Override with environment variables.
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    Ok(config)
}

/// Apply `ZKB_*` overrides. `lookup` abstracts the environment for tests.
pub fn apply_env_overrides<F>(config: &mut CrawlerConfig, lookup: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("ZKB_BASE_URL") {
        config.http.base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(agent) = lookup("ZKB_USER_AGENT") {
        config.http.user_agent = agent;
    }
    if let Some(raw) = lookup("ZKB_REQUEST_TIMEOUT_SECS") {
        config.http.request_timeout_secs = parse_positive(&raw, "ZKB_REQUEST_TIMEOUT_SECS")?;
    }
    if let Some(raw) = lookup("ZKB_MAX_REQUESTS_PER_SEC") {
        config.http.max_requests_per_sec = parse_positive(&raw, "ZKB_MAX_REQUESTS_PER_SEC")?;
    }
    if let Some(raw) = lookup("ZKB_REGIONS") {
        config.crawl.regions = parse_regions(&raw);
    }
    if let Some(raw) = lookup("ZKB_START_MONTH") {
        config.crawl.start_month = raw.parse::<YearMonth>()?;
    }
    if let Some(raw) = lookup("ZKB_END_MONTH") {
        config.crawl.end_month = raw.parse::<YearMonth>()?;
    }
    if let Some(dir) = lookup("ZKB_OUTPUT_DIR") {
        config.crawl.output_dir = dir.trim().into();
    }
    if let Some(raw) = lookup("ZKB_DOWNLOAD_DELAY_SECS") {
        config.crawl.download_delay_secs =
            Some(parse_non_negative_f64(&raw, "ZKB_DOWNLOAD_DELAY_SECS")?);
    }
    if let Some(raw) = lookup("ZKB_RANDOMIZE_DOWNLOAD_DELAY") {
        config.crawl.randomize_download_delay = parse_bool(&raw);
    }
    if let Some(raw) = lookup("ZKB_MAX_EMPTY_PAGE_ATTEMPTS") {
        config.crawl.max_empty_page_attempts = parse_positive(&raw, "ZKB_MAX_EMPTY_PAGE_ATTEMPTS")?;
    }
    if let Some(raw) = lookup("ZKB_MAX_CONCURRENT_SPIDERS") {
        config.crawl.max_concurrent_spiders = parse_positive(&raw, "ZKB_MAX_CONCURRENT_SPIDERS")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&CrawlerConfig::default()).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = CrawlerConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("ZKB_REGIONS", "10000043, 10000030,"),
                ("ZKB_START_MONTH", "2016-01"),
                ("ZKB_END_MONTH", "2016-03"),
                ("ZKB_DOWNLOAD_DELAY_SECS", "1.5"),
                ("ZKB_RANDOMIZE_DOWNLOAD_DELAY", "off"),
                ("ZKB_MAX_EMPTY_PAGE_ATTEMPTS", "4"),
                ("ZKB_BASE_URL", "http://localhost:8080/"),
            ]),
        )
        .expect("overrides");

        assert_eq!(cfg.crawl.regions, vec!["10000043", "10000030"]);
        assert_eq!(cfg.crawl.start_month.to_string(), "2016-01");
        assert_eq!(cfg.crawl.end_month.to_string(), "2016-03");
        assert_eq!(cfg.crawl.download_delay_secs, Some(1.5));
        assert!(!cfg.crawl.randomize_download_delay);
        assert_eq!(cfg.crawl.max_empty_page_attempts, 4);
        assert_eq!(cfg.http.base_url, "http://localhost:8080");
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut cfg = CrawlerConfig::default();
        assert!(apply_env_overrides(&mut cfg, env(&[("ZKB_MAX_EMPTY_PAGE_ATTEMPTS", "0")])).is_err());
        assert!(apply_env_overrides(&mut cfg, env(&[("ZKB_DOWNLOAD_DELAY_SECS", "-1")])).is_err());
        assert!(apply_env_overrides(&mut cfg, env(&[("ZKB_START_MONTH", "2015/05")])).is_err());
        assert!(apply_env_overrides(&mut cfg, env(&[("ZKB_END_MONTH", "2147483647-12")])).is_err());
    }

    #[test]
    fn test_validation_collects_all_issues() {
        let mut cfg = CrawlerConfig::default();
        cfg.crawl.regions.clear();
        cfg.crawl.start_month = "2018-06".parse().expect("month");
        cfg.crawl.max_empty_page_attempts = 0;
        cfg.crawl.download_delay_secs = Some(-0.5);

        let err = validate_config(&cfg).expect_err("invalid").to_string();
        assert!(err.contains("crawl.regions"));
        assert!(err.contains("crawl.end_month"));
        assert!(err.contains("max_empty_page_attempts"));
        assert!(err.contains("download_delay_secs"));
    }

    #[test]
    fn test_oversized_delay_rejected() {
        let mut cfg = CrawlerConfig::default();
        cfg.crawl.download_delay_secs = Some(1e20);
        let err = validate_config(&cfg).expect_err("invalid").to_string();
        assert!(err.contains("download_delay_secs must be at most"));

        cfg.crawl.download_delay_secs = Some(MAX_DOWNLOAD_DELAY_SECS);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_non_numeric_region_rejected() {
        let mut cfg = CrawlerConfig::default();
        cfg.crawl.regions = vec!["The Forge".into()];
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("crawl.toml");
        std::fs::write(
            &path,
            r#"
[http]
max_requests_per_sec = 20

[crawl]
regions = ["10000002"]
start_month = "2017-01"
end_month = "2017-02"
output_dir = "out"
"#,
        )
        .expect("write");

        let cfg = load_config(Some(&path)).expect("config");
        assert_eq!(cfg.http.max_requests_per_sec, 20);
        assert_eq!(cfg.crawl.regions, vec!["10000002"]);
        assert_eq!(cfg.crawl.output_dir, std::path::PathBuf::from("out"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/crawl.toml"))).is_err());
    }
}
