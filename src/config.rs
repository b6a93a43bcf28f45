// src/config.rs

use std::{env, time::Duration};

use dotenvy::dotenv;
use url::Url;

/// Runtime environment the server was started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(value: Option<String>) -> Self {
        match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("production") => Environment::Production,
            Some("test") => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    /// Directory holding the built client bundle, served as a fallback.
    pub static_dir: Option<String>,
    /// Browser origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub pdf_engine: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Base delay for exponential backoff; attempt `n` waits `base * 2^n`.
    pub retry_base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Deadline for one search call; expiry is reported to the model as a failed search.
    pub timeout: Duration,
}

impl SearchConfig {
    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct QuizConfig {
    pub min_questions: u32,
    pub max_questions: u32,
    /// Lifetime of stored quizzes and their results.
    pub ttl: Duration,
    /// Lifetime of an in-flight processing record.
    pub processing_ttl: Duration,
    /// How long a completed/failed processing record stays pollable.
    pub status_retention: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub max_files: usize,
    pub allowed_file_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub quizzes_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub ai: AiConfig,
    pub search: SearchConfig,
    pub store: StoreConfig,
    pub quiz: QuizConfig,
    pub upload: UploadConfig,
    pub rate_limit: RateLimitConfig,
    pub rust_log: String,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let environment = Environment::parse(var("APP_ENV"));
        let default_host = if environment == Environment::Production {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        };

        let server = ServerConfig {
            host: var("HOST").unwrap_or_else(|| default_host.to_string()),
            port: parse_bounded(var("PORT"), 3000, 1, 65535) as u16,
            environment,
            static_dir: var("STATIC_DIR"),
            cors_origins: parse_list(
                var("CORS_ORIGINS"),
                &["http://localhost:3000", "http://localhost:5173"],
            ),
        };

        let ai = AiConfig {
            api_key: var("AI_API_KEY").unwrap_or_default(),
            base_url: var("AI_BASE_URL")
                .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            model: var("AI_MODEL").unwrap_or_else(|| "google/gemini-2.5-flash".to_string()),
            pdf_engine: var("PDF_PROCESSING_ENGINE").unwrap_or_else(|| "native".to_string()),
            temperature: parse_float_bounded(var("AI_TEMPERATURE"), 0.3, 0.0, 1.0),
            max_tokens: parse_bounded(var("AI_MAX_TOKENS"), 4000, 100, 8000) as u32,
            timeout: Duration::from_millis(parse_bounded(
                var("AI_TIMEOUT_MS"),
                120_000,
                30_000,
                300_000,
            )),
            max_retries: parse_bounded(var("AI_MAX_RETRIES"), 2, 0, 5) as u32,
            retry_base_delay: Duration::from_secs(1),
        };

        let search = SearchConfig {
            api_key: var("SEARCH_API_KEY"),
            base_url: var("SEARCH_BASE_URL").unwrap_or_else(|| "https://api.tavily.com".to_string()),
            timeout: Duration::from_millis(parse_bounded(
                var("SEARCH_TIMEOUT_MS"),
                15_000,
                1_000,
                60_000,
            )),
        };

        let store = StoreConfig {
            url: var("STORE_URL").unwrap_or_else(|| "memory://".to_string()),
        };

        let quiz = QuizConfig {
            min_questions: parse_bounded(var("MIN_QUIZ_LENGTH"), 5, 1, 50) as u32,
            max_questions: parse_bounded(var("MAX_QUIZ_LENGTH"), 50, 10, 100) as u32,
            ttl: Duration::from_secs(parse_bounded(var("QUIZ_TTL"), 86_400, 3_600, 604_800)),
            processing_ttl: Duration::from_secs(parse_bounded(
                var("PROCESSING_TTL"),
                300,
                30,
                3_600,
            )),
            status_retention: Duration::from_secs(parse_bounded(
                var("STATUS_RETENTION"),
                60,
                5,
                3_600,
            )),
        };

        let upload = UploadConfig {
            max_file_size: parse_bounded(var("MAX_FILE_SIZE"), 10 * 1024 * 1024, 1, u64::MAX)
                as usize,
            max_files: parse_bounded(var("MAX_FILES_COUNT"), 5, 1, 20) as usize,
            allowed_file_types: parse_list(
                var("ALLOWED_FILE_TYPES"),
                &["application/pdf"],
            ),
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_bool(var("ENABLE_RATE_LIMITING"), true),
            quizzes_per_minute: parse_bounded(var("RATE_LIMIT_QUIZZES_PER_MINUTE"), 2, 1, 100)
                as u32,
        };

        Self {
            server,
            ai,
            search,
            store,
            quiz,
            upload,
            rate_limit,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_dir: var("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        }
    }

    /// Returns every fatal configuration problem. Empty means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.ai.api_key.trim().is_empty() {
            errors.push("AI_API_KEY is required and must be set to a valid API key".to_string());
        }
        if Url::parse(&self.ai.base_url).is_err() {
            errors.push(format!("AI_BASE_URL is not a valid URL: {}", self.ai.base_url));
        }
        if Url::parse(&self.search.base_url).is_err() {
            errors.push(format!(
                "SEARCH_BASE_URL is not a valid URL: {}",
                self.search.base_url
            ));
        }
        if self.quiz.min_questions >= self.quiz.max_questions {
            errors.push("MIN_QUIZ_LENGTH must be less than MAX_QUIZ_LENGTH".to_string());
        }
        if self.upload.allowed_file_types.is_empty() {
            errors.push("ALLOWED_FILE_TYPES must list at least one MIME type".to_string());
        }

        errors
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parses an integer, falling back to `default` when missing, malformed or out of range.
fn parse_bounded(value: Option<String>, default: u64, min: u64, max: u64) -> u64 {
    match value.and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(parsed) if parsed >= min && parsed <= max => parsed,
        _ => default,
    }
}

fn parse_float_bounded(value: Option<String>, default: f32, min: f32, max: f32) -> f32 {
    match value.and_then(|v| v.trim().parse::<f32>().ok()) {
        Some(parsed) if parsed >= min && parsed <= max => parsed,
        _ => default,
    }
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    value.map_or(default, |v| v.trim().eq_ignore_ascii_case("true"))
}

fn parse_list(value: Option<String>, default: &[&str]) -> Vec<String> {
    match value {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bounded_falls_back_outside_range() {
        assert_eq!(parse_bounded(Some("7".into()), 5, 1, 50), 7);
        assert_eq!(parse_bounded(Some("0".into()), 5, 1, 50), 5);
        assert_eq!(parse_bounded(Some("500".into()), 5, 1, 50), 5);
        assert_eq!(parse_bounded(Some("abc".into()), 5, 1, 50), 5);
        assert_eq!(parse_bounded(None, 5, 1, 50), 5);
    }

    #[test]
    fn test_parse_float_bounded() {
        assert_eq!(parse_float_bounded(Some("0.7".into()), 0.3, 0.0, 1.0), 0.7);
        assert_eq!(parse_float_bounded(Some("1.5".into()), 0.3, 0.0, 1.0), 0.3);
    }

    #[test]
    fn test_parse_list_trims_and_drops_empty() {
        let list = parse_list(Some(" a , ,b".into()), &["x"]);
        assert_eq!(list, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(parse_list(None, &["x"]), vec!["x".to_string()]);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("TRUE".into()), false));
        assert!(!parse_bool(Some("no".into()), true));
        assert!(parse_bool(None, true));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse(Some("Production".into())), Environment::Production);
        assert_eq!(Environment::parse(None), Environment::Development);
    }
}
