use crate::services::providers::gemini::GEMINI_API_BASE;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Default request timeout for the model provider, in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default multipart upload limit (10MB).
const DEFAULT_UPLOAD_MAX_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct XrayConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub provider: ProviderKind,
    pub models: ModelConfig,
    pub google: GoogleConfig,
    pub upload: UploadConfig,
}

/// Which backend answers analysis requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Mock,
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "GENAI_PROVIDER must be 'gemini' or 'mock', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Vision-capable model used for X-ray analysis (e.g., gemini-2.0-flash)
    pub vision_model: String,
    /// Optional sampling temperature
    pub temperature: Option<f32>,
    /// Transport timeout for one model call
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub api_key: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl XrayConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let provider: ProviderKind = get_env("GENAI_PROVIDER", Some("gemini"), is_prod)?.parse()?;

        // The key is only needed when talking to Gemini
        let api_key = match provider {
            ProviderKind::Gemini => get_env("GOOGLE_API_KEY", None, is_prod)?,
            ProviderKind::Mock => env::var("GOOGLE_API_KEY").unwrap_or_default(),
        };

        let temperature = match env::var("GENAI_TEMPERATURE") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_env("GENAI_TEMPERATURE", &raw)?),
            _ => None,
        };

        Ok(XrayConfig {
            common: common_config,
            provider,
            models: ModelConfig {
                vision_model: get_env("GENAI_VISION_MODEL", Some("gemini-2.0-flash"), is_prod)?,
                temperature,
                request_timeout_secs: parse_env(
                    "GENAI_REQUEST_TIMEOUT_SECS",
                    &get_env(
                        "GENAI_REQUEST_TIMEOUT_SECS",
                        Some(&DEFAULT_REQUEST_TIMEOUT_SECS.to_string()),
                        is_prod,
                    )?,
                )?,
            },
            google: GoogleConfig {
                api_key,
                api_base: get_env("GEMINI_API_BASE", Some(GEMINI_API_BASE), is_prod)?,
            },
            upload: UploadConfig {
                max_bytes: parse_env(
                    "UPLOAD_MAX_BYTES",
                    &get_env(
                        "UPLOAD_MAX_BYTES",
                        Some(&DEFAULT_UPLOAD_MAX_BYTES.to_string()),
                        is_prod,
                    )?,
                )?,
            },
        })
    }

    /// Configuration for tests and local runs backed by the mock provider.
    pub fn for_mock(port: u16) -> Self {
        XrayConfig {
            common: core_config::Config {
                port,
                ..Default::default()
            },
            provider: ProviderKind::Mock,
            models: ModelConfig {
                vision_model: "mock-vision".to_string(),
                temperature: None,
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            google: GoogleConfig {
                api_key: String::new(),
                api_base: GEMINI_API_BASE.to_string(),
            },
            upload: UploadConfig {
                max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
            },
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}
