use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub upload_temp_dir: PathBuf,
    pub upload_max_bytes: u64,
}

impl ServerConfig {
    /// Builds the HTTP surface configuration from the environment.
    ///
    /// - `CHECKIN_HTTP_ADDR` (default `0.0.0.0:4000`)
    /// - `UPLOAD_TEMP_DIR` (default `uploads/temp`)
    /// - `UPLOAD_MAX_BYTES` (default 10 MiB)
    ///
    /// Fails when `CHECKIN_HTTP_ADDR` is not a valid socket address or the
    /// upload cap is zero.
    pub fn from_env() -> Result<Self> {
        let raw_addr =
            std::env::var("CHECKIN_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:4000".to_string());
        let http_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("CHECKIN_HTTP_ADDR is invalid ({}): {}", raw_addr, e))?;
        let upload_temp_dir = PathBuf::from(
            env_non_empty("UPLOAD_TEMP_DIR").unwrap_or_else(|| "uploads/temp".to_string()),
        );
        let upload_max_bytes = env_u64("UPLOAD_MAX_BYTES", 10 * 1024 * 1024);
        if upload_max_bytes == 0 {
            return Err(anyhow!("UPLOAD_MAX_BYTES must be greater than 0"));
        }
        Ok(Self {
            http_addr,
            upload_temp_dir,
            upload_max_bytes,
        })
    }
}

#[derive(Clone, Debug)]
pub struct AiConfig {
    pub assemblyai_api_key: Option<String>,
    pub assemblyai_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub google_tts_api_key: Option<String>,
    pub google_tts_base_url: String,
    pub tts_voice_name: String,
    pub tts_language_code: String,
}

impl AiConfig {
    fn from_env() -> Self {
        Self {
            assemblyai_api_key: env_non_empty("ASSEMBLYAI_API_KEY"),
            assemblyai_base_url: env_non_empty("ASSEMBLYAI_BASE_URL")
                .unwrap_or_else(|| "https://api.assemblyai.com/v2".to_string()),
            openai_api_key: env_non_empty("OPENAI_API_KEY"),
            openai_base_url: env_non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_model: env_non_empty("OPENAI_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            google_tts_api_key: env_non_empty("GOOGLE_TTS_API_KEY"),
            google_tts_base_url: env_non_empty("GOOGLE_TTS_BASE_URL")
                .unwrap_or_else(|| "https://texttospeech.googleapis.com/v1".to_string()),
            tts_voice_name: env_non_empty("TTS_VOICE_NAME")
                .unwrap_or_else(|| "en-US-Standard-C".to_string()),
            tts_language_code: env_non_empty("TTS_LANGUAGE_CODE")
                .unwrap_or_else(|| "en-US".to_string()),
        }
    }
}

static AI_CONFIG: OnceLock<AiConfig> = OnceLock::new();

pub fn ai_config() -> &'static AiConfig {
    AI_CONFIG.get_or_init(AiConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct CoachingConfig {
    /// Raw `COACHING_MODE`; validated by the mode resolver, not here.
    pub default_mode: Option<String>,
    pub tts_enabled: bool,
}

impl CoachingConfig {
    fn from_env() -> Self {
        Self {
            default_mode: env_non_empty("COACHING_MODE"),
            tts_enabled: env_bool("ENABLE_TTS", true),
        }
    }
}

static COACHING_CONFIG: OnceLock<CoachingConfig> = OnceLock::new();

pub fn coaching_config() -> &'static CoachingConfig {
    COACHING_CONFIG.get_or_init(CoachingConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl CacheConfig {
    fn from_env() -> Self {
        let max_entries = env_u64("CACHE_MAX_ENTRIES", 1000).max(1);
        Self {
            ttl: env_duration_sec("CACHE_TTL_SEC", 24 * 60 * 60),
            max_entries: usize::try_from(max_entries).unwrap_or(usize::MAX),
        }
    }
}

static CACHE_CONFIG: OnceLock<CacheConfig> = OnceLock::new();

pub fn cache_config() -> &'static CacheConfig {
    CACHE_CONFIG.get_or_init(CacheConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub audio_dir: PathBuf,
    pub audio_url_prefix: String,
    pub tts_file_ttl: Duration,
}

impl StorageConfig {
    fn from_env() -> Self {
        let audio_url_prefix = env_non_empty("AUDIO_URL_PREFIX")
            .unwrap_or_else(|| "/audio".to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            audio_dir: PathBuf::from(
                env_non_empty("AUDIO_DIR").unwrap_or_else(|| "uploads/audio".to_string()),
            ),
            audio_url_prefix,
            tts_file_ttl: env_duration_sec("TTS_FILE_TTL_SEC", 60 * 60),
        }
    }
}

static STORAGE_CONFIG: OnceLock<StorageConfig> = OnceLock::new();

pub fn storage_config() -> &'static StorageConfig {
    STORAGE_CONFIG.get_or_init(StorageConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct RetentionConfig {
    pub sentiment_retention_days: u32,
    pub coaching_session_retention_hours: u32,
    pub coaching_session_ttl: Duration,
}

impl RetentionConfig {
    fn from_env() -> Self {
        // Two clocks on purpose: the session row outlives its audio file.
        Self {
            sentiment_retention_days: env_u32("SENTIMENT_RETENTION_DAYS", 30),
            coaching_session_retention_hours: env_u32("COACHING_SESSION_RETENTION_HOURS", 24),
            coaching_session_ttl: env_duration_sec("COACHING_SESSION_TTL_SEC", 60 * 60),
        }
    }
}

static RETENTION_CONFIG: OnceLock<RetentionConfig> = OnceLock::new();

pub fn retention_config() -> &'static RetentionConfig {
    RETENTION_CONFIG.get_or_init(RetentionConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct CleanupConfig {
    pub interval: Duration,
    pub shutdown_timeout: Duration,
}

impl CleanupConfig {
    fn from_env() -> Self {
        let interval_min = env_u64("CLEANUP_INTERVAL_MIN", 30).max(1);
        Self {
            interval: Duration::from_secs(interval_min * 60),
            shutdown_timeout: env_duration_sec("SHUTDOWN_TIMEOUT_SEC", 10),
        }
    }
}

static CLEANUP_CONFIG: OnceLock<CleanupConfig> = OnceLock::new();

pub fn cleanup_config() -> &'static CleanupConfig {
    CLEANUP_CONFIG.get_or_init(CleanupConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryConfig {
    fn from_env() -> Self {
        Self {
            max_attempts: env_u32("PROVIDER_MAX_ATTEMPTS", 3).max(1),
            base_delay: env_duration_ms("PROVIDER_RETRY_BASE_MS", 1_000),
        }
    }
}

static RETRY_CONFIG: OnceLock<RetryConfig> = OnceLock::new();

pub fn retry_config() -> &'static RetryConfig {
    RETRY_CONFIG.get_or_init(RetryConfig::from_env)
}

#[derive(Clone, Debug)]
pub struct Timeouts {
    pub ai_http: Duration,
    pub transcript_poll_interval: Duration,
    pub transcript_poll_timeout: Duration,
    pub audio_io: Duration,
}

impl Timeouts {
    fn from_env() -> Self {
        // Defaults: AI HTTP 20s, transcript poll every 1s for at most 30s, audio file I/O 5s.
        // Timeout behavior: vendor clients return an error; static audio delivery returns 504.
        Self {
            ai_http: env_duration_ms("AI_HTTP_TIMEOUT_MS", 20_000),
            transcript_poll_interval: env_duration_ms("TRANSCRIPT_POLL_INTERVAL_MS", 1_000),
            transcript_poll_timeout: env_duration_ms("TRANSCRIPT_POLL_TIMEOUT_MS", 30_000),
            audio_io: env_duration_ms("AUDIO_IO_TIMEOUT_MS", 5_000),
        }
    }
}

static TIMEOUTS: OnceLock<Timeouts> = OnceLock::new();

pub fn timeouts() -> &'static Timeouts {
    TIMEOUTS.get_or_init(Timeouts::from_env)
}

/// PostgreSQL DSN. When absent the binary falls back to in-memory stores.
pub fn database_url() -> Option<String> {
    env_non_empty("DATABASE_URL")
}

#[derive(Clone, Debug)]
pub enum LogMode {
    Stdout,
    File,
}

#[derive(Clone, Debug)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub mode: LogMode,
    pub format: LogFormat,
    pub dir: Option<String>,
    pub file_name: String,
}

impl LoggingConfig {
    fn from_env() -> Self {
        let dir_env = std::env::var("LOG_DIR").ok();
        let mode_env = std::env::var("LOG_MODE").ok();
        let format_env = std::env::var("LOG_FORMAT").ok();

        let format = match format_env.as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let mode = match mode_env.as_deref() {
            Some("file") => LogMode::File,
            Some("stdout") => LogMode::Stdout,
            _ => {
                if dir_env.is_some() {
                    LogMode::File
                } else {
                    LogMode::Stdout
                }
            }
        };

        let dir = match mode {
            LogMode::File => Some(dir_env.unwrap_or_else(|| "logs".to_string())),
            LogMode::Stdout => None,
        };

        let file_name =
            std::env::var("LOG_FILE_NAME").unwrap_or_else(|_| "checkin.log".to_string());

        Self {
            mode,
            format,
            dir,
            file_name,
        }
    }
}

static LOGGING: OnceLock<LoggingConfig> = OnceLock::new();

pub fn logging_config() -> &'static LoggingConfig {
    LOGGING.get_or_init(LoggingConfig::from_env)
}

fn env_duration_ms(key: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn env_duration_sec(key: &str, default_sec: u64) -> Duration {
    let sec = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_sec);
    Duration::from_secs(sec)
}

fn env_bool(key: &str, default_value: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| parse_bool(&value))
        .unwrap_or(default_value)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u32(key: &str, default_value: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default_value)
}

fn env_u64(key: &str, default_value: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_truthy_values() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" YES "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("maybe"));
    }

    #[test]
    fn env_helpers_fall_back_on_unparsable_values() {
        std::env::set_var("CHECKIN_TEST_BAD_U64", "not-a-number");
        assert_eq!(env_u64("CHECKIN_TEST_BAD_U64", 42), 42);
        assert_eq!(
            env_duration_ms("CHECKIN_TEST_BAD_U64", 250),
            Duration::from_millis(250)
        );
        std::env::remove_var("CHECKIN_TEST_BAD_U64");
    }

    #[test]
    fn env_non_empty_ignores_blank_values() {
        std::env::set_var("CHECKIN_TEST_BLANK", "   ");
        assert_eq!(env_non_empty("CHECKIN_TEST_BLANK"), None);
        std::env::set_var("CHECKIN_TEST_BLANK", " value ");
        assert_eq!(env_non_empty("CHECKIN_TEST_BLANK").as_deref(), Some("value"));
        std::env::remove_var("CHECKIN_TEST_BLANK");
    }
}
