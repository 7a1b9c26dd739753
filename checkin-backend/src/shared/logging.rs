use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Once;

use chrono::Utc;

use crate::shared::config::{self, LogFormat, LogMode, LoggingConfig};

static INIT: Once = Once::new();

/// Installs the global logger once, according to `config::logging_config()`.
///
/// `LOG_FORMAT=json` emits one JSON object per line (`ts`, `level`, `target`, `msg`);
/// anything else emits plain text. `LOG_MODE=file` appends to `LOG_DIR/LOG_FILE_NAME`
/// and falls back to stdout when the file cannot be opened. Problems hit while setting
/// up the sink are reported as warnings once the logger is live.
///
/// # Examples
///
/// ```
/// checkin_backend::logging::init();
/// checkin_backend::logging::init(); // second call is a no-op
/// log::info!("[checkin] logger ready");
/// ```
pub fn init() {
    INIT.call_once(|| {
        let cfg = config::logging_config().clone();
        let mut init_warnings = Vec::new();
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

        let format = cfg.format.clone();
        builder.format(move |buf, record| {
            let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            let line = format_line(
                &format,
                &ts,
                &record.level().to_string(),
                record.target(),
                &record.args().to_string(),
            );
            writeln!(buf, "{}", line)
        });

        match cfg.mode {
            LogMode::Stdout => {
                builder.target(env_logger::Target::Stdout);
            }
            LogMode::File => match open_log_file(&cfg) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(warning) => {
                    init_warnings.push(warning);
                    builder.target(env_logger::Target::Stdout);
                }
            },
        }

        let _ = builder.try_init();
        for warning in init_warnings {
            log::warn!("{}", warning);
        }
    });
}

fn format_line(format: &LogFormat, ts: &str, level: &str, target: &str, msg: &str) -> String {
    match format {
        LogFormat::Json => serde_json::json!({
            "ts": ts,
            "level": level,
            "target": target,
            "msg": msg,
        })
        .to_string(),
        LogFormat::Text => format!("{} {} {} {}", ts, level, target, msg),
    }
}

fn open_log_file(cfg: &LoggingConfig) -> Result<File, String> {
    let dir = cfg.dir.as_deref().unwrap_or("logs");
    std::fs::create_dir_all(dir)
        .map_err(|err| format!("[logging] failed to create log dir {}: {}", dir, err))?;
    let path = Path::new(dir).join(&cfg.file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| {
            format!(
                "[logging] failed to open log file ({}): {}",
                path.display(),
                err
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_are_parseable() {
        let line = format_line(
            &LogFormat::Json,
            "2024-01-01T00:00:00.000Z",
            "INFO",
            "checkin_backend::service::cache",
            "[cache] hit key=abcd1234",
        );
        let value: serde_json::Value = serde_json::from_str(&line).expect("json line");
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["msg"], "[cache] hit key=abcd1234");
    }

    #[test]
    fn text_lines_keep_field_order() {
        let line = format_line(&LogFormat::Text, "ts", "WARN", "target", "msg");
        assert_eq!(line, "ts WARN target msg");
    }

    #[test]
    fn open_log_file_creates_missing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("nested/logs");
        let cfg = LoggingConfig {
            mode: LogMode::File,
            format: LogFormat::Text,
            dir: Some(dir.to_string_lossy().into_owned()),
            file_name: "checkin.log".to_string(),
        };
        open_log_file(&cfg).expect("open log file");
        assert!(dir.join("checkin.log").exists());
    }
}
