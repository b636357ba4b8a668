// 共通ユーティリティ関数

use regex::Regex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// プレイバックURLから配信チャンネルIDを抽出
///
/// `...channel.<ID>.m3u8` の形式を想定する。
pub fn extract_stream_id(playback_url: &str) -> Option<String> {
    Regex::new(r"channel\.([A-Za-z0-9]+)\.m3u8")
        .unwrap()
        .captures(playback_url)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// プレイバックURLの簡易バリデーション
pub fn validate_playback_url(url: &str) -> bool {
    (url.starts_with("https://") || url.starts_with("http://")) && url.ends_with(".m3u8")
}

/// 時刻フォーマット（チャット表示用）
pub fn format_timestamp(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    timestamp.format("%H:%M:%S").to_string()
}

/// 強化されたログ初期化
///
/// ファイル出力が有効な場合はローテーション付きで併用し、
/// フラッシュ用のguardを返す（呼び出し側で保持すること）。
pub fn init_logging(config: &LogConfig) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_str()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    if config.enable_file_logging {
        let log_dir = config
            .log_dir
            .clone()
            .unwrap_or_else(|| std::path::PathBuf::from("logs"));
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "gghub.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .try_init()?;

        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(None)
    }
}
