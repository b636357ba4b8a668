//! アプリケーション設定管理モジュール
//!
//! XDGディレクトリを使用した設定ファイルの永続化と管理を提供します。
//! 資格情報は環境変数で上書きできる（設定ファイルには書かない運用を推奨）。

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// 配信設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// HLSマニフェストのプレイバックURL
    pub playback_url: String,
    /// 配信識別子（空ならプレイバックURLから抽出する）
    #[serde(default)]
    pub stream_id: String,
    /// ライブ状態のポーリング間隔（秒）
    pub poll_interval_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            playback_url:
                "https://playback.live-video.example.com/api/video/v1/channel.aVHZaA2R5mCI.m3u8"
                    .to_string(),
            stream_id: String::new(),
            poll_interval_secs: 5,
        }
    }
}

/// チャット永続化テーブル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// テーブルサービスのエンドポイント
    pub endpoint: String,
    /// テーブル名
    pub table_name: String,
    /// リージョン
    pub region: String,
    /// APIキー（環境変数 GGHUB_STORE_API_KEY で上書き可）
    #[serde(default)]
    pub api_key: Option<String>,
    /// リクエストタイムアウト（秒）
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://tables.us-west-2.example.com".to_string(),
            table_name: "GlobalGaming-LiveChat".to_string(),
            region: "us-west-2".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

/// 推論エンドポイント設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// 推論サービスのエンドポイント
    pub endpoint: String,
    /// モデルID
    pub model_id: String,
    /// APIキー（環境変数 GGHUB_INFERENCE_API_KEY で上書き可）
    #[serde(default)]
    pub api_key: Option<String>,
    /// 感情分析の最大トークン数
    pub max_tokens: u32,
    /// 感情分析の温度
    pub temperature: f32,
    /// バッジ講評の最大トークン数
    pub badge_max_tokens: u32,
    /// バッジ講評の温度
    pub badge_temperature: f32,
    /// リクエストタイムアウト（秒）
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://inference.us-west-2.example.com".to_string(),
            model_id: "anthropic.claude-3-haiku-20240307-v1:0".to_string(),
            api_key: None,
            max_tokens: 1500,
            temperature: 0.3,
            badge_max_tokens: 1000,
            badge_temperature: 0.2,
            timeout_secs: 30,
        }
    }
}

/// チャット表示・生成設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// 履歴ロード件数
    pub history_limit: usize,
    /// 表示ウィンドウ（バナー込みの総件数）
    pub window_size: usize,
    /// デモトラフィック生成の有効化
    pub demo_traffic: bool,
    /// デモ生成のtick間隔（秒）
    pub demo_interval_secs: u64,
    /// tickごとの生成確率（0.0〜1.0）
    pub demo_probability: f64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            window_size: 50,
            demo_traffic: true,
            demo_interval_secs: 4,
            demo_probability: 0.35,
        }
    }
}

/// 分析ウィジェット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// 自動リフレッシュ間隔（秒）
    pub refresh_interval_secs: u64,
    /// 1サイクルで取得するセッションメッセージ数
    pub message_fetch_limit: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 120,
            message_fetch_limit: 100,
        }
    }
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// カスタムログディレクトリ（Noneの場合はXDGデフォルト使用）
    pub log_dir: Option<PathBuf>,
    /// ログレベル (trace/debug/info/warn/error)
    pub log_level: String,
    /// ファイル出力有効化
    pub enable_file_logging: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_level: "info".to_string(),
            enable_file_logging: false,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// 環境変数から資格情報を取り込む
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("GGHUB_STORE_API_KEY") {
            if !key.is_empty() {
                self.store.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("GGHUB_INFERENCE_API_KEY") {
            if !key.is_empty() {
                self.inference.api_key = Some(key);
            }
        }
    }

    /// 配信識別子を解決（設定値優先、なければURLから抽出）
    pub fn resolved_stream_id(&self) -> Option<String> {
        if !self.stream.stream_id.is_empty() {
            return Some(self.stream.stream_id.clone());
        }
        crate::utils::extract_stream_id(&self.stream.playback_url)
    }
}

/// 設定管理マネージャー
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 新しい設定マネージャーを作成
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        // 設定ディレクトリを作成（存在しない場合）
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        Ok(Self { config_path })
    }

    /// 明示パス指定（テスト用）
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// XDGディレクトリに基づく設定ファイルパスを取得
    fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("gg", "GlobalGaming", "gghub")
            .context("Failed to get project directories")?;

        let config_dir = project_dirs.config_dir();
        let config_file = config_dir.join("config.toml");

        debug!("Config file path: {}", config_file.display());

        Ok(config_file)
    }

    /// 設定を読み込み
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: AppConfig = toml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })?;

        info!("📋 Config loaded from: {}", self.config_path.display());
        Ok(config)
    }

    /// 設定を保存
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let content =
            toml::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;

        info!("💾 Config saved to: {}", self.config_path.display());
        Ok(())
    }

    /// 設定ファイルパスを取得
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            warn!("設定ディレクトリの初期化に失敗、カレントディレクトリを使用: {}", e);
            Self {
                config_path: PathBuf::from("gghub-config.toml"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.chat.window_size, 50);
        assert_eq!(config.chat.history_limit, 50);
        assert_eq!(config.analytics.refresh_interval_secs, 120);
        assert_eq!(config.store.table_name, "GlobalGaming-LiveChat");
        assert!(config.chat.demo_traffic);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = AppConfig::default();
        config.stream.stream_id = "aVHZaA2R5mCI".to_string();
        config.analytics.refresh_interval_secs = 60;

        manager.save_config(&config).unwrap();
        let loaded = manager.load_config().unwrap();

        assert_eq!(loaded.stream.stream_id, "aVHZaA2R5mCI");
        assert_eq!(loaded.analytics.refresh_interval_secs, 60);
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("missing.toml"));
        let config = manager.load_config().unwrap();
        assert_eq!(config.chat.window_size, AppConfig::default().chat.window_size);
    }

    #[test]
    fn test_resolved_stream_id_prefers_explicit_value() {
        let mut config = AppConfig::default();
        config.stream.stream_id = "explicit".to_string();
        assert_eq!(config.resolved_stream_id(), Some("explicit".to_string()));

        config.stream.stream_id = String::new();
        // デフォルトURLからチャンネルIDを抽出できる
        assert_eq!(
            config.resolved_stream_id(),
            Some("aVHZaA2R5mCI".to_string())
        );
    }
}
