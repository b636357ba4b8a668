pub mod analytics;
pub mod api;
pub mod app;
pub mod chat;
pub mod config;
pub mod player;
pub mod session;
pub mod state;
pub mod utils;

// Re-export the main error types for convenience
pub use api::chat_store::StoreError;
pub use api::inference::InferenceError;
pub use chat::message::ValidationError;
pub use player::status::PlayerError;

// Re-export the core building blocks for convenience
pub use analytics::{AnalyticsService, AnalyticsSnapshot, AnalyticsWidgetController};
pub use api::{ChatStore, InferenceBackend, InferenceClient, TableStoreClient};
pub use app::App;
pub use chat::{BadgeLevel, ChatController, ChatMessage};
pub use config::{AppConfig, ConfigManager};
pub use player::{PlaybackMonitor, PlayerCommand, StreamStatus};
pub use session::{ChatSession, SessionEvent, SessionId, SessionManager, StreamId};
pub use state::{AppEvent, StateManager, ViewState};

/// クレート共通の結果型
pub type GghubResult<T> = anyhow::Result<T>;

/// アプリケーション層のエラー
///
/// 外部コラボレーターとの境界には各モジュールの専用エラーがあり、
/// ここには合成ルートと状態管理のエラーだけを置く。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Service error: {0}")]
    Service(String),
    #[error("State management error: {0}")]
    StateManagement(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}
