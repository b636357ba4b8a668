use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// 投稿本文の最大文字数
pub const MAX_MESSAGE_LENGTH: usize = 500;

/// チャットメッセージ構造体
///
/// 表示・永続化の両方で使う共通モデル。セッションIDは
/// 配信セッションに紐付くメッセージのみ持つ。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub badges: Vec<String>,
    pub is_system: bool,
    pub is_own_message: bool,
    pub session_id: Option<SessionId>,
}

impl ChatMessage {
    /// メッセージ種別を導出（永続化レコードのMessageType属性用）
    pub fn kind(&self) -> MessageKind {
        if self.is_system {
            MessageKind::System
        } else if self.is_own_message {
            MessageKind::User
        } else {
            MessageKind::Viewer
        }
    }

    /// 視聴者側のユーザーメッセージを生成
    pub fn own(content: String, session_id: SessionId) -> Self {
        Self {
            id: generate_message_id("user"),
            username: "You".to_string(),
            content,
            timestamp: Utc::now(),
            badges: Vec::new(),
            is_system: false,
            is_own_message: true,
            session_id: Some(session_id),
        }
    }
}

/// メッセージ種別列挙型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    User,
    Viewer,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::System => "system",
            MessageKind::User => "user",
            MessageKind::Viewer => "viewer",
        }
    }
}

/// ローカル入力の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Message is empty")]
    Empty,
    #[error("Message exceeds {MAX_MESSAGE_LENGTH} characters")]
    TooLong,
}

/// 入力本文を検証してトリム済み文字列を返す
pub fn validate_content(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::TooLong);
    }
    Ok(trimmed.to_string())
}

/// 衝突がほぼ起こらないメッセージIDを生成
///
/// 形式は `prefix_<epoch millis>_<英数字9桁>`。
pub fn generate_message_id(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        Utc::now().timestamp_millis(),
        random_suffix(9)
    )
}

/// 英数字小文字のランダムサフィックスを生成
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
