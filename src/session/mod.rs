//! 配信セッションのライフサイクル管理
//!
//! 配信のライブ状態の遷移を監視し、チャットセッションの開始・終了
//! イベントを発行する。セッションはライブ立ち上がりエッジで一度だけ
//! 生成され、オフライン遷移で暗黙的に終了する（終了レコードは永続化
//! しない）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::message::{random_suffix, ChatMessage};

/// 配信識別子（プレイバックURLに埋め込まれたチャンネルID）
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// セッション識別子（ライブ期間ごとに一意な不透明ID）
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// チャットセッション
///
/// レコードとしては永続化されない。メッセージに刻印される
/// SessionId属性によってのみ存在が示される。
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
}

/// ライブ状態
///
/// 初回観測は必ずUnknownから始める。Offlineをデフォルトにすると
/// 既にライブ中の配信を開いたときに最初のセッション開始を取り
/// こぼすため、未観測は別個の番兵値として扱う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Unknown,
    Offline,
    Live,
}

/// セッションライフサイクルイベント
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// セッション開始（ウェルカムバナー付き）
    Started {
        session: ChatSession,
        welcome: ChatMessage,
    },
    /// セッション終了 - ローカル保持メッセージは全てクリアする
    Ended { session_id: SessionId },
}

/// セッションマネージャー
#[derive(Debug)]
pub struct SessionManager {
    liveness: Liveness,
    current: Option<ChatSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            liveness: Liveness::Unknown,
            current: None,
        }
    }

    /// ライブ状態の観測値を適用し、遷移があればイベントを返す
    ///
    /// Offline→Live（または初回観測がLive）でセッションを新規発行、
    /// Live→Offlineで終了。定常状態では何もしない。
    pub fn observe(&mut self, is_live: bool) -> Option<SessionEvent> {
        let previous = self.liveness;
        self.liveness = if is_live {
            Liveness::Live
        } else {
            Liveness::Offline
        };

        match (previous, is_live) {
            (Liveness::Offline, true) | (Liveness::Unknown, true) => {
                let session = ChatSession {
                    session_id: mint_session_id(),
                    started_at: Utc::now(),
                };
                let welcome = synthesize_welcome_message(&session.session_id);
                self.current = Some(session.clone());

                tracing::info!(
                    "🟢 [SESSION] Stream went LIVE - session started: {}",
                    session.session_id
                );

                Some(SessionEvent::Started { session, welcome })
            }
            (Liveness::Live, false) => {
                let session_id = self
                    .current
                    .take()
                    .map(|session| session.session_id)
                    .unwrap_or_else(|| SessionId::new("unknown"));

                tracing::info!(
                    "🔴 [SESSION] Stream went OFFLINE - session ended: {}",
                    session_id
                );

                Some(SessionEvent::Ended { session_id })
            }
            _ => None,
        }
    }

    /// 現在のセッションを取得
    pub fn current_session(&self) -> Option<&ChatSession> {
        self.current.as_ref()
    }

    /// 現在のライブ状態
    pub fn liveness(&self) -> Liveness {
        self.liveness
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// セッションIDを発行
///
/// 形式は `session_<epoch millis>_<英数字9桁>`。プロセス寿命内での
/// 衝突確率は無視できる。
fn mint_session_id() -> SessionId {
    SessionId::new(format!(
        "session_{}_{}",
        Utc::now().timestamp_millis(),
        random_suffix(9)
    ))
}

/// セッション先頭に固定表示するウェルカムメッセージを合成
///
/// IDはセッションから決定的に導出する。履歴ロード時に永続化済みの
/// コピーとID照合で重複排除できるようにするため。
pub fn synthesize_welcome_message(session_id: &SessionId) -> ChatMessage {
    ChatMessage {
        id: format!("welcome_{}", session_id),
        username: "StreamMaster".to_string(),
        content: "🎮 Welcome to GlobalGaming! Stream is now LIVE!".to_string(),
        timestamp: Utc::now(),
        badges: vec!["mod".to_string()],
        is_system: true,
        is_own_message: false,
        session_id: Some(session_id.clone()),
    }
}
