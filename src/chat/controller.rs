//! チャットビューコントローラー
//!
//! セッションライフサイクルに従って履歴ロード・投稿受付・デモ生成を
//! 束ねる。表示状態の書き換えはすべてStateManager経由。
//!
//! 永続化は常に「ローカル優先」: 先に表示へ載せ、リモート書き込みは
//! 背景でベストエフォート。失敗してもメッセージは撤回しない。

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::api::chat_store::ChatStore;
use crate::chat::generator::spawn_generator;
use crate::chat::message::{validate_content, ChatMessage, ValidationError};
use crate::config::ChatConfig;
use crate::session::{ChatSession, SessionId, StreamId};
use crate::state::{AppEvent, StateManager};

/// ローカル優先でメッセージを公開する共通ヘルパー
///
/// 即時に表示イベントを流し、永続化は背景タスクで試みる。書き込み
/// 失敗時は自分の投稿に限り一時通知を出す（デモ生成分はログのみ）。
/// イベントは発行時のセッションIDを携行するため、完了が遅れても
/// 新しいセッションの状態を汚すことはない。
pub fn publish_local_first(
    state: Arc<StateManager>,
    store: Arc<dyn ChatStore>,
    stream_id: StreamId,
    message: ChatMessage,
) {
    let Some(session_id) = message.session_id.clone() else {
        tracing::warn!("⚠️ [CHAT] Dropping message without session id: {}", message.id);
        return;
    };

    // 楽観的に即時表示
    let _ = state.send_event(AppEvent::MessageAdded {
        session_id,
        message: message.clone(),
    });

    // ベストエフォート永続化
    tokio::spawn(async move {
        match store.save_message(&message, &stream_id).await {
            Ok(_) => {
                tracing::debug!("✅ [CHAT] Message persisted: {}", message.id);
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ [CHAT] Message kept locally but not persisted ({}): {}",
                    message.id,
                    e
                );
                if message.is_own_message {
                    state.raise_transient_notice("Message sent but not saved to database");
                }
            }
        }
    });
}

/// チャットビューコントローラー
pub struct ChatController {
    state: Arc<StateManager>,
    store: Arc<dyn ChatStore>,
    stream_id: StreamId,
    config: ChatConfig,
    active_session: Option<SessionId>,
    generator_shutdown: Option<oneshot::Sender<()>>,
}

impl ChatController {
    pub fn new(
        state: Arc<StateManager>,
        store: Arc<dyn ChatStore>,
        stream_id: StreamId,
        config: ChatConfig,
    ) -> Self {
        Self {
            state,
            store,
            stream_id,
            config,
            active_session: None,
            generator_shutdown: None,
        }
    }

    /// セッション開始処理
    ///
    /// バナー表示→履歴ロード→デモ生成開始の順。履歴ロードは背景で
    /// 行い、完了イベントにはセッションIDを添えて古い完了を弾く。
    pub fn on_session_started(&mut self, session: &ChatSession, welcome: ChatMessage) {
        let session_id = session.session_id.clone();
        self.active_session = Some(session_id.clone());

        let _ = self.state.send_event(AppEvent::SessionStarted {
            session: session.clone(),
            welcome: welcome.clone(),
        });

        // バナーも永続化しておく（失敗は警告のみ）
        {
            let store = Arc::clone(&self.store);
            let stream_id = self.stream_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.save_message(&welcome, &stream_id).await {
                    tracing::warn!("⚠️ [CHAT] Failed to save welcome message: {}", e);
                }
            });
        }

        self.load_session_history(session_id.clone());

        if self.config.demo_traffic {
            self.generator_shutdown = Some(spawn_generator(
                Arc::clone(&self.state),
                Arc::clone(&self.store),
                self.stream_id.clone(),
                session_id,
                &self.config,
            ));
        }
    }

    /// セッション終了処理
    ///
    /// デモ生成を停止してから表示をクリアする。停止後に完了する
    /// 書き込みの結果はリデューサー側のセッション照合で破棄される。
    pub fn on_session_ended(&mut self, session_id: &SessionId) {
        self.stop_generator();
        self.active_session = None;
        let _ = self.state.send_event(AppEvent::SessionEnded {
            session_id: session_id.clone(),
        });
    }

    /// コンポーネント破棄時の後始末
    pub fn shutdown(&mut self) {
        self.stop_generator();
        self.active_session = None;
    }

    /// ローカル投稿
    ///
    /// 検証に通ればその場で表示し、永続化はベストエフォート。
    /// セッションが無い間は受け付けない（入力欄も無効化される想定）。
    pub fn submit_message(&self, content: &str) -> Result<(), ValidationError> {
        let Some(session_id) = self.active_session.clone() else {
            tracing::debug!("⏭️ [CHAT] Submit ignored - no active session");
            return Ok(());
        };

        let content = validate_content(content)?;
        let message = ChatMessage::own(content, session_id);

        publish_local_first(
            Arc::clone(&self.state),
            Arc::clone(&self.store),
            self.stream_id.clone(),
            message,
        );
        Ok(())
    }

    pub fn active_session(&self) -> Option<&SessionId> {
        self.active_session.as_ref()
    }

    fn load_session_history(&self, session_id: SessionId) {
        let state = Arc::clone(&self.state);
        let store = Arc::clone(&self.store);
        let stream_id = self.stream_id.clone();
        let limit = self.config.history_limit;

        tokio::spawn(async move {
            match store
                .get_session_messages(&stream_id, &session_id, limit)
                .await
            {
                Ok(messages) => {
                    tracing::info!(
                        "📥 [CHAT] Loaded {} history messages for session {}",
                        messages.len(),
                        session_id
                    );
                    let _ = state.send_event(AppEvent::HistoryLoaded {
                        session_id,
                        messages,
                    });
                }
                Err(e) => {
                    tracing::error!("❌ [CHAT] Failed to load session history: {}", e);
                    state.raise_transient_notice("Failed to load chat history");
                    let _ = state.send_event(AppEvent::HistoryLoadFailed { session_id });
                }
            }
        });
    }

    fn stop_generator(&mut self) {
        if let Some(shutdown) = self.generator_shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.stop_generator();
    }
}
