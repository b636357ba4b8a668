//! イベント駆動の表示状態管理
//!
//! 表示状態はこのモジュールのイベントループだけが書き換える。
//! セッションに紐付くイベントは発行時のセッションIDを必ず携行し、
//! 現行セッションと一致しないものはリデューサーで破棄する。
//! （旧セッション宛ての遅延完了が新セッションの状態を汚染しない
//! ことの保証はここが担う）

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use chrono::{DateTime, Utc};

use crate::analytics::snapshot::AnalyticsSnapshot;
use crate::chat::badges::BadgeLevel;
use crate::chat::message::ChatMessage;
use crate::player::StreamStatus;
use crate::session::{ChatSession, SessionId};
use crate::{AppError, GghubResult};

/// 一時通知の表示時間（ミリ秒）
pub const NOTICE_TTL_MS: u64 = 3000;

/// 視聴者数の下限
const VIEWER_COUNT_FLOOR: i64 = 15;

static NOTICE_SEQ: AtomicU64 = AtomicU64::new(1);

/// チャット表示のフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatPhase {
    #[default]
    Empty,
    Loading,
    Populated,
}

/// 自動で消える一時通知
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: u64,
    pub text: String,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: NOTICE_SEQ.fetch_add(1, Ordering::Relaxed),
            text: text.into(),
            raised_at: Utc::now(),
        }
    }
}

/// セッション中の統計
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub total_messages: usize,
}

/// アプリケーション全体の状態イベント
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// 配信ステータスが変化した
    StatusChanged(StreamStatus),
    /// セッションが開始した（ウェルカムバナー付き）
    SessionStarted {
        session: ChatSession,
        welcome: ChatMessage,
    },
    /// セッションが終了した
    SessionEnded { session_id: SessionId },
    /// セッション履歴のロードが完了した
    HistoryLoaded {
        session_id: SessionId,
        messages: Vec<ChatMessage>,
    },
    /// セッション履歴のロードに失敗した
    HistoryLoadFailed { session_id: SessionId },
    /// 新しいメッセージが追加された
    MessageAdded {
        session_id: SessionId,
        message: ChatMessage,
    },
    /// 分析スナップショットが更新された
    SnapshotUpdated {
        session_id: SessionId,
        snapshot: AnalyticsSnapshot,
    },
    /// 一時通知が発生した
    NoticeRaised(Notice),
    /// 一時通知の表示期限が切れた
    NoticeExpired { notice_id: u64 },
    /// 視聴者数が変動した
    ViewerCountChanged { delta: i64 },
    /// 上流サービスの疎通状態が変わった
    UpstreamHealthChanged {
        store_online: Option<bool>,
        inference_online: Option<bool>,
    },
}

/// 表示状態
#[derive(Debug, Clone)]
pub struct ViewState {
    pub stream_status: StreamStatus,
    pub session: Option<ChatSession>,
    pub messages: Vec<ChatMessage>,
    pub chat_phase: ChatPhase,
    pub notice: Option<Notice>,
    pub snapshot: Option<AnalyticsSnapshot>,
    pub viewer_count: i64,
    pub session_stats: SessionStats,
    pub store_online: Option<bool>,
    pub inference_online: Option<bool>,
    /// バナー込みの表示ウィンドウ上限
    window_size: usize,
}

impl ViewState {
    pub fn new(window_size: usize) -> Self {
        Self {
            stream_status: StreamStatus::connecting(),
            session: None,
            messages: Vec::new(),
            chat_phase: ChatPhase::Empty,
            notice: None,
            snapshot: None,
            viewer_count: 42,
            session_stats: SessionStats::default(),
            store_online: None,
            inference_online: None,
            window_size: window_size.max(2),
        }
    }

    pub fn is_live(&self) -> bool {
        self.stream_status.is_live
    }

    pub fn current_session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|session| &session.session_id)
    }

    /// 自分の発言数（アクティブセッション内）
    pub fn own_comment_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_own_message).count()
    }

    /// 自分の現在バッジレベル
    pub fn own_badge_level(&self) -> BadgeLevel {
        BadgeLevel::for_count(self.own_comment_count())
    }

    /// イベントを状態へ適用する（唯一の書き換え経路）
    pub fn apply(&mut self, event: AppEvent) {
        match event {
            AppEvent::StatusChanged(status) => {
                self.stream_status = status;
            }

            AppEvent::SessionStarted { session, welcome } => {
                tracing::debug!("📝 [STATE] Session started: {}", session.session_id);
                self.session = Some(session);
                self.messages = vec![welcome];
                self.chat_phase = ChatPhase::Loading;
                self.session_stats = SessionStats::default();
                self.snapshot = None;
                self.notice = None;
            }

            AppEvent::SessionEnded { session_id } => {
                if !self.is_current_session(&session_id) {
                    return;
                }
                tracing::debug!("🗑️ [STATE] Session ended, clearing messages");
                self.session = None;
                self.messages.clear();
                self.chat_phase = ChatPhase::Empty;
                self.session_stats = SessionStats::default();
                self.snapshot = None;
            }

            AppEvent::HistoryLoaded {
                session_id,
                messages,
            } => {
                if !self.is_current_session(&session_id) {
                    tracing::debug!(
                        "⏭️ [STATE] Dropping stale history load for {}",
                        session_id
                    );
                    return;
                }
                // バナーは常に先頭。履歴からはシステムメッセージと
                // 既存IDの重複を除外する
                let mut appended = 0usize;
                for message in messages {
                    if message.is_system
                        || self.messages.iter().any(|m| m.id == message.id)
                    {
                        continue;
                    }
                    self.messages.push(message);
                    appended += 1;
                }
                self.session_stats.total_messages = appended;
                self.chat_phase = ChatPhase::Populated;
                self.evict_to_window();
            }

            AppEvent::HistoryLoadFailed { session_id } => {
                if !self.is_current_session(&session_id) {
                    return;
                }
                // バナーだけ残して表示可能状態にする
                self.chat_phase = ChatPhase::Populated;
            }

            AppEvent::MessageAdded {
                session_id,
                message,
            } => {
                if !self.is_current_session(&session_id) {
                    tracing::debug!("⏭️ [STATE] Dropping stale message for {}", session_id);
                    return;
                }
                if self.messages.iter().any(|m| m.id == message.id) {
                    return;
                }
                // バナーは1枚だけ
                if message.is_system && self.messages.iter().any(|m| m.is_system) {
                    return;
                }
                let counted = !message.is_system;
                self.messages.push(message);
                if counted {
                    self.session_stats.total_messages += 1;
                }
                self.evict_to_window();
            }

            AppEvent::SnapshotUpdated {
                session_id,
                snapshot,
            } => {
                if !self.is_current_session(&session_id) {
                    tracing::debug!(
                        "⏭️ [STATE] Dropping stale analytics snapshot for {}",
                        session_id
                    );
                    return;
                }
                self.snapshot = Some(snapshot);
            }

            AppEvent::NoticeRaised(notice) => {
                self.notice = Some(notice);
            }

            AppEvent::NoticeExpired { notice_id } => {
                if self.notice.as_ref().map(|n| n.id) == Some(notice_id) {
                    self.notice = None;
                }
            }

            AppEvent::ViewerCountChanged { delta } => {
                self.viewer_count = (self.viewer_count + delta).max(VIEWER_COUNT_FLOOR);
            }

            AppEvent::UpstreamHealthChanged {
                store_online,
                inference_online,
            } => {
                if let Some(online) = store_online {
                    self.store_online = Some(online);
                }
                if let Some(online) = inference_online {
                    self.inference_online = Some(online);
                }
            }
        }
    }

    fn is_current_session(&self, session_id: &SessionId) -> bool {
        self.current_session_id() == Some(session_id)
    }

    /// 非システムメッセージを古い順に間引いてウィンドウへ収める
    fn evict_to_window(&mut self) {
        let cap = self.window_size.saturating_sub(1);
        loop {
            let non_system = self.messages.iter().filter(|m| !m.is_system).count();
            if non_system <= cap {
                break;
            }
            if let Some(index) = self.messages.iter().position(|m| !m.is_system) {
                self.messages.remove(index);
            } else {
                break;
            }
        }
    }
}

/// イベント駆動状態マネージャー
///
/// イベントループで状態更新を直列化する。グローバルシングルトンには
/// せず、起動時に構築してArcで配る。
pub struct StateManager {
    state: Arc<Mutex<ViewState>>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl StateManager {
    pub fn new(window_size: usize) -> Arc<Self> {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ViewState::new(window_size)));

        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            tracing::debug!("🚀 [STATE] Event loop started");
            Self::run_event_loop(state_clone, event_receiver).await;
        });

        Arc::new(Self {
            state,
            event_sender,
        })
    }

    async fn run_event_loop(
        state: Arc<Mutex<ViewState>>,
        mut event_receiver: mpsc::UnboundedReceiver<AppEvent>,
    ) {
        while let Some(event) = event_receiver.recv().await {
            Self::handle_event_static(&state, event);
        }
        tracing::info!("🏁 [STATE] Event loop stopped");
    }

    fn handle_event_static(state: &Arc<Mutex<ViewState>>, event: AppEvent) {
        let mut guard = match state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("⚠️ [STATE] State mutex poisoned during event handling, recovering");
                poisoned.into_inner()
            }
        };
        guard.apply(event);
    }

    /// イベントを送信
    pub fn send_event(&self, event: AppEvent) -> Result<(), mpsc::error::SendError<AppEvent>> {
        self.event_sender.send(event)
    }

    /// 現在の状態を取得
    pub fn get_state(&self) -> GghubResult<ViewState> {
        self.state
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| {
                AppError::StateManagement(
                    "Failed to acquire state lock (mutex poisoned)".to_string(),
                )
                .into()
            })
    }

    /// 現在の状態を取得（ロック汚染時はデフォルトへフォールバック）
    pub fn get_state_unchecked(&self) -> ViewState {
        match self.get_state() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("⚠️ [STATE] State lock poisoned, returning default state: {}", e);
                ViewState::new(50)
            }
        }
    }

    /// 一時通知を発行し、TTL経過後に自動で消す
    pub fn raise_transient_notice(&self, text: impl Into<String>) {
        let notice = Notice::new(text);
        let notice_id = notice.id;
        let _ = self.send_event(AppEvent::NoticeRaised(notice));

        let sender = self.event_sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(NOTICE_TTL_MS)).await;
            let _ = sender.send(AppEvent::NoticeExpired { notice_id });
        });
    }

}
