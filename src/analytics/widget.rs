//! 分析ウィジェットコントローラー
//!
//! ライブ中かつセッションがある間だけ定期リフレッシュを回す。
//! 1サイクルで感情分析とバッジ分析を並行実行し、両方の完了を待って
//! から単一のスナップショットに統合する（部分更新は見せない）。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::api::chat_store::ChatStore;
use crate::config::AnalyticsConfig;
use crate::session::{SessionId, StreamId};
use crate::state::{AppEvent, StateManager};

use super::service::AnalyticsService;
use super::snapshot::{AnalyticsSnapshot, BadgeReport, SentimentReport};

/// 分析ウィジェットコントローラー
pub struct AnalyticsWidgetController {
    state: Arc<StateManager>,
    store: Arc<dyn ChatStore>,
    analytics: Arc<AnalyticsService>,
    stream_id: StreamId,
    config: AnalyticsConfig,
    /// 再入ガード。実行中のリフレッシュ要求はキューせず無視する
    is_analyzing: Arc<AtomicBool>,
    poll_shutdown: Option<oneshot::Sender<()>>,
}

impl AnalyticsWidgetController {
    pub fn new(
        state: Arc<StateManager>,
        store: Arc<dyn ChatStore>,
        analytics: Arc<AnalyticsService>,
        stream_id: StreamId,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            state,
            store,
            analytics,
            stream_id,
            config,
            is_analyzing: Arc::new(AtomicBool::new(false)),
            poll_shutdown: None,
        }
    }

    /// 推論エンドポイントの疎通状態を報告（分析サイクルとは独立）
    pub async fn report_connectivity(&self) {
        let online = self.analytics.test_connection().await;
        let _ = self.state.send_event(AppEvent::UpstreamHealthChanged {
            store_online: None,
            inference_online: Some(online),
        });
    }

    /// セッション開始に伴いポーリングを開始
    pub fn on_session_started(&mut self, session_id: SessionId) {
        self.stop_polling();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.poll_shutdown = Some(shutdown_tx);

        let state = Arc::clone(&self.state);
        let store = Arc::clone(&self.store);
        let analytics = Arc::clone(&self.analytics);
        let stream_id = self.stream_id.clone();
        let is_analyzing = Arc::clone(&self.is_analyzing);
        let limit = self.config.message_fetch_limit;
        let period = Duration::from_secs(self.config.refresh_interval_secs.max(1));

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);

            tracing::info!(
                "📊 [WIDGET] Analytics polling started for session {} (every {}s)",
                session_id,
                period.as_secs()
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::info!("🛑 [WIDGET] Analytics polling stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        refresh_once(
                            Arc::clone(&state),
                            Arc::clone(&store),
                            Arc::clone(&analytics),
                            stream_id.clone(),
                            session_id.clone(),
                            limit,
                            Arc::clone(&is_analyzing),
                        )
                        .await;
                    }
                }
            }
        });
    }

    /// セッション終了（オフライン遷移）に伴いポーリングを停止
    ///
    /// オフライン中のウィジェットは非アクティブ表示（スナップショット
    /// はセッション終了時に状態側でクリアされる）。
    pub fn on_session_ended(&mut self) {
        self.stop_polling();
    }

    /// 手動リフレッシュ
    ///
    /// 自動リフレッシュと同じ再入ガードを共有する。実行中なら無視。
    pub fn request_refresh(&self) {
        let snapshot_state = self.state.get_state_unchecked();
        let Some(session_id) = snapshot_state.current_session_id().cloned() else {
            tracing::debug!("⏭️ [WIDGET] Refresh ignored - no active session");
            return;
        };
        if !snapshot_state.is_live() {
            tracing::debug!("⏭️ [WIDGET] Refresh ignored - stream offline");
            return;
        }

        let state = Arc::clone(&self.state);
        let store = Arc::clone(&self.store);
        let analytics = Arc::clone(&self.analytics);
        let stream_id = self.stream_id.clone();
        let is_analyzing = Arc::clone(&self.is_analyzing);
        let limit = self.config.message_fetch_limit;

        tokio::spawn(async move {
            refresh_once(
                state,
                store,
                analytics,
                stream_id,
                session_id,
                limit,
                is_analyzing,
            )
            .await;
        });
    }

    pub fn is_analyzing(&self) -> bool {
        self.is_analyzing.load(Ordering::SeqCst)
    }

    fn stop_polling(&mut self) {
        if let Some(shutdown) = self.poll_shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for AnalyticsWidgetController {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

/// 1リフレッシュサイクルを実行
///
/// 感情分析とバッジ分析をファンアウトし、両方が揃ってから単一の
/// スナップショットイベントを流す。発行時のセッションIDを添える
/// ため、セッションが切り替わっていれば結果は捨てられる。
async fn refresh_once(
    state: Arc<StateManager>,
    store: Arc<dyn ChatStore>,
    analytics: Arc<AnalyticsService>,
    stream_id: StreamId,
    session_id: SessionId,
    limit: usize,
    is_analyzing: Arc<AtomicBool>,
) {
    if is_analyzing
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        tracing::debug!("⏭️ [WIDGET] Refresh already in flight - no-op");
        return;
    }

    tracing::debug!("🔄 [WIDGET] Refreshing analytics for session {}", session_id);

    let messages = match store
        .get_session_messages(&stream_id, &session_id, limit)
        .await
    {
        Ok(messages) => messages,
        Err(e) => {
            // 取得失敗時は前回スナップショットを保持したまま次回へ
            tracing::warn!("⚠️ [WIDGET] Failed to fetch session messages: {}", e);
            is_analyzing.store(false, Ordering::SeqCst);
            return;
        }
    };

    let snapshot = if messages.is_empty() {
        let mut report = SentimentReport::empty("No messages in this session yet.");
        report.recommendations =
            vec!["Start engaging with viewers to build community!".to_string()];
        AnalyticsSnapshot::merge(report, BadgeReport::empty())
    } else {
        let context = format!("GlobalGaming esports stream session {}", session_id);
        // ファンアウト/ファンイン: 両方の完了を待ってから統合する
        let (report, badges) = tokio::join!(
            analytics.analyze_chat_sentiment(&messages, &context),
            analytics.analyze_badge_distribution(&messages)
        );
        AnalyticsSnapshot::merge(report, badges)
    };

    let _ = state.send_event(AppEvent::SnapshotUpdated {
        session_id,
        snapshot,
    });

    is_analyzing.store(false, Ordering::SeqCst);
    tracing::debug!("✅ [WIDGET] Analytics snapshot updated");
}
