//! アプリケーション合成ルート
//!
//! ゲートウェイと状態マネージャーを起動時に一度だけ構築し、
//! コントローラーへ参照で注入する。配信ステータスの遷移を
//! セッションマネージャーへ流し、ライフサイクルイベントを
//! 各コントローラーへ配るのもここ。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::analytics::{AnalyticsService, AnalyticsWidgetController};
use crate::api::chat_store::{ChatStore, TableStoreClient};
use crate::api::inference::{InferenceBackend, InferenceClient};
use crate::chat::message::ValidationError;
use crate::chat::ChatController;
use crate::config::AppConfig;
use crate::player::StreamStatus;
use crate::session::{SessionEvent, SessionManager, StreamId};
use crate::state::{AppEvent, StateManager};
use crate::{AppError, GghubResult};

/// アプリケーション本体
pub struct App {
    stream_id: StreamId,
    state: Arc<StateManager>,
    store: Arc<dyn ChatStore>,
    chat: ChatController,
    widget: AnalyticsWidgetController,
    sessions: SessionManager,
}

impl App {
    /// 設定からサービス一式を構築する
    pub fn new(config: AppConfig) -> GghubResult<Self> {
        let stream_id = StreamId::new(config.resolved_stream_id().ok_or_else(|| {
            AppError::Configuration(
                "stream id is not set and could not be derived from the playback URL".to_string(),
            )
        })?);

        let state = StateManager::new(config.chat.window_size);

        let table_client = TableStoreClient::new(config.store.clone())?;
        let connection = table_client.connection_status();
        tracing::info!(
            "🔌 [APP] Table service: {} / {} (credentials: {})",
            connection.endpoint,
            connection.table_name,
            connection.has_credentials
        );
        let store: Arc<dyn ChatStore> = Arc::new(table_client);

        let inference_client = InferenceClient::new(config.inference.clone())?;
        tracing::info!(
            "🤖 [APP] Inference endpoint model: {} (credentials: {})",
            inference_client.model_id(),
            inference_client.has_credentials()
        );
        let backend: Arc<dyn InferenceBackend> = Arc::new(inference_client);
        let analytics = Arc::new(AnalyticsService::new(backend, config.inference.clone()));

        Ok(Self::with_services(&config, stream_id, state, store, analytics))
    }

    /// 構築済みのサービスを注入して組み立てる（テストや組み込み用）
    pub fn with_services(
        config: &AppConfig,
        stream_id: StreamId,
        state: Arc<StateManager>,
        store: Arc<dyn ChatStore>,
        analytics: Arc<AnalyticsService>,
    ) -> Self {
        let chat = ChatController::new(
            Arc::clone(&state),
            Arc::clone(&store),
            stream_id.clone(),
            config.chat.clone(),
        );
        let widget = AnalyticsWidgetController::new(
            Arc::clone(&state),
            Arc::clone(&store),
            analytics,
            stream_id.clone(),
            config.analytics.clone(),
        );

        tracing::info!("🏗️ [APP] Services constructed for stream {}", stream_id);

        Self {
            stream_id,
            state,
            store,
            chat,
            widget,
            sessions: SessionManager::new(),
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// 上流サービスの疎通状態を一度確認して状態へ反映する
    pub async fn report_upstream_health(&self) {
        let store_online = self.store.test_connection().await;
        let _ = self.state.send_event(AppEvent::UpstreamHealthChanged {
            store_online: Some(store_online),
            inference_online: None,
        });

        self.widget.report_connectivity().await;
    }

    /// 配信ステータスの観測値を適用する
    ///
    /// ライブ状態のエッジでセッションイベントが出たら、チャットと
    /// ウィジェットの両コントローラーへ配る。ロード中はまだライブ
    /// 状態の観測値ではないため、セッション判定には流さない
    /// （初回観測がライブの配信でもセッション開始を取りこぼさない）。
    pub fn apply_status(&mut self, status: StreamStatus) {
        let liveness = if status.is_loading {
            None
        } else {
            Some(status.is_live)
        };
        let _ = self.state.send_event(AppEvent::StatusChanged(status));

        let Some(is_live) = liveness else {
            return;
        };

        match self.sessions.observe(is_live) {
            Some(SessionEvent::Started { session, welcome }) => {
                self.widget.on_session_started(session.session_id.clone());
                self.chat.on_session_started(&session, welcome);
            }
            Some(SessionEvent::Ended { session_id }) => {
                self.widget.on_session_ended();
                self.chat.on_session_ended(&session_id);

                // 終了した配信の要約をログに残す（ベストエフォート）
                let store = Arc::clone(&self.store);
                let stream_id = self.stream_id.clone();
                tokio::spawn(async move {
                    let stats = store.stream_stats(&stream_id).await;
                    tracing::info!(
                        "📊 [APP] Stream stats: {} messages across {} sessions",
                        stats.total_messages,
                        stats.total_sessions
                    );
                });
            }
            None => {}
        }
    }

    /// ローカル投稿の受付
    pub fn submit_chat_message(&self, content: &str) -> Result<(), ValidationError> {
        self.chat.submit_message(content)
    }

    /// 分析の手動リフレッシュ
    pub fn refresh_analytics(&self) {
        self.widget.request_refresh();
    }

    /// ステータスストリームを消費するメインループ
    ///
    /// シャットダウンシグナルで抜け、バックグラウンドタスクを
    /// 確実に止める。
    pub async fn run(
        &mut self,
        mut status_rx: watch::Receiver<StreamStatus>,
        mut shutdown_rx: mpsc::UnboundedReceiver<()>,
    ) -> GghubResult<()> {
        self.report_upstream_health().await;

        // 初期値も1回適用する
        let initial = status_rx.borrow().clone();
        self.apply_status(initial);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("🛑 [APP] Shutdown signal received");
                    break;
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        tracing::warn!("⚠️ [APP] Status channel closed, stopping");
                        break;
                    }
                    let status = status_rx.borrow().clone();
                    self.apply_status(status);
                }
            }
        }

        // 後始末: セッション相当の停止処理
        self.widget.on_session_ended();
        self.chat.shutdown();
        tracing::info!("🏁 [APP] Main loop finished");
        Ok(())
    }
}
