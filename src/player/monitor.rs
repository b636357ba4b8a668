//! プレイバック監視
//!
//! HLSマニフェストを定期的にプローブしてライブ状態の遷移を
//! watchチャネルで配る。回復可能エラーは一度だけバックオフ付きで
//! 再試行、終端エラーはReload操作が来るまでプローブを停止する。

use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::StreamConfig;

use super::status::{PlayerCommand, PlayerError, StreamStatus, TransportState};

/// 回復可能エラー時の再試行までの待機
const RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// トランスポート操作の受け口
///
/// Reloadだけはモニターへ転送し、それ以外はトランスポート状態へ
/// 直接適用する。
pub struct PlayerHandle {
    transport: RwLock<TransportState>,
    reload_tx: mpsc::UnboundedSender<()>,
}

impl PlayerHandle {
    pub fn apply(&self, command: PlayerCommand) {
        match command {
            PlayerCommand::Reload => {
                tracing::info!("🔄 [PLAYER] Reload requested");
                let _ = self.reload_tx.send(());
            }
            other => {
                self.transport.write().apply(&other);
                tracing::debug!("🎛️ [PLAYER] Transport command applied: {:?}", other);
            }
        }
    }

    pub fn transport(&self) -> TransportState {
        self.transport.read().clone()
    }
}

/// プレイバックモニター
pub struct PlaybackMonitor {
    http: reqwest::Client,
    playback_url: String,
    poll_interval: Duration,
}

impl PlaybackMonitor {
    pub fn new(config: &StreamConfig) -> Result<Self, PlayerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            playback_url: config.playback_url.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        })
    }

    /// 監視タスクを起動する
    ///
    /// 戻り値はステータス購読チャネル、トランスポート受け口、
    /// 停止シグナル送信側。
    pub fn spawn(
        self,
    ) -> (
        watch::Receiver<StreamStatus>,
        std::sync::Arc<PlayerHandle>,
        oneshot::Sender<()>,
    ) {
        let (status_tx, status_rx) = watch::channel(StreamStatus::connecting());
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = std::sync::Arc::new(PlayerHandle {
            transport: RwLock::new(TransportState::default()),
            reload_tx,
        });

        tokio::spawn(self.run(status_tx, reload_rx, shutdown_rx));

        (status_rx, handle, shutdown_tx)
    }

    async fn run(
        self,
        status_tx: watch::Sender<StreamStatus>,
        mut reload_rx: mpsc::UnboundedReceiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(self.poll_interval);
        // 配信がライブだったことがあるか（404の解釈に使う）
        let mut seen_live = false;
        // 終端エラーで停止中か
        let mut halted = false;

        tracing::info!(
            "🎬 [PLAYER] Playback monitor started for {}",
            self.playback_url
        );

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("🛑 [PLAYER] Playback monitor stopped");
                    break;
                }
                _ = reload_rx.recv() => {
                    // 手動リトライ: 停止状態を解除して即時プローブ
                    halted = false;
                    let _ = status_tx.send(StreamStatus::connecting());
                    self.probe_and_publish(&status_tx, &mut seen_live, &mut halted).await;
                }
                _ = interval.tick() => {
                    if halted {
                        continue;
                    }
                    self.probe_and_publish(&status_tx, &mut seen_live, &mut halted).await;
                }
            }
        }
    }

    async fn probe_and_publish(
        &self,
        status_tx: &watch::Sender<StreamStatus>,
        seen_live: &mut bool,
        halted: &mut bool,
    ) {
        let mut outcome = self.probe(*seen_live).await;

        // 回復可能エラーは一度だけバックオフして再試行
        let should_retry = match &outcome {
            Err(e) if e.is_recoverable() => {
                tracing::warn!("⚠️ [PLAYER] Probe failed ({}), retrying once", e);
                true
            }
            _ => false,
        };
        if should_retry {
            tokio::time::sleep(RETRY_BACKOFF).await;
            outcome = self.probe(*seen_live).await;
        }

        let status = match outcome {
            Ok(true) => {
                *seen_live = true;
                StreamStatus::live()
            }
            Ok(false) => StreamStatus::offline(),
            Err(e) => {
                if !e.is_recoverable() {
                    tracing::error!("🔴 [PLAYER] Terminal playback error: {}", e);
                    *halted = true;
                } else {
                    tracing::warn!("⚠️ [PLAYER] Playback error: {}", e);
                }
                StreamStatus::errored(e.to_string())
            }
        };

        if *status_tx.borrow() != status {
            tracing::info!(
                "🔄 [PLAYER] Stream status changed: live={} loading={} error={:?}",
                status.is_live,
                status.is_loading,
                status.error
            );
        }
        let _ = status_tx.send(status);
    }

    /// マニフェストを1回プローブする
    ///
    /// Ok(true)=ライブ、Ok(false)=オフライン。
    async fn probe(&self, seen_live: bool) -> Result<bool, PlayerError> {
        let response = self.http.get(&self.playback_url).send().await?;
        let status = response.status().as_u16();
        let body = if status == 200 {
            response.text().await?
        } else {
            String::new()
        };
        evaluate_probe(status, &body, seen_live)
    }
}

/// プローブ応答を分類する
///
/// 404はロード時（未ライブ）なら終端の「見つからない」、ライブ実績が
/// ある場合は通常のオフライン遷移として扱う。マニフェストでない
/// ペイロードはこの環境で再生不能とみなす。
pub fn evaluate_probe(
    status_code: u16,
    body: &str,
    seen_live: bool,
) -> Result<bool, PlayerError> {
    match status_code {
        200 => {
            if body.trim_start().starts_with("#EXTM3U") {
                Ok(true)
            } else {
                Err(PlayerError::Unsupported(
                    "playback URL did not return an HLS manifest".to_string(),
                ))
            }
        }
        403 | 404 | 410 => {
            if seen_live {
                Ok(false)
            } else {
                Err(PlayerError::NotFound)
            }
        }
        code => Err(PlayerError::Upstream(code)),
    }
}
