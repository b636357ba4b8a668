//! 再生ステータスとトランスポート制御
//!
//! 実際のデコード・描画はマネージドプレイヤーの仕事。ここでは
//! ステータス遷移と操作系の状態だけを扱う。

use serde::{Deserialize, Serialize};

/// 配信ステータス
///
/// モニターから配られ、セッションマネージャーと表示系が消費する。
/// 永続化はしない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub is_live: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl StreamStatus {
    /// 初期状態（接続試行中）
    pub fn connecting() -> Self {
        Self {
            is_live: false,
            is_loading: true,
            error: None,
        }
    }

    pub fn live() -> Self {
        Self {
            is_live: true,
            is_loading: false,
            error: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            is_live: false,
            is_loading: false,
            error: None,
        }
    }

    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            is_live: false,
            is_loading: false,
            error: Some(message.into()),
        }
    }
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self::connecting()
    }
}

/// プレイバックエラー分類
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    /// ネットワーク到達性の問題（回復可能）
    #[error("Network connection issue - retrying...")]
    Network(#[from] reqwest::Error),
    /// 上流サービスの一時エラー（回復可能）
    #[error("Stream temporarily unavailable (status {0})")]
    Upstream(u16),
    /// 配信が見つからない（終端。手動リトライのみ）
    #[error("Stream not found - broadcaster may be offline")]
    NotFound,
    /// この環境で再生技術が利用できない（終端）
    #[error("Playback technology unavailable: {0}")]
    Unsupported(String),
}

impl PlayerError {
    /// 自動リトライしてよいエラーか
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlayerError::Network(_) | PlayerError::Upstream(_))
    }
}

/// トランスポート操作
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    SetVolume(f32),
    SetMuted(bool),
    ToggleFullscreen,
    /// マニフェストの再読込（終端エラーからの手動復帰）
    Reload,
}

/// トランスポート状態
#[derive(Debug, Clone, PartialEq)]
pub struct TransportState {
    pub is_playing: bool,
    pub volume: f32,
    pub is_muted: bool,
    pub is_fullscreen: bool,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            is_playing: false,
            volume: 0.5,
            is_muted: false,
            is_fullscreen: false,
        }
    }
}

impl TransportState {
    /// 操作を適用する
    ///
    /// 音量は0.0〜1.0にクランプ。ミュート中に音量を上げたら
    /// ミュートを解除する。Reloadはモニター側の責務なのでここでは
    /// 何もしない。
    pub fn apply(&mut self, command: &PlayerCommand) {
        match command {
            PlayerCommand::Play => self.is_playing = true,
            PlayerCommand::Pause => self.is_playing = false,
            PlayerCommand::SetVolume(volume) => {
                self.volume = volume.clamp(0.0, 1.0);
                if self.volume > 0.0 && self.is_muted {
                    self.is_muted = false;
                }
            }
            PlayerCommand::SetMuted(muted) => self.is_muted = *muted,
            PlayerCommand::ToggleFullscreen => self.is_fullscreen = !self.is_fullscreen,
            PlayerCommand::Reload => {}
        }
    }
}
