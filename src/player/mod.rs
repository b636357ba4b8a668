//! プレイバック層
//!
//! マネージド動画プレイヤーのラッパー。ステータス遷移の配布と
//! 基本的なトランスポート制御のみを担い、デコードや描画は扱わない。

pub mod monitor;
pub mod status;

pub use monitor::{evaluate_probe, PlaybackMonitor, PlayerHandle};
pub use status::{PlayerCommand, PlayerError, StreamStatus, TransportState};
