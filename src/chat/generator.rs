//! デモ用チャットトラフィック生成
//!
//! ライブ中のみ動く低頻度の合成メッセージ生成器。実視聴者と同じ
//! 経路（ローカル優先表示＋ベストエフォート永続化）で流し、
//! セッション終了時にoneshotで確実に停止する。

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;

use crate::api::chat_store::ChatStore;
use crate::chat::controller::publish_local_first;
use crate::chat::message::{generate_message_id, ChatMessage};
use crate::config::ChatConfig;
use crate::session::{SessionId, StreamId};
use crate::state::{AppEvent, StateManager};

/// デモメッセージの候補プール
const DEMO_MESSAGES: [&str; 14] = [
    "This is so exciting!",
    "Great gameplay! 🎮",
    "When does the next match start?",
    "The graphics are incredible",
    "Go team blue! 💙",
    "This player is insane!",
    "Best stream on the platform",
    "Love the camera angles 📹",
    "Who's your favorite player?",
    "This tournament is epic! 🏆",
    "Amazing stream quality!",
    "Can't wait for the finals!",
    "Such good commentary",
    "This game is intense! 🔥",
];

/// デモユーザー名の候補プール
const DEMO_USERS: [&str; 14] = [
    "GamerX",
    "StreamFan",
    "EsportsLover",
    "ProPlayer",
    "TournamentWatcher",
    "GameMaster",
    "StreamViewer",
    "EpicGamer",
    "ChatModerator",
    "FanBoy2025",
    "ESportsKing",
    "GameChampion",
    "StreamAddict",
    "TourneyFan",
];

/// サブスクバッジが付く確率
const SUB_BADGE_PROBABILITY: f64 = 0.15;

/// デモメッセージを1件組み立てる
pub fn build_demo_message(session_id: &SessionId) -> ChatMessage {
    let mut rng = rand::thread_rng();
    let username = DEMO_USERS[rng.gen_range(0..DEMO_USERS.len())];
    let content = DEMO_MESSAGES[rng.gen_range(0..DEMO_MESSAGES.len())];
    let badges = if rng.gen_bool(SUB_BADGE_PROBABILITY) {
        vec!["sub".to_string()]
    } else {
        Vec::new()
    };

    ChatMessage {
        id: generate_message_id("demo"),
        username: username.to_string(),
        content: content.to_string(),
        timestamp: chrono::Utc::now(),
        badges,
        is_system: false,
        is_own_message: false,
        session_id: Some(session_id.clone()),
    }
}

/// 生成タスクを起動し、停止用のシグナル送信側を返す
///
/// tickごとに確率ゲートを通った場合のみ1件生成する。視聴者数の
/// ゆらぎもここで一緒に流す。
pub fn spawn_generator(
    state: Arc<StateManager>,
    store: Arc<dyn ChatStore>,
    stream_id: StreamId,
    session_id: SessionId,
    config: &ChatConfig,
) -> oneshot::Sender<()> {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let period = Duration::from_secs(config.demo_interval_secs.max(1));
    let probability = config.demo_probability.clamp(0.0, 1.0);

    tokio::spawn(async move {
        // 最初のtickは1周期後（起動直後に連射しない）
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        tracing::info!(
            "🎭 [DEMO] Demo traffic generator started for session {}",
            session_id
        );

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("🛑 [DEMO] Demo traffic generator stopped");
                    break;
                }
                _ = interval.tick() => {
                    if !rand::thread_rng().gen_bool(probability) {
                        continue;
                    }

                    let message = build_demo_message(&session_id);
                    publish_local_first(
                        Arc::clone(&state),
                        Arc::clone(&store),
                        stream_id.clone(),
                        message,
                    );

                    // 視聴者数のゆらぎ（-3〜+4）
                    let delta = rand::thread_rng().gen_range(-3..5);
                    let _ = state.send_event(AppEvent::ViewerCountChanged { delta });
                }
            }
        }
    });

    shutdown_tx
}
