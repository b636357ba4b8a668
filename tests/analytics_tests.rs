//! 分析ウィジェットの統合テスト
//!
//! ファンアウト/ファンインの統合、再入ガード、旧セッション宛て
//! スナップショットの破棄を検証する。

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{build_app, test_config, MemoryChatStore, ScriptedInference};
use gghub::analytics::snapshot::SentimentLabel;
use gghub::chat::message::generate_message_id;
use gghub::{ChatMessage, StreamStatus};

const SENTIMENT_JSON: &str = r#"{
    "sentiment": {"overall": "excited", "score": 0.8, "confidence": 0.9},
    "summary": "Chat is hyped for the finals.",
    "engagement": {"level": "high", "indicators": ["rapid messages"]},
    "recommendations": ["keep the energy up"]
}"#;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

fn viewer_message(username: &str, session_id: gghub::SessionId) -> ChatMessage {
    ChatMessage {
        id: generate_message_id("seed"),
        username: username.to_string(),
        content: "what a play".to_string(),
        timestamp: chrono::Utc::now(),
        badges: Vec::new(),
        is_system: false,
        is_own_message: false,
        session_id: Some(session_id),
    }
}

#[tokio::test]
async fn test_refresh_produces_single_complete_snapshot() {
    // 感情分析がバッジ分析より後に完了する逆転順でも、部分更新は
    // 観測されず、最初に見えるスナップショットは両方を含む
    let config = test_config();
    let store = Arc::new(MemoryChatStore::new());
    let inference = Arc::new(ScriptedInference::ok(SENTIMENT_JSON).with_delays(200, 10));
    let mut app = build_app(&config, Arc::clone(&store), Arc::clone(&inference));

    app.apply_status(StreamStatus::live());
    settle().await;
    let session_id = app
        .state()
        .get_state()
        .unwrap()
        .session
        .unwrap()
        .session_id;

    let stream_id = app.stream_id().clone();
    store.seed(&viewer_message("GamerX", session_id.clone()), &stream_id);
    store.seed(&viewer_message("GamerX", session_id.clone()), &stream_id);
    store.seed(&viewer_message("StreamFan", session_id), &stream_id);

    app.refresh_analytics();

    // スナップショットが現れた瞬間に両方の結果が揃っていること
    let mut snapshot = None;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if let Some(found) = app.state().get_state().unwrap().snapshot {
            snapshot = Some(found);
            break;
        }
    }
    let snapshot = snapshot.expect("snapshot produced");

    assert_eq!(snapshot.sentiment.overall, SentimentLabel::Excited);
    assert_eq!(snapshot.summary, "Chat is hyped for the finals.");
    // バッジ側: GamerX 2件→レベル3、StreamFan 1件→レベル2
    assert_eq!(snapshot.badges.total_users, 2);
    assert_eq!(snapshot.badges.distribution.get(&3), Some(&1));
    assert_eq!(snapshot.badges.distribution.get(&2), Some(&1));
}

#[tokio::test]
async fn test_refresh_while_in_flight_is_a_noop() {
    let config = test_config();
    let store = Arc::new(MemoryChatStore::new());
    let inference = Arc::new(ScriptedInference::ok(SENTIMENT_JSON).with_delays(300, 300));
    let mut app = build_app(&config, Arc::clone(&store), Arc::clone(&inference));

    app.apply_status(StreamStatus::live());
    settle().await;
    let session_id = app
        .state()
        .get_state()
        .unwrap()
        .session
        .unwrap()
        .session_id;
    store.seed(
        &viewer_message("GamerX", session_id),
        &app.stream_id().clone(),
    );

    app.refresh_analytics();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // 実行中の再リフレッシュは無視される（キューされない）
    app.refresh_analytics();
    app.refresh_analytics();

    tokio::time::sleep(Duration::from_millis(900)).await;
    // 1サイクル = 感情 + バッジの2呼び出しだけ
    assert_eq!(inference.call_count(), 2);
}

#[tokio::test]
async fn test_stale_snapshot_does_not_touch_new_session() {
    let config = test_config();
    let store = Arc::new(MemoryChatStore::new());
    let inference = Arc::new(ScriptedInference::ok(SENTIMENT_JSON).with_delays(400, 400));
    let mut app = build_app(&config, Arc::clone(&store), Arc::clone(&inference));

    app.apply_status(StreamStatus::live());
    settle().await;
    let first_session = app
        .state()
        .get_state()
        .unwrap()
        .session
        .unwrap()
        .session_id;
    store.seed(
        &viewer_message("GamerX", first_session),
        &app.stream_id().clone(),
    );

    // 旧セッション宛てのリフレッシュを飛ばしてからセッションを切り替える
    app.refresh_analytics();
    tokio::time::sleep(Duration::from_millis(50)).await;
    app.apply_status(StreamStatus::offline());
    settle().await;
    app.apply_status(StreamStatus::live());
    settle().await;

    // 旧セッションの分析が完了しても新セッションの状態は汚れない
    tokio::time::sleep(Duration::from_millis(700)).await;
    let state = app.state().get_state().unwrap();
    assert!(state.snapshot.is_none());
}

#[tokio::test]
async fn test_badge_histogram_survives_inference_outage() {
    let config = test_config();
    let store = Arc::new(MemoryChatStore::new());
    let inference = Arc::new(ScriptedInference::failing());
    let mut app = build_app(&config, Arc::clone(&store), Arc::clone(&inference));

    app.apply_status(StreamStatus::live());
    settle().await;
    let session_id = app
        .state()
        .get_state()
        .unwrap()
        .session
        .unwrap()
        .session_id;
    let stream_id = app.stream_id().clone();
    store.seed(&viewer_message("A", session_id.clone()), &stream_id);
    store.seed(&viewer_message("A", session_id.clone()), &stream_id);
    store.seed(&viewer_message("B", session_id), &stream_id);

    app.refresh_analytics();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = app
        .state()
        .get_state()
        .unwrap()
        .snapshot
        .expect("fallback snapshot still rendered");

    // センチメントはフォールバック、ヒストグラムは決定的に正しい
    assert_eq!(snapshot.sentiment.overall, SentimentLabel::Neutral);
    assert_eq!(snapshot.sentiment.confidence, 0.1);
    assert_eq!(snapshot.badges.total_users, 2);
    assert_eq!(snapshot.badges.distribution.get(&3), Some(&1));
    assert_eq!(snapshot.badges.distribution.get(&2), Some(&1));
    assert!(snapshot.badges.analysis.is_none());
}

#[tokio::test]
async fn test_empty_session_renders_quiet_snapshot() {
    let config = test_config();
    let store = Arc::new(MemoryChatStore::new());
    // 書き込みを落とすことでストアを空に保つ（バナーも入らない）
    store.set_fail_writes(true);
    let inference = Arc::new(ScriptedInference::ok(SENTIMENT_JSON));
    let mut app = build_app(&config, Arc::clone(&store), Arc::clone(&inference));

    app.apply_status(StreamStatus::live());
    settle().await;

    app.refresh_analytics();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = app
        .state()
        .get_state()
        .unwrap()
        .snapshot
        .expect("quiet snapshot rendered");
    assert_eq!(snapshot.summary, "No messages in this session yet.");
    assert_eq!(
        snapshot.recommendations,
        vec!["Start engaging with viewers to build community!".to_string()]
    );
    // 空入力なのでリモートは呼ばれない
    assert_eq!(inference.call_count(), 0);
    assert_eq!(snapshot.badges.total_users, 0);
}

#[tokio::test]
async fn test_upstream_health_reported_independently() {
    let config = test_config();
    let store = Arc::new(MemoryChatStore::new());
    let inference = Arc::new(ScriptedInference::failing());
    let app = build_app(&config, Arc::clone(&store), Arc::clone(&inference));

    app.report_upstream_health().await;
    settle().await;

    let state = app.state().get_state().unwrap();
    assert_eq!(state.store_online, Some(true));
    // 推論側は落ちているがウィジェットは分析とは独立に状態を報告する
    assert_eq!(state.inference_online, Some(false));
}
