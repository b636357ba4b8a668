//! 統合テスト用の共有テストダブル
//!
//! ネットワークに出ないインメモリのストアとスクリプト済み推論
//! バックエンド。失敗注入と呼び出し回数の観測ができる。

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gghub::api::chat_store::{
    fold_session_summaries, session_scope, ChatStore, SessionSummary, StoreError,
    StoredMessageRecord,
};
use gghub::api::inference::{InferenceBackend, InferenceError};
use gghub::chat::ChatMessage;
use gghub::session::{SessionId, StreamId};

/// インメモリのチャットストア
#[derive(Default)]
pub struct MemoryChatStore {
    records: Mutex<Vec<StoredMessageRecord>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_count: AtomicUsize,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    pub fn seed(&self, message: &ChatMessage, stream_id: &StreamId) {
        let record = StoredMessageRecord::from_message(message, stream_id);
        self.records.lock().unwrap().push(record);
    }

    /// 新しい順のメッセージ列を返す（挿入順の逆）
    fn newest_first(&self, stream_id: &StreamId) -> Vec<ChatMessage> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|record| record.stream_id == stream_id.as_str())
            .cloned()
            .map(StoredMessageRecord::into_message)
            .collect()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn save_message(
        &self,
        message: &ChatMessage,
        stream_id: &StreamId,
    ) -> Result<StoredMessageRecord, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Status(500));
        }
        let record = StoredMessageRecord::from_message(message, stream_id);
        self.records.lock().unwrap().push(record.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn get_messages(
        &self,
        stream_id: &StreamId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Status(500));
        }
        let mut newest_first = self.newest_first(stream_id);
        newest_first.truncate(limit);
        newest_first.reverse();
        Ok(newest_first)
    }

    async fn get_session_messages(
        &self,
        stream_id: &StreamId,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Status(500));
        }
        // 本物と同じくオーバーフェッチ→厳密フィルタの経路を通す
        let mut newest_first = self.newest_first(stream_id);
        newest_first.truncate(limit * 2);
        Ok(session_scope(newest_first, session_id, limit))
    }

    async fn message_count(&self, stream_id: &StreamId) -> Result<usize, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Status(500));
        }
        Ok(self.newest_first(stream_id).len())
    }

    async fn session_message_count(
        &self,
        stream_id: &StreamId,
        session_id: &SessionId,
    ) -> Result<usize, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Status(500));
        }
        Ok(self
            .newest_first(stream_id)
            .iter()
            .filter(|m| m.session_id.as_ref() == Some(session_id))
            .count())
    }

    async fn stream_sessions(
        &self,
        stream_id: &StreamId,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Status(500));
        }
        let records: Vec<StoredMessageRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|record| record.stream_id == stream_id.as_str())
            .cloned()
            .collect();
        let mut summaries = fold_session_summaries(&records);
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn test_connection(&self) -> bool {
        !self.fail_reads.load(Ordering::SeqCst)
    }
}

/// スクリプト済み推論バックエンド
pub struct ScriptedInference {
    /// Noneで失敗応答
    response: Option<String>,
    /// プロンプト内容ごとの遅延（ミリ秒）
    sentiment_delay_ms: u64,
    badge_delay_ms: u64,
    calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn ok(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            sentiment_delay_ms: 0,
            badge_delay_ms: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            sentiment_delay_ms: 0,
            badge_delay_ms: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// 感情分析側をバッジ側より遅く完了させる（完了順の逆転用）
    pub fn with_delays(mut self, sentiment_delay_ms: u64, badge_delay_ms: u64) -> Self {
        self.sentiment_delay_ms = sentiment_delay_ms;
        self.badge_delay_ms = badge_delay_ms;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedInference {
    async fn invoke(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = if prompt.contains("badge distribution") {
            self.badge_delay_ms
        } else {
            self.sentiment_delay_ms
        };
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(InferenceError::Status(500)),
        }
    }
}

/// テスト用の設定（デモ生成はデフォルトで無効）
pub fn test_config() -> gghub::AppConfig {
    let mut config = gghub::AppConfig::default();
    config.stream.stream_id = "test-stream".to_string();
    config.chat.demo_traffic = false;
    config
}

/// モックを注入したアプリを組み立てる
pub fn build_app(
    config: &gghub::AppConfig,
    store: Arc<MemoryChatStore>,
    inference: Arc<ScriptedInference>,
) -> gghub::App {
    let stream_id = StreamId::new(config.stream.stream_id.clone());
    let state = gghub::StateManager::new(config.chat.window_size);
    let analytics = Arc::new(gghub::AnalyticsService::new(
        inference,
        config.inference.clone(),
    ));
    gghub::App::with_services(config, stream_id, state, store, analytics)
}
