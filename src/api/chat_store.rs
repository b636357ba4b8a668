//! チャット永続化テーブルクライアント
//!
//! マネージドKey-Valueテーブルサービス（パーティションキー=配信ID、
//! ソートキー=メッセージID）へのJSON/HTTPSクライアント。書き込みは
//! ベストエフォート（at-least-once）、読み取りは結果整合。呼び出し側は
//! 書き込み失敗をローカル表示に対して致命的と扱ってはならない。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::message::ChatMessage;
use crate::config::StoreConfig;
use crate::session::{SessionId, StreamId};

/// レコードの有効期限（書き込みから7日）
const RECORD_TTL_DAYS: i64 = 7;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Request failed")]
    Transport(#[from] reqwest::Error),
    #[error("Authentication rejected by table service")]
    Auth,
    #[error("Table service returned status {0}")]
    Status(u16),
}

/// 永続化レコード
///
/// ChatMessageのスーパーセット。テーブル属性名はサービス側の
/// スキーマ（PascalCase）に合わせる。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct StoredMessageRecord {
    pub stream_id: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub is_own_message: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// epoch秒。サービス側がこの時刻以降にレコードを破棄する
    pub expires_at: i64,
    pub content_length: usize,
    pub message_type: String,
}

impl StoredMessageRecord {
    /// メッセージから永続化レコードを組み立てる
    pub fn from_message(message: &ChatMessage, stream_id: &StreamId) -> Self {
        let now = Utc::now();
        Self {
            stream_id: stream_id.as_str().to_string(),
            message_id: message.id.clone(),
            timestamp: message.timestamp,
            username: message.username.clone(),
            content: message.content.clone(),
            badges: message.badges.clone(),
            is_own_message: message.is_own_message,
            is_system: message.is_system,
            session_id: message.session_id.as_ref().map(|id| id.as_str().to_string()),
            created_at: now,
            expires_at: (now + Duration::days(RECORD_TTL_DAYS)).timestamp(),
            content_length: message.content.chars().count(),
            message_type: message.kind().as_str().to_string(),
        }
    }

    /// 表示用メッセージへ変換
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: self.message_id,
            username: self.username,
            content: self.content,
            timestamp: self.timestamp,
            badges: self.badges,
            is_system: self.is_system,
            is_own_message: self.is_own_message,
            session_id: self.session_id.map(SessionId::new),
        }
    }
}

/// セッション一覧の要約エントリ
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// 配信統計の要約（ベストエフォート）
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub total_messages: usize,
    pub total_sessions: usize,
    pub recent_sessions: Vec<SessionSummary>,
    pub stream_id: StreamId,
    pub last_updated: DateTime<Utc>,
}

/// 接続状態の要約
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub has_credentials: bool,
    pub endpoint: String,
    pub region: String,
    pub table_name: String,
}

/// 永続化層の抽象
///
/// 本番実装はTableStoreClient。テストではインメモリ実装を差し込む。
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// メッセージを1件書き込む（ベストエフォート）
    async fn save_message(
        &self,
        message: &ChatMessage,
        stream_id: &StreamId,
    ) -> Result<StoredMessageRecord, StoreError>;

    /// 配信の最新メッセージを取得（古い順に並べ替えて返す）
    async fn get_messages(
        &self,
        stream_id: &StreamId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// セッション単位のメッセージを取得（古い順）
    async fn get_session_messages(
        &self,
        stream_id: &StreamId,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// 配信の総メッセージ数（概算）
    async fn message_count(&self, stream_id: &StreamId) -> Result<usize, StoreError>;

    /// セッションの総メッセージ数（概算）
    async fn session_message_count(
        &self,
        stream_id: &StreamId,
        session_id: &SessionId,
    ) -> Result<usize, StoreError>;

    /// 配信のユニークセッション一覧（新しい順）
    async fn stream_sessions(
        &self,
        stream_id: &StreamId,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, StoreError>;

    /// 最小限のラウンドトリップで疎通を確認
    async fn test_connection(&self) -> bool;

    /// 統計要約。部分的な失敗はゼロ値で吸収する
    async fn stream_stats(&self, stream_id: &StreamId) -> StreamStats {
        let (total, sessions) = tokio::join!(
            self.message_count(stream_id),
            self.stream_sessions(stream_id, 5)
        );

        let recent_sessions = sessions.unwrap_or_default();
        StreamStats {
            total_messages: total.unwrap_or(0),
            total_sessions: recent_sessions.len(),
            recent_sessions,
            stream_id: stream_id.clone(),
            last_updated: Utc::now(),
        }
    }
}

/// クエリリクエスト
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    table: &'a str,
    partition_key: &'a str,
    limit: usize,
    /// falseで新しい順に走査
    scan_forward: bool,
    /// サービス側のフィルタ式（Limit適用後に評価される点に注意）
    #[serde(skip_serializing_if = "Option::is_none")]
    session_filter: Option<&'a str>,
    count_only: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    items: Vec<StoredMessageRecord>,
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    table: &'a str,
    item: &'a StoredMessageRecord,
}

/// マネージドテーブルサービスのHTTPクライアント
#[derive(Debug, Clone)]
pub struct TableStoreClient {
    http: reqwest::Client,
    config: StoreConfig,
}

impl TableStoreClient {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// 接続状態の要約を取得
    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            has_credentials: self.config.api_key.is_some(),
            endpoint: self.config.endpoint.clone(),
            region: self.config.region.clone(),
            table_name: self.config.table_name.clone(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path))
            .header("x-request-id", uuid::Uuid::new_v4().to_string());
        if let Some(key) = &self.config.api_key {
            builder = builder.header("x-api-key", key.as_str());
        }
        builder
    }

    async fn query(&self, request: QueryRequest<'_>) -> Result<QueryResponse, StoreError> {
        let response = self.request("v1/query").json(&request).send().await?;
        let response = check_status(response)?;
        Ok(response.json::<QueryResponse>().await?)
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(StoreError::Auth);
    }
    if !status.is_success() {
        return Err(StoreError::Status(status.as_u16()));
    }
    Ok(response)
}

#[async_trait]
impl ChatStore for TableStoreClient {
    async fn save_message(
        &self,
        message: &ChatMessage,
        stream_id: &StreamId,
    ) -> Result<StoredMessageRecord, StoreError> {
        let record = StoredMessageRecord::from_message(message, stream_id);
        let request = PutRequest {
            table: &self.config.table_name,
            item: &record,
        };

        let response = self.request("v1/items").json(&request).send().await?;
        check_status(response)?;

        tracing::debug!(
            "💾 [STORE] Message saved: {}",
            message.content.chars().take(30).collect::<String>()
        );
        Ok(record)
    }

    async fn get_messages(
        &self,
        stream_id: &StreamId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let response = self
            .query(QueryRequest {
                table: &self.config.table_name,
                partition_key: stream_id.as_str(),
                limit,
                scan_forward: false,
                session_filter: None,
                count_only: false,
            })
            .await?;

        let mut messages: Vec<ChatMessage> = response
            .items
            .into_iter()
            .map(StoredMessageRecord::into_message)
            .collect();
        // 新しい順で届くので表示用に古い順へ
        messages.reverse();

        tracing::debug!("📥 [STORE] Retrieved {} messages", messages.len());
        Ok(messages)
    }

    async fn get_session_messages(
        &self,
        stream_id: &StreamId,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        // テーブルは配信IDでしか索引しないため、フィルタで落ちる分を
        // 見込んで2倍オーバーフェッチしてからクライアント側で厳密に絞る
        let response = self
            .query(QueryRequest {
                table: &self.config.table_name,
                partition_key: stream_id.as_str(),
                limit: limit * 2,
                scan_forward: false,
                session_filter: Some(session_id.as_str()),
                count_only: false,
            })
            .await?;

        let fetched: Vec<ChatMessage> = response
            .items
            .into_iter()
            .map(StoredMessageRecord::into_message)
            .collect();
        let messages = session_scope(fetched, session_id, limit);

        tracing::debug!(
            "📥 [STORE] Retrieved {} session messages for {}",
            messages.len(),
            session_id
        );
        Ok(messages)
    }

    async fn message_count(&self, stream_id: &StreamId) -> Result<usize, StoreError> {
        let response = self
            .query(QueryRequest {
                table: &self.config.table_name,
                partition_key: stream_id.as_str(),
                limit: 0,
                scan_forward: false,
                session_filter: None,
                count_only: true,
            })
            .await?;
        Ok(response.count)
    }

    async fn session_message_count(
        &self,
        stream_id: &StreamId,
        session_id: &SessionId,
    ) -> Result<usize, StoreError> {
        let response = self
            .query(QueryRequest {
                table: &self.config.table_name,
                partition_key: stream_id.as_str(),
                limit: 0,
                scan_forward: false,
                session_filter: Some(session_id.as_str()),
                count_only: true,
            })
            .await?;
        Ok(response.count)
    }

    async fn stream_sessions(
        &self,
        stream_id: &StreamId,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, StoreError> {
        // ユニークなセッションを探すため多めに走査する
        let response = self
            .query(QueryRequest {
                table: &self.config.table_name,
                partition_key: stream_id.as_str(),
                limit: limit * 10,
                scan_forward: false,
                session_filter: None,
                count_only: false,
            })
            .await?;

        let mut summaries = fold_session_summaries(&response.items);
        summaries.truncate(limit);

        tracing::debug!(
            "📥 [STORE] Found {} unique sessions for stream {}",
            summaries.len(),
            stream_id
        );
        Ok(summaries)
    }

    async fn test_connection(&self) -> bool {
        let result = self
            .query(QueryRequest {
                table: &self.config.table_name,
                partition_key: "test-connection",
                limit: 1,
                scan_forward: false,
                session_filter: None,
                count_only: false,
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!("✅ [STORE] Connection test successful");
                true
            }
            Err(e) => {
                tracing::warn!("❌ [STORE] Connection test failed: {}", e);
                false
            }
        }
    }
}

/// 新しい順のメッセージ列をセッションで厳密に絞り、古い順でlimit件返す
///
/// サービス側フィルタはLimit適用後に評価されるため、異セッションの
/// レコードが混入し得る。ここでの厳密一致が最終的な正しさを担保する。
pub fn session_scope(
    newest_first: Vec<ChatMessage>,
    session_id: &SessionId,
    limit: usize,
) -> Vec<ChatMessage> {
    let mut scoped: Vec<ChatMessage> = newest_first
        .into_iter()
        .filter(|message| message.session_id.as_ref() == Some(session_id))
        .take(limit)
        .collect();
    scoped.reverse();
    scoped
}

/// 新しい順のレコード列からユニークセッションの要約を畳み込む
pub fn fold_session_summaries(records: &[StoredMessageRecord]) -> Vec<SessionSummary> {
    let mut summaries: Vec<SessionSummary> = Vec::new();

    for record in records {
        let Some(session_id) = &record.session_id else {
            continue;
        };

        match summaries
            .iter_mut()
            .find(|summary| summary.session_id.as_str() == session_id.as_str())
        {
            Some(summary) => {
                if record.timestamp > summary.last_activity {
                    summary.last_activity = record.timestamp;
                }
                if record.timestamp < summary.start_time {
                    summary.start_time = record.timestamp;
                }
            }
            None => summaries.push(SessionSummary {
                session_id: SessionId::new(session_id.clone()),
                start_time: record.timestamp,
                last_activity: record.timestamp,
            }),
        }
    }

    summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::generate_message_id;

    fn message(session: &str, minutes_ago: i64) -> ChatMessage {
        ChatMessage {
            id: generate_message_id("msg"),
            username: "viewer".to_string(),
            content: "hello".to_string(),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            badges: Vec::new(),
            is_system: false,
            is_own_message: false,
            session_id: Some(SessionId::new(session.to_string())),
        }
    }

    #[test]
    fn test_record_roundtrip() {
        let stream_id = StreamId::new("aVHZaA2R5mCI");
        let original = message("session_a", 0);
        let record = StoredMessageRecord::from_message(&original, &stream_id);

        assert_eq!(record.stream_id, "aVHZaA2R5mCI");
        assert_eq!(record.message_type, "viewer");
        assert_eq!(record.content_length, 5);
        // 期限は書き込みから約7日後
        let ttl = record.expires_at - record.created_at.timestamp();
        assert_eq!(ttl, RECORD_TTL_DAYS * 24 * 60 * 60);

        let restored = record.into_message();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_record_attribute_names_match_table_schema() {
        let stream_id = StreamId::new("s");
        let record = StoredMessageRecord::from_message(&message("session_a", 0), &stream_id);
        let value = serde_json::to_value(&record).unwrap();

        for key in [
            "StreamId",
            "MessageId",
            "Timestamp",
            "Username",
            "Content",
            "Badges",
            "IsOwnMessage",
            "IsSystem",
            "SessionId",
            "CreatedAt",
            "ExpiresAt",
            "ContentLength",
            "MessageType",
        ] {
            assert!(value.get(key).is_some(), "missing attribute {}", key);
        }
    }

    #[test]
    fn test_session_scope_drops_foreign_sessions() {
        let target = SessionId::new("session_a");
        // 新しい順: 異セッションのレコードが交じる
        let newest_first = vec![
            message("session_b", 1),
            message("session_a", 2),
            message("session_b", 3),
            message("session_a", 4),
        ];

        let scoped = session_scope(newest_first, &target, 10);
        assert_eq!(scoped.len(), 2);
        assert!(scoped
            .iter()
            .all(|m| m.session_id.as_ref() == Some(&target)));
        // 古い順に並んでいる
        assert!(scoped[0].timestamp < scoped[1].timestamp);
    }

    #[test]
    fn test_session_scope_truncates_to_limit() {
        let target = SessionId::new("session_a");
        let newest_first = vec![
            message("session_a", 1),
            message("session_a", 2),
            message("session_a", 3),
        ];

        let scoped = session_scope(newest_first, &target, 2);
        assert_eq!(scoped.len(), 2);
    }

    #[test]
    fn test_fold_session_summaries() {
        let stream_id = StreamId::new("s");
        let records: Vec<StoredMessageRecord> = vec![
            StoredMessageRecord::from_message(&message("session_b", 1), &stream_id),
            StoredMessageRecord::from_message(&message("session_b", 5), &stream_id),
            StoredMessageRecord::from_message(&message("session_a", 60), &stream_id),
        ];

        let summaries = fold_session_summaries(&records);
        assert_eq!(summaries.len(), 2);
        // 開始時刻の新しい順
        assert_eq!(summaries[0].session_id.as_str(), "session_b");
        assert!(summaries[0].start_time < summaries[0].last_activity);
    }
}
