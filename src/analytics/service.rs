//! チャット分析サービス
//!
//! 推論エンドポイントへの2系統の分析操作を提供する。
//! - 感情分析: 直近メッセージをプロンプトに埋め込んで送る
//! - バッジ分布: ヒストグラムはローカルで決定的に計算し、集計値のみ
//!   送って講評を得る（生メッセージは送らない）
//!
//! どちらも失敗を外へ伝播しない。ウィジェットが描画不能になる状態を
//! 作らないため、必ず決定的フォールバックへ落とす。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::inference::{extract_json_payload, InferenceBackend};
use crate::chat::message::ChatMessage;
use crate::config::InferenceConfig;

use super::snapshot::{
    BadgeCommentary, BadgeReport, RawBadgeCommentary, RawSentimentReport, SentimentReport,
};
use crate::chat::badges::BadgeLevel;

/// プロンプトへ埋め込む直近メッセージの上限
const PROMPT_MESSAGE_LIMIT: usize = 50;

/// ユーザーごとの活動集計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserActivity {
    pub message_count: usize,
    pub total_length: usize,
}

impl UserActivity {
    pub fn average_length(&self) -> f64 {
        if self.message_count == 0 {
            0.0
        } else {
            self.total_length as f64 / self.message_count as f64
        }
    }
}

/// 分析サービス
///
/// 共有可変状態を持たないため、2つの操作は同一サイクル内で並行に
/// 呼び出してよい。
pub struct AnalyticsService {
    backend: Arc<dyn InferenceBackend>,
    config: InferenceConfig,
}

impl AnalyticsService {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: InferenceConfig) -> Self {
        Self { backend, config }
    }

    /// チャット全体の感情分析
    ///
    /// 入力が空ならリモートを呼ばずに決定的な中立スナップショットを
    /// 返す。リモート失敗・応答不正もフォールバックに吸収する。
    pub async fn analyze_chat_sentiment(
        &self,
        messages: &[ChatMessage],
        stream_context: &str,
    ) -> SentimentReport {
        if messages.is_empty() {
            return SentimentReport::empty("No messages to analyze yet.");
        }

        let user_messages: Vec<&ChatMessage> =
            messages.iter().filter(|m| !m.is_system).collect();
        if user_messages.is_empty() {
            return SentimentReport::empty("Only system messages detected.");
        }

        let unique_users = count_unique_users(&user_messages);
        let average_length = average_message_length(&user_messages);

        let prompt = build_sentiment_prompt(&user_messages, stream_context);

        tracing::debug!(
            "🤖 [ANALYTICS] Sending {} messages for sentiment analysis",
            user_messages.len().min(PROMPT_MESSAGE_LIMIT)
        );

        match self
            .backend
            .invoke(&prompt, self.config.max_tokens, self.config.temperature)
            .await
        {
            Ok(text) => {
                let raw = parse_sentiment_payload(&text);
                SentimentReport::from_raw(raw, unique_users, average_length)
            }
            Err(e) => {
                tracing::warn!("❌ [ANALYTICS] Sentiment analysis failed: {}", e);
                SentimentReport::unavailable(user_messages.len(), unique_users, average_length)
            }
        }
    }

    /// バッジ分布の分析
    ///
    /// ヒストグラムはリモートの可用性に関わらず常に正しい。講評の
    /// 取得に失敗した場合のみanalysisがNoneになる。
    pub async fn analyze_badge_distribution(&self, messages: &[ChatMessage]) -> BadgeReport {
        let activity = collect_user_activity(messages);
        if activity.is_empty() {
            return BadgeReport::empty();
        }

        let distribution = badge_histogram(&activity);
        let total_users = activity.len();
        let total_messages: usize = activity.values().map(|a| a.message_count).sum();

        let prompt = build_badge_prompt(&distribution, &activity, total_users, total_messages);

        let analysis = match self
            .backend
            .invoke(
                &prompt,
                self.config.badge_max_tokens,
                self.config.badge_temperature,
            )
            .await
        {
            Ok(text) => match extract_json_payload(&text)
                .and_then(|payload| serde_json::from_str::<RawBadgeCommentary>(payload).ok())
            {
                Some(raw) => Some(BadgeCommentary::from_raw(raw)),
                None => {
                    tracing::warn!("⚠️ [ANALYTICS] Badge commentary was not valid JSON");
                    Some(BadgeCommentary::canned())
                }
            },
            Err(e) => {
                tracing::warn!("❌ [ANALYTICS] Badge commentary failed: {}", e);
                None
            }
        };

        BadgeReport {
            distribution,
            total_users,
            analysis,
        }
    }

    /// 疎通確認（分析呼び出しとは独立した最小ラウンドトリップ）
    pub async fn test_connection(&self) -> bool {
        let result = self
            .backend
            .invoke(
                "Respond with 'Connection successful' if you can read this.",
                100,
                0.1,
            )
            .await;

        match result {
            Ok(_) => {
                tracing::info!("✅ [ANALYTICS] Inference connection test successful");
                true
            }
            Err(e) => {
                tracing::warn!("❌ [ANALYTICS] Inference connection test failed: {}", e);
                false
            }
        }
    }
}

/// 非システムメッセージからユーザー活動を集計
///
/// BTreeMapでユーザー名順を固定し、プロンプトを決定的にする。
pub fn collect_user_activity(messages: &[ChatMessage]) -> BTreeMap<String, UserActivity> {
    let mut activity: BTreeMap<String, UserActivity> = BTreeMap::new();
    for message in messages.iter().filter(|m| !m.is_system) {
        let entry = activity.entry(message.username.clone()).or_default();
        entry.message_count += 1;
        entry.total_length += message.content.chars().count();
    }
    activity
}

/// 発言数ヒストグラム（全6レベルのキーを常に持つ）
pub fn badge_histogram(activity: &BTreeMap<String, UserActivity>) -> BTreeMap<u8, usize> {
    let mut distribution: BTreeMap<u8, usize> = BadgeLevel::all()
        .iter()
        .map(|level| (level.level(), 0))
        .collect();

    for stats in activity.values() {
        let level = BadgeLevel::for_count(stats.message_count).level();
        *distribution.entry(level).or_insert(0) += 1;
    }
    distribution
}

fn count_unique_users(messages: &[&ChatMessage]) -> usize {
    let mut users: Vec<&str> = messages.iter().map(|m| m.username.as_str()).collect();
    users.sort_unstable();
    users.dedup();
    users.len()
}

fn average_message_length(messages: &[&ChatMessage]) -> f64 {
    if messages.is_empty() {
        return 0.0;
    }
    let total: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    (total as f64 / messages.len() as f64).round()
}

fn parse_sentiment_payload(text: &str) -> RawSentimentReport {
    match extract_json_payload(text)
        .and_then(|payload| serde_json::from_str::<RawSentimentReport>(payload).ok())
    {
        Some(raw) => raw,
        None => {
            tracing::warn!("⚠️ [ANALYTICS] Sentiment response was not valid JSON, using defaults");
            RawSentimentReport::default()
        }
    }
}

/// 感情分析プロンプトを組み立てる
///
/// 直近50件までをユーザー名・バッジ付きで並べ、固定のJSONスキーマ
/// 指示を付ける。
fn build_sentiment_prompt(user_messages: &[&ChatMessage], stream_context: &str) -> String {
    let recent: Vec<String> = user_messages
        .iter()
        .rev()
        .take(PROMPT_MESSAGE_LIMIT)
        .rev()
        .map(|message| {
            if message.badges.is_empty() {
                format!("[{}]: {}", message.username, message.content)
            } else {
                format!(
                    "[{} ({})]: {}",
                    message.username,
                    message.badges.join(","),
                    message.content
                )
            }
        })
        .collect();

    let context = if stream_context.is_empty() {
        "Gaming/Esports live stream"
    } else {
        stream_context
    };

    format!(
        r#"Analyze this live stream chat data and provide insights:

Stream Context: {context}
Total Messages: {total}
Timeframe: Current live session

Chat Messages:
{messages}

Please provide a JSON response with the following structure:
{{
  "sentiment": {{
    "overall": "positive|negative|neutral|excited|mixed",
    "score": -1.0 to 1.0,
    "confidence": 0.0 to 1.0
  }},
  "summary": "2-3 sentence summary of overall chat sentiment and what viewers are discussing",
  "highlights": [
    {{
      "type": "positive|negative|question|excitement",
      "content": "actual message content",
      "username": "username",
      "reason": "why this message is notable"
    }}
  ],
  "topics": [
    {{
      "topic": "topic name",
      "mentions": number,
      "sentiment": "positive|negative|neutral"
    }}
  ],
  "engagement": {{
    "level": "low|medium|high|very_high",
    "indicators": ["what indicates this engagement level"]
  }},
  "recommendations": [
    "actionable suggestions for the streamer based on chat analysis"
  ]
}}

Focus on gaming/esports terminology and be concise but insightful."#,
        context = context,
        total = user_messages.len(),
        messages = recent.join("\n"),
    )
}

/// バッジ講評プロンプトを組み立てる
///
/// 生メッセージではなく集計済みヒストグラムと上位ユーザーの活動
/// サマリーだけを送る。
fn build_badge_prompt(
    distribution: &BTreeMap<u8, usize>,
    activity: &BTreeMap<String, UserActivity>,
    total_users: usize,
    total_messages: usize,
) -> String {
    let distribution_lines: Vec<String> = BadgeLevel::all()
        .iter()
        .map(|level| {
            format!(
                "- Level {} ({}): {} users",
                level.level(),
                level.name(),
                distribution.get(&level.level()).copied().unwrap_or(0)
            )
        })
        .collect();

    let activity_lines: Vec<String> = activity
        .iter()
        .take(10)
        .map(|(username, stats)| {
            format!(
                "{}: {} messages, avg length: {} chars",
                username,
                stats.message_count,
                stats.average_length().round() as u64
            )
        })
        .collect();

    format!(
        r#"Analyze this chat badge distribution and user engagement data:

Badge Distribution:
{distribution}

Total Users: {total_users}
Total Messages: {total_messages}

User Activity Patterns:
{activity}

Provide insights in JSON format:
{{
  "engagement_quality": "low|medium|high|excellent",
  "distribution_analysis": "analysis of badge distribution health",
  "insights": [
    "key insights about user engagement patterns"
  ],
  "community_health": {{
    "newcomer_retention": "assessment of newcomer activity",
    "veteran_engagement": "assessment of high-level user activity",
    "overall_score": 0-100
  }},
  "recommendations": [
    "suggestions to improve engagement based on patterns"
  ]
}}"#,
        distribution = distribution_lines.join("\n"),
        total_users = total_users,
        total_messages = total_messages,
        activity = activity_lines.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::inference::{InferenceBackend, InferenceError};
    use crate::session::SessionId;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// スクリプト済み応答を返すテスト用バックエンド
    struct ScriptedBackend {
        response: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn ok(response: &str) -> Self {
            Self {
                response: Some(response.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn invoke(
            &self,
            _prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Some(text) => Ok(text.clone()),
                None => Err(InferenceError::Status(500)),
            }
        }
    }

    fn viewer_message(username: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: crate::chat::message::generate_message_id("demo"),
            username: username.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            badges: Vec::new(),
            is_system: false,
            is_own_message: false,
            session_id: Some(SessionId::new("session_test")),
        }
    }

    fn service(backend: Arc<ScriptedBackend>) -> AnalyticsService {
        AnalyticsService::new(backend, InferenceConfig::default())
    }

    #[tokio::test]
    async fn test_empty_input_skips_remote_call() {
        let backend = Arc::new(ScriptedBackend::ok("{}"));
        let service = service(Arc::clone(&backend));

        let report = service.analyze_chat_sentiment(&[], "context").await;

        assert_eq!(report, SentimentReport::empty("No messages to analyze yet."));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_system_only_input_skips_remote_call() {
        let backend = Arc::new(ScriptedBackend::ok("{}"));
        let service = service(Arc::clone(&backend));

        let mut banner = viewer_message("StreamMaster", "welcome");
        banner.is_system = true;

        let report = service.analyze_chat_sentiment(&[banner], "").await;
        assert_eq!(report.summary, "Only system messages detected.");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_sentiment_failure_yields_fallback() {
        let backend = Arc::new(ScriptedBackend::failing());
        let service = service(Arc::clone(&backend));

        let messages = vec![
            viewer_message("GamerX", "great play"),
            viewer_message("StreamFan", "lets go"),
        ];

        let report = service.analyze_chat_sentiment(&messages, "").await;

        assert!(report.fallback);
        assert_eq!(report.sentiment.confidence, 0.1);
        assert_eq!(report.engagement.unique_users, 2);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_badge_distribution_survives_remote_failure() {
        // A 2件、B 1件 → Aはレベル3、Bはレベル2
        let backend = Arc::new(ScriptedBackend::failing());
        let service = service(Arc::clone(&backend));

        let messages = vec![
            viewer_message("A", "first"),
            viewer_message("A", "second"),
            viewer_message("B", "hello"),
        ];

        let report = service.analyze_badge_distribution(&messages).await;

        assert_eq!(report.total_users, 2);
        assert_eq!(report.distribution.get(&3), Some(&1));
        assert_eq!(report.distribution.get(&2), Some(&1));
        assert_eq!(report.distribution.get(&1), Some(&0));
        assert_eq!(report.distribution.get(&6), Some(&0));
        // 講評だけがNoneになる
        assert!(report.analysis.is_none());
    }

    #[tokio::test]
    async fn test_badge_commentary_parses_model_json() {
        let backend = Arc::new(ScriptedBackend::ok(
            r#"{"engagement_quality": "high", "distribution_analysis": "healthy mix",
                "insights": ["newcomers are active"],
                "community_health": {"newcomer_retention": "good", "veteran_engagement": "strong", "overall_score": 82},
                "recommendations": ["keep it up"]}"#,
        ));
        let service = service(Arc::clone(&backend));

        let messages = vec![viewer_message("A", "hello")];
        let report = service.analyze_badge_distribution(&messages).await;

        let analysis = report.analysis.expect("commentary present");
        assert_eq!(analysis.engagement_quality, "high");
        assert_eq!(analysis.community_health.unwrap().overall_score, 82);
    }

    #[tokio::test]
    async fn test_badge_commentary_falls_back_on_malformed_json() {
        let backend = Arc::new(ScriptedBackend::ok("sorry, I cannot produce JSON today"));
        let service = service(Arc::clone(&backend));

        let messages = vec![viewer_message("A", "hello")];
        let report = service.analyze_badge_distribution(&messages).await;

        // ヒストグラムは正しく、講評は既定文面
        assert_eq!(report.total_users, 1);
        assert_eq!(report.analysis, Some(BadgeCommentary::canned()));
    }

    #[tokio::test]
    async fn test_sentiment_parses_fenced_json() {
        let backend = Arc::new(ScriptedBackend::ok(
            "Here you go:\n```json\n{\"sentiment\": {\"overall\": \"positive\", \"score\": 0.6, \"confidence\": 0.9}, \"summary\": \"chat is hyped\"}\n```",
        ));
        let service = service(Arc::clone(&backend));

        let messages = vec![viewer_message("A", "hype!")];
        let report = service.analyze_chat_sentiment(&messages, "finals").await;

        assert!(!report.fallback);
        assert_eq!(report.summary, "chat is hyped");
        assert_eq!(report.sentiment.score, 0.6);
    }

    #[test]
    fn test_collect_user_activity_ignores_system() {
        let mut banner = viewer_message("StreamMaster", "welcome!");
        banner.is_system = true;
        let messages = vec![banner, viewer_message("A", "hey"), viewer_message("A", "yo")];

        let activity = collect_user_activity(&messages);
        assert_eq!(activity.len(), 1);
        assert_eq!(activity.get("A").unwrap().message_count, 2);
    }
}
