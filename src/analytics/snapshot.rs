//! 分析スナップショットのデータモデル
//!
//! 推論エンドポイントの応答は欠損や型ゆれを許容して受け取り、
//! 正規化してからウィジェット状態に載せる。スナップショットは
//! サイクルごとに全量再計算され、前回分を丸ごと置き換える。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 総合センチメントのラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    VeryPositive,
    Positive,
    Excited,
    Mixed,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// モデル出力の文字列から判定（不明値はNeutral）
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "very positive" | "very_positive" => SentimentLabel::VeryPositive,
            "positive" => SentimentLabel::Positive,
            "excited" => SentimentLabel::Excited,
            "mixed" => SentimentLabel::Mixed,
            "negative" => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            SentimentLabel::VeryPositive => "Very Positive",
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Excited => "Excited",
            SentimentLabel::Mixed => "Mixed",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::Negative => "Negative",
        }
    }
}

/// エンゲージメントレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl EngagementLevel {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "low" => EngagementLevel::Low,
            "high" => EngagementLevel::High,
            "very_high" | "very high" => EngagementLevel::VeryHigh,
            _ => EngagementLevel::Medium,
        }
    }
}

/// センチメント指標
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentInsight {
    pub overall: SentimentLabel,
    /// -1.0〜1.0
    pub score: f64,
    /// 0.0〜1.0
    pub confidence: f64,
}

/// 注目メッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub kind: String,
    pub content: String,
    pub username: String,
    pub reason: Option<String>,
}

/// 話題と言及数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMention {
    pub topic: String,
    pub mentions: u32,
    pub sentiment: SentimentLabel,
}

/// エンゲージメント指標
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementInsight {
    pub level: EngagementLevel,
    pub indicators: Vec<String>,
    pub unique_users: usize,
    pub average_message_length: f64,
}

/// 感情分析の結果一式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReport {
    pub sentiment: SentimentInsight,
    pub summary: String,
    pub highlights: Vec<Highlight>,
    pub topics: Vec<TopicMention>,
    pub engagement: EngagementInsight,
    pub recommendations: Vec<String>,
    /// リモート呼び出しなしで組み立てた決定的フォールバックかどうか
    pub fallback: bool,
}

impl SentimentReport {
    /// 入力が空のときの決定的スナップショット（リモート呼び出しなし）
    pub fn empty(summary: &str) -> Self {
        Self {
            sentiment: SentimentInsight {
                overall: SentimentLabel::Neutral,
                score: 0.0,
                confidence: 0.0,
            },
            summary: summary.to_string(),
            highlights: Vec::new(),
            topics: Vec::new(),
            engagement: EngagementInsight {
                level: EngagementLevel::Low,
                indicators: Vec::new(),
                unique_users: 0,
                average_message_length: 0.0,
            },
            recommendations: Vec::new(),
            fallback: true,
        }
    }

    /// リモート失敗時の決定的フォールバック
    ///
    /// ローカルで計算できる数値はそのまま載せ、ウィジェットが描画
    /// 不能にならないことを保証する。
    pub fn unavailable(message_count: usize, unique_users: usize, average_length: f64) -> Self {
        Self {
            sentiment: SentimentInsight {
                overall: SentimentLabel::Neutral,
                score: 0.0,
                confidence: 0.1,
            },
            summary: "Basic analysis completed. AI analysis temporarily unavailable.".to_string(),
            highlights: Vec::new(),
            topics: Vec::new(),
            engagement: EngagementInsight {
                level: if message_count > 10 {
                    EngagementLevel::Medium
                } else {
                    EngagementLevel::Low
                },
                indicators: vec!["Message count".to_string()],
                unique_users,
                average_message_length: average_length,
            },
            recommendations: vec!["Check network connectivity for full AI analysis".to_string()],
            fallback: true,
        }
    }

    /// モデル応答を正規化して組み立てる
    ///
    /// 欠損フィールドは既定値で補い、リスト類は表示上限に切り詰める。
    /// ユニークユーザー数と平均文字数はモデル出力を信用せず、ローカル
    /// 計算値で上書きする。
    pub fn from_raw(raw: RawSentimentReport, unique_users: usize, average_length: f64) -> Self {
        let sentiment = raw.sentiment.unwrap_or_default();
        let engagement = raw.engagement.unwrap_or_default();

        Self {
            sentiment: SentimentInsight {
                overall: SentimentLabel::parse(sentiment.overall.as_deref().unwrap_or("neutral")),
                score: sentiment.score.unwrap_or(0.0).clamp(-1.0, 1.0),
                confidence: sentiment.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            },
            summary: raw
                .summary
                .unwrap_or_else(|| "Chat analysis completed.".to_string()),
            highlights: raw
                .highlights
                .into_iter()
                .filter_map(|highlight| {
                    Some(Highlight {
                        kind: highlight.kind.unwrap_or_else(|| "positive".to_string()),
                        content: highlight.content?,
                        username: highlight.username.unwrap_or_else(|| "viewer".to_string()),
                        reason: highlight.reason,
                    })
                })
                .take(5)
                .collect(),
            topics: raw
                .topics
                .into_iter()
                .filter_map(|topic| {
                    Some(TopicMention {
                        topic: topic.topic?,
                        mentions: topic.mentions.unwrap_or(0.0).max(0.0) as u32,
                        sentiment: SentimentLabel::parse(
                            topic.sentiment.as_deref().unwrap_or("neutral"),
                        ),
                    })
                })
                .take(8)
                .collect(),
            engagement: EngagementInsight {
                level: EngagementLevel::parse(engagement.level.as_deref().unwrap_or("medium")),
                indicators: engagement.indicators,
                unique_users,
                average_message_length: average_length,
            },
            recommendations: raw.recommendations.into_iter().take(3).collect(),
            fallback: false,
        }
    }
}

/// コミュニティ健全性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityHealth {
    pub newcomer_retention: String,
    pub veteran_engagement: String,
    pub overall_score: u32,
}

/// バッジ分布へのモデル講評
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeCommentary {
    pub engagement_quality: String,
    pub distribution_analysis: String,
    pub insights: Vec<String>,
    pub community_health: Option<CommunityHealth>,
    pub recommendations: Vec<String>,
}

impl BadgeCommentary {
    /// 応答が解釈できなかったときの既定講評
    pub fn canned() -> Self {
        Self {
            engagement_quality: "medium".to_string(),
            distribution_analysis: "Badge distribution analysis completed".to_string(),
            insights: vec!["User engagement patterns identified".to_string()],
            community_health: Some(CommunityHealth {
                newcomer_retention: "Active newcomer participation".to_string(),
                veteran_engagement: "Good veteran user engagement".to_string(),
                overall_score: 75,
            }),
            recommendations: vec!["Continue encouraging user participation".to_string()],
        }
    }
}

/// バッジ分布レポート
///
/// ヒストグラムはローカル計算の決定値。analysisのみリモート依存で、
/// 取得できなければNoneになる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeReport {
    /// バッジレベル(1〜6) → ユーザー数
    pub distribution: BTreeMap<u8, usize>,
    pub total_users: usize,
    pub analysis: Option<BadgeCommentary>,
}

impl BadgeReport {
    pub fn empty() -> Self {
        Self {
            distribution: BTreeMap::new(),
            total_users: 0,
            analysis: None,
        }
    }
}

/// 分析スナップショット
///
/// 1リフレッシュサイクルの確定結果。部分更新はなく、常に丸ごと
/// 置き換えられる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub sentiment: SentimentInsight,
    pub summary: String,
    pub highlights: Vec<Highlight>,
    pub topics: Vec<TopicMention>,
    pub engagement: EngagementInsight,
    pub recommendations: Vec<String>,
    pub badges: BadgeReport,
    pub last_analyzed_at: DateTime<Utc>,
}

impl AnalyticsSnapshot {
    /// センチメントとバッジの両結果を1つのスナップショットへ統合
    pub fn merge(report: SentimentReport, badges: BadgeReport) -> Self {
        Self {
            sentiment: report.sentiment,
            summary: report.summary,
            highlights: report.highlights,
            topics: report.topics,
            engagement: report.engagement,
            recommendations: report.recommendations,
            badges,
            last_analyzed_at: Utc::now(),
        }
    }
}

// ---- モデル応答の生デシリアライズ型（欠損許容） ----

#[derive(Debug, Default, Deserialize)]
pub struct RawSentimentReport {
    #[serde(default)]
    pub sentiment: Option<RawSentiment>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub highlights: Vec<RawHighlight>,
    #[serde(default)]
    pub topics: Vec<RawTopic>,
    #[serde(default)]
    pub engagement: Option<RawEngagement>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawSentiment {
    #[serde(default)]
    pub overall: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawHighlight {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTopic {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub mentions: Option<f64>,
    #[serde(default)]
    pub sentiment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawEngagement {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawBadgeCommentary {
    #[serde(default)]
    pub engagement_quality: Option<String>,
    #[serde(default)]
    pub distribution_analysis: Option<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub community_health: Option<RawCommunityHealth>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCommunityHealth {
    #[serde(default)]
    pub newcomer_retention: Option<String>,
    #[serde(default)]
    pub veteran_engagement: Option<String>,
    #[serde(default)]
    pub overall_score: Option<f64>,
}

impl BadgeCommentary {
    pub fn from_raw(raw: RawBadgeCommentary) -> Self {
        Self {
            engagement_quality: raw.engagement_quality.unwrap_or_else(|| "medium".to_string()),
            distribution_analysis: raw
                .distribution_analysis
                .unwrap_or_else(|| "Badge distribution analysis completed".to_string()),
            insights: raw.insights,
            community_health: raw.community_health.map(|health| CommunityHealth {
                newcomer_retention: health
                    .newcomer_retention
                    .unwrap_or_else(|| "Unknown".to_string()),
                veteran_engagement: health
                    .veteran_engagement
                    .unwrap_or_else(|| "Unknown".to_string()),
                overall_score: health.overall_score.unwrap_or(0.0).clamp(0.0, 100.0) as u32,
            }),
            recommendations: raw.recommendations,
        }
    }
}
