//! AI分析層
//!
//! スナップショットモデル、分析サービス、ウィジェットコントローラー。

pub mod service;
pub mod snapshot;
pub mod widget;

pub use service::{badge_histogram, collect_user_activity, AnalyticsService};
pub use snapshot::{AnalyticsSnapshot, BadgeReport, SentimentReport};
pub use widget::AnalyticsWidgetController;
