//! バッジレベル算出
//!
//! セッション内の発言数だけで決まる純粋関数。レベル定義は
//! バッジウィジェットと分析ヒストグラムの両方で共有する。

use serde::{Deserialize, Serialize};

/// バッジレベル（1〜6の序数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BadgeLevel {
    Newcomer,
    Chatter,
    ActiveVoice,
    CommunityMember,
    ChatChampion,
    Legend,
}

impl BadgeLevel {
    /// 発言数からレベルを算出
    pub fn for_count(comment_count: usize) -> Self {
        match comment_count {
            0 => BadgeLevel::Newcomer,
            1 => BadgeLevel::Chatter,
            2 => BadgeLevel::ActiveVoice,
            3 => BadgeLevel::CommunityMember,
            4 => BadgeLevel::ChatChampion,
            _ => BadgeLevel::Legend,
        }
    }

    /// 序数（表示・ヒストグラムのキー）
    pub fn level(&self) -> u8 {
        match self {
            BadgeLevel::Newcomer => 1,
            BadgeLevel::Chatter => 2,
            BadgeLevel::ActiveVoice => 3,
            BadgeLevel::CommunityMember => 4,
            BadgeLevel::ChatChampion => 5,
            BadgeLevel::Legend => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BadgeLevel::Newcomer => "Newcomer",
            BadgeLevel::Chatter => "Chatter",
            BadgeLevel::ActiveVoice => "Active Voice",
            BadgeLevel::CommunityMember => "Community Member",
            BadgeLevel::ChatChampion => "Chat Champion",
            BadgeLevel::Legend => "Legend",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BadgeLevel::Newcomer => "Welcome to GlobalGaming! Your journey begins here.",
            BadgeLevel::Chatter => "Made your first comment! Keep the conversation going.",
            BadgeLevel::ActiveVoice => "2+ comments - You're getting engaged with the community!",
            BadgeLevel::CommunityMember => "3+ comments - A valued member of our chat community.",
            BadgeLevel::ChatChampion => "4+ comments - You're really part of the conversation!",
            BadgeLevel::Legend => "5+ comments - A true GlobalGaming legend!",
        }
    }

    /// このレベルに必要な発言数
    pub fn required_comments(&self) -> usize {
        match self {
            BadgeLevel::Newcomer => 0,
            BadgeLevel::Chatter => 1,
            BadgeLevel::ActiveVoice => 2,
            BadgeLevel::CommunityMember => 3,
            BadgeLevel::ChatChampion => 4,
            BadgeLevel::Legend => 5,
        }
    }

    /// 次のレベル（最上位ではNone）
    pub fn next(&self) -> Option<BadgeLevel> {
        match self {
            BadgeLevel::Newcomer => Some(BadgeLevel::Chatter),
            BadgeLevel::Chatter => Some(BadgeLevel::ActiveVoice),
            BadgeLevel::ActiveVoice => Some(BadgeLevel::CommunityMember),
            BadgeLevel::CommunityMember => Some(BadgeLevel::ChatChampion),
            BadgeLevel::ChatChampion => Some(BadgeLevel::Legend),
            BadgeLevel::Legend => None,
        }
    }

    /// 全レベルの昇順リスト
    pub fn all() -> [BadgeLevel; 6] {
        [
            BadgeLevel::Newcomer,
            BadgeLevel::Chatter,
            BadgeLevel::ActiveVoice,
            BadgeLevel::CommunityMember,
            BadgeLevel::ChatChampion,
            BadgeLevel::Legend,
        ]
    }
}

/// 次レベルへの進捗
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BadgeProgress {
    pub current_comments: usize,
    pub needed_comments: usize,
    pub is_max_level: bool,
}

/// 発言数から次レベルへの進捗を算出
pub fn progress_to_next(comment_count: usize) -> BadgeProgress {
    let current = BadgeLevel::for_count(comment_count);
    match current.next() {
        Some(next) => BadgeProgress {
            current_comments: comment_count,
            needed_comments: next.required_comments(),
            is_max_level: false,
        },
        None => BadgeProgress {
            current_comments: BadgeLevel::Legend.required_comments(),
            needed_comments: BadgeLevel::Legend.required_comments(),
            is_max_level: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_from_comment_counts() {
        assert_eq!(BadgeLevel::for_count(0), BadgeLevel::Newcomer);
        assert_eq!(BadgeLevel::for_count(1), BadgeLevel::Chatter);
        assert_eq!(BadgeLevel::for_count(2), BadgeLevel::ActiveVoice);
        assert_eq!(BadgeLevel::for_count(3), BadgeLevel::CommunityMember);
        assert_eq!(BadgeLevel::for_count(4), BadgeLevel::ChatChampion);
        assert_eq!(BadgeLevel::for_count(5), BadgeLevel::Legend);
        // 5以上はすべてLegend
        assert_eq!(BadgeLevel::for_count(120), BadgeLevel::Legend);
    }

    #[test]
    fn test_level_ordinals() {
        for (idx, level) in BadgeLevel::all().iter().enumerate() {
            assert_eq!(level.level() as usize, idx + 1);
        }
    }

    #[test]
    fn test_progress_to_next() {
        let progress = progress_to_next(2);
        assert_eq!(progress.current_comments, 2);
        assert_eq!(progress.needed_comments, 3);
        assert!(!progress.is_max_level);

        let maxed = progress_to_next(7);
        assert!(maxed.is_max_level);
        assert_eq!(maxed.needed_comments, 5);
    }
}
