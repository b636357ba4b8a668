//! チャットドメイン
//!
//! メッセージモデル、バッジレベル、ビューコントローラー、デモ生成。

pub mod badges;
pub mod controller;
pub mod generator;
pub mod message;

pub use badges::{progress_to_next, BadgeLevel, BadgeProgress};
pub use controller::ChatController;
pub use message::{validate_content, ChatMessage, MessageKind, ValidationError, MAX_MESSAGE_LENGTH};
