//! 外部コラボレーターへのクライアント層
//!
//! マネージドテーブルサービスとマネージド推論エンドポイントの
//! リクエスト/レスポンス契約だけをここで扱う。サービス内部の挙動は
//! この層の関心外。

pub mod chat_store;
pub mod inference;

pub use chat_store::{ChatStore, StoreError, TableStoreClient};
pub use inference::{InferenceBackend, InferenceClient, InferenceError};
