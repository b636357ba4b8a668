//! マネージドLLM推論エンドポイントクライアント
//!
//! プロンプトを送ってテキスト応答を受け取るだけの薄い層。応答の
//! JSON解釈やフォールバックは分析サービス側の責務。

use async_trait::async_trait;
use serde_json::json;

use crate::config::InferenceConfig;

#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error("Request failed")]
    Transport(#[from] reqwest::Error),
    #[error("Authentication rejected by inference endpoint")]
    Auth,
    #[error("Inference endpoint returned status {0}")]
    Status(u16),
    #[error("Response contained no text content")]
    EmptyResponse,
    #[error("Failed to parse response")]
    Parse(#[from] serde_json::Error),
}

/// 推論バックエンドの抽象
///
/// テストではスクリプト済み応答を返すダブルを差し込む。
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// プロンプトを送信し、最初のテキストブロックを返す
    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InferenceError>;
}

/// 推論エンドポイントのHTTPクライアント
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    pub fn has_credentials(&self) -> bool {
        self.config.api_key.is_some()
    }
}

#[async_trait]
impl InferenceBackend for InferenceClient {
    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InferenceError> {
        let url = format!(
            "{}/model/{}/invoke",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model_id
        );

        let body = json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [
                {
                    "role": "user",
                    "content": prompt,
                }
            ],
        });

        let mut request = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("accept", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.header("x-api-key", key.as_str());
        }

        let response = request.json(&body).send().await?;
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(InferenceError::Auth);
        }
        if !status.is_success() {
            return Err(InferenceError::Status(status.as_u16()));
        }

        let payload: serde_json::Value = response.json().await?;
        let text = payload
            .get("content")
            .and_then(|content| content.get(0))
            .and_then(|block| block.get("text"))
            .and_then(|text| text.as_str())
            .ok_or(InferenceError::EmptyResponse)?;

        Ok(text.to_string())
    }
}

/// モデル応答からJSONペイロードを切り出す
///
/// モデルは前置きの文章やコードフェンスでJSONを包むことがあるため、
/// 最初の `{` から最後の `}` までを候補として返す。見つからなければNone。
pub fn extract_json_payload(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_payload_plain() {
        let text = r#"{"sentiment": {"overall": "positive"}}"#;
        assert_eq!(extract_json_payload(text), Some(text));
    }

    #[test]
    fn test_extract_json_payload_with_prose_and_fences() {
        let text = "Here is the analysis:\n```json\n{\"summary\": \"ok\"}\n```\nDone.";
        assert_eq!(extract_json_payload(text), Some("{\"summary\": \"ok\"}"));
    }

    #[test]
    fn test_extract_json_payload_missing() {
        assert_eq!(extract_json_payload("no json here"), None);
        assert_eq!(extract_json_payload("} backwards {"), None);
    }
}
