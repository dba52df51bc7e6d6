use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{InformeError, PipelineConfig};

/// Token counters reported by the model endpoint, when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total: u32,
    pub prompt: u32,
    pub completion: u32,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: TokenUsage) {
        self.total += other.total;
        self.prompt += other.prompt;
        self.completion += other.completion;
    }
}

/// One model response: the generated text plus optional usage counters.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Seam for the hosted language model so tasks can be exercised with stubs.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, InformeError>;
}

/// Chat-completion client against an OpenAI-compatible endpoint.
pub struct OpenAiModel {
    model: String,
    client: Client<OpenAIConfig>,
}

impl OpenAiModel {
    pub fn new(config: &PipelineConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.expose())
            .with_api_base(&config.api_base);

        Self {
            model: config.model.clone(),
            client: Client::with_config(openai_config),
        }
    }
}

#[async_trait]
impl CompletionModel for OpenAiModel {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, InformeError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(system.to_string()),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(user.to_string()),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| InformeError::Pipeline("model returned no content".to_string()))?;

        let usage = response.usage.map(|usage| TokenUsage {
            total: usage.total_tokens,
            prompt: usage.prompt_tokens,
            completion: usage.completion_tokens,
        });

        Ok(Completion { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_across_calls() {
        let mut total = TokenUsage::default();
        total.accumulate(TokenUsage {
            total: 30,
            prompt: 20,
            completion: 10,
        });
        total.accumulate(TokenUsage {
            total: 12,
            prompt: 7,
            completion: 5,
        });

        assert_eq!(total.total, 42);
        assert_eq!(total.prompt, 27);
        assert_eq!(total.completion, 15);
    }
}
