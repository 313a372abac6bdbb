use async_trait::async_trait;
use tracing::debug;

use crate::capability::{AnswerRequest, CapabilityClient, Failure};
use crate::llm::{LlmClient, Message};

use super::INSUFFICIENT_DATA;

/// Responder backed by an OpenAI-compatible chat completion
#[derive(Debug, Clone)]
pub struct LlmResponder {
    client: LlmClient,
}

impl LlmResponder {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

/// Grounded-answer prompt for one question
pub fn answer_prompt(query: &str, context: &str) -> String {
    format!(
        "Answer ONLY using context. Say \"{}\" if unknown.\n\nCONTEXT:\n{}\n\nQUESTION:\n{}\n",
        INSUFFICIENT_DATA, context, query
    )
}

#[async_trait]
impl CapabilityClient for LlmResponder {
    type Request = AnswerRequest;
    type Response = String;

    fn name(&self) -> &str {
        "llm-responder"
    }

    async fn invoke(&self, request: &AnswerRequest) -> Result<String, Failure> {
        let prompt = answer_prompt(&request.query, &request.context);
        let response = self.client.complete(vec![Message::user(prompt)]).await?;
        debug!(tokens = response.tokens_used, "Answer received");

        let answer = response.content.trim();
        if answer.is_empty() {
            return Err(Failure::InvalidResponse("empty answer".to_string()));
        }
        Ok(answer.to_string())
    }
}
