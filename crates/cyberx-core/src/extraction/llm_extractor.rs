use async_trait::async_trait;
use tracing::debug;

use crate::capability::{CapabilityClient, ExtractRequest, ExtractedFields, Failure};
use crate::llm::{LlmClient, Message, strip_code_fence};

const EXTRACTION_PROMPT: &str = r#"You are a cybersecurity threat intelligence analyst.

Extract structured data from the report:
- actor (main threat actor name)
- nexus (country or state the actor is aligned with, "Unknown" if not stated)
- summary (one or two sentences on the reported activity)
- tags (list of short lowercase tags for tactics, tools, targets)

Return ONLY a valid JSON object with exactly these keys. Use an empty list if no tags apply."#;

/// Extractor backed by an OpenAI-compatible chat completion
#[derive(Debug, Clone)]
pub struct LlmExtractor {
    client: LlmClient,
}

impl LlmExtractor {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityClient for LlmExtractor {
    type Request = ExtractRequest;
    type Response = ExtractedFields;

    fn name(&self) -> &str {
        "llm-extractor"
    }

    async fn invoke(&self, request: &ExtractRequest) -> Result<ExtractedFields, Failure> {
        let messages = vec![
            Message::system(EXTRACTION_PROMPT),
            Message::user(format!(
                "REPORT TITLE: {}\n\nREPORT:\n{}",
                request.title, request.body_text
            )),
        ];

        let response = self.client.complete(messages).await?;
        debug!(tokens = response.tokens_used, "Extraction response received");
        parse_extraction(&response.content)
    }
}

/// Parse the model's JSON answer into fields
pub fn parse_extraction(content: &str) -> Result<ExtractedFields, Failure> {
    let fields: ExtractedFields = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| Failure::InvalidResponse(format!("extraction JSON did not parse: {}", e)))?;

    if fields.actor_name.trim().is_empty() {
        return Err(Failure::InvalidResponse(
            "extraction returned no actor".to_string(),
        ));
    }
    Ok(fields)
}
