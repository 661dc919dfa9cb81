//! services/api/src/adapters/openai.rs
//!
//! This module contains the adapter for the generative-AI backend.
//! It implements the `GenerativeAiService` port from the `core` crate on top of
//! OpenAI chat completions.
//!
//! The chat API has no explicit context upload, so a "cached context" is a handle
//! registered by this adapter: the material is sent once as the leading system message
//! to warm the provider's prefix cache, and every later call that presents the handle
//! replays the same prefix. Handles live in process memory and expire with their TTL;
//! an unknown or expired handle is reported as `PortError::ContextExpired`.

const MATERIAL_PREAMBLE: &str = r#"You are an adaptive tutor. Everything you produce must be grounded in the TRAINING MATERIAL below. Do not invent facts that contradict it.

TRAINING MATERIAL ({title}):
---
{text}
---"#;

const JSON_INSTRUCTIONS: &str = r#"Answer with a single JSON value and nothing else. No prose, no markdown fences.
The value must match this JSON Schema exactly:
{schema}"#;

const WARM_UP_PROMPT: &str = "Reply with the single word OK once you have read the training material.";

use adaptive_tutor_core::domain::{ChatMessage, ChatRole, TrainingMaterial};
use adaptive_tutor_core::ports::{GenerativeAiService, MaterialContext, PortError, PortResult};
use adaptive_tutor_core::schema::ResponseSchema;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

struct RegisteredContext {
    preamble: String,
    expires_at: DateTime<Utc>,
}

/// An adapter that implements `GenerativeAiService` using an OpenAI-compatible LLM.
pub struct OpenAiTutorAdapter {
    client: Client<OpenAIConfig>,
    generation_model: String,
    chat_model: String,
    enrichment_model: String,
    contexts: RwLock<HashMap<String, RegisteredContext>>,
    json_fence: Regex,
}

impl OpenAiTutorAdapter {
    /// Creates a new `OpenAiTutorAdapter`.
    pub fn new(
        client: Client<OpenAIConfig>,
        generation_model: String,
        chat_model: String,
        enrichment_model: String,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            generation_model,
            chat_model,
            enrichment_model,
            contexts: RwLock::new(HashMap::new()),
            json_fence: Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$")?,
        })
    }

    async fn register_context(&self, material: &TrainingMaterial, ttl: Duration) -> PortResult<String> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| PortError::Unexpected(e.to_string()))?;
        let now = Utc::now();
        let handle = format!("ctx-{}", Uuid::new_v4());

        let mut contexts = self.contexts.write().await;
        contexts.retain(|_, c| c.expires_at > now);
        contexts.insert(
            handle.clone(),
            RegisteredContext {
                preamble: material_preamble(material),
                expires_at: now + ttl,
            },
        );
        Ok(handle)
    }

    /// Resolves a material context into the system prompt that carries the material.
    async fn preamble_for(&self, context: &MaterialContext) -> PortResult<String> {
        match context {
            MaterialContext::Inline(material) => Ok(material_preamble(material)),
            MaterialContext::Cached { handle, .. } => {
                let contexts = self.contexts.read().await;
                match contexts.get(handle) {
                    Some(c) if c.expires_at > Utc::now() => Ok(c.preamble.clone()),
                    _ => Err(PortError::ContextExpired(handle.clone())),
                }
            }
        }
    }

    async fn complete(&self, model: &str, messages: Vec<ChatCompletionRequestMessage>) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content)
            } else {
                Err(PortError::InvalidResponse(
                    "LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::InvalidResponse(
                "LLM returned no choices in its response.".to_string(),
            ))
        }
    }

    /// Parses a JSON answer, tolerating a surrounding markdown fence.
    fn extract_json(&self, raw: &str) -> PortResult<Value> {
        let body = match self.json_fence.captures(raw).and_then(|c| c.get(1)) {
            Some(inner) => inner.as_str(),
            None => raw.trim(),
        };
        serde_json::from_str(body).map_err(|e| PortError::InvalidResponse(format!("response is not JSON: {}", e)))
    }
}

fn material_preamble(material: &TrainingMaterial) -> String {
    MATERIAL_PREAMBLE
        .replace("{title}", &material.title)
        .replace("{text}", &material.text)
}

fn system_message(content: String) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestSystemMessageArgs::default()
        .content(content)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

fn user_message(content: String) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestUserMessageArgs::default()
        .content(content)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

fn assistant_message(content: String) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestAssistantMessageArgs::default()
        .content(content)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

//=========================================================================================
// `GenerativeAiService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeAiService for OpenAiTutorAdapter {
    async fn create_cached_context(&self, material: &TrainingMaterial, ttl: Duration) -> PortResult<String> {
        let messages = vec![
            system_message(material_preamble(material))?,
            user_message(WARM_UP_PROMPT.to_string())?,
        ];
        self.complete(&self.generation_model, messages).await?;

        let handle = self.register_context(material, ttl).await?;
        info!(
            "Registered context {} for material {} ({} chars)",
            handle,
            material.content_hash,
            material.text.len()
        );
        Ok(handle)
    }

    async fn generate_structured(
        &self,
        context: &MaterialContext,
        prompt: &str,
        schema: &ResponseSchema,
    ) -> PortResult<Value> {
        let preamble = self.preamble_for(context).await?;
        let schema_json = serde_json::to_string_pretty(&schema.to_json_schema())
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let messages = vec![
            system_message(preamble)?,
            system_message(JSON_INSTRUCTIONS.replace("{schema}", &schema_json))?,
            user_message(prompt.to_string())?,
        ];

        let model = match schema.name {
            "profile_insight" => &self.enrichment_model,
            _ => &self.generation_model,
        };
        debug!("Structured call '{}' on {}", schema.name, model);
        let raw = self.complete(model, messages).await?;
        self.extract_json(&raw)
    }

    async fn chat(
        &self,
        context: &MaterialContext,
        grounding: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> PortResult<String> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(system_message(self.preamble_for(context).await?)?);
        messages.push(system_message(grounding.to_string())?);
        for turn in history {
            messages.push(match turn.role {
                ChatRole::Learner => user_message(turn.text.clone())?,
                ChatRole::Assistant => assistant_message(turn.text.clone())?,
            });
        }
        messages.push(user_message(message.to_string())?);

        self.complete(&self.chat_model, messages).await
    }
}
