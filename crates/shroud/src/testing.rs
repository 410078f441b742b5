//! Scripted fakes for exercising the pipeline without a model or a detector
//! service. Used by the crate's own tests; exported because downstream
//! integrations face the same wiring problem.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ToolCall;
use crate::chat::{ChatMessage, ChatProvider, ChatResponse, Tool};
use crate::detect::{Detector, Entity, sort_and_drop_overlaps, validate_texts};
use crate::error::ShroudError;

/// A canned chat reply.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub content: String,
    pub calls: Option<Vec<ToolCall>>,
}

impl fmt::Display for CannedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content)
    }
}

impl ChatResponse for CannedResponse {
    fn text(&self) -> Option<String> {
        Some(self.content.clone())
    }

    fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        self.calls.clone()
    }
}

/// Chat backend that pops scripted replies and records every history it was
/// handed, so tests can assert on exactly what the model saw.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<CannedResponse>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
    echo: bool,
}

impl ScriptedChat {
    pub fn new(replies: Vec<CannedResponse>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Replies by echoing the content of the last message it received.
    pub fn echo() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            echo: true,
        }
    }

    /// Every history received so far, in call order.
    pub fn histories(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().expect("scripted chat lock").clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
    ) -> Result<Box<dyn ChatResponse>, ShroudError> {
        self.seen
            .lock()
            .expect("scripted chat lock")
            .push(messages.to_vec());
        if self.echo {
            let content = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            return Ok(Box::new(CannedResponse {
                content,
                calls: None,
            }));
        }
        let reply = self
            .replies
            .lock()
            .expect("scripted chat lock")
            .pop_front()
            .ok_or_else(|| ShroudError::LlmUnavailable("no scripted reply left".to_string()))?;
        Ok(Box::new(reply))
    }
}

/// Detector that finds known literals.
///
/// Configured with `(label, literal)` pairs; every occurrence of a literal
/// in an input text is reported as an entity with score 1.0. Overlaps are
/// resolved the same way real detectors resolve them.
pub struct StaticDetector {
    table: Vec<(String, String)>,
    entities: Vec<String>,
}

impl StaticDetector {
    pub fn new(table: Vec<(&str, &str)>) -> Self {
        let table: Vec<(String, String)> = table
            .into_iter()
            .map(|(label, literal)| (label.to_string(), literal.to_string()))
            .collect();
        let entities = table.iter().map(|(label, _)| label.clone()).collect();
        Self { table, entities }
    }
}

#[async_trait]
impl Detector for StaticDetector {
    fn supported_entities(&self) -> &[String] {
        &self.entities
    }

    async fn detect(
        &self,
        texts: &[String],
        _threshold: Option<f32>,
    ) -> Result<Vec<Vec<Entity>>, ShroudError> {
        validate_texts(texts)?;
        Ok(texts
            .iter()
            .map(|text| {
                let mut found = Vec::new();
                for (label, literal) in &self.table {
                    for (start, matched) in text.match_indices(literal.as_str()) {
                        found.push(Entity::new(
                            start,
                            start + matched.len(),
                            matched,
                            label,
                            1.0,
                        ));
                    }
                }
                sort_and_drop_overlaps(found)
            })
            .collect())
    }
}
