//! Shroud is a privacy middleware that sits between an application and a
//! hosted LLM chat backend.
//!
//! # Overview
//! For every conversation turn the middleware detects sensitive spans in the
//! new messages (including tool-call arguments), substitutes them with stable
//! per-thread placeholders before anything is transmitted to the model, and
//! restores the original values in the model's reply before it is handed back
//! to the caller. Substitution is deterministic within a thread, so the model
//! can reason about and reference entities it never actually sees.
//!
//! # Architecture
//! The crate is organised around a handful of seams:
//!
//! - [`chat`]: the message model and the [`chat::ChatProvider`] trait the
//!   wrapped backend implements
//! - [`detect`]: entity detection ([`detect::RemoteDetector`],
//!   [`detect::RegexDetector`])
//! - [`replace`]: placeholder strategies sharing one replacement pipeline
//! - [`store`]: thread-scoped entity mappings and redacted conversation logs
//! - [`wrapper`]: [`wrapper::PrivacyChatModel`], the per-turn orchestrator
//!
//! Components are wired explicitly through [`builder::ShroudBuilder`]; there
//! is no global state.

use serde::{Deserialize, Serialize};

/// Builder pattern for wiring detectors, replacers, stores and the wrapped
/// chat backend into a [`wrapper::PrivacyChatModel`].
pub mod builder;

/// Chat message model and the provider trait for the wrapped backend.
pub mod chat;

/// Lossless serialisation of stored messages.
pub mod codec;

/// Configuration loading with spec'd defaults.
pub mod config;

/// Entity detection over message payloads.
pub mod detect;

/// Error types and handling.
pub mod error;

/// Placeholder strategies and the shared replace/restore pipeline.
pub mod replace;

/// Entity-mapping and conversation storage backends.
pub mod store;

/// Scripted fakes for exercising the pipeline in tests.
pub mod testing;

/// Thread identity derivation.
pub mod thread;

/// The per-turn privacy orchestrator.
pub mod wrapper;

pub use error::ShroudError;
pub use thread::ThreadId;

/// A function call a model wants to make (or a tool result flowing back),
/// standardised across backends.
#[derive(Debug, Deserialize, Serialize, Clone, Eq, PartialEq)]
pub struct ToolCall {
    /// The ID of the tool call. Empty when the backend failed to assign one;
    /// the wrapper rejects such calls.
    #[serde(default)]
    pub id: String,
    /// The type of the tool call (usually "function").
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    /// The function to call.
    pub function: FunctionCall,
    /// Optional execution status attached by the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

fn default_call_type() -> String {
    "function".to_string()
}

/// FunctionCall contains details about which function to call and with what arguments.
#[derive(Debug, Deserialize, Serialize, Clone, Eq, PartialEq)]
pub struct FunctionCall {
    /// The name of the function to call.
    pub name: String,
    /// The arguments to pass to the function, serialized as a JSON string.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            status: None,
        }
    }
}
