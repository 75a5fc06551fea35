//! Conversational memory primitive
//!
//! The memory manager only needs to know how many messages a memory holds and roughly
//! how large it is. `BufferMemory` is the default implementation: an append-only chat
//! transcript shared between the manager and the node using it.

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed per-message bookkeeping cost added to content length when estimating size
pub const MESSAGE_OVERHEAD_BYTES: usize = 64;

/// Introspection contract the memory manager relies on
pub trait ConversationMemory: Send + Sync + 'static {
    fn message_count(&self) -> usize;

    /// Approximate heap footprint in bytes
    fn estimated_size(&self) -> usize;

    /// Drop all messages
    fn clear(&self);
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Human,
    Ai,
    System,
}

impl MessageRole {
    fn prefix(&self) -> &'static str {
        match self {
            MessageRole::Human => "Human",
            MessageRole::Ai => "AI",
            MessageRole::System => "System",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Human, content: content.into() }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Ai, content: content.into() }
    }
}

/// How a memory node wants its buffer configured
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryOptions {
    /// Variable name the history is exposed under
    pub memory_key: String,
    /// Expose history as a message list instead of a rendered transcript
    pub return_messages: bool,
    /// Input variable holding the user turn; inferred when there is only one
    pub input_key: Option<String>,
    /// Output variable holding the model turn; inferred when there is only one
    pub output_key: Option<String>,
    /// Kind of node that owns the session (reported in metrics)
    pub node_type: String,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            memory_key: "history".to_string(),
            return_messages: true,
            input_key: None,
            output_key: None,
            node_type: "BufferMemory".to_string(),
        }
    }
}

/// Append-only chat transcript
#[derive(Debug)]
pub struct BufferMemory {
    options: MemoryOptions,
    messages: RwLock<Vec<ChatMessage>>,
}

impl BufferMemory {
    pub fn new(options: &MemoryOptions) -> Self {
        Self {
            options: options.clone(),
            messages: RwLock::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &MemoryOptions {
        &self.options
    }

    pub fn add_message(&self, message: ChatMessage) {
        self.messages.write().push(message);
    }

    pub fn add_user_message(&self, content: impl Into<String>) {
        self.add_message(ChatMessage::human(content));
    }

    pub fn add_ai_message(&self, content: impl Into<String>) {
        self.add_message(ChatMessage::ai(content));
    }

    /// Snapshot of the transcript
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    /// Record one exchange from a chain's input and output variables
    pub fn save_context(&self, inputs: &Map<String, Value>, outputs: &Map<String, Value>) -> Result<()> {
        let input = select_variable(inputs, self.options.input_key.as_deref(), "input")?;
        let output = select_variable(outputs, self.options.output_key.as_deref(), "output")?;

        let mut messages = self.messages.write();
        messages.push(ChatMessage::human(input));
        messages.push(ChatMessage::ai(output));
        Ok(())
    }

    /// History exposed under `memory_key`
    pub fn load_memory_variables(&self) -> Map<String, Value> {
        let messages = self.messages.read();

        let history = if self.options.return_messages {
            serde_json::to_value(&*messages).unwrap_or(Value::Array(Vec::new()))
        } else {
            Value::String(
                messages
                    .iter()
                    .map(|m| format!("{}: {}", m.role.prefix(), m.content))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        };

        let mut variables = Map::new();
        variables.insert(self.options.memory_key.clone(), history);
        variables
    }
}

impl ConversationMemory for BufferMemory {
    fn message_count(&self) -> usize {
        self.messages.read().len()
    }

    fn estimated_size(&self) -> usize {
        self.messages
            .read()
            .iter()
            .map(|m| m.content.len() + MESSAGE_OVERHEAD_BYTES)
            .sum()
    }

    fn clear(&self) {
        self.messages.write().clear();
    }
}

/// Pick the configured key, or the only key present
fn select_variable(variables: &Map<String, Value>, key: Option<&str>, kind: &str) -> Result<String> {
    let value = match key {
        Some(key) => variables
            .get(key)
            .ok_or_else(|| anyhow!("Missing {} variable '{}'", kind, key))?,
        None if variables.len() == 1 => variables
            .values()
            .next()
            .ok_or_else(|| anyhow!("Missing {} variable", kind))?,
        None => {
            return Err(anyhow!(
                "Ambiguous {} variables {:?}; configure an explicit {}_key",
                kind,
                variables.keys().collect::<Vec<_>>(),
                kind
            ))
        }
    };

    Ok(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
