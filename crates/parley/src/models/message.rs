use super::role::Role;
use super::tool::ToolInvocation;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// A typed unit within a turn
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default = "empty_object")]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ContentBlock {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(invocation: &ToolInvocation) -> Self {
        ContentBlock::ToolUse {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            input: invocation.input.clone(),
        }
    }

    pub fn tool_result<I: Into<String>, C: Into<String>>(tool_use_id: I, content: C) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Accepts both the plain-string and the block-array form of `content`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ContentRepr {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

fn deserialize_content<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ContentRepr::deserialize(deserializer)? {
        ContentRepr::Text(text) => vec![ContentBlock::text(text)],
        ContentRepr::Blocks(blocks) => blocks,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One role-tagged turn of the conversation
pub struct Message {
    pub role: Role,
    #[serde(deserialize_with = "deserialize_content")]
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Message {
            role,
            content: Vec::new(),
        }
    }

    pub fn user() -> Self {
        Self::new(Role::User)
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Add any ContentBlock to the message
    pub fn with_content(mut self, content: ContentBlock) -> Self {
        self.content.push(content);
        self
    }

    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(ContentBlock::text(text))
    }

    pub fn with_tool_use(self, invocation: &ToolInvocation) -> Self {
        self.with_content(ContentBlock::tool_use(invocation))
    }

    pub fn with_tool_result<I: Into<String>, C: Into<String>>(
        self,
        tool_use_id: I,
        content: C,
    ) -> Self {
        self.with_content(ContentBlock::tool_result(tool_use_id, content))
    }

    /// Concatenation of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
