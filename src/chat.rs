use serde::{Deserialize, Serialize};
use std::fmt;

/// Role for a chat message (user or assistant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl Role {
    /// Convert the role to a string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The role of the message sender (user or assistant)
    pub role: Role,
    /// The content of the message
    pub content: String,
}

impl Turn {
    /// A turn spoken by the user
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// A turn spoken by the assistant
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat template format used to turn a transcript into a prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChatTemplateFormat {
    /// Use the template embedded in the model, or [`ChatTemplateFormat::Default`]
    /// when the model has none
    #[default]
    ModelDefault,
    /// Use a simple default template
    Default,
}

/// Render a transcript with the simple `<|role|>` template, leaving the
/// prompt open for the assistant's reply.
pub fn render_default_template(messages: &[Turn]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str("<|");
        prompt.push_str(message.role.as_str());
        prompt.push_str("|>\n");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("<|assistant|>\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_wire_shape() {
        let turn = Turn::user("hello");
        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            json!({ "role": "user", "content": "hello" })
        );

        let turn: Turn =
            serde_json::from_value(json!({ "role": "assistant", "content": "" })).unwrap();
        assert_eq!(turn, Turn::assistant(""));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result: std::result::Result<Turn, _> =
            serde_json::from_value(json!({ "role": "system", "content": "be brief" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_render_default_template() {
        let prompt = render_default_template(&[Turn::user("hello"), Turn::assistant("hi")]);
        assert_eq!(prompt, "<|user|>\nhello\n<|assistant|>\nhi\n<|assistant|>\n");
    }
}
