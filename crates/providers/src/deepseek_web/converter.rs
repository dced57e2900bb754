//! Flattens a conversation into the single prompt string the web endpoint takes.
//!
//! Delimiter placement is whitespace-sensitive on the server side: the
//! first merged block carries no leading delimiter, user-like roles are
//! prefixed with [`USER_DELIMITER`], and assistant turns are wrapped in
//! [`ASSISTANT_DELIMITER`] .. [`END_OF_TURN`].

use ds_core::llm::{Message, MessagePart, Role};

pub const USER_DELIMITER: &str = "<|User|>";
pub const ASSISTANT_DELIMITER: &str = "<|Assistant|>";
pub const END_OF_TURN: &str = "<|end_of_sentence|>";

const MERGE_SEPARATOR: &str = "\n\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    pub thinking_enabled: bool,
    pub search_enabled: bool,
}

/// Feature toggles are encoded in the model id, e.g. `deepseek-reasoner-search`.
pub fn model_config(model_id: &str) -> ModelConfig {
    let id = model_id.to_ascii_lowercase();
    ModelConfig {
        thinking_enabled: id.contains("reasoner"),
        search_enabled: id.contains("search"),
    }
}

pub fn convert_messages(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for (index, msg) in merge_consecutive_roles(messages).iter().enumerate() {
        let text = extract_text(msg);
        if text.trim().is_empty() {
            continue;
        }
        match msg.role {
            Role::Assistant => {
                prompt.push_str(ASSISTANT_DELIMITER);
                prompt.push_str(&text);
                prompt.push_str(END_OF_TURN);
            }
            // tool output and unknown roles read as user context
            Role::System | Role::User | Role::Tool | Role::Other => {
                if index > 0 {
                    prompt.push_str(USER_DELIMITER);
                }
                prompt.push_str(&text);
            }
        }
    }
    prompt
}

fn merge_consecutive_roles(messages: &[Message]) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        match merged.last_mut() {
            Some(last) if last.role == msg.role => {
                last.parts.push(MessagePart::text(MERGE_SEPARATOR));
                last.parts.extend(msg.parts.iter().cloned());
            }
            _ => merged.push(msg.clone()),
        }
    }
    merged
}

fn extract_text(msg: &Message) -> String {
    let mut out = String::new();
    for part in &msg.parts {
        match part {
            MessagePart::Text { text } => out.push_str(text),
            MessagePart::Reasoning { reasoning } => out.push_str(reasoning),
            MessagePart::Document { file_name } => {
                out.push_str("[Document: ");
                out.push_str(file_name);
                out.push(']');
            }
            // the web endpoint cannot take inline image data
            MessagePart::Image { .. } if part.is_inline_image() => {}
            MessagePart::Image { url } => {
                out.push_str("![](");
                out.push_str(url);
                out.push(')');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_user_messages_merge_into_one_block() {
        let msgs = vec![Message::user("a"), Message::user("b"), Message::user("c")];
        assert_eq!(merge_consecutive_roles(&msgs).len(), 1);
        assert_eq!(convert_messages(&msgs), "a\n\nb\n\nc");
    }

    #[test]
    fn alternating_roles_never_merge() {
        let msgs = vec![
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
        ];
        assert_eq!(merge_consecutive_roles(&msgs).len(), 3);
        assert_eq!(
            convert_messages(&msgs),
            "q1<|Assistant|>a1<|end_of_sentence|><|User|>q2"
        );
    }

    #[test]
    fn system_then_user_keeps_user_delimiter() {
        let msgs = vec![Message::system("You are helpful"), Message::user("Hi")];
        assert_eq!(convert_messages(&msgs), "You are helpful<|User|>Hi");
    }

    #[test]
    fn leading_assistant_is_still_wrapped() {
        let msgs = vec![Message::assistant("hello"), Message::user("hi")];
        assert_eq!(
            convert_messages(&msgs),
            "<|Assistant|>hello<|end_of_sentence|><|User|>hi"
        );
    }

    #[test]
    fn empty_blocks_emit_nothing_but_keep_their_index() {
        let msgs = vec![
            Message::user("   "),
            Message::assistant(""),
            Message::user("real"),
        ];
        assert_eq!(convert_messages(&msgs), "<|User|>real");
    }

    #[test]
    fn parts_flatten_by_kind() {
        let msg = Message::new(
            Role::User,
            vec![
                MessagePart::text("see "),
                MessagePart::Image { url: "https://x.test/a.png".into() },
                MessagePart::Image { url: "data:image/png;base64,AAAA".into() },
                MessagePart::Document { file_name: "notes.pdf".into() },
                MessagePart::Reasoning { reasoning: " hmm".into() },
            ],
        );
        assert_eq!(
            convert_messages(&[msg]),
            "see ![](https://x.test/a.png)[Document: notes.pdf] hmm"
        );
    }

    #[test]
    fn tool_messages_read_as_user_context() {
        let msgs = vec![
            Message::user("run it"),
            Message::text(Role::Tool, "exit 0"),
        ];
        assert_eq!(convert_messages(&msgs), "run it<|User|>exit 0");
    }

    #[test]
    fn conversion_is_deterministic() {
        let msgs = vec![
            Message::system("s"),
            Message::user("u"),
            Message::assistant("a"),
        ];
        assert_eq!(convert_messages(&msgs), convert_messages(&msgs));
    }

    #[test]
    fn model_flags_from_id() {
        assert_eq!(
            model_config("deepseek-chat"),
            ModelConfig { thinking_enabled: false, search_enabled: false }
        );
        assert_eq!(
            model_config("deepseek-reasoner-search"),
            ModelConfig { thinking_enabled: true, search_enabled: true }
        );
        assert!(model_config("DeepSeek-REASONER").thinking_enabled);
        assert!(model_config("deepseek-chat-search").search_enabled);
    }
}
