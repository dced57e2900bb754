pub mod llm {
    use futures::Stream;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        System,
        User,
        Assistant,
        Tool,
        Other,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum MessagePart {
        Text { text: String },
        Image { url: String },
        Reasoning { reasoning: String },
        Document { file_name: String },
    }

    impl MessagePart {
        pub fn text<S: Into<String>>(s: S) -> Self {
            MessagePart::Text { text: s.into() }
        }

        /// Inline images carry their bytes in a `data:` url.
        pub fn is_inline_image(&self) -> bool {
            matches!(self, MessagePart::Image { url } if url.starts_with("data:"))
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Message {
        pub role: Role,
        pub parts: Vec<MessagePart>,
    }

    impl Message {
        pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
            Self { role, parts }
        }
        pub fn text<S: Into<String>>(role: Role, s: S) -> Self {
            Self::new(role, vec![MessagePart::text(s)])
        }
        pub fn system<S: Into<String>>(s: S) -> Self {
            Self::text(Role::System, s)
        }
        pub fn user<S: Into<String>>(s: S) -> Self {
            Self::text(Role::User, s)
        }
        pub fn assistant<S: Into<String>>(s: S) -> Self {
            Self::text(Role::Assistant, s)
        }
    }

    #[derive(Clone, Debug)]
    pub struct ChatOpts {
        pub model: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ChatDelta {
        Text(String),
        Reasoning(String),
        /// Terminal item of a stream. Nothing is yielded after it.
        Finish(Option<String>),
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct ChatResult {
        pub model: String,
        pub text: String,
        pub reasoning: String,
        pub finish_reason: Option<String>,
    }

    #[derive(Error, Debug)]
    pub enum ChatError {
        #[error("auth error: {0}")] Auth(String),
        #[error("rate limit: {0}")] RateLimit(String),
        #[error("timeout: {0}")] Timeout(String),
        #[error("network: {0}")] Network(String),
        #[error("decode: {0}")] Decode(String),
        #[error("protocol: {0}")] Protocol(String),
        #[error("canceled")] Canceled,
        #[error("other: {0}")] Other(String),
    }

    pub type ChatStream<'a> = Pin<Box<dyn Stream<Item = Result<ChatDelta, ChatError>> + Send + 'a>>;

    use std::pin::Pin;

    #[allow(async_fn_in_trait)]
    pub trait ModelClient: Send + Sync {
        async fn send_chat(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult, ChatError>;
        async fn stream_chat<'a>(
            &'a self,
            msgs: Vec<Message>,
            opts: ChatOpts,
        ) -> Result<ChatStream<'a>, ChatError>;
    }

}
