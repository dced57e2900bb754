use std::sync::Arc;

use ds_core::llm::{ChatDelta, ChatError, ChatOpts, ChatResult, ChatStream, Message, ModelClient};
use futures::StreamExt;
use reqwest::Request;
use tracing::{info, warn};

use super::client::DeepSeekWebClient;
use super::config::{AccountConfig, DeepSeekWebConfig};
use super::converter::{convert_messages, model_config, ModelConfig};
use super::error::{DeepSeekError, Result};
use super::pow::PowSolver;
use super::sse::{data_payload, parse_event, FragmentType, LineBuffer, ParseState};
use super::token::{TokenCache, TokenManager};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub reasoning: bool,
}

pub const DEEPSEEK_WEB_MODELS: [ModelInfo; 4] = [
    ModelInfo { id: "deepseek-chat", display_name: "DeepSeek V3", reasoning: false },
    ModelInfo { id: "deepseek-reasoner", display_name: "DeepSeek R1", reasoning: true },
    ModelInfo { id: "deepseek-chat-search", display_name: "DeepSeek V3 (Search)", reasoning: false },
    ModelInfo { id: "deepseek-reasoner-search", display_name: "DeepSeek R1 (Search)", reasoning: true },
];

const FINISH_STOP: &str = "stop";

pub struct DeepSeekWebProvider {
    tokens: TokenManager<DeepSeekWebClient>,
    solver: PowSolver,
    account: AccountConfig,
}

impl DeepSeekWebProvider {
    /// `cache` may be shared by providers for other accounts.
    pub fn new(cfg: &DeepSeekWebConfig, cache: Arc<TokenCache>) -> anyhow::Result<Self> {
        let client = DeepSeekWebClient::new(cfg)?;
        Ok(Self {
            tokens: TokenManager::new(client, cache),
            solver: PowSolver::default(),
            account: cfg.account.clone(),
        })
    }

    pub fn list_models(&self) -> &'static [ModelInfo] {
        &DEEPSEEK_WEB_MODELS
    }

    pub fn invalidate_token(&self) {
        self.tokens.invalidate_token(&self.account.id);
    }

    fn client(&self) -> &DeepSeekWebClient {
        self.tokens.authenticator()
    }

    /// Session, challenge and PoW for one completion request.
    async fn prepare_completion(&self, token: &str, prompt: &str, mc: ModelConfig) -> Result<Request> {
        let session_id = self.client().create_session(token).await?;
        let challenge = self.client().create_pow_challenge(token).await?;
        let solver = self.solver.clone();
        let solution = tokio::task::spawn_blocking(move || solver.solve(&challenge))
            .await
            .map_err(|e| match e.try_into_panic() {
                Ok(panic) => std::panic::resume_unwind(panic),
                Err(_) => DeepSeekError::Canceled,
            })??;
        let pow_response = solution.to_header_value()?;
        self.client().build_completion_request(
            token,
            &session_id,
            &pow_response,
            prompt,
            mc.thinking_enabled,
            mc.search_enabled,
        )
    }

    pub async fn generate(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult> {
        let prompt = convert_messages(msgs);
        let mc = model_config(&opts.model);
        info!(target:"providers::deepseek_web","generate model={} thinking={} search={}", opts.model, mc.thinking_enabled, mc.search_enabled);
        let (text, reasoning, finish_reason) = self
            .tokens
            .execute_with_retry(&self.account, |token| {
                let prompt = &prompt;
                async move {
                    let req = self.prepare_completion(&token, prompt, mc).await?;
                    let resp = self.client().send_completion(req).await?;
                    let body = resp.text().await?;
                    collect_body(&body)
                }
            })
            .await?;
        Ok(ChatResult {
            model: opts.model.clone(),
            text,
            reasoning,
            finish_reason,
        })
    }
}

/// Assembles a whole response body, stopping at the first terminal event.
fn collect_body(body: &str) -> Result<(String, String, Option<String>)> {
    let mut state = ParseState::default();
    let (mut text, mut reasoning) = (String::new(), String::new());
    for data in body.lines().filter_map(data_payload) {
        let out = parse_event(data, state);
        state = out.state;
        for f in out.fragments {
            match f.kind {
                FragmentType::Plain => text.push_str(&f.text),
                FragmentType::Reasoning => reasoning.push_str(&f.text),
            }
        }
        if let Some(msg) = out.error_message {
            return Err(DeepSeekError::Stream(msg));
        }
        if out.stop {
            return Ok((text, reasoning, Some(FINISH_STOP.to_string())));
        }
    }
    Ok((text, reasoning, None))
}

/// Items one body line contributes, and whether it ended the stream.
fn line_items(line: &str, state: &mut ParseState) -> (Vec<std::result::Result<ChatDelta, ChatError>>, bool) {
    let Some(data) = data_payload(line) else {
        return (Vec::new(), false);
    };
    let out = parse_event(data, *state);
    *state = out.state;
    let mut items: Vec<_> = out
        .fragments
        .into_iter()
        .filter(|f| !f.text.is_empty())
        .map(|f| {
            Ok(match f.kind {
                FragmentType::Plain => ChatDelta::Text(f.text),
                FragmentType::Reasoning => ChatDelta::Reasoning(f.text),
            })
        })
        .collect();
    if let Some(msg) = out.error_message {
        items.push(Err(DeepSeekError::Stream(msg).into()));
        return (items, true);
    }
    if out.stop {
        items.push(Ok(ChatDelta::Finish(Some(FINISH_STOP.to_string()))));
    }
    (items, out.stop)
}

#[allow(async_fn_in_trait)]
impl ModelClient for DeepSeekWebProvider {
    async fn send_chat(&self, msgs: &[Message], opts: &ChatOpts) -> std::result::Result<ChatResult, ChatError> {
        Ok(self.generate(msgs, opts).await?)
    }

    async fn stream_chat<'a>(
        &'a self,
        msgs: Vec<Message>,
        opts: ChatOpts,
    ) -> std::result::Result<ChatStream<'a>, ChatError> {
        let prompt = convert_messages(&msgs);
        let mc = model_config(&opts.model);
        info!(target:"providers::deepseek_web","start stream model={} thinking={} search={}", opts.model, mc.thinking_enabled, mc.search_enabled);
        let req = self
            .tokens
            .execute_with_retry(&self.account, |token| {
                let prompt = &prompt;
                async move { self.prepare_completion(&token, prompt, mc).await }
            })
            .await?;

        let s = async_stream::stream! {
            let resp = match self.client().send_completion(req).await {
                Ok(r) => r,
                Err(e) => {
                    if e.is_auth_failure() {
                        self.invalidate_token();
                    }
                    yield Err(ChatError::from(e));
                    return;
                }
            };
            let mut body = resp.bytes_stream();
            let mut lines = LineBuffer::new();
            let mut state = ParseState::default();
            loop {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        lines.push(&chunk);
                        while let Some(line) = lines.next_line() {
                            let (items, done) = line_items(&line, &mut state);
                            for it in items {
                                yield it;
                            }
                            if done {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(target:"providers::deepseek_web","stream interrupted: {}", e);
                        yield Err(ChatError::from(DeepSeekError::Stream(format!("stream interrupted: {e}"))));
                        return;
                    }
                    None => {
                        if let Some(line) = lines.finish() {
                            let (items, done) = line_items(&line, &mut state);
                            for it in items {
                                yield it;
                            }
                            if done {
                                return;
                            }
                        }
                        yield Ok(ChatDelta::Finish(None));
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(s))
    }
}
