//! Client for the DeepSeek web chat endpoint.
//!
//! A request runs, in order: token resolution ([`token`]), session and
//! PoW challenge creation ([`client`]), the PoW search ([`pow`]), then the
//! streamed completion, whose frames are decoded by [`sse`].

pub mod client;
pub mod config;
pub mod converter;
pub mod error;
pub mod pow;
pub mod provider;
pub mod sse;
pub mod token;

pub use client::{Authenticator, DeepSeekWebClient};
pub use config::{AccountConfig, DeepSeekWebConfig};
pub use converter::{convert_messages, model_config, ModelConfig};
pub use error::{CredentialError, DeepSeekError, PowError};
pub use pow::{Challenge, PowSolver, Solution};
pub use provider::{DeepSeekWebProvider, ModelInfo, DEEPSEEK_WEB_MODELS};
pub use sse::{parse_event, ContentFragment, FragmentType, ParseOutcome, ParseState};
pub use token::{TokenCache, TokenManager};
