use std::fmt::Write as _;
use std::time::Instant;

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use super::error::{DeepSeekError, PowError};

pub const SUPPORTED_ALGORITHM: &str = "DeepSeekHashV1";
pub const COMPLETION_TARGET_PATH: &str = "/api/v0/chat/completion";
pub const MAX_NONCE: u64 = 10_000_000;

fn default_algorithm() -> String {
    SUPPORTED_ALGORITHM.to_string()
}

fn default_target_path() -> String {
    COMPLETION_TARGET_PATH.to_string()
}

/// Server-issued puzzle, consumed by exactly one completion request.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Challenge {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    pub challenge: String,
    pub salt: String,
    pub signature: String,
    pub difficulty: i64,
    #[serde(default = "default_target_path")]
    pub target_path: String,
}

impl Challenge {
    pub fn from_value(v: &serde_json::Value) -> Result<Self, DeepSeekError> {
        serde_json::from_value(v.clone())
            .map_err(|e| DeepSeekError::MalformedResponse(format!("PoW challenge: {e}")))
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Solution {
    pub algorithm: String,
    pub challenge: String,
    pub salt: String,
    pub answer: String,
    pub signature: String,
    pub target_path: String,
}

impl Solution {
    /// Compact JSON, then standard base64 without wrapping. Sent as `x-ds-pow-response`.
    pub fn to_header_value(&self) -> Result<String, PowError> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }
}

#[derive(Clone, Debug)]
pub struct PowSolver {
    max_nonce: u64,
}

impl Default for PowSolver {
    fn default() -> Self {
        Self { max_nonce: MAX_NONCE }
    }
}

impl PowSolver {
    pub fn with_max_nonce(max_nonce: u64) -> Self {
        Self { max_nonce }
    }

    pub fn solve(&self, c: &Challenge) -> Result<Solution, PowError> {
        if c.algorithm != SUPPORTED_ALGORITHM {
            return Err(PowError::UnsupportedAlgorithm(c.algorithm.clone()));
        }
        if c.difficulty <= 0 {
            return Err(PowError::InvalidDifficulty(c.difficulty));
        }
        let start = Instant::now();
        let answer = self.find_nonce(&c.challenge, &c.salt, c.difficulty as u64)?;
        info!(target:"providers::deepseek_web","PoW solved difficulty={} answer={} elapsed_ms={}", c.difficulty, answer, start.elapsed().as_millis());
        Ok(Solution {
            algorithm: c.algorithm.clone(),
            challenge: c.challenge.clone(),
            salt: c.salt.clone(),
            answer: answer.to_string(),
            signature: c.signature.clone(),
            target_path: c.target_path.clone(),
        })
    }

    /// Smallest nonce whose `sha256(challenge_salt_nonce)` is below `2^256 / difficulty`.
    pub fn find_nonce(&self, challenge: &str, salt: &str, difficulty: u64) -> Result<u64, PowError> {
        let target = target_for(difficulty);
        let base = Sha256::new_with_prefix(format!("{challenge}_{salt}_").as_bytes());
        let mut nonce_buf = String::with_capacity(20);
        for nonce in 0..self.max_nonce {
            nonce_buf.clear();
            write!(nonce_buf, "{nonce}").expect("write to String");
            let mut h = base.clone();
            h.update(nonce_buf.as_bytes());
            if below_target(&h.finalize(), &target) {
                return Ok(nonce);
            }
        }
        Err(PowError::Exhausted { max_nonce: self.max_nonce })
    }
}

/// `floor(2^256 / difficulty)` as 33 big-endian bytes. Byte 0 is set only for difficulty 1.
fn target_for(difficulty: u64) -> [u8; 33] {
    let d = u128::from(difficulty);
    let mut q = [0u8; 33];
    let mut rem: u128 = 0;
    for (i, out) in q.iter_mut().enumerate() {
        let cur = (rem << 8) | u128::from(i == 0);
        *out = (cur / d) as u8;
        rem = cur % d;
    }
    q
}

fn below_target(digest: &[u8], target: &[u8; 33]) -> bool {
    target[0] != 0 || digest < &target[1..]
}
