use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Request, Response};
use serde_json::Value;
use tracing::{error, info};
use url::Url;

use super::config::DeepSeekWebConfig;
use super::error::{CredentialError, DeepSeekError, Result};
use super::pow::{Challenge, COMPLETION_TARGET_PATH};

const LOGIN_PATH: &str = "/api/v0/users/login";
const CREATE_SESSION_PATH: &str = "/api/v0/chat_session/create";
const CREATE_POW_PATH: &str = "/api/v0/chat/create_pow_challenge";

pub const POW_RESPONSE_HEADER: &str = "x-ds-pow-response";

const CLIENT_HEADERS: [(&str, &str); 6] = [
    ("user-agent", "DeepSeek/1.6.11 Android/35"),
    ("accept", "application/json"),
    ("x-client-platform", "android"),
    ("x-client-version", "1.6.11"),
    ("x-client-locale", "zh_CN"),
    ("accept-charset", "UTF-8"),
];

/// Obtains a bearer token from account credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, email: &str, mobile: &str, password: &str) -> Result<String>;
}

#[derive(Clone, Debug)]
struct Endpoints {
    login: Url,
    create_session: Url,
    create_pow: Url,
    completion: Url,
}

#[derive(Clone, Debug)]
pub struct DeepSeekWebClient {
    http: Client,
    endpoints: Endpoints,
}

impl DeepSeekWebClient {
    pub fn new(cfg: &DeepSeekWebConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .connect_timeout(cfg.timeout);
        // the config layer already read the proxy env vars
        builder = match &cfg.proxy {
            Some(p) => builder.proxy(reqwest::Proxy::all(p)?),
            None => builder.no_proxy(),
        };
        let http = builder.build()?;
        let endpoints = Endpoints {
            login: cfg.endpoint(LOGIN_PATH)?,
            create_session: cfg.endpoint(CREATE_SESSION_PATH)?,
            create_pow: cfg.endpoint(CREATE_POW_PATH)?,
            completion: cfg.endpoint(COMPLETION_TARGET_PATH)?,
        };
        Ok(Self { http, endpoints })
    }

    pub async fn create_session(&self, token: &str) -> Result<String> {
        let body = serde_json::json!({ "agent": "chat" });
        let resp = self
            .http
            .post(self.endpoints.create_session.clone())
            .headers(auth_headers(token)?)
            .json(&body)
            .send()
            .await?;
        let v = read_json(resp, "Failed to create session").await?;
        let session_id = v["data"]["biz_data"]["id"]
            .as_str()
            .ok_or_else(|| DeepSeekError::MalformedResponse("session response missing data.biz_data.id".into()))?
            .to_string();
        info!(target:"providers::deepseek_web","session created");
        Ok(session_id)
    }

    pub async fn create_pow_challenge(&self, token: &str) -> Result<Challenge> {
        let body = serde_json::json!({ "target_path": COMPLETION_TARGET_PATH });
        let resp = self
            .http
            .post(self.endpoints.create_pow.clone())
            .headers(auth_headers(token)?)
            .json(&body)
            .send()
            .await?;
        let v = read_json(resp, "Failed to get PoW challenge").await?;
        let biz = &v["data"]["biz_data"];
        if !biz.is_object() {
            return Err(DeepSeekError::MalformedResponse("PoW response missing data.biz_data".into()));
        }
        // newer servers nest the fields one level deeper
        let fields = if biz["challenge"].is_object() { &biz["challenge"] } else { biz };
        let challenge = Challenge::from_value(fields)?;
        info!(target:"providers::deepseek_web","PoW challenge received difficulty={}", challenge.difficulty);
        Ok(challenge)
    }

    /// Builds, but does not send, the streaming completion request.
    pub fn build_completion_request(
        &self,
        token: &str,
        session_id: &str,
        pow_response: &str,
        prompt: &str,
        thinking_enabled: bool,
        search_enabled: bool,
    ) -> Result<Request> {
        let body = serde_json::json!({
            "chat_session_id": session_id,
            "prompt": prompt,
            "ref_file_ids": [],
            "thinking_enabled": thinking_enabled,
            "search_enabled": search_enabled,
        });
        let mut headers = auth_headers(token)?;
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(HeaderName::from_static(POW_RESPONSE_HEADER), header_value(pow_response)?);
        let req = self
            .http
            .post(self.endpoints.completion.clone())
            .headers(headers)
            .json(&body)
            .build()?;
        Ok(req)
    }

    /// Sends a built completion request; non-2xx becomes [`DeepSeekError::Api`].
    pub async fn send_completion(&self, req: Request) -> Result<Response> {
        let resp = self.http.execute(req).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        error!(target:"providers::deepseek_web","completion non-2xx status={} body={:?}", status, body);
        let message = error_detail(&body).unwrap_or_else(|| "DeepSeek stream failed".to_string());
        Err(DeepSeekError::api(status.as_u16(), message))
    }
}

#[async_trait]
impl Authenticator for DeepSeekWebClient {
    async fn login(&self, email: &str, mobile: &str, password: &str) -> Result<String> {
        let body = login_body(email, mobile, password);
        let resp = self
            .http
            .post(self.endpoints.login.clone())
            .headers(client_headers())
            .json(&body)
            .send()
            .await?;
        let v = read_json(resp, "DeepSeek login failed").await?;
        let token = extract_token(&v)?;
        info!(target:"providers::deepseek_web","login successful");
        Ok(token)
    }
}

/// Email wins when both are set; exactly one identifier goes on the wire.
pub fn login_body(email: &str, mobile: &str, password: &str) -> Value {
    if !email.trim().is_empty() {
        serde_json::json!({ "email": email, "area_code": "", "password": password })
    } else {
        serde_json::json!({ "mobile": mobile, "area_code": "+86", "password": password })
    }
}

pub fn extract_token(v: &Value) -> Result<String> {
    let data = &v["data"];
    if !data.is_object() {
        return Err(DeepSeekError::MalformedResponse("login response missing data".into()));
    }
    data["user"]["token"]
        .as_str()
        .or_else(|| data["token"].as_str())
        .map(str::to_string)
        .ok_or_else(|| CredentialError::MissingToken.into())
}

/// Human-readable message from a structured error body, if it has one.
pub fn error_detail(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    let detail = [&v["msg"], &v["message"], &v["error"]["message"], &v["error"]]
        .into_iter()
        .find_map(|f| f.as_str().filter(|s| !s.trim().is_empty()))
        .map(str::to_string);
    detail
}

async fn read_json(resp: Response, what: &str) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        error!(target:"providers::deepseek_web","{} status={}", what, status);
        let message = match error_detail(&body) {
            Some(detail) => format!("{what}: {detail}"),
            None => what.to_string(),
        };
        return Err(DeepSeekError::api(status.as_u16(), message));
    }
    serde_json::from_str(&body)
        .map_err(|e| DeepSeekError::MalformedResponse(format!("{what}: invalid JSON body: {e}")))
}

fn client_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (k, v) in CLIENT_HEADERS {
        headers.insert(HeaderName::from_static(k), HeaderValue::from_static(v));
    }
    headers
}

fn auth_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = client_headers();
    let mut auth = header_value(&format!("Bearer {token}"))?;
    auth.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, auth);
    Ok(headers)
}

fn header_value(s: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(s).map_err(|e| DeepSeekError::Config(format!("invalid header value: {e}")))
}
