use directories::BaseDirs;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://chat.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_ACCOUNT_ID: &str = "default";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeepSeekWebFileConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_ms: Option<u64>,
    pub account: Option<AccountFileConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AccountFileConfig {
    pub id: Option<String>,
    pub token: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub password: Option<String>,
}

/// One logical account. Tokens are cached per `id`.
#[derive(Clone, Default)]
pub struct AccountConfig {
    pub id: String,
    pub token: String,
    pub email: String,
    pub mobile: String,
    pub password: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("id", &self.id)
            .field("has_token", &!self.token.trim().is_empty())
            .field("email", &self.email)
            .field("mobile", &self.mobile)
            .field("has_password", &!self.password.is_empty())
            .finish()
    }
}

impl AccountConfig {
    pub fn static_token(&self) -> Option<&str> {
        let t = self.token.trim();
        (!t.is_empty()).then_some(t)
    }

    /// True when a fresh login is possible.
    pub fn can_login(&self) -> bool {
        !self.password.trim().is_empty()
            && (!self.email.trim().is_empty() || !self.mobile.trim().is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct DeepSeekWebConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub account: AccountConfig,
}

impl Default for DeepSeekWebConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_millis(30_000),
            proxy: None,
            account: AccountConfig {
                id: DEFAULT_ACCOUNT_ID.to_string(),
                ..AccountConfig::default()
            },
        }
    }
}

impl DeepSeekWebConfig {
    pub fn from_env_and_file() -> anyhow::Result<Self> {
        let mut cfg = DeepSeekWebConfig::default();

        if let Some(path) = Self::config_path() {
            if path.exists() {
                let text = fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("read {}: {}", path.display(), e))?;
                let file_cfg = toml::from_str::<DeepSeekWebFileConfig>(&text)
                    .map_err(|e| anyhow::anyhow!("parse {}: {}", path.display(), e))?;
                cfg.apply_file(file_cfg);
            }
        }
        cfg.apply_env(|k| env::var(k).ok());
        cfg.endpoint("/")?;
        Ok(cfg)
    }

    fn apply_file(&mut self, file_cfg: DeepSeekWebFileConfig) {
        if let Some(u) = file_cfg.base_url {
            self.base_url = u;
        }
        if let Some(m) = file_cfg.model {
            self.model = m;
        }
        if let Some(t) = file_cfg.timeout_ms {
            self.timeout = Duration::from_millis(t);
        }
        if let Some(a) = file_cfg.account {
            let acc = &mut self.account;
            if let Some(v) = a.id {
                acc.id = v;
            }
            if let Some(v) = a.token {
                acc.token = v;
            }
            if let Some(v) = a.email {
                acc.email = v;
            }
            if let Some(v) = a.mobile {
                acc.mobile = v;
            }
            if let Some(v) = a.password {
                acc.password = v;
            }
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(u) = var("DEEPSEEK_WEB_BASE_URL") {
            self.base_url = u;
        }
        if let Some(m) = var("DEEPSEEK_WEB_MODEL") {
            self.model = m;
        }
        let acc = &mut self.account;
        for (key, slot) in [
            ("DEEPSEEK_WEB_ACCOUNT", &mut acc.id),
            ("DEEPSEEK_WEB_TOKEN", &mut acc.token),
            ("DEEPSEEK_WEB_EMAIL", &mut acc.email),
            ("DEEPSEEK_WEB_MOBILE", &mut acc.mobile),
            ("DEEPSEEK_WEB_PASSWORD", &mut acc.password),
        ] {
            if let Some(v) = var(key) {
                *slot = v;
            }
        }
        self.proxy = var("HTTPS_PROXY").or_else(|| var("HTTP_PROXY"));
    }

    /// Absolute URL for an API path under `base_url`.
    pub fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("invalid base_url {:?}: {}", self.base_url, e))?;
        Ok(base.join(path)?)
    }

    fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".dsweb").join("config.toml")
        } else {
            base.config_dir().join("dsweb").join("config.toml")
        };
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn file_then_env_layering() {
        let mut cfg = DeepSeekWebConfig::default();
        let file_cfg: DeepSeekWebFileConfig = toml::from_str(
            r#"
            model = "deepseek-reasoner"
            timeout_ms = 5000
            [account]
            id = "work"
            email = "a@b.c"
            password = "from-file"
            "#,
        )
        .unwrap();
        cfg.apply_file(file_cfg);
        let env: HashMap<&str, &str> = [("DEEPSEEK_WEB_PASSWORD", "from-env")].into();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.model, "deepseek-reasoner");
        assert_eq!(cfg.timeout, Duration::from_millis(5000));
        assert_eq!(cfg.account.id, "work");
        assert_eq!(cfg.account.email, "a@b.c");
        assert_eq!(cfg.account.password, "from-env");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert!(cfg.proxy.is_none());
    }

    #[test]
    fn account_capabilities() {
        let mut acc = AccountConfig { id: "x".into(), ..Default::default() };
        assert!(acc.static_token().is_none());
        assert!(!acc.can_login());
        acc.token = "  tok ".into();
        assert_eq!(acc.static_token(), Some("tok"));
        acc.mobile = "13800000000".into();
        assert!(!acc.can_login());
        acc.password = "pw".into();
        assert!(acc.can_login());
    }

    #[test]
    fn debug_hides_secrets() {
        let acc = AccountConfig {
            id: "x".into(),
            token: "secret-token".into(),
            password: "secret-pw".into(),
            ..Default::default()
        };
        let s = format!("{acc:?}");
        assert!(!s.contains("secret"));
    }

    #[test]
    fn endpoints_join_base_url() {
        let cfg = DeepSeekWebConfig {
            base_url: "http://127.0.0.1:8080/".into(),
            ..Default::default()
        };
        assert_eq!(
            cfg.endpoint("/api/v0/chat/completion").unwrap().as_str(),
            "http://127.0.0.1:8080/api/v0/chat/completion"
        );
        let bad = DeepSeekWebConfig { base_url: "not a url".into(), ..Default::default() };
        assert!(bad.endpoint("/").is_err());
    }
}
