//! 客户端配置
//!
//! 支持三种来源：代码中的 builder、环境变量以及 YAML 配置文件。
//! 配置在构造客户端时校验一次，之后只读共享。

mod path_utils;

pub use path_utils::{default_config_path, expand_tilde, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

use crate::streaming::StreamConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 默认 API origin
pub const DEFAULT_ORIGIN: &str = "https://api.openai.com";

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ORG_ID: &str = "OPENAI_ORG_ID";
pub const ENV_ORIGIN: &str = "OPENAI_ORIGIN";

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("缺少 API key（可通过 OPENAI_API_KEY 环境变量或配置文件设置）")]
    MissingApiKey,

    #[error("读取配置文件失败: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML 解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("无效的 origin: {0}")]
    InvalidOrigin(String),
}

/// 客户端配置
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API key，只用于 Authorization 头，不校验内容
    #[serde(default)]
    pub api_key: String,

    /// 组织 ID，设置后随请求发送 `OpenAI-Organization` 头
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,

    /// API origin，例如 `https://api.openai.com`；末尾带 `/v1` 也可以
    #[serde(default = "default_origin")]
    pub origin: String,

    /// 阻塞调用的整体超时（毫秒）
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// 建立连接的超时（毫秒）
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub stream: StreamConfig,
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_request_timeout_ms() -> u64 {
    120_000 // 2 分钟
}

fn default_connect_timeout_ms() -> u64 {
    10_000 // 10 秒
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            org_id: None,
            origin: default_origin(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            stream: StreamConfig::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("org_id", &self.org_id)
            .field("origin", &self.origin)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("stream", &self.stream)
            .finish()
    }
}

/// 遮盖 API key，只保留末尾 4 个字符
fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{}", tail)
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 去掉末尾 `/` 的 origin
    pub fn normalized_origin(&self) -> &str {
        self.origin.trim().trim_end_matches('/')
    }

    /// 构建完整的 API URL
    ///
    /// origin 已经以 `/v1` 结尾时直接拼接 endpoint，否则拼接 `/v1/endpoint`。
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        let base = self.normalized_origin();
        let endpoint = endpoint.trim_start_matches('/');
        if base.ends_with("/v1") {
            format!("{}/{}", base, endpoint)
        } else {
            format!("{}/v1/{}", base, endpoint)
        }
    }

    /// 校验配置
    ///
    /// origin 必须是带 host 的绝对 http/https URL。API key 不做校验。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = self.normalized_origin();
        let parsed = url::Url::parse(origin)
            .map_err(|e| ConfigError::InvalidOrigin(format!("{}: {}", origin, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidOrigin(format!(
                "{}: 只支持 http/https",
                origin
            )));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidOrigin(format!("{}: 缺少 host", origin)));
        }
        Ok(())
    }

    /// 从环境变量构建配置
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        if config.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(config)
    }

    /// 用环境变量覆盖已有配置（只覆盖设置了的变量）
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(api_key) = non_empty(ENV_API_KEY) {
            self.api_key = api_key;
        }
        if let Some(org_id) = non_empty(ENV_ORG_ID) {
            self.org_id = Some(org_id);
        }
        if let Some(origin) = non_empty(ENV_ORIGIN) {
            self.origin = origin;
        }
    }

    /// 从 YAML 文件加载配置（路径支持 `~`）
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = expand_tilde(path);
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: ClientConfig = serde_yaml::from_str(&content)?;
        debug!(path = %path.display(), origin = %config.origin, "[CONFIG] 已加载配置文件");
        Ok(config)
    }

    /// 按优先级解析配置：配置文件（存在时）+ 环境变量覆盖
    ///
    /// 未指定路径时使用默认路径；文件不存在时只使用环境变量。
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(expand_tilde).or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();

        if config.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        config.validate()?;
        Ok(config)
    }

    /// 保存为 YAML 文件，父目录不存在时自动创建
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = expand_tilde(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })
    }
}
