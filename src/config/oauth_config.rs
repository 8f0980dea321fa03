/// OAuth2 客户端凭据读取模块
///
/// 支持从环境变量或 Google 下载的 `credentials.json` 读取客户端凭据
use anyhow::{Context, Result};
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl, basic::BasicClient};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Google 授权端点
const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google Token 端点
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Drive 只读权限（修改后需删除 token.json 重新授权）
pub const DRIVE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/drive.metadata.readonly",
];

/// OAuth2 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,

    /// 回调地址（取 credentials.json 中的第一个）
    pub redirect_uri: String,

    /// 请求的 API 权限范围
    pub scopes: Vec<String>,
}

/// `credentials.json` 文件格式（桌面应用为 `installed`，Web 应用为 `web`）
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl OAuthConfig {
    /// 加载 OAuth2 配置
    ///
    /// 优先级（从高到低）：
    /// 1. 环境变量：`GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`
    /// 2. 客户端凭据文件（默认 `credentials.json`）
    ///
    /// # Errors
    /// - 凭据文件不存在或无法读取
    /// - 文件格式错误（缺少 `installed` / `web` 段）
    pub fn load(credentials_path: &Path) -> Result<Self> {
        if let (Ok(client_id), Ok(client_secret)) = (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
        ) {
            tracing::debug!("从环境变量加载 OAuth2 客户端凭据");
            return Ok(Self::new(
                client_id,
                client_secret,
                default_auth_uri(),
                default_token_uri(),
                "http://localhost".to_string(),
            ));
        }

        let content = std::fs::read_to_string(credentials_path).with_context(|| {
            format!("加载客户端凭据文件失败: {}", credentials_path.display())
        })?;

        Self::from_json(&content)
            .with_context(|| format!("客户端凭据文件格式错误: {}", credentials_path.display()))
    }

    /// 解析 Google 客户端凭据 JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(content)?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or_else(|| anyhow::anyhow!("缺少 installed 或 web 段"))?;

        if secrets.client_id.trim().is_empty() || secrets.client_secret.trim().is_empty() {
            anyhow::bail!("client_id 或 client_secret 为空");
        }

        let redirect_uri = secrets
            .redirect_uris
            .into_iter()
            .next()
            .unwrap_or_else(|| "http://localhost".to_string());

        Ok(Self::new(
            secrets.client_id,
            secrets.client_secret,
            secrets.auth_uri,
            secrets.token_uri,
            redirect_uri,
        ))
    }

    fn new(
        client_id: String,
        client_secret: String,
        auth_uri: String,
        token_uri: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            auth_uri,
            token_uri,
            redirect_uri,
            scopes: DRIVE_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 构建 OAuth2 客户端
    ///
    /// `redirect_uri` 仅在授权码流程中需要，刷新 Token 时传 `None`
    pub fn client(&self, redirect_uri: Option<String>) -> Result<BasicClient> {
        let client = BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.clone())),
            AuthUrl::new(self.auth_uri.clone())?,
            Some(TokenUrl::new(self.token_uri.clone())?),
        );

        match redirect_uri {
            Some(uri) => Ok(client.set_redirect_uri(RedirectUrl::new(uri)?)),
            None => Ok(client),
        }
    }
}
