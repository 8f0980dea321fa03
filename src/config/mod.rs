use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod crypto;
pub mod oauth_config;

/// 配置文件名（工作目录下）
const LOCAL_CONFIG_FILE: &str = "drivesign.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub drive: DriveConfig,
    pub signature: SignatureConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 接收签署请求的 POST 路由
    pub route: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            route: "/api/envelopes".to_string(),
        }
    }
}

/// Google Drive 相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub api_base: String,
    pub folder_id: String,
    /// 文件名需包含的子串
    pub name_contains: String,
    /// 文件 mime type 需包含的子串
    pub mime_type: String,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub download_dir: PathBuf,
    /// 文件夹中没有匹配文件时的轮询间隔
    pub poll_interval_secs: u64,
    /// 等待匹配文件出现的总时长，超时后返回明确的错误响应
    pub acquire_timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com".to_string(),
            folder_id: String::new(),
            name_contains: "file".to_string(),
            mime_type: "application/pdf".to_string(),
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            download_dir: PathBuf::from("downloads"),
            poll_interval_secs: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl DriveConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// DocuSign 信封配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    pub base_path: String,
    pub document_name: String,
    pub sign_here: SignHerePlacement,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            base_path: "https://demo.docusign.net/restapi".to_string(),
            document_name: "Sample document".to_string(),
            sign_here: SignHerePlacement::default(),
        }
    }
}

/// 签名框在文档中的位置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignHerePlacement {
    pub page: u32,
    pub x: u32,
    pub y: u32,
}

impl Default for SignHerePlacement {
    fn default() -> Self {
        Self {
            page: 1,
            x: 195,
            y: 147,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

/// 获取配置文件路径
///
/// 优先级（从高到低）：
/// 1. 环境变量 `DRIVESIGN_CONFIG`
/// 2. 工作目录下的 `drivesign.toml`
/// 3. 用户配置目录：`<config_dir>/drivesign/config.toml`
///
/// 均不存在时返回 `None`
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DRIVESIGN_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("drivesign").join("config.toml"))
        .filter(|path| path.exists())
}

/// 加载配置
///
/// 先读取配置文件（不存在则使用默认值），再用环境变量覆盖
pub fn load() -> Result<Config> {
    let mut config = match config_path() {
        Some(path) => {
            tracing::info!("✅ 从配置文件加载配置: {}", path.display());
            load_from(&path)?
        }
        None => {
            tracing::info!("未找到配置文件，使用默认配置");
            Config::default()
        }
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// 从指定 TOML 文件加载
pub fn load_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
    Ok(config)
}

impl Config {
    /// 用环境变量覆盖配置项
    ///
    /// `lookup` 通常为 `std::env::var`，测试时可传入闭包
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT 不是有效端口号: {}", port))?;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(folder_id) = lookup("DRIVE_FOLDER_ID") {
            self.drive.folder_id = folder_id;
        }
        if let Some(path) = lookup("GOOGLE_CREDENTIALS_PATH") {
            self.drive.credentials_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("GOOGLE_TOKEN_PATH") {
            self.drive.token_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("DOWNLOAD_DIR") {
            self.drive.download_dir = PathBuf::from(dir);
        }
        if let Some(base_path) = lookup("DOCUSIGN_BASE_PATH") {
            self.signature.base_path = base_path;
        }
        Ok(())
    }

    /// 启动前校验必填项
    pub fn validate(&self) -> Result<()> {
        if self.drive.folder_id.trim().is_empty() {
            anyhow::bail!("未配置 Drive 文件夹 ID：请设置环境变量 DRIVE_FOLDER_ID 或配置文件 [drive] folder_id");
        }
        if self.drive.poll_interval_secs == 0 {
            anyhow::bail!("[drive] poll_interval_secs 必须大于 0");
        }
        if !self.server.route.starts_with('/') {
            anyhow::bail!("路由必须以 '/' 开头: {}", self.server.route);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.drive.name_contains, "file");
        assert_eq!(config.drive.mime_type, "application/pdf");
        assert_eq!(config.drive.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.signature.sign_here.x, 195);
        assert_eq!(config.signature.sign_here.y, 147);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [drive]
            folder_id = "folder-123"
            acquire_timeout_secs = 0

            [signature.sign_here]
            page = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.drive.folder_id, "folder-123");
        assert_eq!(config.drive.acquire_timeout_secs, 0);
        assert_eq!(config.drive.name_contains, "file");
        assert_eq!(config.signature.sign_here.page, 2);
        assert_eq!(config.signature.sign_here.x, 195);
        assert_eq!(config.server.route, "/api/envelopes");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8088"),
            ("DRIVE_FOLDER_ID", "abc"),
            ("DOCUSIGN_BASE_PATH", "http://localhost:9000/restapi"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.drive.folder_id, "abc");
        assert_eq!(config.signature.base_path, "http://localhost:9000/restapi");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|key| {
            (key == "PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_folder_id_fails_validation() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DRIVE_FOLDER_ID"));
    }

    #[test]
    fn test_zero_poll_interval_fails_validation() {
        let mut config = Config::default();
        config.drive.folder_id = "folder".to_string();
        assert!(config.validate().is_ok());

        config.drive.poll_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }
}
