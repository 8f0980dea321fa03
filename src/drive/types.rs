/// Google Drive 数据结构
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::crypto::{self, TokenCipher};

/// Drive 文件描述（files.list 返回的单个条目）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// files.list 响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

/// 已完整写入本地磁盘的文件
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub source: DriveFile,
    pub path: PathBuf,
    pub bytes: u64,
}

/// 授权或刷新得到的 Token（明文，仅在内存中短暂存在）
#[derive(Debug, Clone)]
pub struct GrantedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_seconds: i64,
    pub scopes: Vec<String>,
}

/// 持久化到 token.json 的 Token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    /// 访问令牌（加密存储）
    ///
    /// 格式：`"encrypted:BASE64..."`
    #[serde(deserialize_with = "deserialize_token")]
    pub access_token: String,

    /// 刷新令牌（加密存储）
    #[serde(deserialize_with = "deserialize_token")]
    pub refresh_token: String,

    /// Token 过期时间（UTC）
    pub expires_at: DateTime<Utc>,

    #[serde(default)]
    pub scopes: Vec<String>,
}

/// 反序列化 Token（保持加密状态，按需解密）
fn deserialize_token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    if !crypto::is_encrypted(&s) {
        return Err(serde::de::Error::custom(
            "Token 格式错误：应为加密格式（encrypted:...）",
        ));
    }

    Ok(s)
}

impl StoredToken {
    /// 由授权结果创建（Token 在创建时立即加密）
    ///
    /// # Errors
    /// - 授权结果中没有 refresh_token
    /// - 加密失败
    pub fn from_grant(cipher: &TokenCipher, grant: GrantedToken) -> Result<Self> {
        let refresh_token = grant
            .refresh_token
            .ok_or_else(|| anyhow::anyhow!("未收到 refresh_token"))?;

        Ok(Self {
            access_token: cipher
                .encrypt(&grant.access_token)
                .context("加密 Access Token 失败")?,
            refresh_token: cipher
                .encrypt(&refresh_token)
                .context("加密 Refresh Token 失败")?,
            expires_at: Utc::now() + chrono::Duration::seconds(grant.expires_in_seconds),
            scopes: grant.scopes,
        })
    }

    pub fn decrypt_access_token(&self, cipher: &TokenCipher) -> Result<String> {
        cipher.decrypt(&self.access_token)
    }

    pub fn decrypt_refresh_token(&self, cipher: &TokenCipher) -> Result<String> {
        cipher.decrypt(&self.refresh_token)
    }

    /// 检查 Token 是否即将过期
    ///
    /// # Arguments
    /// * `threshold_minutes` - 提前多少分钟算作"即将过期"
    pub fn is_token_expiring(&self, threshold_minutes: i64) -> bool {
        let threshold = Utc::now() + chrono::Duration::minutes(threshold_minutes);
        self.expires_at <= threshold
    }

    /// 用刷新结果更新（刷新响应可能不带新的 refresh_token）
    pub fn apply_refresh(&mut self, cipher: &TokenCipher, grant: GrantedToken) -> Result<()> {
        self.access_token = cipher.encrypt(&grant.access_token)?;
        if let Some(refresh_token) = grant.refresh_token {
            self.refresh_token = cipher.encrypt(&refresh_token)?;
        }
        if !grant.scopes.is_empty() {
            self.scopes = grant.scopes;
        }
        self.expires_at = Utc::now() + chrono::Duration::seconds(grant.expires_in_seconds);
        Ok(())
    }
}
