/// 本机密钥源与加密密钥派生模块
///
/// 优先读取环境变量 `DRIVESIGN_TOKEN_SECRET`，否则读取 Linux 的 machine-id，
/// 使用 Argon2 派生加密密钥
use anyhow::Result;
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString},
};

/// 固定盐值（编译时确定，用于密钥派生的一致性）
///
/// 注意：这个盐值对所有部署相同，真正的唯一性来自密钥源
const FIXED_SALT: &[u8] = b"DriveSign.v1.key";

/// 密钥源环境变量
const SECRET_ENV: &str = "DRIVESIGN_TOKEN_SECRET";

/// machine-id 候选路径
const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// 获取本机密钥源
///
/// # Errors
/// - 环境变量未设置且所有 machine-id 文件均不可读
pub fn machine_secret() -> Result<String> {
    if let Ok(secret) = std::env::var(SECRET_ENV) {
        if !secret.trim().is_empty() {
            tracing::debug!("使用 {} 作为密钥源", SECRET_ENV);
            return Ok(secret);
        }
    }

    for path in MACHINE_ID_PATHS {
        if let Ok(id) = std::fs::read_to_string(path) {
            let id = id.trim();
            if !id.is_empty() {
                tracing::debug!("使用 {} 作为密钥源", path);
                return Ok(id.to_string());
            }
        }
    }

    anyhow::bail!(
        "未找到密钥源：请设置环境变量 {} 或确保 /etc/machine-id 可读",
        SECRET_ENV
    )
}

/// 从密钥源派生 256-bit 加密密钥
///
/// 使用 Argon2id 派生，相同密钥源派生结果一致（固定盐值）
pub fn derive_encryption_key(secret: &str) -> Result<[u8; 32]> {
    let salt = SaltString::encode_b64(FIXED_SALT)
        .map_err(|e| anyhow::anyhow!("盐值编码失败: {}", e))?;

    let password_hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Argon2 哈希失败: {}", e))?;

    let hash_bytes = password_hash
        .hash
        .ok_or_else(|| anyhow::anyhow!("哈希值为空"))?;

    let hash_slice = hash_bytes.as_bytes();
    if hash_slice.len() < 32 {
        anyhow::bail!("哈希长度不足 32 字节（实际: {}）", hash_slice.len());
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_slice[..32]);

    tracing::debug!("加密密钥派生成功（256-bit）");

    Ok(key)
}
