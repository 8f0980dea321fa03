/// 全局共享的 HTTP 客户端
///
/// 复用 TCP 连接和连接池，避免每个 API 调用都创建新客户端。
/// 启动时按配置初始化一次，未初始化时使用默认超时。
use once_cell::sync::OnceCell;
use reqwest::Client;
use std::time::Duration;

use crate::config::HttpConfig;

/// 全局 HTTP 客户端实例
static HTTP_CLIENT: OnceCell<Client> = OnceCell::new();

fn build_client(config: &HttpConfig) -> reqwest::Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(300))
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(concat!("DriveSign/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// 按配置初始化全局客户端
///
/// 重复调用时保留第一次的实例
pub fn init(config: &HttpConfig) -> reqwest::Result<()> {
    let client = build_client(config)?;
    if HTTP_CLIENT.set(client).is_err() {
        tracing::warn!("全局 HTTP 客户端已初始化，忽略重复初始化");
    }
    Ok(())
}

/// 获取全局 HTTP 客户端
pub fn get_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        build_client(&HttpConfig::default()).unwrap_or_else(|e| {
            tracing::warn!("按默认配置构建 HTTP 客户端失败，退回基础客户端: {}", e);
            Client::new()
        })
    })
}
