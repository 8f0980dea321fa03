use anyhow::{Context, Result};
use std::sync::Arc;

mod config;
mod docusign;
mod drive;
mod error;
mod pipeline;
mod server;
mod utils;

use config::crypto::TokenCipher;
use docusign::SignatureRequester;
use drive::{FileAcquirer, FileTokenStore, LoopbackAuthorizer, TokenManager};
use pipeline::SigningPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 读取 .env（不存在时忽略）
    dotenvy::dotenv().ok();

    // 2. 初始化日志
    init_logger()?;

    // 3. 加载配置
    let config = config::load()?;
    config.validate()?;

    // 4. 初始化全局 HTTP 客户端
    utils::http_client::init(&config.http).context("构建 HTTP 客户端失败")?;

    // 5. Token 管理（token.json 加密存储）
    let cipher = TokenCipher::from_machine()?;
    let token_store = Arc::new(FileTokenStore::new(config.drive.token_path.clone()));
    tracing::info!("Token 文件: {}", token_store.path().display());
    let tokens = Arc::new(TokenManager::new(
        token_store,
        Arc::new(LoopbackAuthorizer),
        cipher,
        config.drive.credentials_path.clone(),
    ));

    // 6. 组装流水线与路由
    let pipeline = SigningPipeline::new(
        FileAcquirer::new(tokens, &config.drive),
        SignatureRequester::new(config.signature.clone()),
    );
    let app = server::router(server::AppState::new(pipeline), &config.server.route);

    // 7. 启动服务
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;

    tracing::info!("🚀 服务已启动: http://{} (POST {})", addr, config.server.route);
    tracing::info!("📁 监视 Drive 文件夹: {}", config.drive.folder_id);

    axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await
        .context("HTTP 服务异常退出")?;

    Ok(())
}

fn init_logger() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drivesign=debug,tower_http=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
