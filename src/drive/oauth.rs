/// Google Drive OAuth2 交互式授权
///
/// 实现 OAuth2 授权码流程（带 PKCE），通过本地回环服务器接收回调
use anyhow::{Context, Result};
use async_trait::async_trait;
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, Scope};
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Response, Server};
use tokio::sync::oneshot;
use url::Url;

use crate::config::oauth_config::OAuthConfig;
use crate::drive::token::{Authorizer, grant_from_response};
use crate::drive::types::GrantedToken;

/// OAuth2 回调超时时间（秒）
const CALLBACK_TIMEOUT_SECS: u64 = 120;

/// 本地服务器端口范围
const PORT_RANGE: std::ops::Range<u16> = 8080..8090;

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>授权成功 - DriveSign</title></head>
<body style="font-family: sans-serif; text-align: center; margin-top: 20vh">
    <h1>授权成功</h1>
    <p>DriveSign 已获得 Google Drive 只读权限，可以关闭此页面。</p>
</body>
</html>"#;

const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>授权失败 - DriveSign</title></head>
<body style="font-family: sans-serif; text-align: center; margin-top: 20vh">
    <h1>授权失败</h1>
    <p>Google Drive 授权未完成，请查看服务日志。</p>
</body>
</html>"#;

/// 本地回环授权器
///
/// 打开浏览器（失败时仅打印授权 URL），在本地端口等待 Google 回调
#[derive(Debug, Default)]
pub struct LoopbackAuthorizer;

#[async_trait]
impl Authorizer for LoopbackAuthorizer {
    /// 完整流程：
    /// 1. 绑定本地端口
    /// 2. 生成授权 URL
    /// 3. 打开浏览器
    /// 4. 等待回调
    /// 5. 验证 CSRF state
    /// 6. 交换 Token
    async fn authorize(&self, config: &OAuthConfig) -> Result<GrantedToken> {
        tracing::info!("🔐 开始 Google Drive OAuth2 授权流程");

        let (server, port) = bind_local_server()?;
        let redirect_uri = loopback_redirect_uri(&config.redirect_uri, port)?;

        let (auth_url, csrf_state, pkce_verifier) = build_auth_url(config, &redirect_uri)?;
        tracing::debug!("授权 URL: {}", auth_url);

        tracing::info!("✅ 本地服务器启动成功: {}", redirect_uri);

        if let Err(e) = webbrowser::open(auth_url.as_str()) {
            tracing::warn!("无法打开浏览器（{}），请手动访问授权 URL", e);
        }
        tracing::info!("请在浏览器中完成授权: {}", auth_url);

        let (received_code, received_state) =
            receive_callback(server, port, Duration::from_secs(CALLBACK_TIMEOUT_SECS)).await?;

        if received_state.secret() != csrf_state.secret() {
            anyhow::bail!("CSRF 验证失败：state 不匹配");
        }
        tracing::info!("✅ CSRF 验证通过");

        let response = config
            .client(Some(redirect_uri))?
            .exchange_code(received_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| anyhow::anyhow!("Token 交换失败: {}", e))?;

        tracing::info!("✅ Token 交换成功");
        Ok(grant_from_response(&response))
    }
}

/// 在端口范围内绑定第一个可用端口
fn bind_local_server() -> Result<(Server, u16)> {
    let mut last_error = None;
    for port in PORT_RANGE {
        match Server::http(("127.0.0.1", port)) {
            Ok(server) => return Ok((server, port)),
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "无法启动本地服务器（端口 {}..{} 均被占用）: {}",
        PORT_RANGE.start,
        PORT_RANGE.end,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// 把 credentials.json 中的回调地址替换为实际端口
fn loopback_redirect_uri(configured: &str, port: u16) -> Result<String> {
    let mut url = Url::parse(configured).context("回调地址无效")?;
    url.set_port(Some(port))
        .map_err(|_| anyhow::anyhow!("回调地址不支持设置端口: {}", configured))?;
    Ok(url.to_string())
}

/// 生成授权 URL
///
/// `access_type=offline` + `prompt=consent` 保证返回 refresh_token
fn build_auth_url(
    config: &OAuthConfig,
    redirect_uri: &str,
) -> Result<(Url, CsrfToken, PkceCodeVerifier)> {
    let client = config.client(Some(redirect_uri.to_string()))?;
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (auth_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(config.scopes.iter().map(|s| Scope::new(s.clone())))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    Ok((auth_url, csrf_state, pkce_verifier))
}

fn html_header() -> Result<Header> {
    Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
        .map_err(|_| anyhow::anyhow!("构造响应头失败"))
}

/// 在后台线程等待回调
///
/// 无论成功、失败还是超时，返回前都会关闭本地服务器并回收线程，端口随之释放
async fn receive_callback(
    server: Server,
    port: u16,
    timeout: Duration,
) -> Result<(AuthorizationCode, CsrfToken)> {
    let server = Arc::new(server);
    let (code_tx, code_rx) = oneshot::channel();

    let callback_server = Arc::clone(&server);
    let server_task =
        tokio::task::spawn_blocking(move || wait_for_callback(&callback_server, port, code_tx));

    let received = tokio::time::timeout(timeout, code_rx).await;

    server.unblock();
    let served = server_task
        .await
        .map_err(|e| anyhow::anyhow!("回调服务器线程异常退出: {}", e))?;

    match received {
        Ok(Ok(callback)) => Ok(callback),
        Ok(Err(_)) => {
            served.context("本地服务器接收回调失败")?;
            anyhow::bail!("本地服务器在收到回调前关闭")
        }
        Err(_) => anyhow::bail!("授权超时：{:?} 内未完成授权", timeout),
    }
}

/// 接收 OAuth2 回调，取出 code 和 state
fn wait_for_callback(
    server: &Server,
    port: u16,
    code_tx: oneshot::Sender<(AuthorizationCode, CsrfToken)>,
) -> Result<()> {
    for request in server.incoming_requests() {
        let url = Url::parse(&format!("http://localhost:{}{}", port, request.url()))?;
        let (code, state, error) = parse_callback(&url);

        if let Some(error) = error {
            tracing::error!("用户拒绝授权: {}", error);
            request.respond(Response::from_string(ERROR_HTML).with_header(html_header()?))?;
            return Err(anyhow::anyhow!("用户拒绝授权: {}", error));
        }

        // 浏览器可能先请求 /favicon.ico 等路径
        let (Some(code), Some(state)) = (code, state) else {
            tracing::debug!("忽略非回调请求: {}", url.path());
            request.respond(Response::empty(tiny_http::StatusCode(404)))?;
            continue;
        };

        request.respond(Response::from_string(SUCCESS_HTML).with_header(html_header()?))?;

        code_tx
            .send((AuthorizationCode::new(code), CsrfToken::new(state)))
            .ok();
        break;
    }

    Ok(())
}

/// 解析回调 URL 中的 code / state / error
fn parse_callback(url: &Url) -> (Option<String>, Option<String>, Option<String>) {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }
    (code, state, error)
}
