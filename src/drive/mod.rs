/// Google Drive 模块 - OAuth2 认证、文件列表与下载
pub mod acquire;
pub mod api;
pub mod oauth;
pub mod token;
pub mod types;

pub use acquire::{AcquireError, FileAcquirer};
pub use oauth::LoopbackAuthorizer;
pub use token::{FileTokenStore, TokenManager};
pub use types::DownloadedFile;
