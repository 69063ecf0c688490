//! 命令行参数与服务配置默认值。

use clap::Parser;

pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";
pub const DEFAULT_RATE_LIMIT: u32 = 60;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const RATE_LIMIT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
pub const DEFAULT_ALLOWED_TYPES: &str = "image/jpeg,image/png,image/gif,image/webp";

/// 服务的命令行参数与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "imgdrop", version, about = "Image upload server")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "IMGDROP_UPLOAD_DIR",
        default_value = "./images",
        help = "Directory where uploaded images are stored"
    )]
    pub upload_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "IMGDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "IMGDROP_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Listen port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "IMGDROP_CORS_ORIGINS",
        default_value = DEFAULT_CORS_ORIGINS,
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: String,
    #[arg(
        long,
        env = "IMGDROP_RATE_LIMIT",
        default_value_t = DEFAULT_RATE_LIMIT,
        help = "Requests per client per minute (0 to disable)"
    )]
    pub rate_limit: u32,
    #[arg(
        long,
        env = "IMGDROP_MAX_UPLOAD_BYTES",
        default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
        help = "Max upload request size in bytes"
    )]
    pub max_upload_bytes: usize,
    #[arg(
        long,
        env = "IMGDROP_ALLOWED_TYPES",
        default_value = DEFAULT_ALLOWED_TYPES,
        help = "Comma separated media types accepted for upload"
    )]
    pub allowed_types: String,
    #[arg(long, env = "IMGDROP_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(long, env = "IMGDROP_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
    #[arg(
        long,
        env = "IMGDROP_LOG_LEVEL",
        default_value = "info",
        help = "Log filter used when RUST_LOG is unset"
    )]
    pub log_level: String,
}

impl Args {
    /// 允许上传的媒体类型；为空时回退到默认列表。
    pub fn allowed_types(&self) -> Vec<String> {
        let types = split_list(&self.allowed_types);
        if types.is_empty() {
            default_allowed_types()
        } else {
            types
        }
    }

    pub fn cors_origins(&self) -> Vec<String> {
        split_list(&self.cors_origins)
    }
}

pub fn default_allowed_types() -> Vec<String> {
    split_list(DEFAULT_ALLOWED_TYPES)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
