//! TLS 证书加载（可选）。

use axum_server::tls_rustls::RustlsConfig;
use std::io::{Error, ErrorKind};
use tracing::info;

use crate::config::Args;

/// 加载配置的证书与私钥；未配置 TLS 时返回 `None`。
pub async fn load_rustls_config(args: &Args) -> Result<Option<RustlsConfig>, Error> {
    let Some((cert, key)) = tls_paths(args.tls_cert.as_deref(), args.tls_key.as_deref())? else {
        return Ok(None);
    };
    let config = RustlsConfig::from_pem_file(cert, key).await?;
    info!(cert, "loaded TLS certificate");
    Ok(Some(config))
}

/// 证书与私钥必须成对出现。
fn tls_paths<'a>(
    cert: Option<&'a str>,
    key: Option<&'a str>,
) -> Result<Option<(&'a str, &'a str)>, Error> {
    match (cert, key) {
        (Some(cert), Some(key)) => Ok(Some((cert, key))),
        (None, None) => Ok(None),
        _ => Err(Error::new(
            ErrorKind::InvalidInput,
            "--tls-cert and --tls-key must be set together",
        )),
    }
}
