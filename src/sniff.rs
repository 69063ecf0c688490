//! 根据上传内容的前导字节识别媒体类型。

use std::fmt;

/// 参与识别的最大前导字节数。
pub const SNIFF_LEN: usize = 512;

/// 无法识别时返回的媒体类型。
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, PartialEq, Eq)]
pub enum SniffError {
    Empty,
}

impl fmt::Display for SniffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SniffError::Empty => f.write_str("upload body is empty"),
        }
    }
}

/// 按魔数识别内容类型，只检查前 [`SNIFF_LEN`] 字节；调用方需将这部分字节写回流的开头。
pub fn classify(leading: &[u8]) -> Result<&'static str, SniffError> {
    if leading.is_empty() {
        return Err(SniffError::Empty);
    }
    let head = &leading[..leading.len().min(SNIFF_LEN)];
    Ok(infer::get(head)
        .map(|kind| kind.mime_type())
        .unwrap_or(DEFAULT_MEDIA_TYPE))
}
