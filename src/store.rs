use axum::body::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::fs::Metadata;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::sniff::{SNIFF_LEN, classify};

/// 已存储文件对外访问的路径前缀。
pub const IMAGE_URL_PREFIX: &str = "/images/";

const FALLBACK_NAME: &str = "image";
const MAX_NAME_ATTEMPTS: u32 = 16;

/// 上传图片的扁平目录；目录列表即索引。
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
    allowed_types: Vec<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub url: String,
}

impl ImageMetadata {
    fn from_fs(filename: String, metadata: &Metadata) -> io::Result<Self> {
        let created_at: DateTime<Utc> = metadata.modified()?.into();
        Ok(Self {
            id: image_id(&filename).to_string(),
            url: format!("{IMAGE_URL_PREFIX}{filename}"),
            size: metadata.len(),
            created_at,
            filename,
        })
    }
}

#[derive(Debug)]
pub enum StoreError {
    Validation(String),
    Read(String),
    TooLarge(String),
    NotFound(String),
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Validation(msg)
            | StoreError::Read(msg)
            | StoreError::TooLarge(msg)
            | StoreError::NotFound(msg) => f.write_str(msg),
            StoreError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<Infallible> for StoreError {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}

impl ImageStore {
    pub fn new(root: PathBuf, allowed_types: Vec<String>) -> Self {
        Self {
            root,
            allowed_types,
        }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn is_allowed(&self, media_type: &str) -> bool {
        self.allowed_types.iter().any(|allowed| allowed == media_type)
    }

    /// 按文件名列出上传目录中的普通文件，读取元数据失败的条目直接跳过。
    pub async fn list(&self) -> Result<Vec<ImageMetadata>, StoreError> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut images = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    debug!(path = ?entry.path(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().to_string();
            match ImageMetadata::from_fs(filename, &metadata) {
                Ok(image) => images.push(image),
                Err(err) => debug!(path = ?entry.path(), error = %err, "skipping entry"),
            }
        }

        images.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(images)
    }

    /// 识别类型、生成文件名并写入磁盘；类型校验通过前不会创建文件。
    pub async fn put<S, E>(&self, original_name: &str, body: S) -> Result<ImageMetadata, StoreError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<StoreError>,
    {
        let mut body = std::pin::pin!(body);
        let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        while head.len() < SNIFF_LEN {
            match body.next().await {
                Some(chunk) => {
                    let chunk = chunk.map_err(Into::<StoreError>::into)?;
                    head.extend_from_slice(&chunk);
                }
                None => break,
            }
        }

        let media_type = classify(&head).map_err(|err| StoreError::Read(err.to_string()))?;
        if !self.is_allowed(media_type) {
            warn!(media_type, original_name, "rejected upload type");
            return Err(StoreError::Validation("File type not allowed".into()));
        }

        let (filename, path, mut file) = self.create_unique(original_name).await?;
        let write_result: Result<(), StoreError> = async {
            file.write_all(&head).await?;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(Into::<StoreError>::into)?;
                if !chunk.is_empty() {
                    file.write_all(&chunk).await?;
                }
            }
            file.flush().await?;
            Ok(())
        }
        .await;
        drop(file);
        if let Err(err) = write_result {
            discard_partial(&path).await;
            return Err(err);
        }

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                discard_partial(&path).await;
                return Err(err.into());
            }
        };
        debug!(filename, media_type, "stored upload");
        Ok(ImageMetadata::from_fs(filename, &metadata)?)
    }

    /// 删除 id 完全匹配的第一个文件（按文件名排序）。
    pub async fn delete(&self, id: &str) -> Result<ImageMetadata, StoreError> {
        let target = self
            .list()
            .await?
            .into_iter()
            .find(|image| image.id == id)
            .ok_or_else(|| StoreError::NotFound("Image not found".into()))?;
        fs::remove_file(self.root.join(&target.filename)).await?;
        Ok(target)
    }

    async fn create_unique(
        &self,
        original_name: &str,
    ) -> Result<(String, PathBuf, File), StoreError> {
        let name = safe_name(original_name);
        let mut stamp = unix_nanos(SystemTime::now());
        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = format!("{stamp}_{name}");
            let path = self.root.join(&filename);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((filename, path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => stamp += 1,
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate a unique filename",
        )))
    }
}

/// 去掉扩展名（最后一个 `.` 及之后的部分）。
pub fn image_id(filename: &str) -> &str {
    filename
        .rfind('.')
        .map(|index| &filename[..index])
        .unwrap_or(filename)
}

fn safe_name(original: &str) -> String {
    let sanitized = sanitize_filename::sanitize(original.trim());
    let sanitized = sanitized.trim_start_matches('.').trim();
    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized.to_string()
    }
}

fn unix_nanos(now: SystemTime) -> u128 {
    now.duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or_default()
}

async fn discard_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        warn!(path = ?path, error = %err, "failed to remove partial upload");
    }
}
