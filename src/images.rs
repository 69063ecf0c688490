//! 图片列表、上传与删除处理器。

use axum::extract::multipart::MultipartError;
use axum::extract::{Extension, Multipart, Path};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::store::{ImageMetadata, ImageStore, StoreError};

/// 承载上传文件的表单字段名。
pub const UPLOAD_FIELD: &str = "image";

/// 列出全部已存储图片。
pub async fn list_images(
    Extension(store): Extension<Arc<ImageStore>>,
) -> Result<JsonResponse<Vec<ImageMetadata>>, ApiError> {
    let images = store.list().await?;
    info!(count = images.len(), "list images");
    Ok(JsonResponse(images))
}

/// 接收 multipart 上传并保存 `image` 字段。
pub async fn upload_image(
    Extension(store): Extension<Arc<ImageStore>>,
    mut multipart: Multipart,
) -> Result<JsonResponse<ImageMetadata>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| match body_error(err) {
            StoreError::Read(msg) => ApiError::BadRequest(msg),
            other => other.into(),
        })?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_string) else {
            return Err(ApiError::BadRequest("image field has no filename".into()));
        };

        let image = store
            .put(&original_name, field.map_err(body_error))
            .await
            .inspect_err(|err| {
                warn!(original_name, error = %err, "upload failed");
            })?;
        info!(
            filename = %image.filename,
            size = image.size,
            "upload image"
        );
        return Ok(JsonResponse(image));
    }

    Err(ApiError::BadRequest(format!(
        "missing form field `{UPLOAD_FIELD}`"
    )))
}

/// 按 id 删除图片。
pub async fn delete_image(
    Path(id): Path<String>,
    Extension(store): Extension<Arc<ImageStore>>,
) -> Result<StatusCode, ApiError> {
    let removed = store.delete(&id).await?;
    info!(id, filename = %removed.filename, "delete image");
    Ok(StatusCode::OK)
}

/// 区分请求体超限与其他读取失败。
fn body_error(err: MultipartError) -> StoreError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StoreError::TooLarge(err.body_text())
    } else {
        StoreError::Read(err.body_text())
    }
}
