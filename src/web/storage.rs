use std::path::Path;

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::web::responses::{ApiError, json_error};

/// Removes a stored upload. A file that is already gone is not an error.
pub async fn remove_stored_file(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Stream a file with a standard attachment disposition.
pub async fn stream_file(path: &Path, filename: &str) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        error!(?err, file = %path.display(), "failed to read download file");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Файл недоступен")
    })?;

    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(mime::APPLICATION_OCTET_STREAM.as_ref())
        .map_err(|_| json_error(StatusCode::INTERNAL_SERVER_ERROR, "Некорректный тип файла"))?;
    headers.insert(header::CONTENT_TYPE, content_type);
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| json_error(StatusCode::INTERNAL_SERVER_ERROR, "Некорректное имя файла"))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    Ok((headers, bytes).into_response())
}
