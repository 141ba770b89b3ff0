use std::{future::Future, path::Path, sync::LazyLock};

use axum::{
    Json,
    extract::{Multipart, Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::web::{
    AppState,
    data,
    models::{ArticleRow, NewArticle},
    responses::{ApiError, ApiMessage, internal_error, json_error, parse_id},
    storage::{remove_stored_file, stream_file},
    uploads::{
        ARTICLE_POLICY, FormOutcome, UploadError, UploadedFile, read_upload_form,
        resolve_stored_path, store_upload,
    },
};

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

/// Why a public submission was turned away.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("author, title or email missing")]
    MissingFields,
    #[error("invalid email")]
    InvalidEmail,
    #[error("manuscript file missing")]
    MissingFile,
    #[error("unsupported file type `{0}`")]
    UnsupportedFileType(String),
    #[error("malformed form: {0}")]
    MalformedForm(String),
    #[error("failed to store manuscript: {0}")]
    Storage(#[source] UploadError),
    #[error("failed to insert submission: {0}")]
    Database(#[source] sqlx::Error),
}

impl SubmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            SubmissionError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            SubmissionError::MissingFields
            | SubmissionError::InvalidEmail
            | SubmissionError::MissingFile
            | SubmissionError::UnsupportedFileType(_)
            | SubmissionError::MalformedForm(_) => StatusCode::BAD_REQUEST,
            SubmissionError::Storage(_) | SubmissionError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the submitter. Storage details stay in the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmissionError::PayloadTooLarge => "Слишком большой файл (лимит 25 МБ)",
            SubmissionError::MissingFields => "Заполните все поля: Автор, Название, Email",
            SubmissionError::InvalidEmail => "Некорректный email",
            SubmissionError::MissingFile => "Приложите файл рукописи",
            SubmissionError::UnsupportedFileType(_) => {
                "Недопустимый тип файла. Разрешено: PDF, DOCX, ODT"
            }
            SubmissionError::MalformedForm(_) => "Некорректная форма",
            SubmissionError::Storage(_) => "Не удалось сохранить файл",
            SubmissionError::Database(_) => "Ошибка БД при сохранении заявки",
        }
    }
}

impl From<UploadError> for SubmissionError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::PayloadTooLarge => SubmissionError::PayloadTooLarge,
            UploadError::Malformed(reason) | UploadError::Rejected(reason) => {
                SubmissionError::MalformedForm(reason)
            }
            err @ UploadError::Io { .. } => SubmissionError::Storage(err),
        }
    }
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        json_error(self.status(), self.user_message()).into_response()
    }
}

/// The fields of a submission as they arrived, before validation.
#[derive(Debug, Default)]
pub struct ArticleSubmissionForm {
    pub author: String,
    pub title: String,
    pub email: String,
    pub file: Option<UploadedFile>,
}

impl From<FormOutcome> for ArticleSubmissionForm {
    fn from(mut form: FormOutcome) -> Self {
        Self {
            author: form.trimmed("author").to_string(),
            title: form.trimmed("title").to_string(),
            email: form.trimmed("email").to_string(),
            file: form.take_file("file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub id: i32,
    pub path: String,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Validates a submission, stores its manuscript and records it through `insert`.
///
/// The manuscript is written before `insert` runs. When `insert` fails the file is
/// deleted again so a stored file always has a matching row.
pub async fn accept_article_submission<F, Fut>(
    form: ArticleSubmissionForm,
    upload_root: &Path,
    timestamp: i64,
    insert: F,
) -> Result<SubmissionReceipt, SubmissionError>
where
    F: FnOnce(NewArticle) -> Fut,
    Fut: Future<Output = sqlx::Result<i32>>,
{
    if form.author.is_empty() || form.title.is_empty() || form.email.is_empty() {
        return Err(SubmissionError::MissingFields);
    }
    if !is_valid_email(&form.email) {
        return Err(SubmissionError::InvalidEmail);
    }

    let file = form.file.ok_or(SubmissionError::MissingFile)?;
    let extension = file.extension();
    if !ARTICLE_POLICY.allows_extension(&extension) {
        return Err(SubmissionError::UnsupportedFileType(extension));
    }
    if ARTICLE_POLICY.exceeds_size(file.size()) {
        return Err(SubmissionError::PayloadTooLarge);
    }

    let stored = store_upload(upload_root, &ARTICLE_POLICY, &file, &form.title, timestamp)
        .await
        .map_err(SubmissionError::Storage)?;

    let article = NewArticle {
        author: form.author,
        title: form.title,
        email: form.email,
        file_path: stored.web_path.clone(),
    };

    match insert(article).await {
        Ok(id) => Ok(SubmissionReceipt {
            id,
            path: stored.web_path,
        }),
        Err(err) => {
            if let Err(cleanup) = remove_stored_file(&stored.disk_path).await {
                warn!(?cleanup, file = %stored.disk_path.display(), "failed to remove orphaned manuscript");
            }
            Err(SubmissionError::Database(err))
        }
    }
}

#[derive(Serialize)]
struct SubmissionAccepted {
    ok: bool,
    id: i32,
    path: String,
    msg: &'static str,
}

pub async fn submit_article(State(state): State<AppState>, multipart: Multipart) -> Response {
    let outcome: Result<SubmissionReceipt, SubmissionError> = async {
        let form = read_upload_form(multipart).await?;
        let pool = state.pool_ref().clone();
        accept_article_submission(
            ArticleSubmissionForm::from(form),
            state.upload_root(),
            Utc::now().timestamp(),
            |article| async move { data::insert_article(&pool, &article).await },
        )
        .await
    }
    .await;

    match outcome {
        Ok(receipt) => {
            info!(id = receipt.id, path = %receipt.path, "article submission accepted");
            Json(SubmissionAccepted {
                ok: true,
                id: receipt.id,
                path: receipt.path,
                msg: "Заявка отправлена",
            })
            .into_response()
        }
        Err(err) => {
            if err.status().is_server_error() {
                error!(?err, "article submission failed");
            } else {
                warn!(%err, "article submission rejected");
            }
            err.into_response()
        }
    }
}

pub async fn list_articles(
    State(state): State<AppState>,
) -> Result<Json<Vec<ArticleRow>>, (StatusCode, Json<ApiError>)> {
    let articles = data::fetch_articles(state.pool_ref()).await.map_err(|err| {
        error!(?err, "failed to fetch articles");
        internal_error()
    })?;
    Ok(Json(articles))
}

async fn load_article(
    state: &AppState,
    raw_id: &str,
) -> Result<ArticleRow, (StatusCode, Json<ApiError>)> {
    let id = parse_id(raw_id)?;
    match data::fetch_article(state.pool_ref(), id).await {
        Ok(Some(article)) => Ok(article),
        Ok(None) => Err(json_error(StatusCode::NOT_FOUND, "Заявка не найдена")),
        Err(err) => {
            error!(?err, id, "failed to fetch article");
            Err(internal_error())
        }
    }
}

pub async fn get_article(
    State(state): State<AppState>,
    AxumPath(raw_id): AxumPath<String>,
) -> Result<Json<ArticleRow>, (StatusCode, Json<ApiError>)> {
    load_article(&state, &raw_id).await.map(Json)
}

pub async fn delete_article(
    State(state): State<AppState>,
    AxumPath(raw_id): AxumPath<String>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiError>)> {
    let article = load_article(&state, &raw_id).await?;

    let deleted = data::delete_article(state.pool_ref(), article.id)
        .await
        .map_err(|err| {
            error!(?err, id = article.id, "failed to delete article");
            internal_error()
        })?;
    if !deleted {
        return Err(json_error(StatusCode::NOT_FOUND, "Заявка не найдена"));
    }

    match resolve_stored_path(state.upload_root(), &article.file_path) {
        Some(path) => {
            if let Err(err) = remove_stored_file(&path).await {
                warn!(?err, file = %path.display(), "article row deleted but file removal failed");
            }
        }
        None => {
            warn!(id = article.id, file_path = %article.file_path, "article row deleted, file path is outside the upload root");
        }
    }

    info!(id = article.id, "article deleted");
    Ok(Json(ApiMessage::new("Заявка удалена")))
}

pub async fn download_article(
    State(state): State<AppState>,
    AxumPath(raw_id): AxumPath<String>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let article = load_article(&state, &raw_id).await?;

    let path = resolve_stored_path(state.upload_root(), &article.file_path).ok_or_else(|| {
        warn!(id = article.id, file_path = %article.file_path, "refusing to resolve article path");
        json_error(StatusCode::NOT_FOUND, "Файл не найден")
    })?;
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(json_error(StatusCode::NOT_FOUND, "Файл не найден"));
    }

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("article");
    stream_file(&path, filename).await
}
