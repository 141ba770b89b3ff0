use axum::{
    Json,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::web::{
    AppState,
    data,
    models::{CollectionInput, CollectionResponse, CollectionRow},
    responses::{ApiError, ApiMessage, internal_error, json_error, parse_id},
    uploads::{
        COLLECTION_PDF_POLICY, COVER_POLICY, FormOutcome, UploadError, read_upload_form,
        store_asset,
    },
};

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Serialize)]
pub struct CollectionCreated {
    pub message: &'static str,
    pub id: i32,
}

pub async fn list_collections_api(State(state): State<AppState>) -> ApiResult<Json<Vec<CollectionResponse>>> {
    let rows = data::fetch_collections(state.pool_ref()).await.map_err(|err| {
        error!(?err, "failed to fetch collections");
        internal_error()
    })?;

    Ok(Json(
        rows.into_iter()
            .map(|row| CollectionResponse::from(row.normalized()))
            .collect(),
    ))
}

pub async fn get_collection_api(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<CollectionResponse>> {
    let id = parse_id(&raw_id)?;
    let row = load_collection(&state, id)
        .await?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Сборник не найден"))?;
    Ok(Json(CollectionResponse::from(row.normalized())))
}

/// Fetches one collection, logging storage failures.
pub async fn load_collection(state: &AppState, id: i32) -> ApiResult<Option<CollectionRow>> {
    data::fetch_collection(state.pool_ref(), id).await.map_err(|err| {
        error!(?err, id, "failed to fetch collection");
        internal_error()
    })
}

/// Integer form fields are optional; anything unparsable counts as absent.
pub fn parse_optional_int(raw: Option<&str>) -> Option<i32> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse().ok())
}

/// Builds the insert values from the text part of a create form.
pub fn collection_input_from_form(form: &FormOutcome) -> ApiResult<CollectionInput> {
    let title = form.trimmed("title");
    if title.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Поле 'title' обязательно"));
    }

    Ok(CollectionInput {
        release_number: parse_optional_int(form.first_text("release_number")),
        release_year: parse_optional_int(form.first_text("release_year")),
        title: title.to_string(),
        description: form.first_text("description").map(str::to_string),
        cover_image: None,
        publication_link: form.first_text("publication_link").map(str::to_string),
        pdf_path: None,
    }
    .normalized())
}

fn form_error(err: UploadError) -> (StatusCode, Json<ApiError>) {
    match err {
        UploadError::PayloadTooLarge => {
            json_error(StatusCode::PAYLOAD_TOO_LARGE, "Слишком большой запрос")
        }
        UploadError::Malformed(reason) | UploadError::Rejected(reason) => {
            warn!(%reason, "malformed collection form");
            json_error(StatusCode::BAD_REQUEST, "Некорректная форма")
        }
        UploadError::Io { .. } => {
            error!(?err, "collection form could not be read");
            internal_error()
        }
    }
}

/// Unwraps a JSON body, answering with the `ApiError` shape when it cannot be read.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "rejected collection JSON body");
        json_error(rejection.status(), "Некорректные данные сборника")
    })
}

/// Creates a collection from a multipart form. Cover and PDF are best-effort:
/// a file that cannot be saved leaves its path empty.
pub async fn create_collection(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<CollectionCreated>)> {
    let form = read_upload_form(multipart).await.map_err(form_error)?;
    let mut input = collection_input_from_form(&form)?;

    let upload_root = state.upload_root();
    let timestamp = Utc::now().timestamp();
    let cover = store_asset(upload_root, &COVER_POLICY, form.first_file("cover"), timestamp)
        .await
        .map_err(form_error)?;
    let pdf = store_asset(upload_root, &COLLECTION_PDF_POLICY, form.first_file("pdf"), timestamp)
        .await
        .map_err(form_error)?;
    input.cover_image = cover.map(|stored| stored.web_path);
    input.pdf_path = pdf.map(|stored| stored.web_path);

    let id = data::insert_collection(state.pool_ref(), &input)
        .await
        .map_err(|err| {
            error!(?err, title = %input.title, "failed to insert collection");
            internal_error()
        })?;

    info!(id, title = %input.title, "collection created");
    Ok((
        StatusCode::CREATED,
        Json(CollectionCreated {
            message: "Сборник создан",
            id,
        }),
    ))
}

pub async fn update_collection(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<CollectionInput>, JsonRejection>,
) -> ApiResult<Json<ApiMessage>> {
    let id = parse_id(&raw_id)?;
    let input = json_body(payload)?.normalized();
    if input.title.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Поле 'title' обязательно"));
    }

    let updated = data::update_collection(state.pool_ref(), id, &input)
        .await
        .map_err(|err| {
            error!(?err, id, "failed to update collection");
            internal_error()
        })?;
    if !updated {
        return Err(json_error(StatusCode::NOT_FOUND, "Сборник не найден"));
    }

    info!(id, "collection updated");
    Ok(Json(ApiMessage::new("Сборник обновлён")))
}

pub async fn delete_collection(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<ApiMessage>> {
    let id = parse_id(&raw_id)?;
    let deleted = data::delete_collection(state.pool_ref(), id)
        .await
        .map_err(|err| {
            error!(?err, id, "failed to delete collection");
            internal_error()
        })?;
    if !deleted {
        return Err(json_error(StatusCode::NOT_FOUND, "Сборник не найден"));
    }

    info!(id, "collection deleted");
    Ok(Json(ApiMessage::new("Сборник удалён")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> FormOutcome {
        let mut outcome = FormOutcome::default();
        for (name, value) in fields {
            outcome
                .text_fields
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        outcome
    }

    #[test]
    fn optional_ints_are_lenient() {
        assert_eq!(parse_optional_int(Some(" 2024 ")), Some(2024));
        assert_eq!(parse_optional_int(Some("")), None);
        assert_eq!(parse_optional_int(Some("двадцать")), None);
        assert_eq!(parse_optional_int(None), None);
    }

    #[test]
    fn create_form_requires_title() {
        let (status, Json(body)) = collection_input_from_form(&form(&[("title", "   ")])).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Поле 'title' обязательно");
    }

    #[test]
    fn create_form_maps_fields_and_drops_blanks() {
        let input = collection_input_from_form(&form(&[
            ("title", " Выпуск 5 "),
            ("release_year", "2023"),
            ("release_number", "x"),
            ("description", ""),
            ("publication_link", "https://elibrary.example/5"),
        ]))
        .unwrap();

        assert_eq!(input.title, "Выпуск 5");
        assert_eq!(input.release_year, Some(2023));
        assert_eq!(input.release_number, None);
        assert_eq!(input.description, None);
        assert_eq!(input.publication_link.as_deref(), Some("https://elibrary.example/5"));
        assert_eq!(input.cover_image, None);
        assert_eq!(input.pdf_path, None);
    }

    #[test]
    fn oversized_form_is_413() {
        let (status, _) = form_error(UploadError::PayloadTooLarge);
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        let (status, _) = form_error(UploadError::Malformed("boundary".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
