use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::error;

use crate::web::{
    AppState,
    collections::load_collection,
    data,
    models::CollectionRow,
    responses::parse_id,
    templates::{self, PageContext, truncate_chars},
};

const META_DESCRIPTION_CHARS: usize = 180;
const OG_DESCRIPTION_CHARS: usize = 200;

fn is_admin(state: &AppState, jar: &CookieJar) -> bool {
    state.sessions().read(jar).is_some()
}

fn not_found(is_admin: bool) -> Response {
    let page = PageContext::new("Страница не найдена", is_admin);
    (StatusCode::NOT_FOUND, Html(templates::render_not_found_page(&page))).into_response()
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html("<h1>Внутренняя ошибка сервера</h1>"),
    )
        .into_response()
}

pub async fn index(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    let page = PageContext::new("Главная", is_admin(&state, &jar));
    Html(templates::render_index_page(&page))
}

pub async fn collections_page(State(state): State<AppState>, jar: CookieJar) -> Response {
    let rows = match data::fetch_collections(state.pool_ref()).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(?err, "failed to fetch collections for page");
            return server_error();
        }
    };
    let rows: Vec<CollectionRow> = rows.into_iter().map(CollectionRow::normalized).collect();

    let page = PageContext::new("Все сборники", is_admin(&state, &jar));
    Html(templates::render_collections_page(&page, &rows)).into_response()
}

pub async fn collection_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(raw_id): Path<String>,
) -> Response {
    let admin = is_admin(&state, &jar);
    let Ok(id) = parse_id(&raw_id) else {
        return not_found(admin);
    };

    let collection = match load_collection(&state, id).await {
        Ok(Some(row)) => row.normalized(),
        Ok(None) => return not_found(admin),
        Err(_) => return server_error(),
    };

    let page = collection_page_context(&collection, admin);
    Html(templates::render_collection_page(&page, &collection)).into_response()
}

/// Page title plus search and OpenGraph meta for a collection.
pub fn collection_page_context(collection: &CollectionRow, is_admin: bool) -> PageContext {
    let description = collection.description.as_deref().unwrap_or("");
    let mut page = PageContext::new(collection.title.clone(), is_admin)
        .with_meta("og:title", collection.title.clone())
        .with_meta("og:type", "book");

    if !description.is_empty() {
        page = page
            .with_meta("description", truncate_chars(description, META_DESCRIPTION_CHARS))
            .with_meta("og:description", truncate_chars(description, OG_DESCRIPTION_CHARS));
    }
    if let Some(cover) = collection.cover_image.as_deref() {
        page = page
            .with_meta("og:image", cover)
            .with_meta("twitter:card", "summary_large_image");
    }
    page
}

pub async fn article_form_page(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    let page = PageContext::new("Подать статью", is_admin(&state, &jar));
    Html(templates::render_article_form_page(&page))
}
