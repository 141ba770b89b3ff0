use axum::{Extension, response::Html};
use tracing::debug;

use super::CurrentAdmin;
use crate::web::templates::{self, PageContext};

pub async fn collections_panel(Extension(CurrentAdmin(admin_id)): Extension<CurrentAdmin>) -> Html<String> {
    debug!(admin_id, "collections panel opened");
    let page = PageContext::new("Управление сборниками", true);
    Html(templates::render_admin_collections_page(&page))
}

pub async fn articles_panel(Extension(CurrentAdmin(admin_id)): Extension<CurrentAdmin>) -> Html<String> {
    debug!(admin_id, "articles panel opened");
    let page = PageContext::new("Заявки на публикацию", true);
    Html(templates::render_admin_articles_page(&page))
}
