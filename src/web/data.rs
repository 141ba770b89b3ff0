use sqlx::PgPool;

use super::models::{AdministratorRow, ArticleRow, CollectionInput, CollectionRow, NewArticle};

const COLLECTION_COLUMNS: &str =
    "id, release_number, release_year, title, description, cover_image, publication_link, pdf_path";

pub async fn fetch_collections(pool: &PgPool) -> sqlx::Result<Vec<CollectionRow>> {
    sqlx::query_as::<_, CollectionRow>(&format!(
        "SELECT {COLLECTION_COLUMNS} FROM collections ORDER BY id DESC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn fetch_collection(pool: &PgPool, id: i32) -> sqlx::Result<Option<CollectionRow>> {
    sqlx::query_as::<_, CollectionRow>(&format!(
        "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_collection(pool: &PgPool, input: &CollectionInput) -> sqlx::Result<i32> {
    sqlx::query_scalar::<_, i32>(
        "INSERT INTO collections (release_number, release_year, title, description, cover_image, publication_link, pdf_path)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id",
    )
    .bind(input.release_number)
    .bind(input.release_year)
    .bind(&input.title)
    .bind(input.description.as_deref())
    .bind(input.cover_image.as_deref())
    .bind(input.publication_link.as_deref())
    .bind(input.pdf_path.as_deref())
    .fetch_one(pool)
    .await
}

/// Returns `false` when no collection has the given id.
pub async fn update_collection(
    pool: &PgPool,
    id: i32,
    input: &CollectionInput,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE collections SET
            release_number = $1,
            release_year = $2,
            title = $3,
            description = $4,
            cover_image = $5,
            publication_link = $6,
            pdf_path = $7
         WHERE id = $8",
    )
    .bind(input.release_number)
    .bind(input.release_year)
    .bind(&input.title)
    .bind(input.description.as_deref())
    .bind(input.cover_image.as_deref())
    .bind(input.publication_link.as_deref())
    .bind(input.pdf_path.as_deref())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_collection(pool: &PgPool, id: i32) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM collections WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_articles(pool: &PgPool) -> sqlx::Result<Vec<ArticleRow>> {
    sqlx::query_as::<_, ArticleRow>(
        "SELECT id, author, title, email, file_path, created_at FROM articles ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn fetch_article(pool: &PgPool, id: i32) -> sqlx::Result<Option<ArticleRow>> {
    sqlx::query_as::<_, ArticleRow>(
        "SELECT id, author, title, email, file_path, created_at FROM articles WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_article(pool: &PgPool, article: &NewArticle) -> sqlx::Result<i32> {
    sqlx::query_scalar::<_, i32>(
        "INSERT INTO articles (author, title, email, file_path) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(&article.author)
    .bind(&article.title)
    .bind(&article.email)
    .bind(&article.file_path)
    .fetch_one(pool)
    .await
}

pub async fn delete_article(pool: &PgPool, id: i32) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM articles WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_administrator_by_login(
    pool: &PgPool,
    login: &str,
) -> sqlx::Result<Option<AdministratorRow>> {
    sqlx::query_as::<_, AdministratorRow>(
        "SELECT id, login, password_hash FROM administrators WHERE login = $1",
    )
    .bind(login)
    .fetch_optional(pool)
    .await
}
