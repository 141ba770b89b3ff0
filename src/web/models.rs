use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Clone, Debug, FromRow)]
pub struct CollectionRow {
    pub id: i32,
    pub release_number: Option<i32>,
    pub release_year: Option<i32>,
    pub title: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub publication_link: Option<String>,
    pub pdf_path: Option<String>,
}

impl CollectionRow {
    /// Relative asset paths gain a leading `/`; absolute cover URLs are left alone.
    pub fn normalized(mut self) -> Self {
        self.pdf_path = self.pdf_path.map(|path| with_leading_slash(path, false));
        self.cover_image = self.cover_image.map(|path| with_leading_slash(path, true));
        self
    }
}

fn with_leading_slash(path: String, allow_remote: bool) -> String {
    if path.starts_with('/') || (allow_remote && path.starts_with("http")) {
        path
    } else {
        format!("/{}", path.replace('\\', "/"))
    }
}

/// Outward JSON shape of a collection; absent values are omitted.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CollectionResponse {
    pub id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_year: Option<i32>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
}

impl From<CollectionRow> for CollectionResponse {
    fn from(row: CollectionRow) -> Self {
        Self {
            id: row.id,
            release_number: row.release_number,
            release_year: row.release_year,
            title: row.title,
            description: row.description,
            cover_image: row.cover_image,
            publication_link: row.publication_link,
            pdf_path: row.pdf_path,
        }
    }
}

/// Values written by create and update. Empty strings are stored as NULL.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CollectionInput {
    #[serde(default)]
    pub release_number: Option<i32>,
    #[serde(default)]
    pub release_year: Option<i32>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub publication_link: Option<String>,
    #[serde(default)]
    pub pdf_path: Option<String>,
}

impl CollectionInput {
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = non_empty(self.description);
        self.cover_image = non_empty(self.cover_image);
        self.publication_link = non_empty(self.publication_link);
        self.pdf_path = non_empty(self.pdf_path);
        self
    }
}

pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone, Debug, FromRow, Serialize)]
pub struct ArticleRow {
    pub id: i32,
    pub author: String,
    pub title: String,
    pub email: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A validated submission ready to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewArticle {
    pub author: String,
    pub title: String,
    pub email: String,
    pub file_path: String,
}

#[derive(Clone, FromRow)]
pub struct AdministratorRow {
    pub id: i32,
    pub login: String,
    pub password_hash: String,
}
