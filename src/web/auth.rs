use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    extract::{Form, Query, State},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use rand_core::OsRng;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::web::{
    AppState,
    data::fetch_administrator_by_login,
    responses::found,
    templates::{self, PageContext},
};

pub const LOGIN_PATH: &str = "/admin/login";
pub const PANEL_PATH: &str = "/admin/panel/collections";

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Default, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
}

pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    if state.sessions().read(&jar).is_some() {
        return found(PANEL_PATH);
    }

    let page = PageContext::new("Вход администратора", false);
    Html(templates::render_login_page(&page, query.error.as_deref())).into_response()
}

pub async fn process_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Response), Response> {
    let login = form.login.trim();
    if login.is_empty() || form.password.is_empty() {
        return Err(login_error("missing_fields"));
    }

    let admin = match fetch_administrator_by_login(state.pool_ref(), login).await {
        Ok(Some(admin)) => admin,
        Ok(None) => return Err(login_error("invalid_credentials")),
        Err(err) => {
            error!(?err, "failed to fetch administrator during login");
            return Err(login_error("server"));
        }
    };

    if !verify_password(&form.password, &admin.password_hash) {
        warn!(login, "rejected administrator login");
        return Err(login_error("invalid_credentials"));
    }

    info!(admin_id = admin.id, login = %admin.login, "administrator logged in");
    let jar = jar.add(state.sessions().create(admin.id));
    Ok((jar, found(PANEL_PATH)))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let jar = jar.remove(state.sessions().destroy());
    (jar, found(LOGIN_PATH))
}

fn login_error(code: &str) -> Response {
    found(&format!("{LOGIN_PATH}?error={code}"))
}

/// Human readable message for a login error code.
pub fn login_error_message(code: &str) -> &'static str {
    match code {
        "missing_fields" => "Заполните все поля",
        "invalid_credentials" => "Неверный логин или пароль",
        "server" => "Ошибка сервера, попробуйте позже",
        _ => "Не удалось войти",
    }
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// Verifies a password against an Argon2 PHC string or a legacy bcrypt hash.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    if is_bcrypt_hash(password_hash) {
        return bcrypt::verify(password, password_hash).unwrap_or(false);
    }

    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

fn is_bcrypt_hash(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| hash.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_hash_verifies_only_its_password() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn legacy_bcrypt_hashes_still_verify() {
        let hash = bcrypt::hash("admin-pass", 4).expect("bcrypt hash");
        assert!(verify_password("admin-pass", &hash));
        assert!(!verify_password("admin-pass2", &hash));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "plaintext"));
        assert!(!verify_password("anything", "$2b$broken"));
    }

    #[test]
    fn login_error_codes_have_messages() {
        assert_eq!(login_error_message("invalid_credentials"), "Неверный логин или пароль");
        assert_eq!(login_error_message("<script>"), "Не удалось войти");
    }
}
