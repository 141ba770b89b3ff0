use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::web::{
    auth::LOGIN_PATH,
    responses::found,
    session::{AdminId, SessionManager},
};

/// Admin id of the current session, or a `302` to the login page.
pub fn require_admin(sessions: &SessionManager, jar: &CookieJar) -> Result<AdminId, Response> {
    sessions.read(jar).ok_or_else(|| found(LOGIN_PATH))
}

/// Middleware for admin-only routes. The inner handler never runs without a valid session.
pub async fn admin_only(
    State(sessions): State<SessionManager>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match require_admin(&sessions, &jar) {
        Ok(admin_id) => {
            request.extensions_mut().insert(CurrentAdmin(admin_id));
            next.run(request).await
        }
        Err(redirect) => redirect,
    }
}

/// Request extension set by [`admin_only`].
#[derive(Clone, Copy, Debug)]
pub struct CurrentAdmin(pub AdminId);
