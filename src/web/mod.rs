pub mod admin;
pub mod articles;
pub mod auth;
pub mod collections;
pub mod data;
pub mod models;
pub mod public;
pub mod responses;
pub mod router;
pub mod session;
pub mod state;
pub mod storage;
pub mod templates;
pub mod uploads;

pub use state::AppState;
