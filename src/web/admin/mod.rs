mod guard;
mod panel;

pub use guard::{CurrentAdmin, admin_only};
pub use panel::{articles_panel, collections_panel};
