pub mod auth;
mod sqlite_user_store;
mod user_models;
mod user_store;

pub use auth::{AuthClaims, TokenSigner};
pub use sqlite_user_store::SqliteUserStore;
pub use user_models::{ChannelMembership, User};
pub use user_store::UserStore;
