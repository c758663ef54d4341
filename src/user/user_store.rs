use super::user_models::{ChannelMembership, User};
use crate::error::JukeboxResult;

pub trait UserStore: Send + Sync {
    /// Creates a new user. Fails with `Invalid` if the username is taken.
    fn create_user(&self, username: &str, name: &str) -> JukeboxResult<User>;

    fn get_user(&self, user_id: &str) -> JukeboxResult<Option<User>>;

    fn get_user_by_username(&self, username: &str) -> JukeboxResult<Option<User>>;

    fn get_all_users(&self) -> JukeboxResult<Vec<User>>;

    /// Grants access to a channel, or updates the owner flag of an existing
    /// grant.
    fn grant_channel(&self, user_id: &str, channel: &str, is_owner: bool) -> JukeboxResult<()>;

    /// Removes access to a channel. Returns false if there was none.
    fn revoke_channel(&self, user_id: &str, channel: &str) -> JukeboxResult<bool>;

    /// Every channel the user may join, owned or allowed.
    fn get_channels(&self, user_id: &str) -> JukeboxResult<Vec<ChannelMembership>>;

    fn get_membership(&self, user_id: &str, channel: &str)
        -> JukeboxResult<Option<ChannelMembership>>;
}
