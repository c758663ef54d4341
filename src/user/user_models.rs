use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub created_at: i64,
}

/// A user's access to one channel. Owners may reorder and delete entries
/// and are the only ones who can become the channel player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMembership {
    pub channel: String,
    pub is_owner: bool,
}
