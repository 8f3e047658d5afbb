//! Capability checks gating retrieval and conversation history.
//!
//! Both checks are pure: the caller loads the space membership or chat record and asks
//! whether a verified user identifier may touch it. Joining a space is a store operation,
//! not an access check.

use crate::store::Chat;

/// Whether `user_id` may read from or write to a space with the given member set.
pub fn space_allows(members: &[String], user_id: &str) -> bool {
    members.iter().any(|member| member == user_id)
}

/// Whether `user_id` owns the chat. Chats have no multi-member concept.
pub fn chat_allows(chat: &Chat, user_id: &str) -> bool {
    chat.owner_id == user_id
}
