//! Collaboration layer: spaces, chats, and the conversation log behind the access guard.
//!
//! Every read or write that touches a space or chat goes through this service so the
//! membership/ownership rules live in exactly one place. The query pipeline reuses
//! [`CollabService::authorize`] before retrieval.

use thiserror::Error;

use crate::access;
use crate::store::{
    Chat, ChatStore, DocumentStore, Message, MessageContext, MessageStore, NewMessage, Space,
    SpaceStore, StoreError,
};

/// Errors surfaced by collaboration operations.
#[derive(Debug, Error)]
pub enum CollabError {
    /// Referenced document does not exist.
    #[error("Document not found")]
    DocumentNotFound,
    /// Referenced space does not exist (or the access token is invalid).
    #[error("Space not found")]
    SpaceNotFound,
    /// Referenced chat does not exist.
    #[error("Chat not found")]
    ChatNotFound,
    /// Caller is not a member/owner of the referenced space or chat.
    #[error("Access denied")]
    AccessDenied,
    /// Persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Service owning space membership, chat ownership, and conversation history access.
#[derive(Clone)]
pub struct CollabService {
    documents: DocumentStore,
    spaces: SpaceStore,
    chats: ChatStore,
    messages: MessageStore,
}

impl CollabService {
    /// Build the service from store handles sharing one pool.
    pub fn new(
        documents: DocumentStore,
        spaces: SpaceStore,
        chats: ChatStore,
        messages: MessageStore,
    ) -> Self {
        Self {
            documents,
            spaces,
            chats,
            messages,
        }
    }

    /// Authorize `user_id` against a conversation context.
    ///
    /// Context-less queries always pass. A nonexistent space/chat surfaces as not-found;
    /// a real one without membership/ownership surfaces as denied. Anonymous callers are
    /// denied for any bound context.
    pub async fn authorize(
        &self,
        context: &MessageContext,
        user_id: Option<&str>,
    ) -> Result<(), CollabError> {
        match context {
            MessageContext::None => Ok(()),
            MessageContext::Space(space_id) => {
                let space = self
                    .spaces
                    .get(space_id)
                    .await?
                    .ok_or(CollabError::SpaceNotFound)?;
                let user_id = user_id.ok_or(CollabError::AccessDenied)?;
                let members = self.spaces.members(&space.id).await?;
                if access::space_allows(&members, user_id) {
                    Ok(())
                } else {
                    Err(CollabError::AccessDenied)
                }
            }
            MessageContext::Chat(chat_id) => {
                let chat = self
                    .chats
                    .get(chat_id)
                    .await?
                    .ok_or(CollabError::ChatNotFound)?;
                let user_id = user_id.ok_or(CollabError::AccessDenied)?;
                if access::chat_allows(&chat, user_id) {
                    Ok(())
                } else {
                    Err(CollabError::AccessDenied)
                }
            }
        }
    }

    /// Create a space around an existing document; the creator becomes its first member.
    pub async fn create_space(
        &self,
        name: &str,
        description: &str,
        document_id: &str,
        created_by: &str,
    ) -> Result<Space, CollabError> {
        if self.documents.get(document_id).await?.is_none() {
            return Err(CollabError::DocumentNotFound);
        }

        let space = self
            .spaces
            .create(name, description, document_id, created_by)
            .await?;
        tracing::info!(space = %space.id, document = document_id, creator = created_by, "Space created");
        Ok(space)
    }

    /// Redeem an access token, adding the caller to the member set. Idempotent.
    pub async fn join_space(&self, access_token: &str, user_id: &str) -> Result<Space, CollabError> {
        let space = self
            .spaces
            .find_by_token(access_token)
            .await?
            .ok_or(CollabError::SpaceNotFound)?;

        let added = self.spaces.add_member(&space.id, user_id).await?;
        if added {
            tracing::info!(space = %space.id, user = user_id, "User joined space");
        }
        Ok(space)
    }

    /// List spaces the caller belongs to, newest first.
    pub async fn list_spaces(&self, user_id: &str) -> Result<Vec<Space>, CollabError> {
        Ok(self.spaces.list_for_user(user_id).await?)
    }

    /// Fetch one space and its member set; membership-gated.
    pub async fn get_space(
        &self,
        space_id: &str,
        user_id: &str,
    ) -> Result<(Space, Vec<String>), CollabError> {
        self.authorize(&MessageContext::Space(space_id.to_string()), Some(user_id))
            .await?;
        let space = self
            .spaces
            .get(space_id)
            .await?
            .ok_or(CollabError::SpaceNotFound)?;
        let members = self.spaces.members(space_id).await?;
        Ok((space, members))
    }

    /// Ordered conversation history for a space; membership-gated.
    pub async fn space_messages(
        &self,
        space_id: &str,
        user_id: &str,
    ) -> Result<Vec<Message>, CollabError> {
        self.authorize(&MessageContext::Space(space_id.to_string()), Some(user_id))
            .await?;
        Ok(self.messages.list_for_space(space_id).await?)
    }

    /// Create a chat, optionally bound to an existing document.
    pub async fn create_chat(
        &self,
        owner_id: &str,
        document_id: Option<&str>,
        title: Option<&str>,
        model: &str,
    ) -> Result<Chat, CollabError> {
        if let Some(document_id) = document_id
            && self.documents.get(document_id).await?.is_none()
        {
            return Err(CollabError::DocumentNotFound);
        }
        Ok(self.chats.create(owner_id, document_id, title, model).await?)
    }

    /// List the caller's chats, most recently active first.
    pub async fn list_chats(&self, owner_id: &str) -> Result<Vec<Chat>, CollabError> {
        Ok(self.chats.list_for_owner(owner_id).await?)
    }

    /// Fetch one chat and its ordered history; ownership-gated.
    pub async fn get_chat(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<(Chat, Vec<Message>), CollabError> {
        self.authorize(&MessageContext::Chat(chat_id.to_string()), Some(user_id))
            .await?;
        let chat = self
            .chats
            .get(chat_id)
            .await?
            .ok_or(CollabError::ChatNotFound)?;
        let messages = self.messages.list_for_chat(chat_id).await?;
        Ok((chat, messages))
    }

    /// Rename a chat; ownership-gated.
    pub async fn rename_chat(
        &self,
        chat_id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<(), CollabError> {
        self.authorize(&MessageContext::Chat(chat_id.to_string()), Some(user_id))
            .await?;
        if self.chats.rename(chat_id, user_id, title).await? {
            Ok(())
        } else {
            Err(CollabError::ChatNotFound)
        }
    }

    /// Delete a chat and its history; ownership-gated.
    pub async fn delete_chat(&self, chat_id: &str, user_id: &str) -> Result<(), CollabError> {
        self.authorize(&MessageContext::Chat(chat_id.to_string()), Some(user_id))
            .await?;
        if self.chats.delete(chat_id, user_id).await? {
            Ok(())
        } else {
            Err(CollabError::ChatNotFound)
        }
    }

    /// Append a message to the conversation log.
    pub async fn append_message(&self, message: NewMessage) -> Result<Message, CollabError> {
        Ok(self.messages.append(message).await?)
    }
}
