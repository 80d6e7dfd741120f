//! Customer-support chat: conversation ids, room routing and message
//! persistence. Delivery to connected sockets happens in the server.

use std::fmt::{Display, Formatter};

use crate::service::{Actor, ServiceContext};
use crate::validate::validate_chat_text;
use crate::{ChatMessage, Conversation, ConversationRepository, CoreError, Role};

const SUPPORT_PREFIX: &str = "support_";
const ADMIN_ROOM: &str = "admin_support";
const CONSULTANT_ROOM: &str = "consultant_room";

/// Conversation id for a customer's support thread.
pub fn chat_id_for(customer_id: &str) -> String {
    format!("{}{}", SUPPORT_PREFIX, customer_id)
}

pub fn customer_id_from_chat_id(chat_id: &str) -> Option<&str> {
    chat_id
        .strip_prefix(SUPPORT_PREFIX)
        .filter(|id| !id.is_empty())
}

/// A broadcast group on the socket relay.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Room {
    /// The customer's own thread, `support_<customerId>`.
    Support(String),
    AdminSupport,
    ConsultantRoom,
}

impl Room {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ADMIN_ROOM => Some(Room::AdminSupport),
            CONSULTANT_ROOM => Some(Room::ConsultantRoom),
            other => customer_id_from_chat_id(other).map(|id| Room::Support(id.to_string())),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Room::Support(id) => chat_id_for(id),
            Room::AdminSupport => ADMIN_ROOM.to_string(),
            Room::ConsultantRoom => CONSULTANT_ROOM.to_string(),
        }
    }
}

impl Display for Room {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Rooms a message in `customer_id`'s thread is relayed to.
pub fn rooms_for(customer_id: &str) -> [Room; 3] {
    [
        Room::Support(customer_id.to_string()),
        Room::AdminSupport,
        Room::ConsultantRoom,
    ]
}

pub fn can_join(actor: &Actor, room: &Room) -> bool {
    match (actor.role, room) {
        (Role::Customer, Room::Support(id)) => id == &actor.user_id,
        (Role::Customer, _) => false,
        (_, Room::Support(_)) => true,
        (Role::Admin, Room::AdminSupport) => true,
        (Role::Consultant, Room::ConsultantRoom) => true,
        _ => false,
    }
}

/// Customers reach only their own thread; staff reach every thread.
fn can_access(actor: &Actor, customer_id: &str) -> bool {
    actor.is_staff() || actor.user_id == customer_id
}

/// A stored message together with where it must be delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub chat_id: String,
    pub message: ChatMessage,
    pub rooms: [Room; 3],
}

pub struct ChatService<R: ?Sized> {
    ctx: ServiceContext<R>,
}

impl<R> ChatService<R>
where
    R: ConversationRepository + ?Sized,
{
    pub fn new(ctx: ServiceContext<R>) -> Self {
        Self { ctx }
    }

    fn authorize(&self, actor: &Actor, chat_id: &str) -> Result<String, CoreError> {
        let customer_id = customer_id_from_chat_id(chat_id)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown chat '{}'", chat_id)))?;
        if !can_access(actor, customer_id) {
            return Err(CoreError::Forbidden);
        }
        Ok(customer_id.to_string())
    }

    /// Validate and persist a message. The caller relays it afterwards.
    pub fn post_message(
        &self,
        actor: &Actor,
        chat_id: &str,
        text: &str,
    ) -> Result<PostedMessage, CoreError> {
        let customer_id = self.authorize(actor, chat_id)?;
        let text = validate_chat_text(text)?;
        let message = ChatMessage {
            id: self.ctx.next_id(),
            sender_id: actor.user_id.clone(),
            sender_role: actor.role,
            text,
            sent_at: self.ctx.now(),
        };
        self.ctx
            .repo
            .append_message(chat_id, &customer_id, message.clone())?;
        Ok(PostedMessage {
            chat_id: chat_id.to_string(),
            message,
            rooms: rooms_for(&customer_id),
        })
    }

    /// Full thread; an untouched thread reads as empty.
    pub fn history(&self, actor: &Actor, chat_id: &str) -> Result<Vec<ChatMessage>, CoreError> {
        self.authorize(actor, chat_id)?;
        Ok(self
            .ctx
            .repo
            .get_conversation(chat_id)?
            .map(|c| c.messages)
            .unwrap_or_default())
    }

    pub fn list_conversations(
        &self,
        actor: &Actor,
        limit: usize,
    ) -> Result<Vec<Conversation>, CoreError> {
        if !actor.is_staff() {
            return Err(CoreError::Forbidden);
        }
        self.ctx.repo.list_conversations(limit)
    }
}
