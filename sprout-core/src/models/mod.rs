pub mod faq;
pub mod identity;
pub mod message;
pub mod session;

pub use faq::{FaqAnswer, FaqPrompt};
pub use identity::{ConversationIdentity, IdentityKind};
pub use message::{DeliveryState, Message, MessageId, SenderKind, WireMessage};
pub use session::{Agent, BotReply, ChatSession, SendRequest, SendResponse, SessionSnapshot, SessionStatus};
