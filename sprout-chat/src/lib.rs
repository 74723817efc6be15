pub mod client;
pub mod subsystems;

pub use client::{ChatClient, ChatError, ChatEvent, ChatSnapshot, PollOutcome, SendOutcome};
pub use subsystems::faq::FaqSelection;
pub use subsystems::session::StatusChange;
