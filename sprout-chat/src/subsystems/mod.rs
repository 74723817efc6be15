pub mod faq;
pub mod identity;
pub mod poller;
pub mod reconcile;
pub mod session;
