pub mod conversation_service;
pub mod directory;
pub mod mailer;
pub mod message_service;
pub mod notification_service;
pub mod push;
pub mod read_receipts;
