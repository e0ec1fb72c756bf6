pub mod conversation;
pub mod message;
pub mod notification;
pub mod user;

pub use conversation::{ConversationDetail, ConversationSummary};
pub use message::{MessageDto, MessageRecord};
pub use notification::{
    CreateNotificationRequest, NotificationKind, NotificationPreferences, NotificationPriority,
    NotificationRecord,
};
pub use user::{Identity, UserProfile};
