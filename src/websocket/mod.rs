pub mod events;
pub mod handler;
pub mod registry;
pub mod rooms;

pub use registry::{ConnectionRegistry, ConnectionSender};
pub use rooms::RoomRegistry;
