use crate::{
    config::Config,
    services::mailer::Mailer,
    websocket::{ConnectionRegistry, RoomRegistry},
};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: ConnectionRegistry,
    pub rooms: RoomRegistry,
    pub config: Arc<Config>,
    pub mailer: Mailer,
}
