use std::sync::Arc;

use gridshare_core::identity::IdGenerator;

use crate::config::ServerConfig;
use crate::room::Room;

pub type SharedRoom = Arc<Room>;

#[derive(Clone)]
pub struct AppState {
    pub room: SharedRoom,
    pub ids: Arc<IdGenerator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            room: Arc::new(Room::new(config.limits.max_sessions)),
            ids: Arc::new(IdGenerator::from_time_seed()),
            config: Arc::new(config),
        }
    }
}
