pub mod identity;
pub mod net;
pub mod position;
