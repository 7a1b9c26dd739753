pub mod interface;
pub mod service;
pub mod shared;

pub use interface::{db, http};
pub use service::{ai, cache, checkin, cleanup, coaching, speech};
pub use shared::{config, entities, error, logging, ports, utils};
