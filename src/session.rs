//! the session core: beat grid scheduling, deferred changes, the encode
//! pipeline and remote track lifecycle
pub mod beat_grid;
pub mod controller;
pub mod encode_worker;
pub mod events;
pub mod scheduled;
pub mod track_node;
