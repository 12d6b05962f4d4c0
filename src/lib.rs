pub mod api;
pub mod campaign;
pub mod channels;
pub mod config;
pub mod shared;
