pub mod api;
pub mod config;
pub mod crossing;
pub mod error;
pub mod estimation;
pub mod sensor;
pub mod state;
