pub mod cache;
pub mod capacity;
pub mod cli;
pub mod context;
pub mod error;
pub mod feed;
pub mod logging;
pub mod network;
pub mod player;
pub mod preload;
pub mod settings;
pub mod source;
