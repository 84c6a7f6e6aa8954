pub mod client;
pub mod config;
pub mod connection;
pub mod consts;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod postgres;

pub use client::{connect, Client};
pub use config::Config;
pub use connection::frame::Frame;
pub use pipeline::Pipeline;
