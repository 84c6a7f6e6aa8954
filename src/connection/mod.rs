pub mod codec;
pub mod connect;
pub mod frame;
