use log::info;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::config::Config;
use crate::error::ClientError;

pub use crate::client::cli::Client;
pub use crate::client::cmd::Arg;

pub mod cli;
pub mod cmd;
mod scan;

/// 建立到 Redis 服务器的连接并启动管线。
///
/// `addr` 直接交给 `TcpStream::connect`，由它完成 DNS 查找。
pub async fn connect<T: ToSocketAddrs>(addr: T, config: Config) -> Result<Client, ClientError> {
    let socket = TcpStream::connect(addr).await?;
    socket.set_nodelay(true)?;
    info!("connected to {}", socket.peer_addr()?);

    Client::new(socket, config)
}
