//! 网络层
//! 本层只负责以报文为单位读写字节流，不包含任何会话逻辑

pub(crate) use conn::Connection;
use tokio::io;

pub(crate) mod conn;
pub mod packet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
    #[error("I/O: {0}")]
    IO(#[from] io::Error),
    #[error("Connection closed by peer")]
    ConnectionClosed,
}
