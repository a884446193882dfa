//! 传输层抽象
//! 引擎只要求一个双向字节流，tcp 之外的实现（tls、websocket 等）由调用方提供

use async_trait::async_trait;
use tokio::{
    io::{self, AsyncRead, AsyncWrite},
    net::TcpStream,
};

/// 双向字节流
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// 建立字节流的工厂，重连时被反复调用
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> io::Result<Box<dyn Stream>>;
}

/// 默认的 tcp 传输
pub struct Tcp {
    host: String,
    port: u16,
}

impl Tcp {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Transport for Tcp {
    async fn open(&self) -> io::Result<Box<dyn Stream>> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        Ok(Box::new(stream))
    }
}
