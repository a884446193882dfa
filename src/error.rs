use crate::network::{self, packet::ConnectReturnCode};

/// 对调用方暴露的统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 连接已断开或尚未建立
    #[error("Connection lost")]
    Socket,
    /// 服务端拒绝连接
    #[error("Connection refused: {0:?}")]
    Connection(ConnectReturnCode),
    /// 请求被服务端以失败原因码确认
    #[error("Ack error: {0}")]
    Ack(String),
    /// 字节流读写或编解码错误
    #[error("Stream error: {0}")]
    Stream(#[from] network::Error),
}
