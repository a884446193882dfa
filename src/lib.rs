//! 一个 mqtt 客户端引擎库，同时支持 3.1.1 和 5.0 两个协议版本
//! 用户通过 [`Client`] 发起操作，通过实现 [`Hook`] 接收消息和连接事件

use async_trait::async_trait;

pub use client::Client;
pub use config::Options;
pub use error::Error;
pub use network::packet::{
    Auth, AuthProperties, AuthReason, ConnAckProperties, ConnectProperties, ConnectReturnCode,
    Disconnect, DisconnectProperties, DisconnectReasonCode, LastWill, Login, Message, Protocol,
    PubMsg, PublishProperties, QoS, SubscribeFilter,
};
pub use transport::{Tcp, Transport};

pub mod client;
pub mod config;
pub mod error;
mod network;
mod protocol;
pub mod transport;

/// mqtt事件发生时的回调，由用户实现
/// 所有方法都有空的默认实现，只需要覆盖关心的事件
#[async_trait]
pub trait Hook: Send + Sync + 'static {
    /// 收到一条消息
    async fn message_received(&self, _message: Message) {}
    /// 连接异常断开
    async fn error_caught(&self, _error: Error) {}
    /// 事件循环退出，连接已不可用
    async fn handler_removed(&self) {}
    /// 收到服务端的 disconnect 报文
    async fn disconnect_received(&self, _disconnect: Disconnect) {}
    /// 收到 auth 报文（仅 5.0）
    async fn auth_received(&self, _auth: Auth) {}
}

pub struct HookNoop;

#[async_trait]
impl Hook for HookNoop {}
