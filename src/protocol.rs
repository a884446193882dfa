//! 协议层
//! 确认关联、会话状态与事件循环，依赖底层的网络层进行网络读写

use std::{collections::HashMap, sync::Mutex};

use tokio::sync::oneshot;

use crate::{error::Error, network::packet::Packet};

pub(crate) use eventloop::EventLoop;
pub(crate) use session::Session;

mod eventloop;
mod session;

/// connect 报文没有报文标识符，约定用 1 关联它的 connack
/// 会话分配的标识符从 2 开始，不会与之冲突
pub(crate) const CONNECT_ACK_ID: u16 = 1;

/// 待写入连接的报文，写入完成后通过 done 通知发送方
pub(crate) struct PendingWrite {
    pub(crate) packet: Packet,
    pub(crate) done: oneshot::Sender<Result<(), Error>>,
}

/// 报文标识符与等待确认方的关联表
#[derive(Default)]
pub(crate) struct AckStore {
    pending: Mutex<HashMap<u16, oneshot::Sender<Result<(), Error>>>>,
}

impl AckStore {
    pub(crate) fn register(&self, packet_id: u16, tx: oneshot::Sender<Result<(), Error>>) {
        self.pending.lock().unwrap().insert(packet_id, tx);
    }

    /// 确认成功；没有等待方的标识符被静默忽略
    pub(crate) fn succeed(&self, packet_id: u16) {
        self.complete(packet_id, Ok(()));
    }

    pub(crate) fn fail(&self, packet_id: u16, error: Error) {
        self.complete(packet_id, Err(error));
    }

    fn complete(&self, packet_id: u16, result: Result<(), Error>) {
        if let Some(tx) = self.pending.lock().unwrap().remove(&packet_id) {
            // 等待方可能已经放弃
            let _ = tx.send(result);
        }
    }

    /// 连接断开时让所有等待方立即失败
    pub(crate) fn fail_all(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        for (_, tx) in pending {
            let _ = tx.send(Err(Error::Socket));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeed_wakes_registered_waiter() {
        let acks = AckStore::default();
        let (tx, rx) = oneshot::channel();
        acks.register(3, tx);

        acks.succeed(3);
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn fail_carries_error() {
        let acks = AckStore::default();
        let (tx, rx) = oneshot::channel();
        acks.register(4, tx);

        acks.fail(4, Error::Ack("denied".into()));
        assert!(matches!(rx.await.unwrap(), Err(Error::Ack(text)) if text == "denied"));
    }

    #[test]
    fn unknown_id_is_ignored() {
        let acks = AckStore::default();
        acks.succeed(99);
    }

    #[tokio::test]
    async fn fail_all_drains_every_waiter() {
        let acks = AckStore::default();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        acks.register(1, tx1);
        acks.register(2, tx2);

        acks.fail_all();
        assert!(matches!(rx1.await.unwrap(), Err(Error::Socket)));
        assert!(matches!(rx2.await.unwrap(), Err(Error::Socket)));

        // 清空后再次确认不会出错
        acks.succeed(1);
    }
}
