//! mqtt 客户端
//! 对外暴露 publish/subscribe 等操作，内部维护会话、事件循环和自动重连

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use log::{info, warn};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time,
};

use crate::{
    config::Options,
    error::Error,
    network::{
        self,
        packet::{
            Auth, Disconnect, Packet, Protocol, PubMsg, Publish, QoS, Subscribe, SubscribeFilter,
            Unsubscribe,
        },
        Connection,
    },
    protocol::{AckStore, EventLoop, PendingWrite, Session, CONNECT_ACK_ID},
    transport::Transport,
    Hook,
};

/// 连接异常断开后到下一次重连尝试的间隔
const RECONNECT_DELAY: time::Duration = time::Duration::from_secs(3);

/// mqtt 客户端
/// clone 共享同一个会话
pub struct Client<H: Hook> {
    inner: Arc<ClientInner<H>>,
}

impl<H: Hook> Clone for Client<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: Hook> Client<H> {
    pub fn new(options: Options, transport: Box<dyn Transport>, hook: H) -> Self {
        let session = Session::new(&options);
        Self {
            inner: Arc::new(ClientInner {
                options,
                transport,
                hook: Arc::new(hook),
                session: Arc::new(Mutex::new(session)),
                acks: Arc::new(AckStore::default()),
                queue_tx: Mutex::new(None),
                keepalive: Mutex::new(None),
                reconnect: Mutex::new(None),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// 建立连接并等待服务端确认
    pub async fn connect(&self) -> Result<(), Error> {
        self.inner.shutting_down.store(false, Ordering::SeqCst);
        // 还在等待触发的重连任务被新连接取代
        if let Some(handle) = self.inner.reconnect.lock().unwrap().take() {
            handle.abort();
        }
        self.inner.establish(false).await
    }

    /// 主动断开连接，不触发自动重连
    pub async fn disconnect(&self) -> Result<(), Error> {
        self.disconnect_with(Disconnect::default()).await
    }

    /// 携带原因码和属性断开（原因码和属性仅 5.0 下编码）
    pub async fn disconnect_with(&self, disconnect: Disconnect) -> Result<(), Error> {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let result = self.inner.send(Packet::Disconnect(disconnect), None).await;
        self.inner.teardown();
        result
    }

    /// 发布一条消息
    /// qos0 在写入后即完成，qos1/qos2 等到整个确认流程结束
    pub async fn publish(&self, message: PubMsg) -> Result<(), Error> {
        let (packet_id, ack) = match message.qos {
            QoS::AtMostOnce => (0, None),
            _ => {
                let packet_id = self.inner.session.lock().unwrap().next_packet_id();
                (packet_id, Some(packet_id))
            }
        };

        self.inner
            .send(
                Packet::Publish(Publish::from_message(packet_id, message)),
                ack,
            )
            .await
    }

    pub async fn subscribe(&self, path: impl Into<String>, qos: QoS) -> Result<(), Error> {
        self.subscribe_many(vec![SubscribeFilter {
            path: path.into(),
            qos,
        }])
        .await
    }

    pub async fn subscribe_many(&self, filters: Vec<SubscribeFilter>) -> Result<(), Error> {
        self.inner.subscribe_filters(filters).await
    }

    pub async fn unsubscribe(&self, path: impl Into<String>) -> Result<(), Error> {
        self.unsubscribe_many(vec![path.into()]).await
    }

    pub async fn unsubscribe_many(&self, filters: Vec<String>) -> Result<(), Error> {
        let packet_id = self.inner.session.lock().unwrap().next_packet_id();
        self.inner
            .send(
                Packet::Unsubscribe(Unsubscribe::new(packet_id, filters.clone())),
                Some(packet_id),
            )
            .await?;
        self.inner
            .session
            .lock()
            .unwrap()
            .remove_subscriptions(&filters);
        Ok(())
    }

    /// 发送 auth 报文，仅 5.0 协议可用
    pub async fn auth(&self, auth: Auth) -> Result<(), Error> {
        if self.inner.session.lock().unwrap().protocol != Protocol::V5 {
            return Err(Error::Ack("auth requires mqtt 5.0".into()));
        }
        self.inner.send(Packet::Auth(auth), None).await
    }

    /// 最近一次 connack 带回的属性
    pub fn connack_properties(&self) -> Option<crate::network::packet::ConnAckProperties> {
        self.inner.session.lock().unwrap().connack_properties
    }

    /// 最近一次收到的服务端 disconnect
    pub fn last_disconnect(&self) -> Option<Disconnect> {
        self.inner.session.lock().unwrap().last_disconnect.clone()
    }
}

struct ClientInner<H: Hook> {
    options: Options,
    transport: Box<dyn Transport>,
    hook: Arc<H>,
    session: Arc<Mutex<Session>>,
    acks: Arc<AckStore>,
    /// 当前连接的写队列，断开后为 None
    queue_tx: Mutex<Option<mpsc::Sender<PendingWrite>>>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    /// 等待触发的重连任务，主动断开时取消
    reconnect: Mutex<Option<JoinHandle<()>>>,
    /// 主动关闭标志，抑制自动重连
    shutting_down: AtomicBool,
}

impl<H: Hook> ClientInner<H> {
    /// 建立一条新连接：开流、起事件循环、发 connect、等 connack
    async fn establish(self: &Arc<Self>, resubscribe: bool) -> Result<(), Error> {
        let stream = self
            .transport
            .open()
            .await
            .map_err(|e| Error::Stream(network::Error::IO(e)))?;

        let protocol = self.session.lock().unwrap().protocol;
        let conn = Connection::new(stream, protocol);

        let (queue_tx, queue_rx) = mpsc::channel(1000);
        *self.queue_tx.lock().unwrap() = Some(queue_tx);

        let eventloop = EventLoop::new(
            conn,
            queue_rx,
            self.acks.clone(),
            self.session.clone(),
            self.hook.clone(),
        );
        let inner = self.clone();
        tokio::spawn(async move {
            let cause = eventloop.start().await.err();
            inner.handle_closure(cause).await;
        });

        let connect = self.session.lock().unwrap().connect_packet();
        if let Err(e) = self
            .send(Packet::Connect(connect), Some(CONNECT_ACK_ID))
            .await
        {
            // 连接未建立成功，拆掉刚起的事件循环，不触发重连
            self.shutting_down.store(true, Ordering::SeqCst);
            self.teardown();
            return Err(e);
        }

        self.start_keepalive();

        if resubscribe {
            let filters = self.session.lock().unwrap().subscriptions();
            if !filters.is_empty() {
                self.subscribe_filters(filters).await?;
            }
        }

        Ok(())
    }

    /// 入队一个报文并等待写入完成；ack 不为空时继续等待对应的确认
    async fn send(&self, packet: Packet, ack: Option<u16>) -> Result<(), Error> {
        let queue_tx = self.queue_tx.lock().unwrap().clone().ok_or(Error::Socket)?;

        // 先注册确认关联再入队，避免回包先于注册到达
        let ack_rx = ack.map(|packet_id| {
            let (tx, rx) = oneshot::channel();
            self.acks.register(packet_id, tx);
            rx
        });

        let (done_tx, done_rx) = oneshot::channel();
        queue_tx
            .send(PendingWrite {
                packet,
                done: done_tx,
            })
            .await
            .map_err(|_| Error::Socket)?;
        done_rx.await.map_err(|_| Error::Socket)??;

        if let Some(rx) = ack_rx {
            rx.await.map_err(|_| Error::Socket)??;
        }
        Ok(())
    }

    async fn subscribe_filters(&self, filters: Vec<SubscribeFilter>) -> Result<(), Error> {
        let packet_id = self.session.lock().unwrap().next_packet_id();
        self.send(
            Packet::Subscribe(Subscribe::new(packet_id, filters.clone())),
            Some(packet_id),
        )
        .await?;
        self.session.lock().unwrap().record_subscriptions(&filters);
        Ok(())
    }

    /// 周期发送 pingreq，keepalive 为 0 时关闭
    fn start_keepalive(self: &Arc<Self>) {
        let secs = self.session.lock().unwrap().effective_keep_alive();
        if secs == 0 {
            return;
        }

        let inner = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(time::Duration::from_secs(secs as u64));
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if inner.send(Packet::PingReq, None).await.is_err() {
                    return;
                }
            }
        });
        if let Some(old) = self.keepalive.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    fn teardown(&self) {
        self.queue_tx.lock().unwrap().take();
        if let Some(handle) = self.keepalive.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.reconnect.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// 事件循环退出后的收尾
    /// 异常断开时让所有等待方失败，并按配置调度重连
    /// 返回装箱的 future：收尾和 establish 互相引用，装箱切断类型上的循环
    fn handle_closure(
        self: Arc<Self>,
        cause: Option<network::Error>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let intentional = self.shutting_down.load(Ordering::SeqCst);
            self.teardown();
            self.acks.fail_all();

            if let Some(e) = cause {
                warn!("connection lost: {}", e);
                self.hook.error_caught(Error::Stream(e)).await;
            }
            self.hook.handler_removed().await;

            if intentional || !self.options.auto_reconnect {
                return;
            }

            info!("reconnecting in {:?}", RECONNECT_DELAY);
            let inner = self.clone();
            let handle = tokio::spawn(async move {
                loop {
                    time::sleep(RECONNECT_DELAY).await;
                    if inner.shutting_down.load(Ordering::SeqCst) {
                        return;
                    }
                    match inner.establish(true).await {
                        Ok(()) => {
                            info!("reconnected");
                            return;
                        }
                        Err(e) => {
                            warn!("reconnect failed: {}", e);
                            if inner.shutting_down.load(Ordering::SeqCst) {
                                return;
                            }
                        }
                    }
                }
            });
            self.reconnect.lock().unwrap().replace(handle);
        })
    }
}
