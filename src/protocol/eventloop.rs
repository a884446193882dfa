use std::sync::{Arc, Mutex};

use log::{debug, info, trace, warn};
use tokio::{select, sync::mpsc::Receiver};

use crate::{
    error::Error,
    network::{
        self,
        packet::{
            AckProperties, ConnectReturnCode, Message, Packet, PubAck, PubComp, PubRec, PubRel,
            QoS,
        },
        Connection,
    },
    protocol::{AckStore, PendingWrite, Session, CONNECT_ACK_ID},
    Hook,
};

/// 单个连接的事件循环
/// 同时驱动入站报文分发和出站写队列，连接断开时整体退出
pub(crate) struct EventLoop<H: Hook> {
    conn: Connection,
    queue_rx: Receiver<PendingWrite>,
    acks: Arc<AckStore>,
    session: Arc<Mutex<Session>>,
    hook: Arc<H>,
}

impl<H: Hook> EventLoop<H> {
    pub(crate) fn new(
        conn: Connection,
        queue_rx: Receiver<PendingWrite>,
        acks: Arc<AckStore>,
        session: Arc<Mutex<Session>>,
        hook: Arc<H>,
    ) -> Self {
        Self {
            conn,
            queue_rx,
            acks,
            session,
            hook,
        }
    }

    /// 开启事件循环
    /// * Ok 表示正常收尾（客户端拆除连接，或服务端发来 disconnect）
    /// * Err 表示连接异常断开
    pub(crate) async fn start(mut self) -> Result<(), network::Error> {
        loop {
            select! {
                // 从网络层读报文
                read = self.conn.read_packet() => {
                    match read {
                        Ok(packet) => {
                            if self.handle_inbound(packet).await? {
                                return Ok(());
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
                // 从写队列取待发送报文
                recv = self.queue_rx.recv() => {
                    match recv {
                        Some(write) => {
                            match self.conn.write_packet(&write.packet).await {
                                Ok(()) => {
                                    let _ = write.done.send(Ok(()));
                                }
                                Err(e) => {
                                    let _ = write.done.send(Err(Error::Socket));
                                    return Err(e);
                                }
                            }
                        }
                        // 所有发送端已关闭，连接被主动拆除
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// 分发一个入站报文，返回 true 表示事件循环应当退出
    async fn handle_inbound(&mut self, packet: Packet) -> Result<bool, network::Error> {
        match packet {
            Packet::ConnAck(connack) => {
                self.session.lock().unwrap().connack_properties = connack.properties;
                match connack.code {
                    ConnectReturnCode::Success => self.acks.succeed(CONNECT_ACK_ID),
                    code => {
                        info!("connect refused: {:?}", code);
                        self.acks.fail(CONNECT_ACK_ID, Error::Connection(code));
                    }
                }
            }
            Packet::Publish(publish) => {
                let message = Message::from(&publish);
                match publish.qos {
                    QoS::AtMostOnce => self.hook.message_received(message).await,
                    QoS::AtLeastOnce => {
                        self.conn
                            .write_packet(&Packet::PubAck(PubAck::new(publish.packet_id)))
                            .await?;
                        self.hook.message_received(message).await;
                    }
                    QoS::ExactlyOnce => {
                        let first = self
                            .session
                            .lock()
                            .unwrap()
                            .begin_inbound_qos2(publish.packet_id);
                        self.conn
                            .write_packet(&Packet::PubRec(PubRec::new(publish.packet_id)))
                            .await?;
                        // 重复投递的报文只确认，不再上抛
                        if first {
                            self.hook.message_received(message).await;
                        }
                    }
                }
            }
            Packet::PubAck(puback) => {
                if puback.reason.is_failure() {
                    self.acks.fail(
                        puback.packet_id,
                        ack_failure("PUBACK", puback.reason as u8, &puback.properties),
                    );
                } else {
                    self.acks.succeed(puback.packet_id);
                }
            }
            Packet::PubRec(pubrec) => {
                if pubrec.reason.is_failure() {
                    self.acks.fail(
                        pubrec.packet_id,
                        ack_failure("PUBREC", pubrec.reason as u8, &pubrec.properties),
                    );
                } else {
                    // qos2 第二段，等待方继续等 pubcomp
                    self.conn
                        .write_packet(&Packet::PubRel(PubRel::new(pubrec.packet_id)))
                        .await?;
                }
            }
            Packet::PubRel(pubrel) => {
                self.session
                    .lock()
                    .unwrap()
                    .finish_inbound_qos2(pubrel.packet_id);
                // 未知标识符的 pubrel 同样回复 pubcomp
                self.conn
                    .write_packet(&Packet::PubComp(PubComp::new(pubrel.packet_id)))
                    .await?;
            }
            Packet::PubComp(pubcomp) => {
                if pubcomp.reason.is_failure() {
                    self.acks.fail(
                        pubcomp.packet_id,
                        ack_failure("PUBCOMP", pubcomp.reason as u8, &pubcomp.properties),
                    );
                } else {
                    self.acks.succeed(pubcomp.packet_id);
                }
            }
            Packet::SubAck(suback) => {
                if suback.has_failure() {
                    // 任何一个返回码失败即整体失败，取首个失败码作描述
                    let code = suback
                        .return_codes
                        .iter()
                        .find(|code| code.is_failure())
                        .map_or(0x80, |code| code.as_u8());
                    self.acks.fail(
                        suback.packet_id,
                        ack_failure("SUBACK", code, &suback.properties),
                    );
                } else {
                    self.acks.succeed(suback.packet_id);
                }
            }
            Packet::UnsubAck(unsuback) => {
                if unsuback.has_failure() {
                    let reason = unsuback
                        .reasons
                        .iter()
                        .find(|reason| reason.is_failure())
                        .map_or(0x80, |reason| *reason as u8);
                    self.acks.fail(
                        unsuback.packet_id,
                        ack_failure("UNSUBACK", reason, &unsuback.properties),
                    );
                } else {
                    self.acks.succeed(unsuback.packet_id);
                }
            }
            Packet::Disconnect(disconnect) => {
                info!("server disconnect: {:?}", disconnect.reason);
                self.session.lock().unwrap().last_disconnect = Some(disconnect.clone());
                self.hook.disconnect_received(disconnect).await;
                return Ok(true);
            }
            Packet::Auth(auth) => {
                debug!("auth exchange: {:?}", auth.reason);
                self.hook.auth_received(auth).await;
            }
            Packet::PingResp => trace!("pingresp"),
            // 服务端不应发送的报文
            packet => warn!("unexpected packet from server: {:?}", packet.packet_type()),
        }

        Ok(false)
    }
}

/// 失败确认的描述文本，优先用服务端带回的 reason string
fn ack_failure(kind: &str, code: u8, properties: &Option<AckProperties>) -> Error {
    let text = properties
        .as_ref()
        .and_then(|p| p.reason_string.clone())
        .unwrap_or_else(|| format!("{} failure (0x{:02X})", kind, code));
    Error::Ack(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_failure_prefers_reason_string() {
        let properties = Some(AckProperties {
            reason_string: Some("not welcome".into()),
            user_properties: Default::default(),
        });
        assert!(matches!(
            ack_failure("PUBACK", 0x87, &properties),
            Error::Ack(text) if text == "not welcome"
        ));
    }

    #[test]
    fn ack_failure_falls_back_to_code() {
        assert!(matches!(
            ack_failure("SUBACK", 0x87, &None),
            Error::Ack(text) if text == "SUBACK failure (0x87)"
        ));
    }
}
