use std::collections::{HashMap, HashSet};

use crate::{
    config::Options,
    network::packet::{
        ConnAckProperties, Connect, ConnectProperties, Disconnect, LastWill, Login, Protocol, QoS,
        SubscribeFilter,
    },
};

/// 会话状态
/// 连接断开后仍然保留，重连时据此恢复
pub(crate) struct Session {
    pub(crate) client_id: String,
    pub(crate) clean_session: bool,
    /// 客户端请求的 keepalive 秒数
    pub(crate) keep_alive: u16,
    pub(crate) protocol: Protocol,
    login: Option<Login>,
    last_will: Option<LastWill>,
    connect_properties: Option<ConnectProperties>,
    /// 已订阅主题，重连后用于恢复订阅
    topics: HashMap<String, QoS>,
    /// 报文标识符计数器
    packet_id: u16,
    /// 入站 qos2 流程中等待 pubrel 的报文
    inbound_qos2: HashSet<u16>,
    /// 最近一次 connack 带回的属性
    pub(crate) connack_properties: Option<ConnAckProperties>,
    /// 最近一次收到的服务端 disconnect
    pub(crate) last_disconnect: Option<Disconnect>,
}

impl Session {
    pub(crate) fn new(options: &Options) -> Self {
        Session {
            client_id: options.client_id.clone(),
            clean_session: options.clean_session,
            keep_alive: options.keep_alive,
            protocol: options.version.into(),
            login: options.login.clone().map(Into::into),
            last_will: options.last_will.clone(),
            connect_properties: options.connect_properties,
            topics: HashMap::new(),
            packet_id: super::CONNECT_ACK_ID,
            inbound_qos2: HashSet::new(),
            connack_properties: None,
            last_disconnect: None,
        }
    }

    pub(crate) fn connect_packet(&self) -> Connect {
        Connect {
            protocol: self.protocol,
            keep_alive: self.keep_alive,
            client_id: self.client_id.clone(),
            clean_session: self.clean_session,
            last_will: self.last_will.clone(),
            login: self.login.clone(),
            properties: self.connect_properties,
        }
    }

    /// 分配下一个报文标识符
    /// 0 不是合法标识符，1 保留给 connect 的确认关联，回绕时一并跳过
    pub(crate) fn next_packet_id(&mut self) -> u16 {
        loop {
            self.packet_id = self.packet_id.wrapping_add(1);
            if self.packet_id > super::CONNECT_ACK_ID {
                return self.packet_id;
            }
        }
    }

    /// 服务端下发的 keepalive 优先于客户端请求的值
    pub(crate) fn effective_keep_alive(&self) -> u16 {
        self.connack_properties
            .and_then(|p| p.server_keep_alive)
            .unwrap_or(self.keep_alive)
    }

    pub(crate) fn record_subscriptions(&mut self, filters: &[SubscribeFilter]) {
        for filter in filters {
            self.topics.insert(filter.path.clone(), filter.qos);
        }
    }

    pub(crate) fn remove_subscriptions(&mut self, filters: &[String]) {
        for filter in filters {
            self.topics.remove(filter);
        }
    }

    pub(crate) fn subscriptions(&self) -> Vec<SubscribeFilter> {
        self.topics
            .iter()
            .map(|(path, qos)| SubscribeFilter {
                path: path.clone(),
                qos: *qos,
            })
            .collect()
    }

    /// 开始一个入站 qos2 流程；返回 false 表示该标识符已在处理中（重复投递）
    pub(crate) fn begin_inbound_qos2(&mut self, packet_id: u16) -> bool {
        self.inbound_qos2.insert(packet_id)
    }

    pub(crate) fn finish_inbound_qos2(&mut self, packet_id: u16) {
        self.inbound_qos2.remove(&packet_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(&Options::new("test-client"))
    }

    #[test]
    fn packet_id_starts_after_connect_ack_id() {
        let mut session = session();
        assert_eq!(session.next_packet_id(), 2);
        assert_eq!(session.next_packet_id(), 3);
    }

    #[test]
    fn packet_id_wraps_skipping_reserved() {
        let mut session = session();
        session.packet_id = u16::MAX - 1;
        assert_eq!(session.next_packet_id(), u16::MAX);
        // 回绕跳过 0 和 1
        assert_eq!(session.next_packet_id(), 2);
    }

    #[test]
    fn subscriptions_survive_record_and_remove() {
        let mut session = session();
        session.record_subscriptions(&[
            SubscribeFilter {
                path: "/a".into(),
                qos: QoS::AtLeastOnce,
            },
            SubscribeFilter {
                path: "/b".into(),
                qos: QoS::AtMostOnce,
            },
        ]);
        assert_eq!(session.subscriptions().len(), 2);

        session.remove_subscriptions(&["/a".to_string()]);
        let remaining = session.subscriptions();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, "/b");
    }

    #[test]
    fn inbound_qos2_deduplicates() {
        let mut session = session();
        assert!(session.begin_inbound_qos2(7));
        assert!(!session.begin_inbound_qos2(7));
        session.finish_inbound_qos2(7);
        assert!(session.begin_inbound_qos2(7));
    }

    #[test]
    fn server_keep_alive_overrides_requested() {
        let mut session = session();
        assert_eq!(session.effective_keep_alive(), 60);

        session.connack_properties = Some(ConnAckProperties {
            server_keep_alive: Some(20),
            ..Default::default()
        });
        assert_eq!(session.effective_keep_alive(), 20);
    }
}
