use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, Error, Protocol, QoS};

/// subscribe 报文，固定头标志位必须是 0b0010
/// 客户端不使用订阅标识符等 v5 属性，属性块写空
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filters: Vec<SubscribeFilter>,
}

/// 单个订阅项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeFilter {
    pub path: String,
    pub qos: QoS,
}

impl Subscribe {
    pub(crate) fn new(packet_id: u16, filters: Vec<SubscribeFilter>) -> Self {
        Subscribe { packet_id, filters }
    }

    fn len(&self, protocol: Protocol) -> usize {
        let mut len = 2;
        if protocol == Protocol::V5 {
            // 空属性块
            len += 1;
        }
        for filter in &self.filters {
            len += 2 + filter.path.len() + 1;
        }
        len
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        stream.put_u8(0x82);
        packet::write_remaining_length(stream, self.len(protocol))?;
        stream.put_u16(self.packet_id);

        if protocol == Protocol::V5 {
            packet::write_remaining_length(stream, 0)?;
        }

        for filter in &self.filters {
            packet::write_string(stream, &filter.path);
            stream.put_u8(filter.qos as u8);
        }
        Ok(())
    }

    pub(crate) fn read(mut stream: Bytes, protocol: Protocol) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;

        if protocol == Protocol::V5 {
            packet::read_block(&mut stream)?;
        }

        let mut filters = Vec::new();
        while !stream.is_empty() {
            let path = packet::read_string(&mut stream)?;
            let options = packet::read_u8(&mut stream)?;
            filters.push(SubscribeFilter {
                path,
                // 订阅选项字节的低两位
                qos: QoS::try_from(options & 0x03)?,
            });
        }

        if filters.is_empty() {
            return Err(Error::PayloadRequired);
        }

        Ok(Subscribe { packet_id, filters })
    }
}

#[cfg(test)]
mod tests {
    use crate::network::packet::Packet;

    use super::*;

    fn roundtrip(subscribe: Subscribe, protocol: Protocol) {
        let mut stream = BytesMut::new();
        subscribe.write(&mut stream, protocol).unwrap();
        assert_eq!(stream[0], 0x82);
        let decoded = Packet::read(&mut stream, protocol).unwrap().unwrap();
        assert_eq!(decoded, Packet::Subscribe(subscribe));
    }

    #[test]
    fn v4_subscribe_roundtrip() {
        roundtrip(
            Subscribe::new(
                51,
                vec![
                    SubscribeFilter {
                        path: "/a/+".into(),
                        qos: QoS::AtLeastOnce,
                    },
                    SubscribeFilter {
                        path: "/b/#".into(),
                        qos: QoS::ExactlyOnce,
                    },
                ],
            ),
            Protocol::V4,
        );
    }

    #[test]
    fn v5_subscribe_roundtrip() {
        roundtrip(
            Subscribe::new(
                52,
                vec![SubscribeFilter {
                    path: "/v5".into(),
                    qos: QoS::AtMostOnce,
                }],
            ),
            Protocol::V5,
        );
    }

    #[test]
    fn subscribe_without_filters_is_rejected() {
        let subscribe = Subscribe::new(53, Vec::new());
        let mut stream = BytesMut::new();
        subscribe.write(&mut stream, Protocol::V4).unwrap();
        assert!(matches!(
            Packet::read(&mut stream, Protocol::V4),
            Err(Error::PayloadRequired)
        ));
    }
}
