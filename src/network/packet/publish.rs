use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, properties::PropertyType, Error, FixedHeader, Protocol, QoS};

/// publish 报文
/// retain/qos/dup 三个标志位在固定头第一个字节里，不在可变报头
#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// qos0 报文没有报文标识符，保持为 0
    pub packet_id: u16,
    pub payload: Bytes,
    pub properties: Option<PublishProperties>,
}

impl Publish {
    pub(crate) fn from_message(packet_id: u16, message: PubMsg) -> Self {
        Publish {
            dup: false,
            qos: message.qos,
            retain: message.retain,
            topic: message.topic,
            packet_id,
            payload: message.payload,
            properties: message.properties,
        }
    }

    fn len(&self, protocol: Protocol) -> usize {
        let mut len = 2 + self.topic.len();

        if self.qos != QoS::AtMostOnce {
            len += 2;
        }

        if protocol == Protocol::V5 {
            let properties_len = self.properties.as_ref().map(|p| p.len()).unwrap_or(0);
            len += packet::len_len(properties_len) + properties_len;
        }

        len + self.payload.len()
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        let mut byte1 = 0x30;
        if self.retain {
            byte1 |= 0x01;
        }
        byte1 |= (self.qos as u8) << 1;
        if self.dup {
            byte1 |= 0x08;
        }
        stream.put_u8(byte1);

        packet::write_remaining_length(stream, self.len(protocol))?;
        packet::write_string(stream, &self.topic);

        if self.qos != QoS::AtMostOnce {
            if self.packet_id == 0 {
                return Err(Error::MissPacketId);
            }
            stream.put_u16(self.packet_id);
        }

        if protocol == Protocol::V5 {
            match &self.properties {
                Some(properties) => properties.write(stream)?,
                None => {
                    packet::write_remaining_length(stream, 0)?;
                }
            }
        }

        stream.extend_from_slice(&self.payload);
        Ok(())
    }

    pub(crate) fn read(
        fixed_header: &FixedHeader,
        mut stream: Bytes,
        protocol: Protocol,
    ) -> Result<Self, Error> {
        let byte1 = fixed_header.byte1;
        let qos = QoS::try_from((byte1 & 0x06) >> 1)?;

        let topic = packet::read_string(&mut stream)?;
        let packet_id = match qos {
            QoS::AtMostOnce => 0,
            _ => packet::read_u16(&mut stream)?,
        };

        let properties = match protocol {
            Protocol::V5 => {
                let mut block = packet::read_block(&mut stream)?;
                let properties = PublishProperties::read(&mut block);
                (!properties.is_empty()).then_some(properties)
            }
            Protocol::V4 => None,
        };

        Ok(Publish {
            dup: (byte1 & 0x08) != 0,
            qos,
            retain: (byte1 & 0x01) != 0,
            topic,
            packet_id,
            // 剩下的字节全部是应用载荷
            payload: stream,
            properties,
        })
    }
}

/// 调用方提交的待发布消息
#[derive(Debug, Clone, PartialEq)]
pub struct PubMsg {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
    pub qos: QoS,
    /// v5 属性，3.1.1 下被忽略
    pub properties: Option<PublishProperties>,
}

/// 投递给回调的已解码消息
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    pub id: u16,
    pub retain: bool,
}

impl From<&Publish> for Message {
    fn from(publish: &Publish) -> Self {
        Message {
            topic: publish.topic.clone(),
            payload: publish.payload.clone(),
            id: publish.packet_id,
            retain: publish.retain,
        }
    }
}

/// publish 报文的 v5 属性
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishProperties {
    pub payload_format_indicator: Option<u8>,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    pub topic_alias: Option<u16>,
}

impl PublishProperties {
    pub fn is_empty(&self) -> bool {
        self.payload_format_indicator.is_none()
            && self.message_expiry_interval.is_none()
            && self.content_type.is_none()
            && self.response_topic.is_none()
            && self.correlation_data.is_none()
            && self.topic_alias.is_none()
    }

    fn len(&self) -> usize {
        let mut len = 0;

        if self.payload_format_indicator.is_some() {
            len += 1 + 1;
        }

        if self.message_expiry_interval.is_some() {
            len += 1 + 4;
        }

        if let Some(content_type) = &self.content_type {
            len += 1 + 2 + content_type.len();
        }

        if let Some(response_topic) = &self.response_topic {
            len += 1 + 2 + response_topic.len();
        }

        if let Some(correlation_data) = &self.correlation_data {
            len += 1 + 2 + correlation_data.len();
        }

        if self.topic_alias.is_some() {
            len += 1 + 2;
        }

        len
    }

    fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        packet::write_remaining_length(stream, self.len())?;

        if let Some(payload_format_indicator) = self.payload_format_indicator {
            stream.put_u8(PropertyType::PayloadFormatIndicator as u8);
            stream.put_u8(payload_format_indicator);
        }

        if let Some(message_expiry_interval) = self.message_expiry_interval {
            stream.put_u8(PropertyType::MessageExpiryInterval as u8);
            stream.put_u32(message_expiry_interval);
        }

        if let Some(content_type) = &self.content_type {
            stream.put_u8(PropertyType::ContentType as u8);
            packet::write_string(stream, content_type);
        }

        if let Some(response_topic) = &self.response_topic {
            stream.put_u8(PropertyType::ResponseTopic as u8);
            packet::write_string(stream, response_topic);
        }

        if let Some(correlation_data) = &self.correlation_data {
            stream.put_u8(PropertyType::CorrelationData as u8);
            packet::write_bytes(stream, correlation_data);
        }

        if let Some(topic_alias) = self.topic_alias {
            stream.put_u8(PropertyType::TopicAlias as u8);
            stream.put_u16(topic_alias);
        }

        Ok(())
    }

    fn read(block: &mut Bytes) -> Self {
        let mut properties = PublishProperties::default();

        while !block.is_empty() {
            let prop = packet::read_u8(block).unwrap_or(0);
            match prop {
                p if p == PropertyType::PayloadFormatIndicator as u8 => {
                    match packet::read_u8(block) {
                        Ok(value) => properties.payload_format_indicator = Some(value),
                        Err(_) => return properties,
                    }
                }
                p if p == PropertyType::MessageExpiryInterval as u8 => {
                    match packet::read_u32(block) {
                        Ok(value) => properties.message_expiry_interval = Some(value),
                        Err(_) => return properties,
                    }
                }
                p if p == PropertyType::ContentType as u8 => match packet::read_string(block) {
                    Ok(value) => properties.content_type = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::ResponseTopic as u8 => match packet::read_string(block) {
                    Ok(value) => properties.response_topic = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::CorrelationData as u8 => match packet::read_bytes(block) {
                    Ok(value) => properties.correlation_data = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::TopicAlias as u8 => match packet::read_u16(block) {
                    Ok(value) => properties.topic_alias = Some(value),
                    Err(_) => return properties,
                },
                _ => return properties,
            }
        }

        properties
    }
}

#[cfg(test)]
mod tests {
    use crate::network::packet::Packet;

    use super::*;

    fn roundtrip(publish: Publish, protocol: Protocol) {
        let mut stream = BytesMut::new();
        publish.write(&mut stream, protocol).unwrap();
        let decoded = Packet::read(&mut stream, protocol).unwrap().unwrap();
        assert_eq!(decoded, Packet::Publish(publish));
    }

    #[test]
    fn v4_qos0_publish_roundtrip() {
        roundtrip(
            Publish {
                dup: false,
                qos: QoS::AtMostOnce,
                retain: true,
                topic: "/topic/test1".into(),
                packet_id: 0,
                payload: Bytes::from_static(b"Hello"),
                properties: None,
            },
            Protocol::V4,
        );
    }

    #[test]
    fn v4_qos1_publish_roundtrip() {
        roundtrip(
            Publish {
                dup: true,
                qos: QoS::AtLeastOnce,
                retain: false,
                topic: "/topic/test1".into(),
                packet_id: 17,
                payload: Bytes::from_static(b"Hello"),
                properties: None,
            },
            Protocol::V4,
        );
    }

    #[test]
    fn v5_qos2_publish_roundtrip_with_properties() {
        roundtrip(
            Publish {
                dup: false,
                qos: QoS::ExactlyOnce,
                retain: false,
                topic: "/v5".into(),
                packet_id: 2,
                payload: Bytes::from_static(b"payload"),
                properties: Some(PublishProperties {
                    payload_format_indicator: Some(1),
                    message_expiry_interval: Some(60),
                    content_type: Some("text/plain".into()),
                    response_topic: Some("/reply".into()),
                    correlation_data: Some(Bytes::from_static(b"c1")),
                    topic_alias: Some(3),
                }),
            },
            Protocol::V5,
        );
    }

    #[test]
    fn v5_publish_empty_property_block() {
        // v5 下属性块始终存在，为空时载荷紧随其后
        roundtrip(
            Publish {
                dup: false,
                qos: QoS::AtMostOnce,
                retain: false,
                topic: "/v5".into(),
                packet_id: 0,
                payload: Bytes::from_static(b"data"),
                properties: None,
            },
            Protocol::V5,
        );
    }

    #[test]
    fn qos1_publish_requires_packet_id() {
        let publish = Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: "/t".into(),
            packet_id: 0,
            payload: Bytes::new(),
            properties: None,
        };
        let mut stream = BytesMut::new();
        assert!(matches!(
            publish.write(&mut stream, Protocol::V4),
            Err(Error::MissPacketId)
        ));
    }
}
