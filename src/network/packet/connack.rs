use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, properties::PropertyType, Error, Protocol};

/// connack 报文
#[derive(Debug, Clone, PartialEq)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReturnCode,
    pub properties: Option<ConnAckProperties>,
}

impl ConnAck {
    fn len(&self, protocol: Protocol) -> usize {
        let mut len = 1 + 1;
        if protocol == Protocol::V5 {
            let properties_len = self.properties.as_ref().map(|p| p.len()).unwrap_or(0);
            len += packet::len_len(properties_len) + properties_len;
        }

        len
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        stream.put_u8(0x20);
        packet::write_remaining_length(stream, self.len(protocol))?;
        stream.put_u8(self.session_present as u8);
        stream.put_u8(self.code as u8);

        if protocol == Protocol::V5 {
            match &self.properties {
                Some(properties) => properties.write(stream)?,
                None => {
                    packet::write_remaining_length(stream, 0)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn read(mut stream: Bytes, protocol: Protocol) -> Result<Self, Error> {
        let flags = packet::read_u8(&mut stream)?;
        let code = ConnectReturnCode::try_from(packet::read_u8(&mut stream)?)?;

        let properties = match protocol {
            Protocol::V5 if !stream.is_empty() => {
                let mut block = packet::read_block(&mut stream)?;
                let properties = ConnAckProperties::read(&mut block);
                (!properties.is_empty()).then_some(properties)
            }
            _ => None,
        };

        Ok(ConnAck {
            session_present: (flags & 0x01) == 0x01,
            code,
            properties,
        })
    }
}

/// 连接结果
/// 3.1.1 的返回码和 5.0 的原因码合并在一个枚举里
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Success = 0x00,
    BadProtocol = 0x01,
    ClientIdRejected = 0x02,
    ServerUnavailable = 0x03,
    BadUsernamePassword = 0x04,
    NotAuthorized = 0x05,
    // 5.0 原因码
    UnspecifiedError = 0x80,
    MalformedPacket = 0x81,
    ProtocolError = 0x82,
    ImplementationSpecificError = 0x83,
    UnsupportedProtocolVersion = 0x84,
    ClientIdentifierNotValid = 0x85,
    BadAuthenticationMethod = 0x8C,
    TopicNameInvalid = 0x90,
    PacketTooLarge = 0x95,
    QuotaExceeded = 0x97,
    PayloadFormatInvalid = 0x99,
    RetainNotSupported = 0x9A,
    QoSNotSupported = 0x9B,
    UseAnotherServer = 0x9C,
    ServerMoved = 0x9D,
    ConnectionRateExceeded = 0x9F,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => ConnectReturnCode::Success,
            0x01 => ConnectReturnCode::BadProtocol,
            0x02 => ConnectReturnCode::ClientIdRejected,
            0x03 => ConnectReturnCode::ServerUnavailable,
            0x04 => ConnectReturnCode::BadUsernamePassword,
            0x05 => ConnectReturnCode::NotAuthorized,
            0x80 => ConnectReturnCode::UnspecifiedError,
            0x81 => ConnectReturnCode::MalformedPacket,
            0x82 => ConnectReturnCode::ProtocolError,
            0x83 => ConnectReturnCode::ImplementationSpecificError,
            0x84 => ConnectReturnCode::UnsupportedProtocolVersion,
            0x85 => ConnectReturnCode::ClientIdentifierNotValid,
            0x8C => ConnectReturnCode::BadAuthenticationMethod,
            0x90 => ConnectReturnCode::TopicNameInvalid,
            0x95 => ConnectReturnCode::PacketTooLarge,
            0x97 => ConnectReturnCode::QuotaExceeded,
            0x99 => ConnectReturnCode::PayloadFormatInvalid,
            0x9A => ConnectReturnCode::RetainNotSupported,
            0x9B => ConnectReturnCode::QoSNotSupported,
            0x9C => ConnectReturnCode::UseAnotherServer,
            0x9D => ConnectReturnCode::ServerMoved,
            0x9F => ConnectReturnCode::ConnectionRateExceeded,
            num => return Err(Error::InvalidReasonCode(num)),
        };

        Ok(code)
    }
}

/// connack 报文的 v5 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnAckProperties {
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: Option<u16>,
    /// 服务端下发的 keepalive，优先于客户端请求的值
    pub server_keep_alive: Option<u16>,
}

impl ConnAckProperties {
    pub fn is_empty(&self) -> bool {
        self.session_expiry_interval.is_none()
            && self.receive_maximum.is_none()
            && self.maximum_packet_size.is_none()
            && self.topic_alias_maximum.is_none()
            && self.server_keep_alive.is_none()
    }

    fn len(&self) -> usize {
        let mut len = 0;

        if self.session_expiry_interval.is_some() {
            len += 1 + 4;
        }

        if self.receive_maximum.is_some() {
            len += 1 + 2;
        }

        if self.maximum_packet_size.is_some() {
            len += 1 + 4;
        }

        if self.topic_alias_maximum.is_some() {
            len += 1 + 2;
        }

        if self.server_keep_alive.is_some() {
            len += 1 + 2;
        }

        len
    }

    fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        packet::write_remaining_length(stream, self.len())?;

        if let Some(session_expiry_interval) = self.session_expiry_interval {
            stream.put_u8(PropertyType::SessionExpiryInterval as u8);
            stream.put_u32(session_expiry_interval);
        }

        if let Some(receive_maximum) = self.receive_maximum {
            stream.put_u8(PropertyType::ReceiveMaximum as u8);
            stream.put_u16(receive_maximum);
        }

        if let Some(maximum_packet_size) = self.maximum_packet_size {
            stream.put_u8(PropertyType::MaximumPacketSize as u8);
            stream.put_u32(maximum_packet_size);
        }

        if let Some(topic_alias_maximum) = self.topic_alias_maximum {
            stream.put_u8(PropertyType::TopicAliasMaximum as u8);
            stream.put_u16(topic_alias_maximum);
        }

        if let Some(server_keep_alive) = self.server_keep_alive {
            stream.put_u8(PropertyType::ServerKeepAlive as u8);
            stream.put_u16(server_keep_alive);
        }

        Ok(())
    }

    fn read(block: &mut Bytes) -> Self {
        let mut properties = ConnAckProperties::default();

        while !block.is_empty() {
            let prop = packet::read_u8(block).unwrap_or(0);
            match prop {
                p if p == PropertyType::SessionExpiryInterval as u8 => {
                    match packet::read_u32(block) {
                        Ok(value) => properties.session_expiry_interval = Some(value),
                        Err(_) => return properties,
                    }
                }
                p if p == PropertyType::ReceiveMaximum as u8 => match packet::read_u16(block) {
                    Ok(value) => properties.receive_maximum = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::MaximumPacketSize as u8 => match packet::read_u32(block) {
                    Ok(value) => properties.maximum_packet_size = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::TopicAliasMaximum as u8 => match packet::read_u16(block) {
                    Ok(value) => properties.topic_alias_maximum = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::ServerKeepAlive as u8 => match packet::read_u16(block) {
                    Ok(value) => properties.server_keep_alive = Some(value),
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

    #[test]
    fn v4_connack_roundtrip() {
        let connack = ConnAck {
            session_present: true,
            code: ConnectReturnCode::Success,
            properties: None,
        };
        let mut stream = BytesMut::new();
        connack.write(&mut stream, Protocol::V4).unwrap();
        let decoded = Packet::read(&mut stream, Protocol::V4).unwrap().unwrap();
        assert_eq!(decoded, Packet::ConnAck(connack));
    }

    #[test]
    fn v5_connack_roundtrip_with_server_keep_alive() {
        let connack = ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: Some(ConnAckProperties {
                session_expiry_interval: Some(120),
                receive_maximum: Some(32),
                maximum_packet_size: None,
                topic_alias_maximum: Some(4),
                server_keep_alive: Some(45),
            }),
        };
        let mut stream = BytesMut::new();
        connack.write(&mut stream, Protocol::V5).unwrap();
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::ConnAck(connack));
    }

    #[test]
    fn refused_connack_decodes_reason() {
        let connack = ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
            properties: None,
        };
        let mut stream = BytesMut::new();
        connack.write(&mut stream, Protocol::V4).unwrap();
        match Packet::read(&mut stream, Protocol::V4).unwrap().unwrap() {
            Packet::ConnAck(decoded) => {
                assert_eq!(decoded.code, ConnectReturnCode::NotAuthorized)
            }
            packet => panic!("unexpected packet: {packet:?}"),
        }
    }
}
