use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, properties::PropertyType, Error, Protocol};

/// disconnect 报文
/// 3.1.1 下只有固定头；5.0 下正常断开且无属性时原因码和属性块整体省略
#[derive(Debug, Clone, PartialEq)]
pub struct Disconnect {
    pub reason: DisconnectReasonCode,
    pub properties: Option<DisconnectProperties>,
}

impl Default for Disconnect {
    fn default() -> Self {
        Disconnect {
            reason: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }
    }
}

impl Disconnect {
    fn len(&self, protocol: Protocol) -> usize {
        let mut len = 0;
        if protocol == Protocol::V5 && self.has_tail() {
            let properties_len = self.properties.as_ref().map(|p| p.len()).unwrap_or(0);
            len += 1 + packet::len_len(properties_len) + properties_len;
        }
        len
    }

    fn has_tail(&self) -> bool {
        self.reason != DisconnectReasonCode::NormalDisconnection
            || self.properties.as_ref().map(|p| !p.is_empty()).unwrap_or(false)
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        stream.put_u8(0xE0);
        packet::write_remaining_length(stream, self.len(protocol))?;

        if protocol == Protocol::V5 && self.has_tail() {
            stream.put_u8(self.reason as u8);
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
        if protocol == Protocol::V4 {
            return Ok(Disconnect::default());
        }

        let reason = DisconnectReasonCode::try_from(packet::read_u8(&mut stream)?)?;
        let mut properties = None;
        if !stream.is_empty() {
            let mut block = packet::read_block(&mut stream)?;
            let decoded = DisconnectProperties::read(&mut block);
            properties = (!decoded.is_empty()).then_some(decoded);
        }

        Ok(Disconnect { reason, properties })
    }
}

/// disconnect 原因码
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReasonCode {
    NormalDisconnection = 0x00,
    DisconnectWithWillMessage = 0x04,
    UnspecifiedError = 0x80,
    MalformedPacket = 0x81,
    ProtocolError = 0x82,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    ServerBusy = 0x89,
    ServerShuttingDown = 0x8B,
    KeepAliveTimeout = 0x8D,
    SessionTakenOver = 0x8E,
    TopicFilterInvalid = 0x8F,
    TopicNameInvalid = 0x90,
    ReceiveMaximumExceeded = 0x93,
    TopicAliasInvalid = 0x94,
    PacketTooLarge = 0x95,
    MessageRateTooHigh = 0x96,
    QuotaExceeded = 0x97,
    AdministrativeAction = 0x98,
    PayloadFormatInvalid = 0x99,
    RetainNotSupported = 0x9A,
    QoSNotSupported = 0x9B,
    UseAnotherServer = 0x9C,
    ServerMoved = 0x9D,
    SharedSubscriptionsNotSupported = 0x9E,
    ConnectionRateExceeded = 0x9F,
    MaximumConnectTime = 0xA0,
    SubscriptionIdentifiersNotSupported = 0xA1,
    WildcardSubscriptionsNotSupported = 0xA2,
}

impl TryFrom<u8> for DisconnectReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => DisconnectReasonCode::NormalDisconnection,
            0x04 => DisconnectReasonCode::DisconnectWithWillMessage,
            0x80 => DisconnectReasonCode::UnspecifiedError,
            0x81 => DisconnectReasonCode::MalformedPacket,
            0x82 => DisconnectReasonCode::ProtocolError,
            0x83 => DisconnectReasonCode::ImplementationSpecificError,
            0x87 => DisconnectReasonCode::NotAuthorized,
            0x89 => DisconnectReasonCode::ServerBusy,
            0x8B => DisconnectReasonCode::ServerShuttingDown,
            0x8D => DisconnectReasonCode::KeepAliveTimeout,
            0x8E => DisconnectReasonCode::SessionTakenOver,
            0x8F => DisconnectReasonCode::TopicFilterInvalid,
            0x90 => DisconnectReasonCode::TopicNameInvalid,
            0x93 => DisconnectReasonCode::ReceiveMaximumExceeded,
            0x94 => DisconnectReasonCode::TopicAliasInvalid,
            0x95 => DisconnectReasonCode::PacketTooLarge,
            0x96 => DisconnectReasonCode::MessageRateTooHigh,
            0x97 => DisconnectReasonCode::QuotaExceeded,
            0x98 => DisconnectReasonCode::AdministrativeAction,
            0x99 => DisconnectReasonCode::PayloadFormatInvalid,
            0x9A => DisconnectReasonCode::RetainNotSupported,
            0x9B => DisconnectReasonCode::QoSNotSupported,
            0x9C => DisconnectReasonCode::UseAnotherServer,
            0x9D => DisconnectReasonCode::ServerMoved,
            0x9E => DisconnectReasonCode::SharedSubscriptionsNotSupported,
            0x9F => DisconnectReasonCode::ConnectionRateExceeded,
            0xA0 => DisconnectReasonCode::MaximumConnectTime,
            0xA1 => DisconnectReasonCode::SubscriptionIdentifiersNotSupported,
            0xA2 => DisconnectReasonCode::WildcardSubscriptionsNotSupported,
            num => return Err(Error::InvalidReasonCode(num)),
        };
        Ok(code)
    }
}

/// disconnect 报文的 v5 属性
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisconnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub reason_string: Option<String>,
    pub server_reference: Option<String>,
    pub user_properties: HashMap<String, String>,
}

impl DisconnectProperties {
    pub fn is_empty(&self) -> bool {
        self.session_expiry_interval.is_none()
            && self.reason_string.is_none()
            && self.server_reference.is_none()
            && self.user_properties.is_empty()
    }

    fn len(&self) -> usize {
        let mut len = 0;

        if self.session_expiry_interval.is_some() {
            len += 1 + 4;
        }

        if let Some(reason) = &self.reason_string {
            len += 1 + 2 + reason.len();
        }

        if let Some(reference) = &self.server_reference {
            len += 1 + 2 + reference.len();
        }

        for (key, value) in &self.user_properties {
            len += 1 + 2 + key.len() + 2 + value.len();
        }

        len
    }

    fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        packet::write_remaining_length(stream, self.len())?;

        if let Some(session_expiry_interval) = self.session_expiry_interval {
            stream.put_u8(PropertyType::SessionExpiryInterval as u8);
            stream.put_u32(session_expiry_interval);
        }

        if let Some(reason) = &self.reason_string {
            stream.put_u8(PropertyType::ReasonString as u8);
            packet::write_string(stream, reason);
        }

        if let Some(reference) = &self.server_reference {
            stream.put_u8(PropertyType::ServerReference as u8);
            packet::write_string(stream, reference);
        }

        for (key, value) in &self.user_properties {
            stream.put_u8(PropertyType::UserProperty as u8);
            packet::write_string(stream, key);
            packet::write_string(stream, value);
        }

        Ok(())
    }

    fn read(block: &mut Bytes) -> Self {
        let mut properties = DisconnectProperties::default();

        while !block.is_empty() {
            let prop = packet::read_u8(block).unwrap_or(0);
            match prop {
                p if p == PropertyType::SessionExpiryInterval as u8 => {
                    match packet::read_u32(block) {
                        Ok(value) => properties.session_expiry_interval = Some(value),
                        Err(_) => return properties,
                    }
                }
                p if p == PropertyType::ReasonString as u8 => match packet::read_string(block) {
                    Ok(value) => properties.reason_string = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::ServerReference as u8 => match packet::read_string(block) {
                    Ok(value) => properties.server_reference = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::UserProperty as u8 => {
                    let key = match packet::read_string(block) {
                        Ok(key) => key,
                        Err(_) => return properties,
                    };
                    let value = match packet::read_string(block) {
                        Ok(value) => value,
                        Err(_) => return properties,
                    };
                    properties.user_properties.insert(key, value);
                }
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
    fn v4_disconnect_is_two_bytes() {
        let disconnect = Disconnect::default();
        let mut stream = BytesMut::new();
        disconnect.write(&mut stream, Protocol::V4).unwrap();
        assert_eq!(&stream[..], &[0xE0, 0x00]);
        let decoded = Packet::read(&mut stream, Protocol::V4).unwrap().unwrap();
        assert_eq!(decoded, Packet::Disconnect(disconnect));
    }

    #[test]
    fn v5_normal_disconnect_omits_reason() {
        let disconnect = Disconnect::default();
        let mut stream = BytesMut::new();
        disconnect.write(&mut stream, Protocol::V5).unwrap();
        assert_eq!(&stream[..], &[0xE0, 0x00]);
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::Disconnect(disconnect));
    }

    #[test]
    fn v5_server_disconnect_roundtrip() {
        let disconnect = Disconnect {
            reason: DisconnectReasonCode::ServerShuttingDown,
            properties: Some(DisconnectProperties {
                session_expiry_interval: None,
                reason_string: Some("maintenance".into()),
                server_reference: Some("backup.example.com".into()),
                user_properties: Default::default(),
            }),
        };
        let mut stream = BytesMut::new();
        disconnect.write(&mut stream, Protocol::V5).unwrap();
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::Disconnect(disconnect));
    }
}
