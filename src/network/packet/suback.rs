use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, AckProperties, Error, Protocol, QoS};

/// suback 报文
/// 每个订阅项对应一个返回码，顺序与 subscribe 报文一致
#[derive(Debug, Clone, PartialEq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReasonCode>,
    pub properties: Option<AckProperties>,
}

impl SubAck {
    /// 任意一个返回码失败即整体失败
    pub fn has_failure(&self) -> bool {
        self.return_codes.iter().any(|code| code.is_failure())
    }

    fn len(&self, protocol: Protocol) -> usize {
        let mut len = 2 + self.return_codes.len();
        if protocol == Protocol::V5 {
            let properties_len = self.properties.as_ref().map(|p| p.len()).unwrap_or(0);
            len += packet::len_len(properties_len) + properties_len;
        }
        len
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        stream.put_u8(0x90);
        packet::write_remaining_length(stream, self.len(protocol))?;
        stream.put_u16(self.packet_id);

        if protocol == Protocol::V5 {
            match &self.properties {
                Some(properties) => properties.write(stream)?,
                None => {
                    packet::write_remaining_length(stream, 0)?;
                }
            }
        }

        for code in &self.return_codes {
            stream.put_u8(code.as_u8());
        }
        Ok(())
    }

    pub(crate) fn read(mut stream: Bytes, protocol: Protocol) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;

        let properties = match protocol {
            Protocol::V5 => {
                let mut block = packet::read_block(&mut stream)?;
                let properties = AckProperties::read(&mut block);
                (!properties.is_empty()).then_some(properties)
            }
            Protocol::V4 => None,
        };

        let mut return_codes = Vec::new();
        while !stream.is_empty() {
            return_codes.push(SubscribeReasonCode::try_from(packet::read_u8(&mut stream)?)?);
        }

        if return_codes.is_empty() {
            return Err(Error::PayloadRequired);
        }

        Ok(SubAck {
            packet_id,
            return_codes,
            properties,
        })
    }
}

/// suback 返回码
/// 3.1.1 只有 0/1/2/0x80，5.0 的失败原因码更细
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReasonCode {
    Success(QoS),
    Unspecified,
    ImplementationSpecificError,
    NotAuthorized,
    TopicFilterInvalid,
    PacketIdentifierInUse,
    QuotaExceeded,
    SharedSubscriptionsNotSupported,
    SubscriptionIdentifiersNotSupported,
    WildcardSubscriptionsNotSupported,
}

impl SubscribeReasonCode {
    pub fn is_failure(&self) -> bool {
        !matches!(self, SubscribeReasonCode::Success(_))
    }

    pub(crate) fn as_u8(&self) -> u8 {
        match self {
            SubscribeReasonCode::Success(qos) => *qos as u8,
            SubscribeReasonCode::Unspecified => 0x80,
            SubscribeReasonCode::ImplementationSpecificError => 0x83,
            SubscribeReasonCode::NotAuthorized => 0x87,
            SubscribeReasonCode::TopicFilterInvalid => 0x8F,
            SubscribeReasonCode::PacketIdentifierInUse => 0x91,
            SubscribeReasonCode::QuotaExceeded => 0x97,
            SubscribeReasonCode::SharedSubscriptionsNotSupported => 0x9E,
            SubscribeReasonCode::SubscriptionIdentifiersNotSupported => 0xA1,
            SubscribeReasonCode::WildcardSubscriptionsNotSupported => 0xA2,
        }
    }
}

impl TryFrom<u8> for SubscribeReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => SubscribeReasonCode::Success(QoS::AtMostOnce),
            0x01 => SubscribeReasonCode::Success(QoS::AtLeastOnce),
            0x02 => SubscribeReasonCode::Success(QoS::ExactlyOnce),
            0x80 => SubscribeReasonCode::Unspecified,
            0x83 => SubscribeReasonCode::ImplementationSpecificError,
            0x87 => SubscribeReasonCode::NotAuthorized,
            0x8F => SubscribeReasonCode::TopicFilterInvalid,
            0x91 => SubscribeReasonCode::PacketIdentifierInUse,
            0x97 => SubscribeReasonCode::QuotaExceeded,
            0x9E => SubscribeReasonCode::SharedSubscriptionsNotSupported,
            0xA1 => SubscribeReasonCode::SubscriptionIdentifiersNotSupported,
            0xA2 => SubscribeReasonCode::WildcardSubscriptionsNotSupported,
            num => return Err(Error::InvalidReasonCode(num)),
        };
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use crate::network::packet::Packet;

    use super::*;

    #[test]
    fn v4_suback_roundtrip() {
        let suback = SubAck {
            packet_id: 61,
            return_codes: vec![
                SubscribeReasonCode::Success(QoS::AtLeastOnce),
                SubscribeReasonCode::Success(QoS::ExactlyOnce),
            ],
            properties: None,
        };
        let mut stream = BytesMut::new();
        suback.write(&mut stream, Protocol::V4).unwrap();
        let decoded = Packet::read(&mut stream, Protocol::V4).unwrap().unwrap();
        assert_eq!(decoded, Packet::SubAck(suback));
    }

    #[test]
    fn v5_suback_with_failure_roundtrip() {
        let suback = SubAck {
            packet_id: 62,
            return_codes: vec![
                SubscribeReasonCode::Success(QoS::AtMostOnce),
                SubscribeReasonCode::NotAuthorized,
            ],
            properties: Some(AckProperties {
                reason_string: Some("acl".into()),
                user_properties: Default::default(),
            }),
        };
        assert!(suback.has_failure());

        let mut stream = BytesMut::new();
        suback.write(&mut stream, Protocol::V5).unwrap();
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::SubAck(suback));
    }

    #[test]
    fn all_granted_suback_has_no_failure() {
        let suback = SubAck {
            packet_id: 63,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
            properties: None,
        };
        assert!(!suback.has_failure());
    }
}
