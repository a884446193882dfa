use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, AckProperties, Error, Protocol};

/// puback 报文
/// v5 下当原因码为成功且没有属性时，原因码和属性块整体省略
#[derive(Debug, Clone, PartialEq)]
pub struct PubAck {
    pub packet_id: u16,
    pub reason: PubAckReason,
    pub properties: Option<AckProperties>,
}

impl PubAck {
    pub(crate) fn new(packet_id: u16) -> Self {
        PubAck {
            packet_id,
            reason: PubAckReason::Success,
            properties: None,
        }
    }

    fn len(&self, protocol: Protocol) -> usize {
        let mut len = 2;
        if protocol == Protocol::V5 && self.has_tail() {
            let properties_len = self.properties.as_ref().map(|p| p.len()).unwrap_or(0);
            len += 1 + packet::len_len(properties_len) + properties_len;
        }
        len
    }

    fn has_tail(&self) -> bool {
        self.reason != PubAckReason::Success
            || self.properties.as_ref().map(|p| !p.is_empty()).unwrap_or(false)
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        stream.put_u8(0x40);
        packet::write_remaining_length(stream, self.len(protocol))?;
        stream.put_u16(self.packet_id);

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
        let packet_id = packet::read_u16(&mut stream)?;

        let mut reason = PubAckReason::Success;
        let mut properties = None;
        if protocol == Protocol::V5 && !stream.is_empty() {
            reason = PubAckReason::try_from(packet::read_u8(&mut stream)?)?;
            if !stream.is_empty() {
                let mut block = packet::read_block(&mut stream)?;
                let decoded = AckProperties::read(&mut block);
                properties = (!decoded.is_empty()).then_some(decoded);
            }
        }

        Ok(PubAck {
            packet_id,
            reason,
            properties,
        })
    }
}

/// puback/pubrec 共用的原因码集合
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubAckReason {
    Success = 0x00,
    NoMatchingSubscribers = 0x10,
    UnspecifiedError = 0x80,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    TopicNameInvalid = 0x90,
    PacketIdentifierInUse = 0x91,
    QuotaExceeded = 0x97,
    PayloadFormatInvalid = 0x99,
}

impl PubAckReason {
    pub fn is_failure(&self) -> bool {
        (*self as u8) >= 0x80
    }
}

impl TryFrom<u8> for PubAckReason {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => PubAckReason::Success,
            0x10 => PubAckReason::NoMatchingSubscribers,
            0x80 => PubAckReason::UnspecifiedError,
            0x83 => PubAckReason::ImplementationSpecificError,
            0x87 => PubAckReason::NotAuthorized,
            0x90 => PubAckReason::TopicNameInvalid,
            0x91 => PubAckReason::PacketIdentifierInUse,
            0x97 => PubAckReason::QuotaExceeded,
            0x99 => PubAckReason::PayloadFormatInvalid,
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
    fn v4_puback_roundtrip() {
        let puback = PubAck::new(10);
        let mut stream = BytesMut::new();
        puback.write(&mut stream, Protocol::V4).unwrap();
        // 3.1.1 puback 固定 4 字节
        assert_eq!(stream.len(), 4);
        let decoded = Packet::read(&mut stream, Protocol::V4).unwrap().unwrap();
        assert_eq!(decoded, Packet::PubAck(puback));
    }

    #[test]
    fn v5_success_puback_omits_reason_and_properties() {
        let puback = PubAck::new(11);
        let mut stream = BytesMut::new();
        puback.write(&mut stream, Protocol::V5).unwrap();
        assert_eq!(stream.len(), 4);
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::PubAck(puback));
    }

    #[test]
    fn v5_failure_puback_roundtrip() {
        let puback = PubAck {
            packet_id: 12,
            reason: PubAckReason::NotAuthorized,
            properties: Some(AckProperties {
                reason_string: Some("denied".into()),
                user_properties: Default::default(),
            }),
        };
        let mut stream = BytesMut::new();
        puback.write(&mut stream, Protocol::V5).unwrap();
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::PubAck(puback));
    }
}
