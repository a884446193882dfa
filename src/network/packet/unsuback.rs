use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, AckProperties, Error, Protocol};

/// unsuback 报文
/// 3.1.1 下没有载荷，5.0 下每个过滤器对应一个原因码
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubAck {
    pub packet_id: u16,
    pub reasons: Vec<UnsubAckReason>,
    pub properties: Option<AckProperties>,
}

impl UnsubAck {
    pub fn has_failure(&self) -> bool {
        self.reasons.iter().any(|reason| reason.is_failure())
    }

    fn len(&self, protocol: Protocol) -> usize {
        let mut len = 2;
        if protocol == Protocol::V5 {
            let properties_len = self.properties.as_ref().map(|p| p.len()).unwrap_or(0);
            len += packet::len_len(properties_len) + properties_len;
            len += self.reasons.len();
        }
        len
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        stream.put_u8(0xB0);
        packet::write_remaining_length(stream, self.len(protocol))?;
        stream.put_u16(self.packet_id);

        if protocol == Protocol::V5 {
            match &self.properties {
                Some(properties) => properties.write(stream)?,
                None => {
                    packet::write_remaining_length(stream, 0)?;
                }
            }
            for reason in &self.reasons {
                stream.put_u8(*reason as u8);
            }
        }
        Ok(())
    }

    pub(crate) fn read(mut stream: Bytes, protocol: Protocol) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;

        let mut properties = None;
        let mut reasons = Vec::new();
        if protocol == Protocol::V5 {
            let mut block = packet::read_block(&mut stream)?;
            let decoded = AckProperties::read(&mut block);
            properties = (!decoded.is_empty()).then_some(decoded);

            while !stream.is_empty() {
                reasons.push(UnsubAckReason::try_from(packet::read_u8(&mut stream)?)?);
            }
        }

        Ok(UnsubAck {
            packet_id,
            reasons,
            properties,
        })
    }
}

/// unsuback 原因码
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubAckReason {
    Success = 0x00,
    NoSubscriptionExisted = 0x11,
    UnspecifiedError = 0x80,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    TopicFilterInvalid = 0x8F,
    PacketIdentifierInUse = 0x91,
}

impl UnsubAckReason {
    pub fn is_failure(&self) -> bool {
        (*self as u8) >= 0x80
    }
}

impl TryFrom<u8> for UnsubAckReason {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => UnsubAckReason::Success,
            0x11 => UnsubAckReason::NoSubscriptionExisted,
            0x80 => UnsubAckReason::UnspecifiedError,
            0x83 => UnsubAckReason::ImplementationSpecificError,
            0x87 => UnsubAckReason::NotAuthorized,
            0x8F => UnsubAckReason::TopicFilterInvalid,
            0x91 => UnsubAckReason::PacketIdentifierInUse,
            num => return Err(Error::InvalidReasonCode(num)),
        };
        Ok(code)
    }
}
