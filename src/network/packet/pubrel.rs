use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, AckProperties, Error, Protocol};

/// pubrel 报文，固定头标志位必须是 0b0010
#[derive(Debug, Clone, PartialEq)]
pub struct PubRel {
    pub packet_id: u16,
    pub reason: PubRelReason,
    pub properties: Option<AckProperties>,
}

impl PubRel {
    pub(crate) fn new(packet_id: u16) -> Self {
        PubRel {
            packet_id,
            reason: PubRelReason::Success,
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
        self.reason != PubRelReason::Success
            || self.properties.as_ref().map(|p| !p.is_empty()).unwrap_or(false)
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        stream.put_u8(0x62);
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

        let mut reason = PubRelReason::Success;
        let mut properties = None;
        if protocol == Protocol::V5 && !stream.is_empty() {
            reason = PubRelReason::try_from(packet::read_u8(&mut stream)?)?;
            if !stream.is_empty() {
                let mut block = packet::read_block(&mut stream)?;
                let decoded = AckProperties::read(&mut block);
                properties = (!decoded.is_empty()).then_some(decoded);
            }
        }

        Ok(PubRel {
            packet_id,
            reason,
            properties,
        })
    }
}

/// pubrel/pubcomp 共用的原因码集合
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubRelReason {
    Success = 0x00,
    PacketIdentifierNotFound = 0x92,
}

impl PubRelReason {
    pub fn is_failure(&self) -> bool {
        (*self as u8) >= 0x80
    }
}

impl TryFrom<u8> for PubRelReason {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => PubRelReason::Success,
            0x92 => PubRelReason::PacketIdentifierNotFound,
            num => return Err(Error::InvalidReasonCode(num)),
        };
        Ok(code)
    }
}
