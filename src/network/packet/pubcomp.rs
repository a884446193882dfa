use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, AckProperties, Error, Protocol, PubRelReason};

/// pubcomp 报文，qos2 流程的收尾
#[derive(Debug, Clone, PartialEq)]
pub struct PubComp {
    pub packet_id: u16,
    pub reason: PubRelReason,
    pub properties: Option<AckProperties>,
}

impl PubComp {
    pub(crate) fn new(packet_id: u16) -> Self {
        PubComp {
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
        stream.put_u8(0x70);
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

        Ok(PubComp {
            packet_id,
            reason,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::network::packet::Packet;

    use super::*;

    #[test]
    fn v4_pubcomp_roundtrip() {
        let pubcomp = PubComp::new(41);
        let mut stream = BytesMut::new();
        pubcomp.write(&mut stream, Protocol::V4).unwrap();
        assert_eq!(stream.len(), 4);
        let decoded = Packet::read(&mut stream, Protocol::V4).unwrap().unwrap();
        assert_eq!(decoded, Packet::PubComp(pubcomp));
    }

    #[test]
    fn v5_pubcomp_with_reason_string_roundtrip() {
        let pubcomp = PubComp {
            packet_id: 42,
            reason: PubRelReason::PacketIdentifierNotFound,
            properties: Some(AckProperties {
                reason_string: Some("no such id".into()),
                user_properties: Default::default(),
            }),
        };
        let mut stream = BytesMut::new();
        pubcomp.write(&mut stream, Protocol::V5).unwrap();
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::PubComp(pubcomp));
    }
}
