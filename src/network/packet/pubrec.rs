use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, AckProperties, Error, Protocol, PubAckReason};

/// pubrec 报文，qos2 流程第一段的确认
#[derive(Debug, Clone, PartialEq)]
pub struct PubRec {
    pub packet_id: u16,
    pub reason: PubAckReason,
    pub properties: Option<AckProperties>,
}

impl PubRec {
    pub(crate) fn new(packet_id: u16) -> Self {
        PubRec {
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
        stream.put_u8(0x50);
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

        Ok(PubRec {
            packet_id,
            reason,
            properties,
        })
    }
}
