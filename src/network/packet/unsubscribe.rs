use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, Error, Protocol};

/// unsubscribe 报文，固定头标志位必须是 0b0010
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl Unsubscribe {
    pub(crate) fn new(packet_id: u16, filters: Vec<String>) -> Self {
        Unsubscribe { packet_id, filters }
    }

    fn len(&self, protocol: Protocol) -> usize {
        let mut len = 2;
        if protocol == Protocol::V5 {
            // 空属性块
            len += 1;
        }
        for filter in &self.filters {
            len += 2 + filter.len();
        }
        len
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        stream.put_u8(0xA2);
        packet::write_remaining_length(stream, self.len(protocol))?;
        stream.put_u16(self.packet_id);

        if protocol == Protocol::V5 {
            packet::write_remaining_length(stream, 0)?;
        }

        for filter in &self.filters {
            packet::write_string(stream, filter);
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
            filters.push(packet::read_string(&mut stream)?);
        }

        if filters.is_empty() {
            return Err(Error::PayloadRequired);
        }

        Ok(Unsubscribe { packet_id, filters })
    }
}
