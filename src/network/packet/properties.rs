//! v5 属性块编解码
//!
//! 属性块只在 5.0 协议下出现。解码采取宽松策略：遇到当前报文不认识的属性
//! 标识符，或者属性值越界时，停止解析并返回已经解析出来的部分，不报错。

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::network::packet::{self, Error};

/// 属性标识符
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub(crate) enum PropertyType {
    PayloadFormatIndicator = 1,
    MessageExpiryInterval = 2,
    ContentType = 3,
    ResponseTopic = 8,
    CorrelationData = 9,
    SessionExpiryInterval = 17,
    ServerKeepAlive = 19,
    AuthenticationMethod = 21,
    AuthenticationData = 22,
    ServerReference = 28,
    ReasonString = 31,
    ReceiveMaximum = 33,
    TopicAliasMaximum = 34,
    TopicAlias = 35,
    UserProperty = 38,
    MaximumPacketSize = 39,
}

/// 取出一个长度前缀的属性块
/// 长度越过报文边界时截断到可用数据，与宽松解码策略一致
pub(crate) fn read_block(stream: &mut Bytes) -> Result<Bytes, Error> {
    let len = packet::read_length(stream)?;
    let take = len.min(stream.len());
    Ok(stream.split_to(take))
}

/// puback/pubrec/pubrel/pubcomp/suback/unsuback 共用的属性集
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckProperties {
    pub reason_string: Option<String>,
    pub user_properties: HashMap<String, String>,
}

impl AckProperties {
    pub fn is_empty(&self) -> bool {
        self.reason_string.is_none() && self.user_properties.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        let mut len = 0;

        if let Some(reason) = &self.reason_string {
            len += 1 + 2 + reason.len();
        }

        for (key, value) in &self.user_properties {
            len += 1 + 2 + key.len() + 2 + value.len();
        }

        len
    }

    pub(crate) fn read(block: &mut Bytes) -> Self {
        let mut properties = AckProperties::default();

        while !block.is_empty() {
            let prop = block.get_u8();
            match prop {
                p if p == PropertyType::ReasonString as u8 => {
                    match packet::read_string(block) {
                        Ok(reason) => properties.reason_string = Some(reason),
                        Err(_) => return properties,
                    }
                }
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

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        packet::write_remaining_length(stream, self.len())?;

        if let Some(reason) = &self.reason_string {
            stream.put_u8(PropertyType::ReasonString as u8);
            packet::write_string(stream, reason);
        }

        for (key, value) in &self.user_properties {
            stream.put_u8(PropertyType::UserProperty as u8);
            packet::write_string(stream, key);
            packet::write_string(stream, value);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_property_truncates_block() {
        let mut block = BytesMut::new();
        block.put_u8(PropertyType::ReasonString as u8);
        packet::write_string(&mut block, "ok");
        // 0x7B 不是 ack 属性，其后的 user property 被一并丢弃
        block.put_u8(0x7B);
        block.put_u8(PropertyType::UserProperty as u8);
        packet::write_string(&mut block, "k");
        packet::write_string(&mut block, "v");

        let properties = AckProperties::read(&mut block.freeze());
        assert_eq!(properties.reason_string.as_deref(), Some("ok"));
        assert!(properties.user_properties.is_empty());
    }

    #[test]
    fn short_property_value_truncates_block() {
        let mut block = BytesMut::new();
        block.put_u8(PropertyType::ReasonString as u8);
        // 声明长度 10，实际只有 2 字节
        block.put_u16(10);
        block.extend_from_slice(b"ok");

        let properties = AckProperties::read(&mut block.freeze());
        assert!(properties.is_empty());
    }

    #[test]
    fn block_longer_than_packet_is_clamped() {
        let mut stream = BytesMut::new();
        packet::write_remaining_length(&mut stream, 100).unwrap();
        stream.put_u8(PropertyType::ReasonString as u8);
        packet::write_string(&mut stream, "done");

        let mut stream = stream.freeze();
        let mut block = read_block(&mut stream).unwrap();
        let properties = AckProperties::read(&mut block);
        assert_eq!(properties.reason_string.as_deref(), Some("done"));
        assert!(stream.is_empty());
    }
}
