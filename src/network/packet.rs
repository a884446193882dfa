//! mqtt 控制报文编解码
//! 同时支持 3.1.1 和 5.0 两个协议版本，版本差异由各报文类型自行处理

use std::slice::Iter;

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use auth::*;
pub use connack::*;
pub use connect::*;
pub use disconnect::*;
pub use properties::*;
pub use puback::*;
pub use pubcomp::*;
pub use publish::*;
pub use pubrec::*;
pub use pubrel::*;
pub use suback::*;
pub use subscribe::*;
pub use unsuback::*;
pub use unsubscribe::*;

pub mod auth;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod properties;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

/// 剩余长度字段的上限（2^28 - 1）
const PAYLOAD_MAX_LENGTH: usize = 268_435_455;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),
    #[error("Malformed packet")]
    MalformedPacket,
    #[error("At least {0} more bytes required")]
    InsufficientBytes(usize),
    #[error("Malformed UTF-8 string")]
    MalformedString,
    #[error("Invalid protocol")]
    InvalidProtocol,
    #[error("Invalid protocol level: {0}")]
    InvalidProtocolLevel(u8),
    #[error("Incorrect packet format")]
    IncorrectPacketFormat,
    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),
    #[error("Invalid reason code: {0}")]
    InvalidReasonCode(u8),
    #[error("Payload required")]
    PayloadRequired,
    #[error("Payload too large")]
    PayloadTooLarge,
    #[error("Miss packet id")]
    MissPacketId,
}

/// 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// v3.1.1
    V4,
    /// v5
    V5,
}

impl Protocol {
    pub(crate) fn level(&self) -> u8 {
        match self {
            Protocol::V4 => 4,
            Protocol::V5 => 5,
        }
    }
}

/// 服务质量
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(clippy::enum_variant_names)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            qos => Err(Error::InvalidQoS(qos)),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
    Auth,
}

pub(crate) struct FixedHeader {
    /// 固定头的第一个字节，包含报文类型和flags
    pub(crate) byte1: u8,
    // 固定头的大小
    pub(crate) fixed_header_len: usize,
    // 剩余长度大小
    pub(crate) remaining_len: usize,
}

impl FixedHeader {
    #[inline]
    fn packet_type(&self) -> Result<PacketType, Error> {
        let num = self.byte1 >> 4;
        match num {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            15 => Ok(PacketType::Auth),
            n => Err(Error::InvalidPacketType(n)),
        }
    }

    /// 整个完整报文的字节长度
    #[inline]
    pub(crate) fn packet_len(&self) -> usize {
        self.fixed_header_len + self.remaining_len
    }

    pub(crate) fn read_from(mut stream: Iter<u8>) -> Result<Self, Error> {
        let stream_len = stream.len();
        if stream_len < 2 {
            return Err(Error::InsufficientBytes(2 - stream_len));
        }
        // 第一个字节
        let byte1 = stream.next().unwrap();

        // 剩余字节长度
        let mut remaining_len: usize = 0;
        // 固定头长度
        let mut header_len = 1;
        let mut done = false;
        let mut shift = 0;

        for byte in stream {
            // 固定头长度 + 1
            header_len += 1;
            // 剩余长度字节
            let byte = *byte as usize;
            // 字节的后七位 * 128 + 上一个字节
            remaining_len += (byte & 0x7F) << shift;

            // 是否还有后续 remaining_len 字节
            done = (byte & 0x80) == 0;
            if done {
                break;
            }

            shift += 7;

            // 剩余长度字节最多四个字节（0，7，14，21）
            if shift > 21 {
                return Err(Error::MalformedPacket);
            }
        }

        if !done {
            return Err(Error::InsufficientBytes(1));
        }

        Ok(Self {
            byte1: *byte1,
            fixed_header_len: header_len,
            remaining_len,
        })
    }
}

/// 控制报文
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect(Disconnect),
    Auth(Auth),
}

impl Packet {
    /// 从读缓冲区中取出一个完整报文
    /// * 数据不足一个完整报文时返回 InsufficientBytes，缓冲区保持原样
    /// * 取出的字节数严格等于固定头声明的报文长度，多余的数据留在缓冲区
    /// * 当前协议版本下不支持的报文类型，整个报文被丢弃，返回 None
    pub(crate) fn read(stream: &mut BytesMut, protocol: Protocol) -> Result<Option<Self>, Error> {
        let stream_len = stream.len();
        let fixed_header = FixedHeader::read_from(stream.iter())?;

        let packet_len = fixed_header.packet_len();
        if stream_len < packet_len {
            return Err(Error::InsufficientBytes(packet_len - stream_len));
        }

        // 根据固定头给出的长度信息，取出整个报文字节（包含报文头）
        // split_to 方法会更新 stream
        let packet = stream.split_to(packet_len);

        // 报文类型
        // 未定义的类型不能使流失去同步，丢弃整个报文即可
        let packet_type = match fixed_header.packet_type() {
            Ok(packet_type) => packet_type,
            Err(_) => return Ok(None),
        };

        // 没有剩余数据的 packet 类型，获取到报文头后，可以直接返回
        if fixed_header.remaining_len == 0 {
            return match packet_type {
                PacketType::PingReq => Ok(Some(Packet::PingReq)),
                PacketType::PingResp => Ok(Some(Packet::PingResp)),
                PacketType::Disconnect => Ok(Some(Packet::Disconnect(Disconnect::default()))),
                PacketType::Auth if protocol == Protocol::V5 => {
                    Ok(Some(Packet::Auth(Auth::default())))
                }
                PacketType::Auth => Ok(None),
                _ => Err(Error::PayloadRequired),
            };
        }

        // 完整的报文
        let mut stream = packet.freeze();
        // 去掉固定头的报文
        let variable_header_index = fixed_header.fixed_header_len;
        stream.advance(variable_header_index);

        let packet = match packet_type {
            PacketType::Connect => Packet::Connect(Connect::read(stream)?),
            PacketType::ConnAck => Packet::ConnAck(ConnAck::read(stream, protocol)?),
            PacketType::Publish => Packet::Publish(Publish::read(&fixed_header, stream, protocol)?),
            PacketType::PubAck => Packet::PubAck(PubAck::read(stream, protocol)?),
            PacketType::PubRec => Packet::PubRec(PubRec::read(stream, protocol)?),
            PacketType::PubRel => Packet::PubRel(PubRel::read(stream, protocol)?),
            PacketType::PubComp => Packet::PubComp(PubComp::read(stream, protocol)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::read(stream, protocol)?),
            PacketType::SubAck => Packet::SubAck(SubAck::read(stream, protocol)?),
            PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::read(stream, protocol)?),
            PacketType::UnsubAck => Packet::UnsubAck(UnsubAck::read(stream, protocol)?),
            PacketType::Disconnect => Packet::Disconnect(Disconnect::read(stream, protocol)?),
            PacketType::Auth if protocol == Protocol::V5 => Packet::Auth(Auth::read(stream)?),
            PacketType::Auth => return Ok(None),
            // 长度不为 0 的 ping 报文不符合协议
            PacketType::PingReq | PacketType::PingResp => return Err(Error::MalformedPacket),
        };

        Ok(Some(packet))
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        match self {
            Packet::Connect(connect) => connect.write(stream),
            Packet::ConnAck(connack) => connack.write(stream, protocol),
            Packet::Publish(publish) => publish.write(stream, protocol),
            Packet::PubAck(puback) => puback.write(stream, protocol),
            Packet::PubRec(pubrec) => pubrec.write(stream, protocol),
            Packet::PubRel(pubrel) => pubrel.write(stream, protocol),
            Packet::PubComp(pubcomp) => pubcomp.write(stream, protocol),
            Packet::Subscribe(subscribe) => subscribe.write(stream, protocol),
            Packet::SubAck(suback) => suback.write(stream, protocol),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.write(stream, protocol),
            Packet::UnsubAck(unsuback) => unsuback.write(stream, protocol),
            Packet::PingReq => {
                stream.put_u8(0xC0);
                stream.put_u8(0x00);
                Ok(())
            }
            Packet::PingResp => {
                stream.put_u8(0xD0);
                stream.put_u8(0x00);
                Ok(())
            }
            Packet::Disconnect(disconnect) => disconnect.write(stream, protocol),
            Packet::Auth(auth) => auth.write(stream, protocol),
        }
    }

    #[inline]
    pub(crate) fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect(_) => PacketType::Disconnect,
            Packet::Auth(_) => PacketType::Auth,
        }
    }
}

/// 读取多个字节
pub(crate) fn read_bytes(stream: &mut Bytes) -> Result<Bytes, Error> {
    // 后续可取出的字节的长度
    let len = read_u16(stream)? as usize;

    if len > stream.len() {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.split_to(len))
}

pub(crate) fn read_string(stream: &mut Bytes) -> Result<String, Error> {
    let s = read_bytes(stream)?;
    match String::from_utf8(s.to_vec()) {
        Ok(v) => Ok(v),
        Err(_) => Err(Error::MalformedString),
    }
}

pub(crate) fn read_u32(stream: &mut Bytes) -> Result<u32, Error> {
    if stream.len() < 4 {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.get_u32())
}

pub(crate) fn read_u16(stream: &mut Bytes) -> Result<u16, Error> {
    if stream.len() < 2 {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.get_u16())
}

pub(crate) fn read_u8(stream: &mut Bytes) -> Result<u8, Error> {
    if stream.is_empty() {
        return Err(Error::MalformedPacket);
    }
    Ok(stream.get_u8())
}

/// 读取属性块长度等处使用的变长整数，并推进 stream
pub(crate) fn read_length(stream: &mut Bytes) -> Result<usize, Error> {
    let mut len: usize = 0;
    let mut shift = 0;
    let mut consumed = 0;

    loop {
        if consumed >= stream.len() {
            return Err(Error::MalformedPacket);
        }
        let byte = stream[consumed] as usize;
        consumed += 1;
        len += (byte & 0x7F) << shift;

        if (byte & 0x80) == 0 {
            break;
        }

        shift += 7;
        if shift > 21 {
            return Err(Error::MalformedPacket);
        }
    }

    stream.advance(consumed);
    Ok(len)
}

pub(crate) fn write_remaining_length(stream: &mut BytesMut, len: usize) -> Result<usize, Error> {
    if len > PAYLOAD_MAX_LENGTH {
        return Err(Error::PayloadTooLarge);
    }

    let mut done = false;
    let mut x = len;
    let mut count = 0;

    while !done {
        let mut byte = (x % 128) as u8;
        x /= 128;
        if x > 0 {
            byte |= 128;
        }

        stream.put_u8(byte);
        count += 1;
        done = x == 0;
    }

    Ok(count)
}

pub(crate) fn write_bytes(stream: &mut BytesMut, bytes: &[u8]) {
    stream.put_u16(bytes.len() as u16);
    stream.extend_from_slice(bytes);
}

pub(crate) fn write_string(stream: &mut BytesMut, string: &str) {
    write_bytes(stream, string.as_bytes())
}

/// 变长整数自身占用的字节数
pub(crate) fn len_len(len: usize) -> usize {
    if len >= 2_097_152 {
        4
    } else if len >= 16_384 {
        3
    } else if len >= 128 {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_length(len: usize) -> BytesMut {
        let mut stream = BytesMut::new();
        write_remaining_length(&mut stream, len).unwrap();
        stream
    }

    #[test]
    fn remaining_length_roundtrip_boundaries() {
        for len in [0, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, 268_435_455] {
            let mut stream = BytesMut::new();
            stream.put_u8(0xC0);
            let written = write_remaining_length(&mut stream, len).unwrap();
            assert_eq!(written, len_len(len));

            let header = FixedHeader::read_from(stream.iter()).unwrap();
            assert_eq!(header.remaining_len, len);
            assert_eq!(header.fixed_header_len, 1 + written);
        }
    }

    #[test]
    fn remaining_length_over_four_bytes_is_malformed() {
        let mut stream = BytesMut::new();
        stream.put_u8(0xC0);
        stream.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        assert!(matches!(
            FixedHeader::read_from(stream.iter()),
            Err(Error::MalformedPacket)
        ));
    }

    #[test]
    fn remaining_length_too_large_to_encode() {
        let mut stream = BytesMut::new();
        assert!(matches!(
            write_remaining_length(&mut stream, PAYLOAD_MAX_LENGTH + 1),
            Err(Error::PayloadTooLarge)
        ));
    }

    #[test]
    fn read_length_advances_stream() {
        let mut encoded = encoded_length(16_384);
        encoded.extend_from_slice(b"rest");
        let mut stream = encoded.freeze();
        assert_eq!(read_length(&mut stream).unwrap(), 16_384);
        assert_eq!(&stream[..], b"rest");
    }

    #[test]
    fn fixed_header_requires_two_bytes() {
        let stream = BytesMut::from(&[0x30][..]);
        assert!(matches!(
            FixedHeader::read_from(stream.iter()),
            Err(Error::InsufficientBytes(1))
        ));
    }

    #[test]
    fn fixed_header_requires_length_terminator() {
        // 延续位为 1，后续字节还没到
        let stream = BytesMut::from(&[0x30, 0x80][..]);
        assert!(matches!(
            FixedHeader::read_from(stream.iter()),
            Err(Error::InsufficientBytes(1))
        ));
    }

    #[test]
    fn incomplete_packet_leaves_stream_untouched() {
        // 声明剩余长度 4，但只给 2 字节
        let mut stream = BytesMut::from(&[0xD0u8, 0x04, 0x00, 0x00][..]);
        assert!(matches!(
            Packet::read(&mut stream, Protocol::V4),
            Err(Error::InsufficientBytes(2))
        ));
        assert_eq!(stream.len(), 4);
    }

    #[test]
    fn unknown_packet_type_consumes_frame() {
        // 类型 0 未定义；帧被丢弃但流保持同步
        let mut stream = BytesMut::from(&[0x00u8, 0x02, 0xAA, 0xBB, 0xC0, 0x00][..]);
        assert!(matches!(Packet::read(&mut stream, Protocol::V4), Ok(None)));
        assert!(matches!(
            Packet::read(&mut stream, Protocol::V4),
            Ok(Some(Packet::PingReq))
        ));
        assert!(stream.is_empty());
    }

    #[test]
    fn auth_is_unsupported_on_v4() {
        let mut stream = BytesMut::from(&[0xF0u8, 0x00][..]);
        assert!(matches!(Packet::read(&mut stream, Protocol::V4), Ok(None)));
        assert!(stream.is_empty());
    }

    #[test]
    fn exact_consumption_with_trailing_bytes() {
        let mut stream = BytesMut::from(&[0xC0u8, 0x00, 0xDE, 0xAD][..]);
        assert!(matches!(
            Packet::read(&mut stream, Protocol::V4),
            Ok(Some(Packet::PingReq))
        ));
        assert_eq!(&stream[..], &[0xDE, 0xAD]);
    }
}
