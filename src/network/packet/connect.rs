use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, properties::PropertyType, Error, Protocol, QoS};

/// connect 报文
/// 协议版本写在报文里，因此编解码不需要额外的版本参数
#[derive(Debug, Clone, PartialEq)]
pub struct Connect {
    /// 协议版本
    pub protocol: Protocol,
    /// keepalive
    pub keep_alive: u16,
    /// 客户端id
    pub client_id: String,
    /// 是否开启新会话
    pub clean_session: bool,
    /// 遗嘱消息
    pub last_will: Option<LastWill>,
    /// 登录凭证
    pub login: Option<Login>,
    /// v5 属性
    pub properties: Option<ConnectProperties>,
}

impl Connect {
    fn len(&self) -> usize {
        // 协议名 + 版本号 + 连接标志 + keepalive
        let mut len = 2 + 4 + 1 + 1 + 2;

        if self.protocol == Protocol::V5 {
            let properties_len = self.properties.as_ref().map(|p| p.len()).unwrap_or(0);
            len += packet::len_len(properties_len) + properties_len;
        }

        len += 2 + self.client_id.len();

        if let Some(will) = &self.last_will {
            if self.protocol == Protocol::V5 {
                // 空的遗嘱属性块
                len += 1;
            }
            len += 2 + will.topic.len() + 2 + will.message.len();
        }

        if let Some(login) = &self.login {
            len += 2 + login.username.len() + 2 + login.password.len();
        }

        len
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }

        if let Some(will) = &self.last_will {
            flags |= 0x04;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= 0x20;
            }
        }

        if self.login.is_some() {
            flags |= 0x80 | 0x40;
        }

        flags
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        stream.put_u8(0x10);
        packet::write_remaining_length(stream, self.len())?;

        // 可变报头
        packet::write_string(stream, "MQTT");
        stream.put_u8(self.protocol.level());
        stream.put_u8(self.connect_flags());
        stream.put_u16(self.keep_alive);

        if self.protocol == Protocol::V5 {
            match &self.properties {
                Some(properties) => properties.write(stream)?,
                None => {
                    packet::write_remaining_length(stream, 0)?;
                }
            }
        }

        // 载荷
        packet::write_string(stream, &self.client_id);

        if let Some(will) = &self.last_will {
            if self.protocol == Protocol::V5 {
                // 遗嘱属性不支持，写空块
                packet::write_remaining_length(stream, 0)?;
            }
            packet::write_string(stream, &will.topic);
            packet::write_bytes(stream, &will.message);
        }

        if let Some(login) = &self.login {
            packet::write_string(stream, &login.username);
            packet::write_string(stream, &login.password);
        }

        Ok(())
    }

    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        // 可变报头
        let protocol_name = packet::read_string(&mut stream)?;
        let protocol_level = packet::read_u8(&mut stream)?;
        if protocol_name != "MQTT" {
            return Err(Error::InvalidProtocol);
        }
        let protocol = match protocol_level {
            4 => Protocol::V4,
            5 => Protocol::V5,
            num => return Err(Error::InvalidProtocolLevel(num)),
        };

        let connect_flags = packet::read_u8(&mut stream)?;
        let clean_session = (connect_flags & 0b10) != 0;
        let keep_alive = packet::read_u16(&mut stream)?;

        let properties = match protocol {
            Protocol::V5 => {
                let mut block = packet::read_block(&mut stream)?;
                let properties = ConnectProperties::read(&mut block);
                (!properties.is_empty()).then_some(properties)
            }
            Protocol::V4 => None,
        };

        let client_id = packet::read_string(&mut stream)?;
        let last_will = LastWill::read(connect_flags, &mut stream, protocol)?;
        let login = Login::read(connect_flags, &mut stream)?;

        Ok(Connect {
            protocol,
            keep_alive,
            client_id,
            clean_session,
            last_will,
            login,
            properties,
        })
    }
}

/// 遗嘱设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    /// 遗嘱发送的目标主题
    pub topic: String,
    // 遗嘱消息
    pub message: Bytes,
    /// 服务质量
    pub qos: QoS,
    /// 消息保留
    pub retain: bool,
}

impl LastWill {
    fn read(connect_flags: u8, stream: &mut Bytes, protocol: Protocol) -> Result<Option<LastWill>, Error> {
        let last_will = match connect_flags & 0b100 {
            0 if (connect_flags & 0b0011_1000) != 0 => {
                return Err(Error::IncorrectPacketFormat);
            }
            0 => None,
            _ => {
                if protocol == Protocol::V5 {
                    // 跳过遗嘱属性块
                    packet::read_block(stream)?;
                }
                Some(LastWill {
                    topic: packet::read_string(stream)?,
                    message: packet::read_bytes(stream)?,
                    qos: QoS::try_from((connect_flags & 0b11000) >> 3)?,
                    retain: (connect_flags & 0b0010_0000) != 0,
                })
            }
        };

        Ok(last_will)
    }
}

/// 登录凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
}

impl Login {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<Login>, Error> {
        let username = match connect_flags & 0b1000_0000 {
            0 => None,
            _ => Some(packet::read_string(stream)?),
        };

        let password = match connect_flags & 0b0100_0000 {
            0 => None,
            _ => Some(packet::read_string(stream)?),
        };

        let login = match (&username, &password) {
            (None, None) => None,
            _ => Some(Login {
                username: username.unwrap_or_default(),
                password: password.unwrap_or_default(),
            }),
        };

        Ok(login)
    }
}

/// connect 报文的 v5 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: Option<u16>,
}

impl ConnectProperties {
    pub fn is_empty(&self) -> bool {
        self.session_expiry_interval.is_none()
            && self.receive_maximum.is_none()
            && self.maximum_packet_size.is_none()
            && self.topic_alias_maximum.is_none()
    }

    fn len(&self) -> usize {
        let mut len = 0;

        if self.session_expiry_interval.is_some() {
            len += 1 + 4;
        }

        if self.receive_maximum.is_some() {
            len += 1 + 2;
        }

        if self.maximum_packet_size.is_some() {
            len += 1 + 4;
        }

        if self.topic_alias_maximum.is_some() {
            len += 1 + 2;
        }

        len
    }

    fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        packet::write_remaining_length(stream, self.len())?;

        if let Some(session_expiry_interval) = self.session_expiry_interval {
            stream.put_u8(PropertyType::SessionExpiryInterval as u8);
            stream.put_u32(session_expiry_interval);
        }

        if let Some(receive_maximum) = self.receive_maximum {
            stream.put_u8(PropertyType::ReceiveMaximum as u8);
            stream.put_u16(receive_maximum);
        }

        if let Some(maximum_packet_size) = self.maximum_packet_size {
            stream.put_u8(PropertyType::MaximumPacketSize as u8);
            stream.put_u32(maximum_packet_size);
        }

        if let Some(topic_alias_maximum) = self.topic_alias_maximum {
            stream.put_u8(PropertyType::TopicAliasMaximum as u8);
            stream.put_u16(topic_alias_maximum);
        }

        Ok(())
    }

    fn read(block: &mut Bytes) -> Self {
        let mut properties = ConnectProperties::default();

        while !block.is_empty() {
            let prop = packet::read_u8(block).unwrap_or(0);
            match prop {
                p if p == PropertyType::SessionExpiryInterval as u8 => {
                    match packet::read_u32(block) {
                        Ok(value) => properties.session_expiry_interval = Some(value),
                        Err(_) => return properties,
                    }
                }
                p if p == PropertyType::ReceiveMaximum as u8 => match packet::read_u16(block) {
                    Ok(value) => properties.receive_maximum = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::MaximumPacketSize as u8 => match packet::read_u32(block) {
                    Ok(value) => properties.maximum_packet_size = Some(value),
                    Err(_) => return properties,
                },
                p if p == PropertyType::TopicAliasMaximum as u8 => match packet::read_u16(block) {
                    Ok(value) => properties.topic_alias_maximum = Some(value),
                    Err(_) => return properties,
                },
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

    fn roundtrip(connect: Connect) {
        let protocol = connect.protocol;
        let mut stream = BytesMut::new();
        connect.write(&mut stream).unwrap();
        let decoded = Packet::read(&mut stream, protocol).unwrap().unwrap();
        assert_eq!(decoded, Packet::Connect(connect));
    }

    #[test]
    fn v4_connect_roundtrip() {
        roundtrip(Connect {
            protocol: Protocol::V4,
            keep_alive: 30,
            client_id: "heron-1".into(),
            clean_session: true,
            last_will: Some(LastWill {
                topic: "/state".into(),
                message: Bytes::from_static(b"offline"),
                qos: QoS::AtLeastOnce,
                retain: false,
            }),
            login: Some(Login {
                username: "user".into(),
                password: "pass".into(),
            }),
            properties: None,
        });
    }

    #[test]
    fn v5_connect_roundtrip_with_properties() {
        roundtrip(Connect {
            protocol: Protocol::V5,
            keep_alive: 60,
            client_id: "heron-2".into(),
            clean_session: false,
            last_will: None,
            login: None,
            properties: Some(ConnectProperties {
                session_expiry_interval: Some(300),
                receive_maximum: Some(16),
                maximum_packet_size: Some(1024),
                topic_alias_maximum: Some(8),
            }),
        });
    }

    #[test]
    fn v5_connect_roundtrip_without_properties() {
        roundtrip(Connect {
            protocol: Protocol::V5,
            keep_alive: 0,
            client_id: "heron-3".into(),
            clean_session: true,
            last_will: Some(LastWill {
                topic: "/will".into(),
                message: Bytes::from_static(b"gone"),
                qos: QoS::ExactlyOnce,
                retain: true,
            }),
            login: None,
            properties: None,
        });
    }
}
