use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, properties::PropertyType, Error, Protocol};

/// auth 报文，仅 5.0 协议支持
/// 原因码为成功且无属性时，原因码和属性块整体省略
#[derive(Debug, Clone, PartialEq)]
pub struct Auth {
    pub reason: AuthReason,
    pub properties: Option<AuthProperties>,
}

impl Default for Auth {
    fn default() -> Self {
        Auth {
            reason: AuthReason::Success,
            properties: None,
        }
    }
}

impl Auth {
    fn len(&self) -> usize {
        let mut len = 0;
        if self.has_tail() {
            let properties_len = self.properties.as_ref().map(|p| p.len()).unwrap_or(0);
            len += 1 + packet::len_len(properties_len) + properties_len;
        }
        len
    }

    fn has_tail(&self) -> bool {
        self.reason != AuthReason::Success
            || self.properties.as_ref().map(|p| !p.is_empty()).unwrap_or(false)
    }

    pub(crate) fn write(&self, stream: &mut BytesMut, protocol: Protocol) -> Result<(), Error> {
        if protocol != Protocol::V5 {
            return Err(Error::IncorrectPacketFormat);
        }

        stream.put_u8(0xF0);
        packet::write_remaining_length(stream, self.len())?;

        if self.has_tail() {
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

    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        let reason = AuthReason::try_from(packet::read_u8(&mut stream)?)?;

        let mut properties = None;
        if !stream.is_empty() {
            let mut block = packet::read_block(&mut stream)?;
            let decoded = AuthProperties::read(&mut block);
            properties = (!decoded.is_empty()).then_some(decoded);
        }

        Ok(Auth { reason, properties })
    }
}

/// auth 原因码
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReason {
    Success = 0x00,
    ContinueAuthentication = 0x18,
    ReAuthenticate = 0x19,
}

impl TryFrom<u8> for AuthReason {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => AuthReason::Success,
            0x18 => AuthReason::ContinueAuthentication,
            0x19 => AuthReason::ReAuthenticate,
            num => return Err(Error::InvalidReasonCode(num)),
        };
        Ok(code)
    }
}

/// auth 报文的 v5 属性
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthProperties {
    pub authentication_method: Option<String>,
    pub authentication_data: Option<Bytes>,
    pub reason_string: Option<String>,
    pub user_properties: HashMap<String, String>,
}

impl AuthProperties {
    pub fn is_empty(&self) -> bool {
        self.authentication_method.is_none()
            && self.authentication_data.is_none()
            && self.reason_string.is_none()
            && self.user_properties.is_empty()
    }

    fn len(&self) -> usize {
        let mut len = 0;

        if let Some(method) = &self.authentication_method {
            len += 1 + 2 + method.len();
        }

        if let Some(data) = &self.authentication_data {
            len += 1 + 2 + data.len();
        }

        if let Some(reason) = &self.reason_string {
            len += 1 + 2 + reason.len();
        }

        for (key, value) in &self.user_properties {
            len += 1 + 2 + key.len() + 2 + value.len();
        }

        len
    }

    fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        packet::write_remaining_length(stream, self.len())?;

        if let Some(method) = &self.authentication_method {
            stream.put_u8(PropertyType::AuthenticationMethod as u8);
            packet::write_string(stream, method);
        }

        if let Some(data) = &self.authentication_data {
            stream.put_u8(PropertyType::AuthenticationData as u8);
            packet::write_bytes(stream, data);
        }

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

    fn read(block: &mut Bytes) -> Self {
        let mut properties = AuthProperties::default();

        while !block.is_empty() {
            let prop = packet::read_u8(block).unwrap_or(0);
            match prop {
                p if p == PropertyType::AuthenticationMethod as u8 => {
                    match packet::read_string(block) {
                        Ok(value) => properties.authentication_method = Some(value),
                        Err(_) => return properties,
                    }
                }
                p if p == PropertyType::AuthenticationData as u8 => {
                    match packet::read_bytes(block) {
                        Ok(value) => properties.authentication_data = Some(value),
                        Err(_) => return properties,
                    }
                }
                p if p == PropertyType::ReasonString as u8 => match packet::read_string(block) {
                    Ok(value) => properties.reason_string = Some(value),
                    Err(_) => return properties,
                },
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
}

#[cfg(test)]
mod tests {
    use crate::network::packet::Packet;

    use super::*;

    #[test]
    fn success_auth_is_two_bytes() {
        let auth = Auth::default();
        let mut stream = BytesMut::new();
        auth.write(&mut stream, Protocol::V5).unwrap();
        assert_eq!(&stream[..], &[0xF0, 0x00]);
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::Auth(auth));
    }

    #[test]
    fn reauthenticate_roundtrip() {
        let auth = Auth {
            reason: AuthReason::ReAuthenticate,
            properties: Some(AuthProperties {
                authentication_method: Some("SCRAM-SHA-256".into()),
                authentication_data: Some(Bytes::from_static(b"client-first")),
                reason_string: None,
                user_properties: Default::default(),
            }),
        };
        let mut stream = BytesMut::new();
        auth.write(&mut stream, Protocol::V5).unwrap();
        let decoded = Packet::read(&mut stream, Protocol::V5).unwrap().unwrap();
        assert_eq!(decoded, Packet::Auth(auth));
    }

    #[test]
    fn auth_cannot_be_written_on_v4() {
        let auth = Auth::default();
        let mut stream = BytesMut::new();
        assert!(matches!(
            auth.write(&mut stream, Protocol::V4),
            Err(Error::IncorrectPacketFormat)
        ));
    }
}
