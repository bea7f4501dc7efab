use crate::{reason, Error, Properties};

/// Authentication exchange
///
/// Sent from client to server or server to client as part of an extended authentication exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub code: AuthReasonCode,
    pub properties: Properties,
}

impl Auth {
    pub fn new(code: AuthReasonCode) -> Self {
        Self {
            code,
            properties: Properties::new(),
        }
    }
}

/// AUTH packet reason code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthReasonCode {
    Success = reason::SUCCESS,
    Continue = reason::CONTINUE_AUTHENTICATION,
    ReAuthenticate = reason::RE_AUTHENTICATE,
}

impl TryFrom<u8> for AuthReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            reason::SUCCESS => AuthReasonCode::Success,
            reason::CONTINUE_AUTHENTICATION => AuthReasonCode::Continue,
            reason::RE_AUTHENTICATE => AuthReasonCode::ReAuthenticate,
            num => return Err(Error::InvalidReasonCode(num)),
        };
        Ok(code)
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::Auth;
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] = &[
        PropertyType::AuthenticationMethod,
        PropertyType::AuthenticationData,
        PropertyType::ReasonString,
        PropertyType::UserProperty,
    ];

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Auth, Error> {
        let code = read_u8(&mut bytes)?;
        let properties = Properties::read(&mut bytes, ALLOWED_PROPERTIES)?;

        Ok(Auth {
            code: code.try_into()?,
            properties,
        })
    }

    pub fn write(packet: &Auth, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0xF0);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // reason code
        buffer.put_u8(packet.code as u8);
        // properties
        packet.properties.write(buffer)?;

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &Auth) -> Result<VarInt, Error> {
        let mut len = 1; // reason code

        let properties_len = packet.properties.len()?;
        len += properties_len.length() + properties_len.value();

        VarInt::new(len)
    }
}
