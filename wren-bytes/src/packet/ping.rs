use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, FixedHeader, VarInt};

/// Ping request, sent by the client to keep the connection alive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReq;

pub(crate) mod req {
    use super::*;

    pub fn read(_fixed_header: FixedHeader, _bytes: Bytes) -> Result<PingReq, Error> {
        Ok(PingReq)
    }

    pub fn write(_packet: &PingReq, buffer: &mut BytesMut) -> Result<usize, Error> {
        buffer.put_slice(&[0xC0, 0x00]);
        Ok(2)
    }

    pub fn len(_packet: &PingReq) -> Result<VarInt, Error> {
        VarInt::new(0) // no payload
    }
}

/// Ping response, sent by the server in reply to a PINGREQ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResp;

pub(crate) mod resp {
    use super::*;

    pub fn read(_fixed_header: FixedHeader, _bytes: Bytes) -> Result<PingResp, Error> {
        Ok(PingResp)
    }

    pub fn write(_packet: &PingResp, buffer: &mut BytesMut) -> Result<usize, Error> {
        buffer.put_slice(&[0xD0, 0x00]);
        Ok(2)
    }

    pub fn len(_packet: &PingResp) -> Result<VarInt, Error> {
        VarInt::new(0) // no payload
    }
}
