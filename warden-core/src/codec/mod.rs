//! `tokio_util` codec for framed RCON I/O.
//!
//! Frames are read "exactly N bytes": the decoder waits until the full
//! length prefix and the full declared body are buffered before it
//! yields a [`Packet`]. A stream that ends part-way through a frame is
//! reported as [`WardenError::ConnectionClosed`].

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WardenError;
use crate::packet::{LENGTH_PREFIX_SIZE, Packet, declared_length};

#[derive(Debug, Default, Clone, Copy)]
pub struct RconCodec;

impl Decoder for RconCodec {
    type Item = Packet;
    type Error = WardenError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let header: [u8; LENGTH_PREFIX_SIZE] = [src[0], src[1], src[2], src[3]];
        let length = declared_length(header)?;
        let total = LENGTH_PREFIX_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let body = src.split_to(length);
        Packet::decode(header, &body).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(packet) => Ok(Some(packet)),
            None if buf.is_empty() => Ok(None),
            None => Err(WardenError::ConnectionClosed),
        }
    }
}

impl Encoder<Packet> for RconCodec {
    type Error = WardenError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}
