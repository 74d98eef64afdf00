//! Endian-aware byte cursors used by the table, archive and codec readers.

use std::marker::PhantomData;

use byteorder::ByteOrder;

use super::{Error, Result};

/// Bounds-checked reader over a borrowed buffer.
pub struct ByteReader<'a, E> {
    data: &'a [u8],
    pos: usize,
    _order: PhantomData<E>,
}

impl<'a, E: ByteOrder> ByteReader<'a, E> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, _order: PhantomData }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Move to an absolute position.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::UnexpectedEof(pos as u64));
        }
        self.pos = pos;
        Ok(())
    }

    /// Borrow the next `len` bytes and advance.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::UnexpectedEof(self.pos.saturating_add(len) as u64))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Read a NUL-terminated byte string (terminator consumed, not returned).
    pub fn cstring(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::UnexpectedEof(self.data.len() as u64))?;
        let out = &rest[..len];
        self.pos += len + 1;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(E::read_u16(self.take(2)?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(E::read_i16(self.take(2)?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(E::read_u32(self.take(4)?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(E::read_i32(self.take(4)?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(E::read_u64(self.take(8)?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(E::read_i64(self.take(8)?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(E::read_f32(self.take(4)?))
    }

    pub fn f64(&mut self) -> Result<f64> {
        Ok(E::read_f64(self.take(8)?))
    }

    /// Read an unsigned integer of 1, 2, 4 or 8 bytes.
    pub fn uint(&mut self, width: u8) -> Result<u64> {
        match width {
            1 => self.u8().map(u64::from),
            2 => self.u16().map(u64::from),
            4 => self.u32().map(u64::from),
            8 => self.u64(),
            _ => Err(Error::format(format!("unsupported integer width {}", width))),
        }
    }
}

/// Growable writer producing a byte vector.
pub struct ByteWriter<E> {
    buf: Vec<u8>,
    _order: PhantomData<E>,
}

impl<E: ByteOrder> Default for ByteWriter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ByteOrder> ByteWriter<E> {
    pub fn new() -> Self {
        Self { buf: Vec::new(), _order: PhantomData }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap), _order: PhantomData }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append `len` zero bytes.
    pub fn zeros(&mut self, len: usize) {
        self.buf.resize(self.buf.len() + len, 0);
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn u16(&mut self, v: u16) {
        let mut b = [0u8; 2];
        E::write_u16(&mut b, v);
        self.bytes(&b);
    }

    pub fn i16(&mut self, v: i16) {
        let mut b = [0u8; 2];
        E::write_i16(&mut b, v);
        self.bytes(&b);
    }

    pub fn u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        E::write_u32(&mut b, v);
        self.bytes(&b);
    }

    pub fn i32(&mut self, v: i32) {
        let mut b = [0u8; 4];
        E::write_i32(&mut b, v);
        self.bytes(&b);
    }

    pub fn u64(&mut self, v: u64) {
        let mut b = [0u8; 8];
        E::write_u64(&mut b, v);
        self.bytes(&b);
    }

    pub fn i64(&mut self, v: i64) {
        let mut b = [0u8; 8];
        E::write_i64(&mut b, v);
        self.bytes(&b);
    }

    pub fn f32(&mut self, v: f32) {
        let mut b = [0u8; 4];
        E::write_f32(&mut b, v);
        self.bytes(&b);
    }

    pub fn f64(&mut self, v: f64) {
        let mut b = [0u8; 8];
        E::write_f64(&mut b, v);
        self.bytes(&b);
    }

    /// Write an unsigned integer into a 1, 2, 4 or 8 byte field.
    pub fn uint(&mut self, width: u8, v: u64) -> Result<()> {
        let fits = width >= 8 || v < (1u64 << (8 * width as u32));
        if !fits {
            return Err(Error::Layout(format!("value {} does not fit in {} bytes", v, width)));
        }
        match width {
            1 => self.u8(v as u8),
            2 => self.u16(v as u16),
            4 => self.u32(v as u32),
            8 => self.u64(v),
            _ => return Err(Error::Layout(format!("unsupported integer width {}", width))),
        }
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
