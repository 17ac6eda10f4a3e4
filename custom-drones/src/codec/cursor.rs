// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Byte cursors handed to payload hooks
//!
//! Both cursors carry an absolute offset into the full buffer, so a hook can
//! assert where it starts but never has to know the header size itself.

use super::header::Vec3;
use crate::error::CodecError;

/// Write cursor over a fixed-capacity buffer
pub struct PayloadWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> PayloadWriter<'a> {
    pub(crate) fn at(buf: &'a mut [u8], pos: usize) -> Self {
        PayloadWriter { buf, pos }
    }

    /// Absolute offset of the next byte to be written
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the buffer is full
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Write raw bytes at the cursor
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(CodecError::PayloadOverflow {
                offset: self.pos,
                requested: bytes.len(),
                capacity: self.buf.len(),
            });
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Write a single byte
    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.write_bytes(&[value])
    }

    /// Write a boolean as one byte (0 or 1)
    pub fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.write_u8(value as u8)
    }

    /// Write a little-endian `u32`
    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a little-endian `i32`
    pub fn write_i32(&mut self, value: i32) -> Result<(), CodecError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a little-endian `u64`
    pub fn write_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a little-endian `f32`
    pub fn write_f32(&mut self, value: f32) -> Result<(), CodecError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write three consecutive `f32` values
    pub fn write_vec3(&mut self, value: Vec3) -> Result<(), CodecError> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)
    }
}

/// Read cursor over an encoded buffer
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn at(buf: &'a [u8], pos: usize) -> Self {
        PayloadReader { buf, pos }
    }

    /// Absolute offset of the next byte to be read
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(CodecError::PayloadUnderflow {
                offset: self.pos,
                requested: len,
                len: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a boolean; any non-zero byte is `true`
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a little-endian `u32`
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `i32`
    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u64`
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `f32`
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Read three consecutive `f32` values
    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }
}
