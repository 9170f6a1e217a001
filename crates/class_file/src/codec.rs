use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::{ClassFileError, Result};

type Endian = BigEndian;

/// Consuming big-endian cursor over a byte slice.
///
/// Every read pops bytes from the front and advances the position. Running
/// past the end fails with [`ClassFileError::UnexpectedEof`] carrying the
/// offset of the failed read.
pub struct Reader<'a> {
    r: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            r: Cursor::new(buf),
        }
    }

    /// Reader positioned at `offset` within `buf`.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        let mut r = Cursor::new(buf);
        r.set_position(offset as u64);
        Self { r }
    }

    pub fn position(&self) -> usize {
        self.r.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.r.get_ref().len().saturating_sub(self.position())
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.r.set_position((self.position() + n) as u64);
        Ok(())
    }

    pub fn read_u1(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.r.read_u8()?)
    }

    pub fn read_u2(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.r.read_u16::<Endian>()?)
    }

    pub fn read_u4(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.r.read_u32::<Endian>()?)
    }

    pub fn read_s1(&mut self) -> Result<i8> {
        self.ensure(1)?;
        Ok(self.r.read_i8()?)
    }

    pub fn read_s2(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.r.read_i16::<Endian>()?)
    }

    pub fn read_i4(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.r.read_i32::<Endian>()?)
    }

    pub fn read_f4(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(self.r.read_f32::<Endian>()?)
    }

    pub fn read_i8(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.r.read_i64::<Endian>()?)
    }

    pub fn read_f8(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.r.read_f64::<Endian>()?)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n)?;
        let mut bytes = vec![0u8; n];
        self.r.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    pub fn read_u2_vec(&mut self, n: usize) -> Result<Vec<u16>> {
        self.ensure(n * 2)?;
        let mut values = vec![0u16; n];
        self.r.read_u16_into::<Endian>(&mut values)?;
        Ok(values)
    }

    fn ensure(&self, wanted: usize) -> Result<()> {
        if self.remaining() < wanted {
            return Err(ClassFileError::UnexpectedEof {
                offset: self.position(),
                wanted,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

/// Decode a "modified UTF-8" string as stored in `CONSTANT_Utf8_info`.
///
/// The encoding differs from standard UTF-8 in two ways: NUL is stored as
/// `C0 80` and supplementary characters are stored as surrogate pairs, each
/// encoded in three bytes.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        if !s.contains('\u{0}') {
            return s.to_owned();
        }
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xe0 == 0xc0 && i + 1 < bytes.len() {
            units.push(((b & 0x1f) << 6) | (bytes[i + 1] as u16 & 0x3f));
            i += 2;
        } else if b & 0xf0 == 0xe0 && i + 2 < bytes.len() {
            units.push(
                ((b & 0x0f) << 12)
                    | ((bytes[i + 1] as u16 & 0x3f) << 6)
                    | (bytes[i + 2] as u16 & 0x3f),
            );
            i += 3;
        } else {
            units.push(0xfffd);
            i += 1;
        }
    }

    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod reader_tests {
    use super::*;

    #[test]
    fn it_should_read_big_endian_values() {
        let mut r = Reader::new(&[0xca, 0xfe, 0xba, 0xbe, 0x00, 0x34, 0xff]);
        assert_eq!(r.read_u4().unwrap(), 0xCAFEBABE);
        assert_eq!(r.read_u2().unwrap(), 0x34);
        assert_eq!(r.read_s1().unwrap(), -1);
        assert!(r.is_empty());
    }

    #[test]
    fn it_should_read_wide_values() {
        let mut r = Reader::new(&[
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0,
        ]);
        assert_eq!(r.read_i8().unwrap(), (1 << 32) + 2);
        assert_eq!(r.read_f8().unwrap(), 1.0);
    }

    #[test]
    fn it_should_report_the_offset_when_running_out_of_data() {
        let mut r = Reader::new(&[0x00, 0x01, 0x02]);
        r.read_u2().unwrap();
        match r.read_u4() {
            Err(ClassFileError::UnexpectedEof {
                offset,
                wanted,
                remaining,
            }) => assert_eq!((offset, wanted, remaining), (2, 4, 1)),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn it_should_start_at_an_offset() {
        let mut r = Reader::at(&[0x01, 0x02, 0x03], 1);
        assert_eq!(r.read_u1().unwrap(), 2);
        assert_eq!(r.position(), 2);
    }
}
