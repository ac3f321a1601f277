use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use omnom::prelude::*;
use std::io::{self, Read, Write};
use strum_macros::Display;

use crate::error::{Error, Result};

/// On-wire value types of the index entries. `ArgString` and `Group` are
/// registry-only: they never appear in a stored header and resolve to a
/// concrete wire type at emit time.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, ToPrimitive, Display)]
pub enum Type {
    Null = 0,
    Char = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    String = 6,
    Bin = 7,
    StringArray = 8,
    I18nString = 9,
    ArgString = 12,
    Group = 13,
}

impl Type {
    /// Natural store alignment of the type; the encoder pads the store to
    /// this boundary before writing a value.
    pub fn alignment(self) -> u32 {
        match self {
            Type::Int16 => 2,
            Type::Int32 => 4,
            Type::Int64 => 8,
            _ => 1,
        }
    }

    pub fn from_wire(id: u32) -> Result<Self> {
        match Type::from_u32(id) {
            Some(t) if t != Type::ArgString && t != Type::Group => Ok(t),
            _ => Err(Error::Structural(format!("unknown tag type {}", id))),
        }
    }
}

/// One 16-byte index entry: tag id, wire type, store offset and count,
/// all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub tag: u32,
    pub ttype: u32,
    pub offset: u32,
    pub count: u32,
}

impl IndexEntry {
    pub const SIZE: usize = 16;

    pub fn read<R: Read>(fh: &mut R) -> io::Result<Self> {
        let tag: u32 = fh.read_be()?;
        let ttype: u32 = fh.read_be()?;
        let offset: u32 = fh.read_be()?;
        let count: u32 = fh.read_be()?;
        Ok(IndexEntry {
            tag,
            ttype,
            offset,
            count,
        })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::Structural("truncated index entry".to_string()));
        }
        let mut cursor = &bytes[..Self::SIZE];
        Ok(Self::read(&mut cursor)?)
    }

    pub fn write<W: Write>(&self, fh: &mut W) -> io::Result<()> {
        fh.write_be(self.tag)?;
        fh.write_be(self.ttype)?;
        fh.write_be(self.offset)?;
        fh.write_be(self.count)?;
        Ok(())
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0_u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.tag.to_be_bytes());
        out[4..8].copy_from_slice(&self.ttype.to_be_bytes());
        out[8..12].copy_from_slice(&self.offset.to_be_bytes());
        out[12..16].copy_from_slice(&self.count.to_be_bytes());
        out
    }
}
