use crate::errors::RuntimeError;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Range};

/// The raw story image: an owned, mutable byte buffer with the big-endian
/// accessors everything else is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn copy_from(&mut self, other: &Bytes) {
        assert!(self.len() == other.len());
        self.0.copy_from_slice(other.as_slice());
    }

    pub fn get_u8(&self, addr: Address) -> Result<u8, RuntimeError> {
        Ok(*self
            .0
            .get(addr.index())
            .ok_or(RuntimeError::AddressOutOfRange(addr))?)
    }

    pub fn set_u8(&mut self, addr: Address, val: u8) -> Result<(), RuntimeError> {
        *self
            .0
            .get_mut(addr.index())
            .ok_or(RuntimeError::AddressOutOfRange(addr))? = val;
        Ok(())
    }

    pub fn get_u16(&self, addr: Address) -> Result<u16, RuntimeError> {
        // 2.1
        // In the Z-machine, numbers are usually stored in 2 bytes (in the form
        // most-significant-byte first, then least-significant) and hold any value in the range
        // $0000 to $ffff (0 to 65535 decimal).
        let msb = self.get_u8(addr)? as u16;
        let lsb = self.get_u8(addr + 1)? as u16;
        Ok((msb << 8) | lsb)
    }

    pub fn set_u16(&mut self, addr: Address, val: u16) -> Result<(), RuntimeError> {
        self.set_u8(addr, (val >> 8) as u8)?;
        self.set_u8(addr + 1, (val & 0xff) as u8)?;
        Ok(())
    }

    pub fn get_slice(&self, range: Range<Address>) -> Result<&[u8], RuntimeError> {
        let s = range.start.index();
        let e = range.end.index();
        if s <= self.len() && e <= self.len() {
            Ok(&self.0[s..e])
        } else {
            Err(RuntimeError::AddressOutOfRange(range.end))
        }
    }

    pub fn set_slice(&mut self, addr: Address, data: &[u8]) -> Result<(), RuntimeError> {
        let s = addr.index();
        let e = s + data.len();
        if e <= self.len() {
            self.0[s..e].copy_from_slice(data);
            Ok(())
        } else {
            Err(RuntimeError::AddressOutOfRange(addr + data.len()))
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Bytes {
        Bytes(bytes)
    }
}

// 1.2
// There are three kinds of address in the Z-machine, all of which can be stored in a 2-byte
// number: byte addresses, word addresses and packed addresses.
//
// Rather than an enum for the three kinds, they are all converted to a plain
// buffer index upon construction. Unpacked addresses can exceed 16 bits, so
// the index is a usize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Address(usize);

impl Address {
    pub const fn from_index(idx: usize) -> Address {
        Address(idx)
    }

    pub const fn from_byte_address(addr: u16) -> Address {
        // 1.2.1
        // A byte address specifies a byte in memory in the range 0 up to the last byte of static
        // memory.
        Address(addr as usize)
    }

    pub fn from_packed_address(packed: u16) -> Address {
        // 1.2.3
        // A packed address specifies where a routine or string begins in high memory. Given a
        // packed address P, the formula to obtain the corresponding byte address B is 2P in
        // versions 1 to 3.
        Address(packed as usize * 2)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl Add<usize> for Address {
    type Output = Address;
    fn add(self, offset: usize) -> Address {
        Address(self.0 + offset)
    }
}

impl Add<i32> for Address {
    type Output = Address;
    fn add(self, offset: i32) -> Address {
        Address((self.0 as i32 + offset) as usize)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}
