use crate::bytes::{Address, Bytes};
use crate::errors::RuntimeError;
use crate::header::Header;
use std::ops::Range;

/// The story image together with its segment boundaries.
///
/// 1.1
/// The memory map of the Z-machine is divided into three regions: "dynamic memory", "static
/// memory" and "high memory". Dynamic memory begins from byte address $00000 and runs up to
/// the byte before the byte address stored in the word at $0e in the header. Static memory
/// follows immediately on.
///
/// Reads and writes through `bytes()`/`bytes_mut()` are unchecked; the
/// `write_*` methods carry the only write policy there is, that nothing at or
/// above the static mark may change.
#[derive(Debug)]
pub struct Memory {
    bytes: Bytes,
    static_base: Address,
    high_base: Address,
}

impl Memory {
    pub fn new(bytes: Bytes, header: &Header) -> Memory {
        Memory {
            bytes,
            static_base: header.static_base,
            high_base: header.high_base,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes_mut(&mut self) -> &mut Bytes {
        &mut self.bytes
    }

    pub fn get_u8(&self, addr: Address) -> Result<u8, RuntimeError> {
        self.bytes.get_u8(addr)
    }

    pub fn get_u16(&self, addr: Address) -> Result<u16, RuntimeError> {
        self.bytes.get_u16(addr)
    }

    pub fn get_slice(&self, range: Range<Address>) -> Result<&[u8], RuntimeError> {
        self.bytes.get_slice(range)
    }

    pub fn write_u8(&mut self, addr: Address, val: u8) -> Result<(), RuntimeError> {
        if !self.is_dynamic(addr) {
            return Err(RuntimeError::WriteOutsideDynamic(addr));
        }
        self.bytes.set_u8(addr, val)
    }

    pub fn write_u16(&mut self, addr: Address, val: u16) -> Result<(), RuntimeError> {
        if !self.is_dynamic(addr) || !self.is_dynamic(addr + 1usize) {
            return Err(RuntimeError::WriteOutsideDynamic(addr));
        }
        self.bytes.set_u16(addr, val)
    }

    pub fn is_dynamic(&self, addr: Address) -> bool {
        addr < self.static_base
    }

    pub fn is_dynamic_or_static(&self, addr: Address) -> bool {
        addr < self.high_base
    }

    pub fn is_high(&self, addr: Address) -> bool {
        addr >= self.high_base
    }

    pub fn static_base(&self) -> Address {
        self.static_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_memory() -> Memory {
        let mut image = vec![0u8; 0x800];
        image[0x00] = 3;
        image[0x04] = 0x06; // high memory at 0x0600
        image[0x0e] = 0x04; // static memory at 0x0400
        let bytes = Bytes::from(image);
        let header = Header::new(&bytes).unwrap();
        Memory::new(bytes, &header)
    }

    #[test]
    fn test_segment_predicates() {
        let mem = test_memory();
        assert!(mem.is_dynamic(Address::from_index(0x3ff)));
        assert!(!mem.is_dynamic(Address::from_index(0x400)));
        assert!(mem.is_dynamic_or_static(Address::from_index(0x5ff)));
        assert!(!mem.is_dynamic_or_static(Address::from_index(0x600)));
        assert!(mem.is_high(Address::from_index(0x600)));
    }

    #[test]
    fn test_checked_writes() {
        let mut mem = test_memory();
        mem.write_u16(Address::from_index(0x100), 0xbeef).unwrap();
        assert_eq!(mem.get_u16(Address::from_index(0x100)).unwrap(), 0xbeef);
        assert!(mem.write_u8(Address::from_index(0x400), 1).is_err());
        // a word write straddling the static mark is rejected whole
        assert!(mem.write_u16(Address::from_index(0x3ff), 1).is_err());
        assert_eq!(mem.get_u8(Address::from_index(0x3ff)).unwrap(), 0);
    }
}
