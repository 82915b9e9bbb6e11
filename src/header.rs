use crate::bytes::{Address, Bytes};
use crate::errors::FormatError;

/// Address of the 'Flags 1' byte. The interpreter announces its abilities
/// here at start and restart; bit 1 is read back to tell score games from
/// time games.
pub const FLAGS_1: Address = Address::from_byte_address(0x0001);

/// Read-once projection of the fixed header fields. Populated at load; the
/// running program may rewrite flags and other dynamic-memory bytes, but the
/// values captured here are the ones from the original image.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u8,
    pub flags1: u8,
    pub release: u16,
    pub high_base: Address,
    pub initial_pc: Address,
    pub dictionary: Address,
    pub objects: Address,
    pub globals: Address,
    pub static_base: Address,
    pub serial: [u8; 6],
    pub abbreviations: Address,
    pub file_len: usize,
}

impl Header {
    pub fn new(bytes: &Bytes) -> Result<Header, FormatError> {
        // The header is 64 bytes, so that's the minimum story size.
        let size = bytes.len();
        if size < 64 {
            return Err(FormatError::TooSmall(size));
        }

        let at = |a: u16| Address::from_byte_address(a);
        let get_u8 = |a: u16| bytes.get_u8(at(a)).unwrap();
        let get_u16 = |a: u16| bytes.get_u16(at(a)).unwrap();

        let version = get_u8(0x00);
        if version != 3 {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let mut serial = [0; 6];
        serial.copy_from_slice(bytes.get_slice(at(0x12)..at(0x18)).unwrap());

        let header = Header {
            version,
            flags1: get_u8(0x01),
            release: get_u16(0x02),
            high_base: Address::from_byte_address(get_u16(0x04)),
            initial_pc: Address::from_byte_address(get_u16(0x06)),
            dictionary: Address::from_byte_address(get_u16(0x08)),
            objects: Address::from_byte_address(get_u16(0x0a)),
            globals: Address::from_byte_address(get_u16(0x0c)),
            static_base: Address::from_byte_address(get_u16(0x0e)),
            serial,
            abbreviations: Address::from_byte_address(get_u16(0x18)),
            // 11.1.6
            // The file length stored at $1a is divided by a constant to make it fit into a
            // header word; the constant is 2 for versions 1 to 3. Some early version 3 files
            // store no length at all.
            file_len: get_u16(0x1a) as usize * 2,
        };

        // 1.1
        // High memory begins at the "high memory mark" and continues to the end of the story
        // file. The bottom of high memory may overlap with the top of static memory (but not
        // with dynamic memory).
        if header.high_base < header.static_base {
            return Err(FormatError::MemoryOverlap(header.static_base, header.high_base));
        }

        // The actual file length stays authoritative for all runtime bounds;
        // the stored length is only sanity-checked here.
        if header.file_len > size {
            return Err(FormatError::LengthMismatch(header.file_len, size));
        }

        if header.static_base.index() > size {
            return Err(FormatError::SegmentOutOfRange(header.static_base, size));
        }

        // 1.1.1.1
        // Dynamic memory must contain at least the whole 64-byte header.
        if header.static_base.index() < 64 {
            return Err(FormatError::StaticInsideHeader(header.static_base));
        }

        Ok(header)
    }

    pub fn serial_string(&self) -> String {
        String::from_utf8_lossy(&self.serial).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_image() -> Vec<u8> {
        let mut image = vec![0; 0x800];
        image[0x00] = 3;
        image[0x03] = 88; // release
        image[0x04] = 0x06; // high memory at 0x0600
        image[0x06] = 0x06; // initial pc
        image[0x07] = 0x01;
        image[0x0e] = 0x04; // static memory at 0x0400
        image[0x12..0x18].copy_from_slice(b"840726");
        image[0x1a] = 0x04; // length word: 0x800 / 2
        image
    }

    #[test]
    fn test_header_fields() {
        let header = Header::new(&minimal_image().into()).unwrap();
        assert_eq!(header.version, 3);
        assert_eq!(header.release, 88);
        assert_eq!(header.serial, *b"840726");
        assert_eq!(header.initial_pc, Address::from_index(0x601));
        assert_eq!(header.static_base, Address::from_index(0x400));
        assert_eq!(header.high_base, Address::from_index(0x600));
        assert_eq!(header.file_len, 0x800);
    }

    #[test]
    fn test_rejects_wrong_version() {
        let mut image = minimal_image();
        image[0x00] = 5;
        match Header::new(&image.into()) {
            Err(FormatError::UnsupportedVersion(5)) => {}
            other => panic!("expected version error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_truncated_file() {
        let image = vec![3; 32];
        assert!(matches!(Header::new(&image.into()), Err(FormatError::TooSmall(32))));
    }

    #[test]
    fn test_rejects_overlapping_segments() {
        let mut image = minimal_image();
        image[0x04] = 0x02; // high memory below static memory
        assert!(matches!(
            Header::new(&image.into()),
            Err(FormatError::MemoryOverlap(_, _))
        ));
    }
}
