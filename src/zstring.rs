use crate::bits::*;
use crate::bytes::Address;
use crate::errors::RuntimeError;
use crate::mem::Memory;

// 3.5.3
// In Versions 2 to 4, the alphabet table for converting Z-characters into ZSCII character
// codes is as follows:
//
//    Z-char 6789abcdef0123456789abcdef
//   current   --------------------------
//     A0      abcdefghijklmnopqrstuvwxyz
//     A1      ABCDEFGHIJKLMNOPQRSTUVWXYZ
//     A2       ^0123456789.,!?_#'"/\-:()
//
// A2 position 0 is the escape introducing a 10-bit literal (the asterisk
// below is only a placeholder for it); position 1, the caret above, is a
// newline.
const ALPHABET_A0: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHABET_A2: &[u8; 26] = b"*\n0123456789.,!?_#'\"/\\-:()";

/// Decodes the Z-string starting at `addr`, returning the text and the
/// address of the first byte past the terminator word.
///
/// `abbreviations` is the base of the abbreviations table, or `None` while
/// already expanding an abbreviation: abbreviations do not nest, so inside
/// one, codes 1 to 3 consume their payload code and expand to nothing.
pub fn decode(
    mem: &Memory,
    addr: Address,
    abbreviations: Option<Address>,
) -> Result<(String, Address), RuntimeError> {
    // 3.2
    // Text in memory consists of a sequence of 2-byte words. Each word holds three 5-bit
    // Z-characters; the top bit is set only on the last word and so marks the end.
    let mut zchars = Vec::new();
    let mut next = addr;
    loop {
        let word = mem.get_u16(next)?;
        next = next + 2usize;
        zchars.push(word.bits(BIT10..=BIT14) as u8);
        zchars.push(word.bits(BIT5..=BIT9) as u8);
        zchars.push(word.bits(BIT0..=BIT4) as u8);
        if word.bit(BIT15) {
            break;
        }
    }

    let text = expand(mem, &zchars, abbreviations)?;
    Ok((text, next))
}

fn expand(
    mem: &Memory,
    zchars: &[u8],
    abbreviations: Option<Address>,
) -> Result<String, RuntimeError> {
    let mut out = String::new();
    let mut alphabet = 0;
    let mut i = 0;
    while i < zchars.len() {
        let zchar = zchars[i];
        i += 1;
        match zchar {
            // 3.5.1
            // Z-character 0 is printed as a space.
            0 => out.push(' '),
            // 3.3
            // In Versions 3 and later, Z-characters 1, 2 and 3 represent abbreviations: if z is
            // the first Z-character (1, 2 or 3) and x the subsequent one, then the interpreter
            // must look up entry 32(z-1)+x in the abbreviations table.
            1..=3 => {
                let payload = match zchars.get(i) {
                    Some(&payload) => payload,
                    None => break, // terminator fell mid-abbreviation
                };
                i += 1;
                if let Some(table) = abbreviations {
                    let entry = table + (32 * (zchar as usize - 1) + payload as usize) * 2;
                    let packed = mem.get_u16(entry)?;
                    let target = Address::from_packed_address(packed);
                    // 3.3.1
                    // Abbreviation string-printing may not itself use abbreviations.
                    let (expansion, _) = decode(mem, target, None)?;
                    out.push_str(&expansion);
                }
            }
            // 3.2.3
            // Z-characters 4 and 5 are shift characters, changing the alphabet for the next
            // Z-character only.
            4 => {
                alphabet = 1;
                continue;
            }
            5 => {
                alphabet = 2;
                continue;
            }
            // 3.4
            // Z-character 6 from A2 means that the two subsequent Z-characters specify a
            // ten-bit ZSCII character code: the next Z-character gives the top 5 bits and the
            // one after the bottom 5.
            6 if alphabet == 2 => {
                if i + 1 >= zchars.len() {
                    break;
                }
                let code = ((zchars[i] as u16) << 5) | zchars[i + 1] as u16;
                i += 2;
                out.push((code as u8) as char);
            }
            _ => {
                let table = match alphabet {
                    0 => ALPHABET_A0,
                    1 => ALPHABET_A1,
                    _ => ALPHABET_A2,
                };
                out.push(table[zchar as usize - 6] as char);
            }
        }
        alphabet = 0;
    }
    Ok(out)
}

/// Encodes a (lowercased) word into the canonical 4-byte version 3
/// dictionary key.
///
/// 3.7
/// When an interpreter is encoding text typed by the player to match against dictionary
/// words, the text is truncated to 6 Z-characters and padded out with 5's.
pub fn encode_word(word: &[u8]) -> [u8; 4] {
    let mut zchars = Vec::with_capacity(6);
    for &ch in word.iter().take(6) {
        if ch == b' ' {
            zchars.push(0);
        } else if let Some(pos) = ALPHABET_A0.iter().position(|&a| a == ch) {
            zchars.push(6 + pos as u8);
        } else if let Some(pos) = ALPHABET_A2.iter().position(|&a| a == ch) {
            zchars.push(5);
            zchars.push(6 + pos as u8);
        }
        // anything else is dropped
    }
    zchars.resize(6.max(zchars.len()), 5);

    let mut key = [0; 4];
    for i in 0..2 {
        let word = ((zchars[3 * i] as u16) << 10)
            | ((zchars[3 * i + 1] as u16) << 5)
            | zchars[3 * i + 2] as u16;
        key[2 * i] = (word >> 8) as u8;
        key[2 * i + 1] = (word & 0xff) as u8;
    }
    key[2] |= 0b1000_0000; // end bit on the second word
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::Bytes;
    use crate::header::Header;

    fn memory_with(addr: usize, data: &[u8]) -> Memory {
        let mut image = vec![0u8; 0x800];
        image[0x00] = 3;
        image[0x04] = 0x07; // high memory
        image[0x0e] = 0x07; // static memory
        image[addr..addr + data.len()].copy_from_slice(data);
        let bytes = Bytes::from(image);
        let header = Header::new(&bytes).unwrap();
        Memory::new(bytes, &header)
    }

    fn decode_at(mem: &Memory, addr: usize) -> String {
        decode(mem, Address::from_index(addr), None).unwrap().0
    }

    #[test]
    fn test_decode_lowercase() {
        // "hello": h=13 e=10 l=17 / l=17 o=20 pad=5, end bit on second word
        let mem = memory_with(0x100, &[0x35, 0x51, 0xc6, 0x85]);
        let (text, next) = decode(&mem, Address::from_index(0x100), None).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(next, Address::from_index(0x104));
    }

    #[test]
    fn test_decode_shifts_last_one_character() {
        // 4 shifts to A1 for the next character only
        let words = pack(&[6, 4, 7, 0, 8, 5]);
        let mem = memory_with(0x100, &words);
        assert_eq!(decode_at(&mem, 0x100), "aB c");
    }

    #[test]
    fn test_decode_a2_punctuation_and_newline() {
        // 5 shifts to A2: position 18 is '.', position 7 is newline
        let words = pack(&[5, 18, 5, 7, 7, 5]);
        let mem = memory_with(0x100, &words);
        assert_eq!(decode_at(&mem, 0x100), ".\nb");
    }

    #[test]
    fn test_decode_ten_bit_literal() {
        // 5 6 introduces a literal: '%' is 0x25 = (1 << 5) | 5
        let words = pack(&[5, 6, 1, 5, 5, 5]);
        let mem = memory_with(0x100, &words);
        assert_eq!(decode_at(&mem, 0x100), "%");
    }

    #[test]
    fn test_abbreviation_expansion_does_not_nest() {
        let mut image = vec![0u8; 0x800];
        image[0x00] = 3;
        image[0x04] = 0x07;
        image[0x0e] = 0x07;
        image[0x18] = 0x02; // abbreviations table at 0x0200

        // abbreviation 0 points at "ab" stored at 0x0300 (packed 0x0180),
        // which itself starts with an abbreviation code that must not expand
        image[0x200] = 0x01;
        image[0x201] = 0x80;
        let inner = pack(&[1, 0, 6, 7, 5, 5]);
        image[0x300..0x300 + inner.len()].copy_from_slice(&inner);

        // main string: abbreviation 1/0, then "c"
        let main = pack(&[1, 0, 8, 5, 5, 5]);
        image[0x100..0x100 + main.len()].copy_from_slice(&main);

        let bytes = Bytes::from(image);
        let header = Header::new(&bytes).unwrap();
        let mem = Memory::new(bytes, &header);

        let (text, _) = decode(
            &mem,
            Address::from_index(0x100),
            Some(Address::from_index(0x200)),
        )
        .unwrap();
        assert_eq!(text, "abc");
    }

    #[test]
    fn test_encode_simple_word() {
        // "open": o=20 p=21 e=10 n=19 padded with 5 5
        let key = encode_word(b"open");
        assert_eq!(key, [0x52, 0xaa, 0xcc, 0xa5]);
    }

    #[test]
    fn test_encode_truncates_to_six() {
        assert_eq!(encode_word(b"mailbox"), encode_word(b"mailbo"));
        assert_ne!(encode_word(b"mailbo"), encode_word(b"mailb"));
    }

    #[test]
    fn test_encode_punctuation_uses_a2_shift() {
        // ',' is A2 position 13: shift 5 then 19, padded
        let key = encode_word(b",");
        let expected = pack(&[5, 19, 5, 5, 5, 5]);
        assert_eq!(&key[..], &expected[..]);
    }

    #[test]
    fn test_encode_drops_unmapped_characters() {
        assert_eq!(encode_word(b"a;b"), encode_word(b"ab"));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        for word in ["sword", "go", "lantern", "x"] {
            let key = encode_word(word.as_bytes());
            let mem = memory_with(0x100, &key);
            let decoded = decode_at(&mem, 0x100);
            let len = word.len().min(6);
            assert_eq!(&decoded[..len], &word[..len]);
        }
    }

    // packs z-characters three to a word, end bit on the last word
    fn pack(zchars: &[u8]) -> Vec<u8> {
        assert!(zchars.len() % 3 == 0);
        let mut out = Vec::new();
        for (i, triple) in zchars.chunks(3).enumerate() {
            let mut word = ((triple[0] as u16) << 10) | ((triple[1] as u16) << 5) | triple[2] as u16;
            if i == zchars.len() / 3 - 1 {
                word |= 0x8000;
            }
            out.push((word >> 8) as u8);
            out.push((word & 0xff) as u8);
        }
        out
    }
}
