use crate::bytes::Address;
use crate::errors::{FormatError, RuntimeError};
use crate::mem::Memory;
use crate::zstring;
use std::cell::RefCell;
use std::rc::Rc;

/// 13.1
/// The dictionary table is held in static memory and its byte address is stored in the word
/// at $08 in the header.
///
/// The word-separator set is captured when the view is built and recomputed
/// on restart and restore, never cached across them.
pub struct DictionaryTable {
    mem: Rc<RefCell<Memory>>,
    base_addr: Address,
    separators: Vec<u8>,
}

impl DictionaryTable {
    pub fn new(mem: Rc<RefCell<Memory>>, base_addr: Address) -> Result<DictionaryTable, FormatError> {
        let separators = read_separators(&mem.borrow(), base_addr)
            .or(Err(FormatError::DictionaryOutOfRange(base_addr)))?;
        Ok(DictionaryTable {
            mem,
            base_addr,
            separators,
        })
    }

    /// Re-reads the separator set from memory after it may have changed
    /// underneath us (restart, restore).
    pub fn reload(&mut self) -> Result<(), RuntimeError> {
        self.separators = read_separators(&self.mem.borrow(), self.base_addr)?;
        Ok(())
    }

    /// Looks up a (lowercased) word, returning the address of its dictionary
    /// entry. Comparison is on the encoded 4-byte key, entry by entry.
    pub fn lookup(&self, word: &[u8]) -> Result<Option<Address>, RuntimeError> {
        let key = zstring::encode_word(word);

        // 13.2
        // The table begins with a short header: n word-separator codes, the entry length
        // (at least 4 in versions 1 to 3) and the 2-byte number of entries.
        let mem = self.mem.borrow();
        let n = mem.get_u8(self.base_addr)? as usize;
        let length_addr = self.base_addr + 1 + n;
        let entry_length = mem.get_u8(length_addr)? as usize;
        if entry_length < 4 {
            return Err(RuntimeError::DictionaryCorrupt);
        }
        let num_entries = mem.get_u16(length_addr + 1usize)? as usize;

        let mut entry_addr = length_addr + 3usize;
        for _ in 0..num_entries {
            if mem.get_slice(entry_addr..entry_addr + 4usize)? == &key[..] {
                return Ok(Some(entry_addr));
            }
            entry_addr = entry_addr + entry_length;
        }
        Ok(None)
    }

    /// Splits input into tokens and resolves each against the dictionary.
    ///
    /// 13.6.1
    /// The text is broken up into words: spaces divide up words and are otherwise ignored;
    /// word separators also divide words, but each one of them is considered a word in its
    /// own right.
    pub fn words<'a>(&'a self, text: &'a [u8]) -> WordIter<'a> {
        WordIter {
            dict: self,
            text,
            next_idx: 0,
        }
    }

    fn is_separator(&self, byte: u8) -> bool {
        self.separators.contains(&byte)
    }
}

fn read_separators(mem: &Memory, base_addr: Address) -> Result<Vec<u8>, RuntimeError> {
    let n = mem.get_u8(base_addr)? as usize;
    Ok(mem.get_slice(base_addr + 1..base_addr + 1 + n)?.to_vec())
}

pub struct WordIter<'a> {
    dict: &'a DictionaryTable,
    text: &'a [u8],
    next_idx: usize,
}

impl<'a> Iterator for WordIter<'a> {
    type Item = Result<Token, RuntimeError>;
    fn next(&mut self) -> Option<Result<Token, RuntimeError>> {
        while self.next_idx < self.text.len() && self.text[self.next_idx] == b' ' {
            self.next_idx += 1;
        }
        if self.next_idx >= self.text.len() {
            return None;
        }

        let start = self.next_idx;
        self.next_idx += 1;
        if !self.dict.is_separator(self.text[start]) {
            while self.next_idx < self.text.len() {
                let byte = self.text[self.next_idx];
                if byte == b' ' || self.dict.is_separator(byte) {
                    break;
                }
                self.next_idx += 1;
            }
        }

        let word = &self.text[start..self.next_idx];
        match self.dict.lookup(word) {
            Ok(addr) => Some(Ok(Token {
                addr,
                start,
                len: word.len(),
            })),
            Err(err) => Some(Err(err)),
        }
    }
}

/// One token of player input: where it sits in the text, how long it is and
/// the dictionary entry it resolved to, if any.
#[derive(Debug, Clone)]
pub struct Token {
    pub addr: Option<Address>,
    pub start: usize,
    pub len: usize,
}
