use log::debug;
use std::fmt::Write;

const ITEMS_PER_ROW: usize = 40;

/// A complete capture of the mutable machine state: program counter, the
/// live stack, and dynamic memory. Serialized as line-oriented 7-bit ASCII
/// so save files survive being moved between machines.
///
/// The text shape is fixed; existing save files must keep loading:
///
/// ```text
/// releasenumber.serialcode
/// NN.SSSSSS
/// pc
/// HHHH
/// stack
/// LLLL
/// HHHH HHHH ...
/// stack.topindex
/// HHHH
/// stack.stackframeindex
/// HHHH
/// dynamicmemory
/// LLLL
/// HH HH ...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub pc: usize,
    pub top: i32,
    pub frame: i32,
    pub stack: Vec<u16>,
    pub memory: Vec<u8>,
}

impl Snapshot {
    pub fn to_text(&self, release: u16, serial: &str) -> String {
        let mut out = String::new();

        out.push_str("releasenumber.serialcode\n");
        let _ = writeln!(out, "{:02}.{}", release, serial);

        out.push_str("pc\n");
        let _ = writeln!(out, "{:04x}", self.pc);

        out.push_str("stack\n");
        let _ = writeln!(out, "{:04x}", self.stack.len());
        for (i, cell) in self.stack.iter().enumerate() {
            if i > 0 && i % ITEMS_PER_ROW == 0 {
                out.push('\n');
            }
            let _ = write!(out, "{:04x} ", cell);
        }
        out.push('\n');

        // top and frame are -1 with nothing below them; they travel as
        // their low 16 bits so the empty case reads back as ffff
        out.push_str("stack.topindex\n");
        let _ = writeln!(out, "{:04x}", self.top as u16);

        out.push_str("stack.stackframeindex\n");
        let _ = writeln!(out, "{:04x}", self.frame as u16);

        out.push_str("dynamicmemory\n");
        let _ = writeln!(out, "{:04x}", self.memory.len());
        for (i, byte) in self.memory.iter().enumerate() {
            if i > 0 && i % ITEMS_PER_ROW == 0 {
                out.push('\n');
            }
            let _ = write!(out, "{:02x} ", byte);
        }

        out
    }

    /// Parses a save file, validating it against the running story's
    /// release number and serial code. Any defect yields `None`; the caller
    /// turns that into the opcode's branch-false.
    pub fn parse(text: &str, release: u16, serial: &str) -> Option<Snapshot> {
        let lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();

        let mut pc = None;
        let mut top = None;
        let mut frame = None;
        let mut stack: Option<Vec<u16>> = None;
        let mut memory: Option<Vec<u8>> = None;

        let mut i = 0;
        while i < lines.len() {
            match lines[i] {
                "releasenumber.serialcode" => {
                    i += 1;
                    let expected = format!("{:02}.{}", release, serial);
                    if *lines.get(i)? != expected {
                        debug!("save file is for {:?}, not {}", lines.get(i), expected);
                        return None;
                    }
                }
                "pc" => {
                    i += 1;
                    pc = Some(usize::from_str_radix(lines.get(i)?, 16).ok()?);
                }
                "stack.topindex" => {
                    i += 1;
                    top = Some(u16::from_str_radix(lines.get(i)?, 16).ok()? as i16 as i32);
                }
                "stack.stackframeindex" => {
                    i += 1;
                    frame = Some(u16::from_str_radix(lines.get(i)?, 16).ok()? as i16 as i32);
                }
                "stack" => {
                    i += 1;
                    let len = usize::from_str_radix(lines.get(i)?, 16).ok()?;
                    let mut cells = Vec::with_capacity(len);
                    i = read_rows(&lines, i + 1, &mut cells, |s| {
                        u16::from_str_radix(s, 16).ok()
                    })?;
                    if cells.len() != len {
                        debug!("stack section holds {} cells, expected {}", cells.len(), len);
                        return None;
                    }
                    stack = Some(cells);
                }
                "dynamicmemory" => {
                    i += 1;
                    let len = usize::from_str_radix(lines.get(i)?, 16).ok()?;
                    let mut bytes = Vec::with_capacity(len);
                    i = read_rows(&lines, i + 1, &mut bytes, |s| {
                        u8::from_str_radix(s, 16).ok()
                    })?;
                    if bytes.len() != len {
                        debug!(
                            "dynamic memory section holds {} bytes, expected {}",
                            bytes.len(),
                            len
                        );
                        return None;
                    }
                    memory = Some(bytes);
                }
                _ => {}
            }
            i += 1;
        }

        Some(Snapshot {
            pc: pc?,
            top: top?,
            frame: frame?,
            stack: stack?,
            memory: memory?,
        })
    }
}

/// Consumes data rows starting at `start` for as long as lines parse as rows
/// of `parse_item`; returns the index of the last row consumed.
fn read_rows<T>(
    lines: &[&str],
    start: usize,
    out: &mut Vec<T>,
    parse_item: impl Fn(&str) -> Option<T>,
) -> Option<usize> {
    let mut i = start;
    while i < lines.len() {
        let mut items = lines[i].split_whitespace().peekable();
        match items.peek() {
            Some(first) if parse_item(first).is_some() => {
                for item in items {
                    out.push(parse_item(item)?);
                }
            }
            _ => break,
        }
        i += 1;
    }
    // the scanner in parse() advances past the last data row itself
    Some(i - 1)
}
