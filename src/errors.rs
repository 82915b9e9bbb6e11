use crate::bytes::Address;
use crate::instr::{Opcode, OperandCount};
use crate::obj::{Object, Property};
use quick_error::quick_error;

quick_error! {
    /// Errors that make the story file unusable before a single instruction
    /// has run. These are reported once, at load time.
    #[derive(Debug)]
    pub enum FormatError {
        TooSmall(size: usize) {
            display("story file of {} bytes is smaller than the 64-byte header", size)
        }
        UnsupportedVersion(version: u8) {
            display("story file is version {}, but only version 3 is supported", version)
        }
        MemoryOverlap(static_base: Address, high_base: Address) {
            display("high memory at {} overlaps dynamic memory below {}", high_base, static_base)
        }
        LengthMismatch(stored: usize, actual: usize) {
            display("header declares {} bytes but the file holds only {}", stored, actual)
        }
        SegmentOutOfRange(addr: Address, size: usize) {
            display("memory segment boundary {} beyond the {}-byte story file", addr, size)
        }
        StaticInsideHeader(addr: Address) {
            display("static memory at {} begins inside the 64-byte header", addr)
        }
        ObjectTableOutOfRange(addr: Address) {
            display("object table at {} lies outside the story file", addr)
        }
        DictionaryOutOfRange(addr: Address) {
            display("dictionary at {} lies outside the story file", addr)
        }
    }
}

quick_error! {
    /// Fatal machine faults. Execution stops; there is no unwinding into the
    /// story. Recoverable conditions (a failed save or restore) never take
    /// this form, they surface through the opcode's branch instead.
    #[derive(Debug)]
    pub enum RuntimeError {
        StackOverflow {
            display("stack overflow")
        }
        StackUnderflow {
            display("stack underflow")
        }
        StackIndexOutOfRange(index: i32, top: i32) {
            display("stack index {} out of bounds [0..{}]", index, top)
        }
        CallStackUnderflow {
            display("return with no call frame on the stack")
        }
        NoCallFrame {
            display("local variable access with no call frame on the stack")
        }
        LocalOutOfRange(local: u8, count: u16) {
            display("local variable {} out of bounds [1..{}]", local, count)
        }
        InvalidVariable(var: u16) {
            display("variable number {} out of bounds [0..255]", var)
        }
        AddressOutOfRange(addr: Address) {
            display("address {} outside the story file", addr)
        }
        WriteOutsideDynamic(addr: Address) {
            display("write to {} outside dynamic memory", addr)
        }
        ReadOutsideStatic(addr: Address) {
            display("read from {} beyond static memory", addr)
        }
        PrintOutsideHigh(addr: Address) {
            display("packed string at {} below high memory", addr)
        }
        DivisionByZero {
            display("division by zero")
        }
        CallOutsideStory(addr: Address) {
            display("call to routine at {} outside the story file", addr)
        }
        NotARoutine(addr: Address, num_locals: u8) {
            display("routine at {} declares {} locals, at most 15 are allowed", addr, num_locals)
        }
        UnknownOpcode(count: OperandCount, number: u8, addr: Address) {
            display("unknown {:?} opcode {:#04x} at {}", count, number, addr)
        }
        InvalidOperandCount(opcode: Opcode, actual: usize) {
            display("opcode {:?} given {} operands", opcode, actual)
        }
        MissingOperand(index: usize) {
            display("operand {} omitted", index)
        }
        InvalidObject(num: u16) {
            display("object number {} out of bounds [1..255]", num)
        }
        InvalidProperty(num: u16) {
            display("property number {} out of bounds [1..31]", num)
        }
        InvalidAttribute(num: u16) {
            display("attribute number {} out of bounds [0..31]", num)
        }
        InvalidPropertySize(len: u8) {
            display("property of {} bytes, expected 1 or 2", len)
        }
        PropertyNotFound(prop: Property, obj: Object) {
            display("object {} has no property {}", obj, prop)
        }
        InsertIntoSelf(obj: Object) {
            display("insert of object {} into itself", obj)
        }
        TextBufferTooSmall(addr: Address) {
            display("text buffer at {} holds fewer than 3 bytes", addr)
        }
        ParseBufferTooSmall(addr: Address) {
            display("parse buffer at {} holds fewer than 1 word", addr)
        }
        DictionaryCorrupt {
            display("dictionary entry length smaller than 4")
        }
    }
}
