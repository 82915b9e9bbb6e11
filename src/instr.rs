// 14. Complete table of opcodes (the version 3 set)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // Two-operand opcodes 2OP
    Je,
    Jl,
    Jg,
    DecChk,
    IncChk,
    Jin,
    Test,
    Or,
    And,
    TestAttr,
    SetAttr,
    ClearAttr,
    Store,
    InsertObj,
    Loadw,
    Loadb,
    GetProp,
    GetPropAddr,
    GetNextProp,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // One-operand opcodes 1OP
    Jz,
    GetSibling,
    GetChild,
    GetParent,
    GetPropLen,
    Inc,
    Dec,
    PrintAddr,
    RemoveObj,
    PrintObj,
    Ret,
    Jump,
    PrintPaddr,
    Load,
    Not,
    // Zero-operand opcodes 0OP
    Rtrue,
    Rfalse,
    Print,
    PrintRet,
    Nop,
    Save,
    Restore,
    Restart,
    RetPopped,
    Pop,
    Quit,
    NewLine,
    ShowStatus,
    Verify,
    // Variable-operand opcodes VAR
    Call,
    Storew,
    Storeb,
    PutProp,
    Sread,
    PrintChar,
    PrintNum,
    Random,
    Push,
    Pull,
    SplitWindow,
    SetWindow,
    OutputStream,
    InputStream,
    SoundEffect,
}

impl Opcode {
    pub fn from_2op(number: u8) -> Option<Opcode> {
        Some(match number {
            0x01 => Opcode::Je,
            0x02 => Opcode::Jl,
            0x03 => Opcode::Jg,
            0x04 => Opcode::DecChk,
            0x05 => Opcode::IncChk,
            0x06 => Opcode::Jin,
            0x07 => Opcode::Test,
            0x08 => Opcode::Or,
            0x09 => Opcode::And,
            0x0a => Opcode::TestAttr,
            0x0b => Opcode::SetAttr,
            0x0c => Opcode::ClearAttr,
            0x0d => Opcode::Store,
            0x0e => Opcode::InsertObj,
            0x0f => Opcode::Loadw,
            0x10 => Opcode::Loadb,
            0x11 => Opcode::GetProp,
            0x12 => Opcode::GetPropAddr,
            0x13 => Opcode::GetNextProp,
            0x14 => Opcode::Add,
            0x15 => Opcode::Sub,
            0x16 => Opcode::Mul,
            0x17 => Opcode::Div,
            0x18 => Opcode::Mod,
            _ => return None,
        })
    }

    pub fn from_1op(number: u8) -> Option<Opcode> {
        Some(match number {
            0x00 => Opcode::Jz,
            0x01 => Opcode::GetSibling,
            0x02 => Opcode::GetChild,
            0x03 => Opcode::GetParent,
            0x04 => Opcode::GetPropLen,
            0x05 => Opcode::Inc,
            0x06 => Opcode::Dec,
            0x07 => Opcode::PrintAddr,
            0x09 => Opcode::RemoveObj,
            0x0a => Opcode::PrintObj,
            0x0b => Opcode::Ret,
            0x0c => Opcode::Jump,
            0x0d => Opcode::PrintPaddr,
            0x0e => Opcode::Load,
            0x0f => Opcode::Not,
            _ => return None,
        })
    }

    pub fn from_0op(number: u8) -> Option<Opcode> {
        Some(match number {
            0x00 => Opcode::Rtrue,
            0x01 => Opcode::Rfalse,
            0x02 => Opcode::Print,
            0x03 => Opcode::PrintRet,
            0x04 => Opcode::Nop,
            0x05 => Opcode::Save,
            0x06 => Opcode::Restore,
            0x07 => Opcode::Restart,
            0x08 => Opcode::RetPopped,
            0x09 => Opcode::Pop,
            0x0a => Opcode::Quit,
            0x0b => Opcode::NewLine,
            0x0c => Opcode::ShowStatus,
            0x0d => Opcode::Verify,
            _ => return None,
        })
    }

    pub fn from_var(number: u8) -> Option<Opcode> {
        Some(match number {
            0x00 => Opcode::Call,
            0x01 => Opcode::Storew,
            0x02 => Opcode::Storeb,
            0x03 => Opcode::PutProp,
            0x04 => Opcode::Sread,
            0x05 => Opcode::PrintChar,
            0x06 => Opcode::PrintNum,
            0x07 => Opcode::Random,
            0x08 => Opcode::Push,
            0x09 => Opcode::Pull,
            0x0a => Opcode::SplitWindow,
            0x0b => Opcode::SetWindow,
            0x13 => Opcode::OutputStream,
            0x14 => Opcode::InputStream,
            0x15 => Opcode::SoundEffect,
            _ => return None,
        })
    }
}

// 4.3
// Each instruction has a form (long, short or variable in version 3) and an operand count
// (0OP, 1OP, 2OP or VAR).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OperandCount {
    Zero,
    One,
    Two,
    Var,
}

// 4.2
// There are four 'types' of operand. These are often specified by a number stored in 2
// binary digits:
//
//   $$00    Large constant (0 to 65535)    2 bytes
//   $$01    Small constant (0 to 255)      1 byte
//   $$10    Variable                       1 byte
//   $$11    Omitted altogether             0 bytes
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OperandType {
    LargeConstant,
    SmallConstant,
    Variable,
    Omitted,
}

impl OperandType {
    pub fn from_bits(bits: u8) -> OperandType {
        match bits {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            0b11 => OperandType::Omitted,
            _ => panic!("2-bit value should not be equal to {:}", bits),
        }
    }
}
