use crate::bits::*;
use crate::bytes::{Address, Bytes};
use crate::dict::DictionaryTable;
use crate::errors::{FormatError, RuntimeError};
use crate::header::{Header, FLAGS_1};
use crate::instr::{Opcode, OperandCount, OperandType};
use crate::mem::Memory;
use crate::obj::{Attribute, Object, ObjectRef, ObjectTable, Property};
use crate::platform::Platform;
use crate::random::Random;
use crate::save::Snapshot;
use crate::stack::{Stack, STACK_SIZE};
use crate::zstring;
use log::{debug, trace};
use std::cell::RefCell;
use std::rc::Rc;

/// The machine itself: fetches at the program counter, dispatches to the
/// opcode bodies, and owns every piece of mutable state. All input and
/// output goes through the platform it is handed at construction.
pub struct ZMachine<'a> {
    platform: &'a mut dyn Platform,
    story_file: Bytes,
    mem: Rc<RefCell<Memory>>,
    header: Header,
    stack: Stack,
    pc: Address,
    random: Random,
    objs: ObjectTable,
    dict: DictionaryTable,
    running: bool,
}

impl<'a> ZMachine<'a> {
    pub fn new(platform: &'a mut dyn Platform, story: Vec<u8>) -> Result<ZMachine<'a>, FormatError> {
        let story_file = Bytes::from(story);
        let header = Header::new(&story_file)?;
        debug!(
            "loaded version {} story, release {} serial {} ({} bytes)",
            header.version,
            header.release,
            header.serial_string(),
            story_file.len()
        );

        let mem = Rc::new(RefCell::new(Memory::new(story_file.clone(), &header)));
        let objs = ObjectTable::new(mem.clone(), header.objects)?;
        let dict = DictionaryTable::new(mem.clone(), header.dictionary)?;

        let mut z = ZMachine {
            platform,
            story_file,
            pc: header.initial_pc,
            header,
            mem,
            stack: Stack::new(),
            random: Random::new(),
            objs,
            dict,
            running: true,
        };
        z.reset_flags().expect("header flags are always writable");
        Ok(z)
    }

    /// Runs until the story quits. A returned error is a machine fault; the
    /// story cannot catch it.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.running {
            self.step()?;
        }
        Ok(())
    }

    /// Decodes and executes a single instruction.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        let start_addr = self.pc;
        let opcode_byte = self.next_u8()?;
        // 4.3
        // If the top two bits of the opcode are $$11 the form is variable; if $$10, the
        // form is short. Otherwise, the form is long.
        match opcode_byte.bits(BIT6..=BIT7) {
            0b11 => {
                // 4.3.3
                // In variable form, if bit 5 is 0 then the count is 2OP; if it is 1, then
                // the count is VAR. The opcode number is given in the bottom 5 bits.
                let number = opcode_byte.bits(BIT0..=BIT4);
                let types = self.next_u8()?;
                let operands = self.consume_var_operands(types)?;
                let opcode = if opcode_byte.bit(BIT5) {
                    Opcode::from_var(number)
                        .ok_or(RuntimeError::UnknownOpcode(OperandCount::Var, number, start_addr))?
                } else {
                    Opcode::from_2op(number)
                        .ok_or(RuntimeError::UnknownOpcode(OperandCount::Two, number, start_addr))?
                };
                self.execute(start_addr, opcode, &operands)
            }
            0b10 => {
                // 4.3.1
                // In short form, bits 4 and 5 of the opcode byte give an operand type. If
                // this is $11 then the operand count is 0OP; otherwise, 1OP. In either case
                // the opcode number is given in the bottom 4 bits.
                let number = opcode_byte.bits(BIT0..=BIT3);
                match OperandType::from_bits(opcode_byte.bits(BIT4..=BIT5)) {
                    OperandType::Omitted => {
                        let opcode = Opcode::from_0op(number).ok_or(
                            RuntimeError::UnknownOpcode(OperandCount::Zero, number, start_addr),
                        )?;
                        self.execute(start_addr, opcode, &[])
                    }
                    operand_type => {
                        let operand = self.consume_operand(operand_type)?;
                        let opcode = Opcode::from_1op(number).ok_or(
                            RuntimeError::UnknownOpcode(OperandCount::One, number, start_addr),
                        )?;
                        self.execute(start_addr, opcode, &[operand])
                    }
                }
            }
            _ => {
                // 4.3.2
                // In long form the operand count is always 2OP. Bit 6 gives the type of the
                // first operand, bit 5 of the second: 0 means a small constant, 1 a
                // variable. The opcode number is given in the bottom 5 bits.
                let number = opcode_byte.bits(BIT0..=BIT4);
                let first = self.consume_operand(long_operand_type(opcode_byte.bit(BIT6)))?;
                let second = self.consume_operand(long_operand_type(opcode_byte.bit(BIT5)))?;
                let opcode = Opcode::from_2op(number)
                    .ok_or(RuntimeError::UnknownOpcode(OperandCount::Two, number, start_addr))?;
                self.execute(start_addr, opcode, &[first, second])
            }
        }
    }

    // fetching at the program counter

    fn next_u8(&mut self) -> Result<u8, RuntimeError> {
        let byte = self.mem.borrow().get_u8(self.pc)?;
        self.pc = self.pc + 1usize;
        Ok(byte)
    }

    fn next_u16(&mut self) -> Result<u16, RuntimeError> {
        let word = self.mem.borrow().get_u16(self.pc)?;
        self.pc = self.pc + 2usize;
        Ok(word)
    }

    // operands

    fn consume_operand(&mut self, operand_type: OperandType) -> Result<u16, RuntimeError> {
        match operand_type {
            OperandType::LargeConstant => self.next_u16(),
            OperandType::SmallConstant => Ok(self.next_u8()? as u16),
            // 4.2.3
            // The type 'Variable' means "variable by value": the byte names the variable
            // whose value is the operand. Reading variable 0 pops the stack.
            OperandType::Variable => {
                let var = self.next_u8()?;
                self.variable_value(var)
            }
            OperandType::Omitted => unreachable!("omitted operands are never consumed"),
        }
    }

    fn consume_var_operands(&mut self, types: u8) -> Result<Vec<u16>, RuntimeError> {
        // 4.4.3
        // In variable form, a byte of 4 operand types is given: bits 6 and 7 are the first
        // field, bits 0 and 1 the fourth. Once one type has been given as 'omitted', all
        // subsequent ones are too.
        let mut operands = Vec::with_capacity(4);
        for &start_bit in &[BIT6, BIT4, BIT2, BIT0] {
            match OperandType::from_bits(types.bits(start_bit..=start_bit + 1)) {
                OperandType::Omitted => break,
                operand_type => operands.push(self.consume_operand(operand_type)?),
            }
        }
        Ok(operands)
    }

    // the variable namespace
    //
    // 4.2.2
    // Variable number $00 refers to the top of the stack, $01 to $0f mean the local
    // variables of the current routine and $10 to $ff mean the global variables.

    fn variable_value(&mut self, var: u8) -> Result<u16, RuntimeError> {
        match var {
            0 => self.stack.pop(),
            1..=15 => self.stack.local(var),
            _ => self.global_value(var),
        }
    }

    fn set_variable(&mut self, var: u8, value: u16) -> Result<(), RuntimeError> {
        match var {
            0 => self.stack.push(value),
            1..=15 => self.stack.set_local(var, value),
            _ => self.set_global(var, value),
        }
    }

    /// Like `variable_value`, but reading variable 0 peeks instead of
    /// popping. Used by the `load` opcode and the in-place modifications of
    /// inc/dec: those treat the stack top as a slot, not a queue.
    fn variable_in_place(&mut self, var: u8) -> Result<u16, RuntimeError> {
        match var {
            0 => self.stack.peek_top(),
            _ => self.variable_value(var),
        }
    }

    /// Like `set_variable`, but writing variable 0 replaces the top cell
    /// instead of pushing. Used by the `store` opcode and inc/dec.
    fn set_variable_in_place(&mut self, var: u8, value: u16) -> Result<(), RuntimeError> {
        match var {
            0 => self.stack.poke_top(value),
            _ => self.set_variable(var, value),
        }
    }

    fn global_value(&self, var: u8) -> Result<u16, RuntimeError> {
        self.mem.borrow().get_u16(self.global_addr(var))
    }

    fn set_global(&mut self, var: u8, value: u16) -> Result<(), RuntimeError> {
        let addr = self.global_addr(var);
        self.mem.borrow_mut().write_u16(addr, value)
    }

    fn global_addr(&self, var: u8) -> Address {
        self.header.globals + (var as usize - 16) * 2
    }

    // store and branch
    //
    // Both trail the instruction and are consumed by the opcode body, not
    // the decoder; the call protocol depends on the store byte still being
    // unconsumed when a routine returns.

    fn store(&mut self, value: u16) -> Result<(), RuntimeError> {
        let var = self.next_u8()?;
        self.set_variable(var, value)
    }

    fn branch(&mut self, condition: bool) -> Result<(), RuntimeError> {
        // 4.7
        // If bit 7 of the first branch byte is 0, a branch occurs when the condition was
        // false; if 1, then branch is on true. If bit 6 is set, the branch occupies 1 byte
        // only with the offset in the bottom 6 bits; if clear, the offset is a signed
        // 14-bit number in the bottom 6 bits followed by all 8 of the second byte.
        let first = self.next_u8()?;
        let on_true = first.bit(BIT7);
        let offset = if first.bit(BIT6) {
            first.bits(BIT0..=BIT5) as i16
        } else {
            let second = self.next_u8()?;
            let mut raw = ((first.bits(BIT0..=BIT5) as u16) << 8) | second as u16;
            if raw.bit(BIT13) {
                raw |= 0xc000; // sign-extend the 14-bit offset
            }
            raw as i16
        };

        if condition != on_true {
            return Ok(());
        }
        match offset {
            // 4.7.1
            // An offset of 0 means "return false from the current routine", and 1 means
            // "return true from the current routine".
            0 => self.do_return(0),
            1 => self.do_return(1),
            // 4.7.2
            // Otherwise, execution moves to "address after branch data + offset - 2".
            _ => {
                self.pc = self.pc + (offset as i32 - 2);
                Ok(())
            }
        }
    }

    // call and return
    //
    // 6.4
    // Routine calls preserve local variables and the stack (except when the return value is
    // stored in a local variable or onto the top of the stack). The store byte of a call is
    // deliberately left unconsumed until the matching return: the return address pushed
    // here points at it, making every call a store opcode that resolves lazily.

    fn do_call(&mut self, operands: &[u16]) -> Result<(), RuntimeError> {
        let packed = operand(operands, 0)?;
        // 6.4.3
        // A routine call to packed address 0 does nothing and returns false.
        if packed == 0 {
            return self.store(0);
        }

        let routine = Address::from_packed_address(packed);
        if routine.index() >= self.mem.borrow().len() {
            return Err(RuntimeError::CallOutsideStory(routine));
        }

        // 5.2
        // A routine begins with one byte indicating the number of local variables it has
        // (between 0 and 15 inclusive), followed by that many default values.
        let num_locals = self.mem.borrow().get_u8(routine)?;
        if num_locals > 15 {
            return Err(RuntimeError::NotARoutine(routine, num_locals));
        }

        self.stack.push_frame(self.pc.index() as u32, num_locals)?;
        for k in 1..=num_locals as usize {
            let value = match operands.get(k) {
                Some(&arg) => arg,
                None => self.mem.borrow().get_u16(routine + 1 + (k - 1) * 2)?,
            };
            self.stack.push(value)?;
        }
        self.pc = routine + 1 + 2 * num_locals as usize;
        Ok(())
    }

    fn do_return(&mut self, value: u16) -> Result<(), RuntimeError> {
        let return_pc = self.stack.pop_frame()?;
        self.pc = Address::from_index(return_pc as usize);
        // consume the caller's store byte, pending since the call
        self.store(value)
    }

    // dispatch

    fn execute(&mut self, start_addr: Address, opcode: Opcode, operands: &[u16]) -> Result<(), RuntimeError> {
        trace!("{}: {:?} {:?}", start_addr, opcode, operands);

        // je is the only 2OP that may legally carry more than two operands
        // (assembled in variable form); everything else dispatches on fixed
        // positions.
        match opcode {
            // 0OP
            Opcode::Rtrue => self.do_return(1),
            Opcode::Rfalse => self.do_return(0),
            Opcode::Print => self.op_print(),
            Opcode::PrintRet => {
                self.op_print()?;
                self.platform.print("\n");
                self.do_return(1)
            }
            Opcode::Nop => Ok(()),
            Opcode::Save => self.op_save(),
            Opcode::Restore => self.op_restore(),
            Opcode::Restart => self.op_restart(),
            Opcode::RetPopped => {
                let value = self.stack.pop()?;
                self.do_return(value)
            }
            Opcode::Pop => {
                self.stack.pop()?;
                Ok(())
            }
            Opcode::Quit => {
                self.running = false;
                self.platform.flush();
                Ok(())
            }
            Opcode::NewLine => {
                self.platform.print("\n");
                Ok(())
            }
            // 8.2
            // show_status would redraw the status line; a teletype has none.
            Opcode::ShowStatus => Ok(()),
            Opcode::Verify => self.branch(true),

            // 1OP
            Opcode::Jz => {
                let a = operand(operands, 0)?;
                self.branch(a == 0)
            }
            Opcode::GetSibling => {
                let sibling = self.obj(operand(operands, 0)?)?.sibling()?;
                self.store(sibling.number())?;
                self.branch(!sibling.is_null())
            }
            Opcode::GetChild => {
                let child = self.obj(operand(operands, 0)?)?.child()?;
                self.store(child.number())?;
                self.branch(!child.is_null())
            }
            Opcode::GetParent => {
                let parent = self.obj(operand(operands, 0)?)?.parent()?;
                self.store(parent.number())
            }
            Opcode::GetPropLen => {
                let a = operand(operands, 0)?;
                let value = if a == 0 {
                    0
                } else {
                    let size_byte = self.mem.borrow().get_u8(Address::from_index(a as usize - 1))?;
                    (size_byte >> 5) as u16 + 1
                };
                self.store(value)
            }
            Opcode::Inc => self.add_to_variable(operand(operands, 0)?, 1).map(|_| ()),
            Opcode::Dec => self.add_to_variable(operand(operands, 0)?, -1).map(|_| ()),
            Opcode::PrintAddr => {
                let addr = Address::from_byte_address(operand(operands, 0)?);
                if !self.mem.borrow().is_dynamic_or_static(addr) {
                    return Err(RuntimeError::ReadOutsideStatic(addr));
                }
                self.print_zstring_at(addr)
            }
            Opcode::RemoveObj => self.obj(operand(operands, 0)?)?.remove_from_parent(),
            Opcode::PrintObj => {
                let name = self.obj(operand(operands, 0)?)?.name(self.header.abbreviations)?;
                self.platform.print(&name);
                Ok(())
            }
            Opcode::Ret => self.do_return(operand(operands, 0)?),
            Opcode::Jump => {
                // jump is unconditional and carries no branch byte; the
                // offset is an ordinary signed operand
                let offset = operand(operands, 0)? as i16;
                self.pc = self.pc + (offset as i32 - 2);
                Ok(())
            }
            Opcode::PrintPaddr => {
                let addr = Address::from_packed_address(operand(operands, 0)?);
                if !self.mem.borrow().is_high(addr) {
                    return Err(RuntimeError::PrintOutsideHigh(addr));
                }
                self.print_zstring_at(addr)
            }
            Opcode::Load => {
                let var = to_var(operand(operands, 0)?)?;
                let value = self.variable_in_place(var)?;
                self.store(value)
            }
            Opcode::Not => {
                let a = operand(operands, 0)?;
                self.store(!a)
            }

            // 2OP
            Opcode::Je => {
                // 2 to 4 operands: branch if the first equals any other
                let first = operand(operands, 0)?;
                let equal = operands[1..].iter().any(|&other| other == first);
                self.branch(equal)
            }
            Opcode::Jl => {
                let (a, b) = pair(opcode, operands)?;
                self.branch((a as i16) < b as i16)
            }
            Opcode::Jg => {
                let (a, b) = pair(opcode, operands)?;
                self.branch(a as i16 > b as i16)
            }
            Opcode::DecChk => {
                let (a, b) = pair(opcode, operands)?;
                let new = self.add_to_variable(a, -1)?;
                self.branch(new < b as i16)
            }
            Opcode::IncChk => {
                let (a, b) = pair(opcode, operands)?;
                let new = self.add_to_variable(a, 1)?;
                self.branch(new > b as i16)
            }
            Opcode::Jin => {
                let (a, b) = pair(opcode, operands)?;
                let parent = self.obj(a)?.parent()?;
                self.branch(parent.number() == b)
            }
            Opcode::Test => {
                let (a, b) = pair(opcode, operands)?;
                self.branch(a & b == b)
            }
            Opcode::Or => {
                let (a, b) = pair(opcode, operands)?;
                self.store(a | b)
            }
            Opcode::And => {
                let (a, b) = pair(opcode, operands)?;
                self.store(a & b)
            }
            Opcode::TestAttr => {
                let (a, b) = pair(opcode, operands)?;
                let set = self.obj(a)?.attr(Attribute::from_number(b)?)?;
                self.branch(set)
            }
            Opcode::SetAttr => {
                let (a, b) = pair(opcode, operands)?;
                self.obj(a)?.set_attr(Attribute::from_number(b)?, true)
            }
            Opcode::ClearAttr => {
                let (a, b) = pair(opcode, operands)?;
                self.obj(a)?.set_attr(Attribute::from_number(b)?, false)
            }
            Opcode::Store => {
                let (a, b) = pair(opcode, operands)?;
                let var = to_var(a)?;
                self.set_variable_in_place(var, b)
            }
            Opcode::InsertObj => {
                let (a, b) = pair(opcode, operands)?;
                let dest = Object::from_number(b);
                self.obj(a)?.insert_into(dest)
            }
            Opcode::Loadw => {
                let (a, b) = pair(opcode, operands)?;
                let addr = Address::from_index(a as usize + 2 * b as usize);
                let value = self.checked_read(addr, |mem| mem.get_u16(addr))?;
                self.store(value)
            }
            Opcode::Loadb => {
                let (a, b) = pair(opcode, operands)?;
                let addr = Address::from_index(a as usize + b as usize);
                let value = self.checked_read(addr, |mem| Ok(mem.get_u8(addr)? as u16))?;
                self.store(value)
            }
            Opcode::GetProp => {
                let (a, b) = pair(opcode, operands)?;
                let prop = to_prop(b)?;
                let value = match self.obj(a)?.prop(prop)? {
                    Some(prop_ref) => prop_ref.get()?,
                    None => self.objs.prop_default(prop)?,
                };
                self.store(value)
            }
            Opcode::GetPropAddr => {
                let (a, b) = pair(opcode, operands)?;
                let value = match self.obj(a)?.prop(to_prop(b)?)? {
                    Some(prop_ref) => prop_ref.addr().index() as u16,
                    None => 0,
                };
                self.store(value)
            }
            Opcode::GetNextProp => {
                let (a, b) = pair(opcode, operands)?;
                self.op_get_next_prop(a, b)
            }
            Opcode::Add => self.arithmetic(opcode, operands, |a, b| Ok(a.wrapping_add(b))),
            Opcode::Sub => self.arithmetic(opcode, operands, |a, b| Ok(a.wrapping_sub(b))),
            Opcode::Mul => self.arithmetic(opcode, operands, |a, b| Ok(a.wrapping_mul(b))),
            Opcode::Div => self.arithmetic(opcode, operands, |a, b| {
                if b == 0 {
                    Err(RuntimeError::DivisionByZero)
                } else {
                    Ok(a.wrapping_div(b))
                }
            }),
            Opcode::Mod => self.arithmetic(opcode, operands, |a, b| {
                if b == 0 {
                    Err(RuntimeError::DivisionByZero)
                } else {
                    // truncated division, so the result takes the sign of a
                    Ok(a.wrapping_rem(b))
                }
            }),

            // VAR
            Opcode::Call => self.do_call(operands),
            Opcode::Storew => {
                let a = operand(operands, 0)?;
                let b = operand(operands, 1)?;
                let value = operand(operands, 2)?;
                let addr = Address::from_index(a as usize + 2 * b as usize);
                self.mem.borrow_mut().write_u16(addr, value)
            }
            Opcode::Storeb => {
                let a = operand(operands, 0)?;
                let b = operand(operands, 1)?;
                let value = operand(operands, 2)?;
                let addr = Address::from_index(a as usize + b as usize);
                self.mem.borrow_mut().write_u8(addr, value as u8)
            }
            Opcode::PutProp => {
                let obj = operand(operands, 0)?;
                let prop = to_prop(operand(operands, 1)?)?;
                let value = operand(operands, 2)?;
                match self.obj(obj)?.prop(prop)? {
                    Some(mut prop_ref) => prop_ref.set(value),
                    None => Err(RuntimeError::PropertyNotFound(prop, Object::from_number(obj))),
                }
            }
            Opcode::Sread => self.op_sread(operands),
            Opcode::PrintChar => {
                let a = operand(operands, 0)?;
                // only carriage return and printable ASCII make it out
                if a == 0x0d {
                    self.platform.print("\n");
                } else if (0x20..=0x7e).contains(&a) {
                    self.platform.print(&((a as u8) as char).to_string());
                }
                Ok(())
            }
            Opcode::PrintNum => {
                let a = operand(operands, 0)? as i16;
                self.platform.print(&a.to_string());
                Ok(())
            }
            Opcode::Random => {
                let a = operand(operands, 0)? as i16;
                let value = self.do_random(a);
                self.store(value)
            }
            Opcode::Push => {
                let a = operand(operands, 0)?;
                self.stack.push(a)
            }
            Opcode::Pull => {
                let var = to_var(operand(operands, 0)?)?;
                let value = self.stack.pop()?;
                self.set_variable(var, value)
            }
            // window, stream and sound opcodes are accepted and ignored;
            // their operands were consumed by the decoder like any others
            Opcode::SplitWindow
            | Opcode::SetWindow
            | Opcode::OutputStream
            | Opcode::InputStream
            | Opcode::SoundEffect => Ok(()),
        }
    }

    // opcode bodies that don't fit on a match arm

    fn op_print(&mut self) -> Result<(), RuntimeError> {
        // 4.8
        // print and print_ret are followed by a text string; execution continues after the
        // last 2-byte word of text (the one with top bit set).
        let (text, next) = {
            let mem = self.mem.borrow();
            zstring::decode(&mem, self.pc, Some(self.header.abbreviations))?
        };
        self.pc = next;
        self.platform.print(&text);
        Ok(())
    }

    fn print_zstring_at(&mut self, addr: Address) -> Result<(), RuntimeError> {
        let (text, _) = {
            let mem = self.mem.borrow();
            zstring::decode(&mem, addr, Some(self.header.abbreviations))?
        };
        self.platform.print(&text);
        Ok(())
    }

    fn op_get_next_prop(&mut self, obj_num: u16, prop_num: u16) -> Result<(), RuntimeError> {
        let obj_ref = self.obj(obj_num)?;
        // properties are stored in descending number order, so "next" walks
        // downward and property 0 asks for the highest-numbered one
        let value = if prop_num == 0 {
            match obj_ref.props()?.next() {
                Some(first) => first?.prop().number() as u16,
                None => 0,
            }
        } else {
            let prop = to_prop(prop_num)?;
            let mut iter = obj_ref.props()?;
            loop {
                match iter.next() {
                    Some(entry) => {
                        if entry?.prop() == prop {
                            break match iter.next() {
                                Some(next) => next?.prop().number() as u16,
                                None => 0,
                            };
                        }
                    }
                    None => {
                        return Err(RuntimeError::PropertyNotFound(
                            prop,
                            Object::from_number(obj_num),
                        ))
                    }
                }
            }
        };
        self.store(value)
    }

    fn op_sread(&mut self, operands: &[u16]) -> Result<(), RuntimeError> {
        let text_addr = Address::from_byte_address(operand(operands, 0)?);
        let parse_addr = Address::from_byte_address(operand(operands, 1)?);

        let max_letters = self.mem.borrow().get_u8(text_addr)?;
        if max_letters < 3 {
            return Err(RuntimeError::TextBufferTooSmall(text_addr));
        }

        let score = self.current_score();
        let line = self.platform.read_line(score).to_lowercase();
        let input = line.trim();
        debug!("sread {:?}", input);

        // 13.6
        // The text is reduced to lower case and stored in the text buffer, terminated: byte
        // 0 of the buffer holds one less than its capacity.
        let written = (max_letters as usize - 1).min(input.len());
        {
            let mut mem = self.mem.borrow_mut();
            for (i, &byte) in input.as_bytes()[..written].iter().enumerate() {
                mem.write_u8(text_addr + 1 + i, byte)?;
            }
            mem.write_u8(text_addr + 1 + written, 0)?;
        }

        let max_words = self.mem.borrow().get_u8(parse_addr)?;
        if max_words < 1 {
            return Err(RuntimeError::ParseBufferTooSmall(parse_addr));
        }

        let tokens = self
            .dict
            .words(input.as_bytes())
            .take(max_words as usize)
            .collect::<Result<Vec<_>, _>>()?;

        // 13.6.1
        // Each parse record is 4 bytes: the dictionary address of the word (or 0), the
        // word's letter count, and its position in the text buffer.
        let mut mem = self.mem.borrow_mut();
        mem.write_u8(parse_addr + 1usize, tokens.len() as u8)?;
        for (i, token) in tokens.iter().enumerate() {
            let record = parse_addr + 2 + i * 4;
            let entry = token.addr.map_or(0, |addr| addr.index() as u16);
            mem.write_u16(record, entry)?;
            mem.write_u8(record + 2usize, token.len as u8)?;
            mem.write_u8(record + 3usize, (token.start + 1) as u8)?;
        }
        Ok(())
    }

    fn op_save(&mut self) -> Result<(), RuntimeError> {
        self.platform.print("File to save? >");
        let score = self.current_score();
        let filename = self.platform.read_line(score);

        // the captured pc still points at our own branch byte; restore
        // counts on that to resume with a true branch
        let snapshot = self.capture()?;
        let text = snapshot.to_text(self.header.release, &self.header.serial_string());
        let saved = self.platform.write_file(&filename, text.as_bytes()).is_ok();
        debug!("save to {:?}: {}", filename, saved);
        self.branch(saved)
    }

    fn op_restore(&mut self) -> Result<(), RuntimeError> {
        self.platform.print("File to restore? >");
        let score = self.current_score();
        let filename = self.platform.read_line(score);

        match self.read_snapshot(&filename) {
            Some(snapshot) => {
                debug!("restore from {:?}: pc {:05x}", filename, snapshot.pc);
                self.apply_snapshot(snapshot)?;
                self.dict.reload()?;
                let score = self.current_score();
                self.platform.prime_score(score);
                // the branch byte now at pc belongs to the save instruction
                // that wrote this file; taking it as true resumes the story
                // as if that save had just succeeded
                self.branch(true)
            }
            None => {
                debug!("restore from {:?} failed", filename);
                self.branch(false)
            }
        }
    }

    fn op_restart(&mut self) -> Result<(), RuntimeError> {
        debug!("restart");
        self.mem.borrow_mut().bytes_mut().copy_from(&self.story_file);
        self.stack.reset();
        self.pc = self.header.initial_pc;
        self.reset_flags()?;
        self.dict.reload()?;
        let score = self.current_score();
        self.platform.prime_score(score);
        Ok(())
    }

    fn capture(&self) -> Result<Snapshot, RuntimeError> {
        let mem = self.mem.borrow();
        let dynamic = mem
            .get_slice(Address::from_index(0)..mem.static_base())?
            .to_vec();
        Ok(Snapshot {
            pc: self.pc.index(),
            top: self.stack.top_index(),
            frame: self.stack.frame_index(),
            stack: self.stack.live_cells().to_vec(),
            memory: dynamic,
        })
    }

    fn read_snapshot(&mut self, filename: &str) -> Option<Snapshot> {
        let data = self.platform.read_file(filename).ok()?;
        let text = String::from_utf8(data).ok()?;
        let snapshot = Snapshot::parse(&text, self.header.release, &self.header.serial_string())?;
        // bounds the parser has no way to know
        if snapshot.memory.len() > self.header.static_base.index()
            || snapshot.stack.len() > STACK_SIZE
            || !(-1..STACK_SIZE as i32).contains(&snapshot.top)
            || !(-1..STACK_SIZE as i32).contains(&snapshot.frame)
        {
            return None;
        }
        Some(snapshot)
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<(), RuntimeError> {
        let mut mem = self.mem.borrow_mut();
        mem.bytes_mut().set_slice(Address::from_index(0), &snapshot.memory)?;
        drop(mem);
        self.stack.restore_from(&snapshot.stack, snapshot.top, snapshot.frame);
        self.pc = Address::from_index(snapshot.pc);
        Ok(())
    }

    fn do_random(&mut self, arg: i16) -> u16 {
        if arg == 0 {
            self.random.seed_unpredictably();
            0
        } else if arg < 0 {
            // seeding yields no sequence element; the next call returns 1
            self.random.seed(arg.unsigned_abs());
            0
        } else {
            self.random.next(arg as u16)
        }
    }

    /// Adds `delta` to a variable in place and yields the new value, for
    /// inc, dec, inc_chk and dec_chk.
    fn add_to_variable(&mut self, var: u16, delta: i16) -> Result<i16, RuntimeError> {
        let var = to_var(var)?;
        let value = (self.variable_in_place(var)? as i16).wrapping_add(delta);
        self.set_variable_in_place(var, value as u16)?;
        Ok(value)
    }

    fn checked_read<T>(
        &self,
        addr: Address,
        read: impl FnOnce(&Memory) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let mem = self.mem.borrow();
        if !mem.is_dynamic_or_static(addr) {
            return Err(RuntimeError::ReadOutsideStatic(addr));
        }
        read(&mem)
    }

    fn arithmetic(
        &mut self,
        opcode: Opcode,
        operands: &[u16],
        op: impl FnOnce(i16, i16) -> Result<i16, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let (a, b) = pair(opcode, operands)?;
        let result = op(a as i16, b as i16)?;
        self.store(result as u16)
    }

    fn obj(&self, num: u16) -> Result<ObjectRef, RuntimeError> {
        self.objs.obj(Object::from_number(num))
    }

    /// The signed value of the score global for score games, `None` for
    /// time games. Handed to the host so the score watcher can report
    /// changes.
    fn current_score(&self) -> Option<i16> {
        // 8.2.3.1
        // For "score games" (bit 1 of Flags 1 clear) the score is held in the second
        // global variable.
        if self.header.flags1.bit(BIT1) {
            None
        } else {
            self.global_value(17).ok().map(|value| value as i16)
        }
    }

    fn reset_flags(&mut self) -> Result<(), RuntimeError> {
        // 8.2.1/8.3
        // An interpreter unable to produce a status line or split the screen must say so in
        // Flags 1.
        let mut mem = self.mem.borrow_mut();
        let flags = mem
            .get_u8(FLAGS_1)?
            .set_bit(BIT4, true) // no status line
            .set_bit(BIT5, false) // no screen splitting
            .set_bit(BIT6, false); // fixed-pitch font
        mem.write_u8(FLAGS_1, flags)
    }
}

fn operand(operands: &[u16], index: usize) -> Result<u16, RuntimeError> {
    operands.get(index).copied().ok_or(RuntimeError::MissingOperand(index))
}

fn pair(opcode: Opcode, operands: &[u16]) -> Result<(u16, u16), RuntimeError> {
    if operands.len() != 2 {
        return Err(RuntimeError::InvalidOperandCount(opcode, operands.len()));
    }
    Ok((operands[0], operands[1]))
}

fn to_var(num: u16) -> Result<u8, RuntimeError> {
    if num <= 255 {
        Ok(num as u8)
    } else {
        Err(RuntimeError::InvalidVariable(num))
    }
}

fn to_prop(num: u16) -> Result<Property, RuntimeError> {
    if (1..=31).contains(&num) {
        Ok(Property::from_number(num as u8))
    } else {
        Err(RuntimeError::InvalidProperty(num))
    }
}

fn long_operand_type(bit: bool) -> OperandType {
    if bit {
        OperandType::Variable
    } else {
        OperandType::SmallConstant
    }
}
