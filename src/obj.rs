use crate::bits::*;
use crate::bytes::Address;
use crate::errors::{FormatError, RuntimeError};
use crate::mem::Memory;
use crate::zstring;
use std::cell::RefCell;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

// 12.2
// The object table begins with the property defaults table: 31 words in versions 1 to 3.
const NUM_PROP_DEFAULTS: usize = 31;

// 12.3.1
// In versions 1 to 3 there are at most 255 objects, each having a 9-byte entry: 32
// attribute flags, parent/sibling/child object numbers held in single bytes, and the byte
// address of the property table.
const OBJ_SIZE: usize = 9;
const OFFSET_PARENT: usize = 4;
const OFFSET_SIBLING: usize = 5;
const OFFSET_CHILD: usize = 6;
const OFFSET_PROPS: usize = 7;

/// 12.1
/// The object table is held in dynamic memory and its byte address is stored in the word at
/// $0a in the header.
pub struct ObjectTable {
    mem: Rc<RefCell<Memory>>,
    prop_defaults_addr: Address,
    start_addr: Address,
}

impl ObjectTable {
    pub fn new(mem: Rc<RefCell<Memory>>, base_addr: Address) -> Result<ObjectTable, FormatError> {
        let start_addr = base_addr + NUM_PROP_DEFAULTS * 2;
        mem.borrow()
            .get_u16(start_addr)
            .or(Err(FormatError::ObjectTableOutOfRange(base_addr)))?;
        Ok(ObjectTable {
            mem,
            prop_defaults_addr: base_addr,
            start_addr,
        })
    }

    pub fn obj(&self, obj: Object) -> Result<ObjectRef, RuntimeError> {
        ObjectRef::new(self.mem.clone(), obj, self.start_addr)
    }

    pub fn prop_default(&self, prop: Property) -> Result<u16, RuntimeError> {
        // 12.2
        // When the game attempts to read the value of a property for an object which does
        // not provide that property, the n-th entry in this table is the resulting value.
        prop.check_valid()?;
        let addr = self.prop_defaults_addr + prop.index() * 2;
        self.mem.borrow().get_u16(addr)
    }
}

// 12.3
// Objects are numbered consecutively from 1 upward, with object number 0 being used to mean
// "nothing" (though there is formally no such object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Object(u16);

impl Object {
    pub fn null() -> Object {
        Object(0)
    }

    pub fn from_number(num: u16) -> Object {
        Object(num)
    }

    pub fn number(self) -> u16 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    fn index(self) -> usize {
        self.0 as usize - 1
    }

    fn check_valid(self) -> Result<(), RuntimeError> {
        if self.0 >= 1 && self.0 <= 255 {
            Ok(())
        } else {
            Err(RuntimeError::InvalidObject(self.0))
        }
    }
}

impl Display for Object {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 12.1
// Objects have variables attached called properties, numbered from 1 upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property(u8);

impl Property {
    pub fn from_number(num: u8) -> Property {
        Property(num)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize - 1
    }

    fn check_valid(self) -> Result<(), RuntimeError> {
        // The maximum property number isn't explicitly written in the standard, but follows
        // from the 5 bits of the size byte it is stored in.
        if self.0 >= 1 && self.0 <= 31 {
            Ok(())
        } else {
            Err(RuntimeError::InvalidProperty(self.0 as u16))
        }
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 12.1
// Objects also have flags attached called attributes, numbered from 0 upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute(u8);

impl Attribute {
    pub fn from_number(num: u16) -> Result<Attribute, RuntimeError> {
        if num <= 31 {
            Ok(Attribute(num as u8))
        } else {
            Err(RuntimeError::InvalidAttribute(num))
        }
    }

    fn offset(self) -> (usize, Bit) {
        // 12.3.1
        // Attributes 0 to 31 are flags and are stored topmost bit first: attribute 0 is in
        // bit 7 of the first byte, attribute 31 in bit 0 of the fourth.
        let idx = self.0 as usize;
        (idx / 8, Bit::number((7 - idx % 8) as u8))
    }
}

/// A validated handle on one object record.
#[derive(Clone)]
pub struct ObjectRef {
    mem: Rc<RefCell<Memory>>,
    obj: Object,
    base_addr: Address,
    addr: Address,
}

impl ObjectRef {
    fn new(mem: Rc<RefCell<Memory>>, obj: Object, base_addr: Address) -> Result<ObjectRef, RuntimeError> {
        obj.check_valid()?;
        let addr = base_addr + obj.index() * OBJ_SIZE;
        Ok(ObjectRef {
            mem,
            obj,
            base_addr,
            addr,
        })
    }

    pub fn parent(&self) -> Result<Object, RuntimeError> {
        Ok(Object::from_number(
            self.mem.borrow().get_u8(self.addr + OFFSET_PARENT)? as u16,
        ))
    }

    pub fn sibling(&self) -> Result<Object, RuntimeError> {
        Ok(Object::from_number(
            self.mem.borrow().get_u8(self.addr + OFFSET_SIBLING)? as u16,
        ))
    }

    pub fn child(&self) -> Result<Object, RuntimeError> {
        Ok(Object::from_number(
            self.mem.borrow().get_u8(self.addr + OFFSET_CHILD)? as u16,
        ))
    }

    pub fn attr(&self, attr: Attribute) -> Result<bool, RuntimeError> {
        let (offset, bit) = attr.offset();
        Ok(self.mem.borrow().get_u8(self.addr + offset)?.bit(bit))
    }

    pub fn set_attr(&mut self, attr: Attribute, value: bool) -> Result<(), RuntimeError> {
        let (offset, bit) = attr.offset();
        let addr = self.addr + offset;
        let byte = self.mem.borrow().get_u8(addr)?.set_bit(bit, value);
        self.mem.borrow_mut().write_u8(addr, byte)
    }

    /// Detaches the object from its parent; its own children stay with it.
    /// Detaching an already parentless object is a no-op.
    pub fn remove_from_parent(&mut self) -> Result<(), RuntimeError> {
        let parent = self.parent()?;
        if parent.is_null() {
            return Ok(());
        }

        let mut parent_ref = ObjectRef::new(self.mem.clone(), parent, self.base_addr)?;
        if parent_ref.child()? == self.obj {
            parent_ref.set_child(self.sibling()?)?;
        } else {
            // walk the sibling chain to the node just before this object
            let mut prev = parent_ref.child()?;
            while !prev.is_null() {
                let mut prev_ref = ObjectRef::new(self.mem.clone(), prev, self.base_addr)?;
                let next = prev_ref.sibling()?;
                if next == self.obj {
                    prev_ref.set_sibling(self.sibling()?)?;
                    break;
                }
                prev = next;
            }
        }
        self.set_sibling(Object::null())?;
        self.set_parent(Object::null())
    }

    /// Moves the object to become the first child of `dest`: afterwards the
    /// child of `dest` is this object and its sibling is whatever was
    /// previously the child of `dest`. Inserting an object into its current
    /// parent is a no-op; inserting it into itself is fatal.
    pub fn insert_into(&mut self, dest: Object) -> Result<(), RuntimeError> {
        if dest == self.obj {
            return Err(RuntimeError::InsertIntoSelf(self.obj));
        }
        if self.parent()? == dest {
            return Ok(());
        }

        let mut dest_ref = ObjectRef::new(self.mem.clone(), dest, self.base_addr)?;
        self.remove_from_parent()?;
        self.set_sibling(dest_ref.child()?)?;
        dest_ref.set_child(self.obj)?;
        self.set_parent(dest)
    }

    /// The object's short name, decoded from the head of its property table.
    pub fn name(&self, abbreviations: Address) -> Result<String, RuntimeError> {
        let header_addr = self.props_header_addr()?;
        let text_words = self.mem.borrow().get_u8(header_addr)?;
        if text_words == 0 {
            return Ok(String::new());
        }
        let mem = self.mem.borrow();
        let (name, _) = zstring::decode(&mem, header_addr + 1usize, Some(abbreviations))?;
        Ok(name)
    }

    pub fn prop(&self, prop: Property) -> Result<Option<PropertyRef>, RuntimeError> {
        prop.check_valid()?;
        for res in self.props()? {
            let prop_ref = res?;
            if prop_ref.prop == prop {
                return Ok(Some(prop_ref));
            }
        }
        Ok(None)
    }

    pub fn props(&self) -> Result<PropertyIterator, RuntimeError> {
        Ok(PropertyIterator {
            mem: self.mem.clone(),
            next_addr: Some(self.props_addr()?),
        })
    }

    fn props_header_addr(&self) -> Result<Address, RuntimeError> {
        Ok(Address::from_byte_address(
            self.mem.borrow().get_u16(self.addr + OFFSET_PROPS)?,
        ))
    }

    fn props_addr(&self) -> Result<Address, RuntimeError> {
        // 12.4
        // The property table header holds the text-length (the number of 2-byte words making
        // up the short name) followed by the name itself; the properties follow that.
        let header_addr = self.props_header_addr()?;
        let text_words = self.mem.borrow().get_u8(header_addr)?;
        Ok(header_addr + 1 + text_words as usize * 2)
    }

    fn set_parent(&mut self, parent: Object) -> Result<(), RuntimeError> {
        let addr = self.addr + OFFSET_PARENT;
        self.mem.borrow_mut().write_u8(addr, parent.0 as u8)
    }

    fn set_sibling(&mut self, sibling: Object) -> Result<(), RuntimeError> {
        let addr = self.addr + OFFSET_SIBLING;
        self.mem.borrow_mut().write_u8(addr, sibling.0 as u8)
    }

    fn set_child(&mut self, child: Object) -> Result<(), RuntimeError> {
        let addr = self.addr + OFFSET_CHILD;
        self.mem.borrow_mut().write_u8(addr, child.0 as u8)
    }
}

/// A located property entry: number, length and the address of its data.
#[derive(Debug, Clone)]
pub struct PropertyRef {
    mem: Rc<RefCell<Memory>>,
    prop: Property,
    data_addr: Address,
    len: u8,
}

impl PropertyRef {
    /// Reads the entry whose size byte is at `size_byte_addr`. A size byte
    /// of 0 terminates the list.
    ///
    /// 12.4.1
    /// In versions 1 to 3 each property is stored as a size byte followed by the data,
    /// where the size byte is 32 times the number of data bytes minus one, plus the
    /// property number.
    fn at(mem: Rc<RefCell<Memory>>, size_byte_addr: Address) -> Result<Option<PropertyRef>, RuntimeError> {
        let size_byte = mem.borrow().get_u8(size_byte_addr)?;
        if size_byte == 0 {
            return Ok(None);
        }
        let prop = Property::from_number(size_byte.bits(BIT0..=BIT4));
        let len = size_byte.bits(BIT5..=BIT7) + 1;
        Ok(Some(PropertyRef {
            mem,
            prop,
            data_addr: size_byte_addr + 1usize,
            len,
        }))
    }

    pub fn prop(&self) -> Property {
        self.prop
    }

    pub fn addr(&self) -> Address {
        self.data_addr
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn get(&self) -> Result<u16, RuntimeError> {
        match self.len {
            1 => Ok(self.mem.borrow().get_u8(self.data_addr)? as u16),
            2 => self.mem.borrow().get_u16(self.data_addr),
            _ => Err(RuntimeError::InvalidPropertySize(self.len)),
        }
    }

    pub fn set(&mut self, val: u16) -> Result<(), RuntimeError> {
        match self.len {
            1 => self.mem.borrow_mut().write_u8(self.data_addr, val as u8),
            2 => self.mem.borrow_mut().write_u16(self.data_addr, val),
            _ => Err(RuntimeError::InvalidPropertySize(self.len)),
        }
    }
}

/// Walks a property list in table order, which is descending property
/// number order (relied upon by get_next_prop).
pub struct PropertyIterator {
    mem: Rc<RefCell<Memory>>,
    next_addr: Option<Address>,
}

impl Iterator for PropertyIterator {
    type Item = Result<PropertyRef, RuntimeError>;
    fn next(&mut self) -> Option<Result<PropertyRef, RuntimeError>> {
        let next_addr = self.next_addr?;
        match PropertyRef::at(self.mem.clone(), next_addr) {
            Ok(Some(prop_ref)) => {
                self.next_addr = Some(prop_ref.data_addr + prop_ref.len as usize);
                Some(Ok(prop_ref))
            }
            Ok(None) => {
                self.next_addr = None;
                None
            }
            Err(err) => {
                self.next_addr = None;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::Bytes;
    use crate::header::Header;

    // Three objects; object table at 0x0200, property tables at 0x0300.
    fn test_table() -> ObjectTable {
        let mut image = vec![0u8; 0x800];
        image[0x00] = 3;
        image[0x04] = 0x06;
        image[0x06] = 0x06;
        image[0x0a] = 0x02; // object table
        image[0x0e] = 0x05;

        // default for property 5 is 0xcafe
        image[0x200 + 4 * 2] = 0xca;
        image[0x200 + 4 * 2 + 1] = 0xfe;

        let objects = 0x200 + 62;
        let entry = |n: usize| objects + (n - 1) * 9;

        // object 1: parent 0, sibling 0, child 2; attribute 0 and 17 set
        image[entry(1)] = 0x80;
        image[entry(1) + 2] = 0x40;
        image[entry(1) + 6] = 2;
        image[entry(1) + 7] = 0x03;
        image[entry(1) + 8] = 0x00;

        // object 2: parent 1, sibling 3
        image[entry(2) + 4] = 1;
        image[entry(2) + 5] = 3;
        image[entry(2) + 7] = 0x03;
        image[entry(2) + 8] = 0x20;

        // object 3: parent 1
        image[entry(3) + 4] = 1;
        image[entry(3) + 7] = 0x03;
        image[entry(3) + 8] = 0x40;

        // property table for object 1: name "box", then property 12 (2
        // bytes), property 5 (1 byte), terminator
        let props = 0x300;
        image[props] = 2; // name is two words
        let name = [0x1e, 0x9d, 0x94, 0xa5]; // b=7 o=20 x=29 / pad
        image[props + 1..props + 5].copy_from_slice(&name);
        image[props + 5] = (1 << 5) | 12;
        image[props + 6] = 0x12;
        image[props + 7] = 0x34;
        image[props + 8] = 5;
        image[props + 9] = 0xab;
        image[props + 10] = 0;

        // objects 2 and 3: empty name, no properties
        image[0x320] = 0;
        image[0x321] = 0;
        image[0x340] = 0;
        image[0x341] = 0;

        let bytes = Bytes::from(image);
        let header = Header::new(&bytes).unwrap();
        let mem = Rc::new(RefCell::new(Memory::new(bytes, &header)));
        ObjectTable::new(mem, Address::from_index(0x200)).unwrap()
    }

    fn obj(table: &ObjectTable, num: u16) -> ObjectRef {
        table.obj(Object::from_number(num)).unwrap()
    }

    #[test]
    fn test_links_and_attributes() {
        let table = test_table();
        let one = obj(&table, 1);
        assert!(one.parent().unwrap().is_null());
        assert_eq!(one.child().unwrap(), Object::from_number(2));
        assert!(one.attr(Attribute::from_number(0).unwrap()).unwrap());
        assert!(one.attr(Attribute::from_number(17).unwrap()).unwrap());
        assert!(!one.attr(Attribute::from_number(1).unwrap()).unwrap());
        assert!(Attribute::from_number(32).is_err());
    }

    #[test]
    fn test_set_attr_round_trip() {
        let table = test_table();
        let mut one = obj(&table, 1);
        let attr = Attribute::from_number(9).unwrap();
        assert!(!one.attr(attr).unwrap());
        one.set_attr(attr, true).unwrap();
        assert!(one.attr(attr).unwrap());
        one.set_attr(attr, false).unwrap();
        assert!(!one.attr(attr).unwrap());
    }

    #[test]
    fn test_remove_first_child_relinks_parent() {
        let table = test_table();
        obj(&table, 2).remove_from_parent().unwrap();
        assert!(obj(&table, 2).parent().unwrap().is_null());
        assert!(obj(&table, 2).sibling().unwrap().is_null());
        assert_eq!(obj(&table, 1).child().unwrap(), Object::from_number(3));
        // a second removal is a no-op
        obj(&table, 2).remove_from_parent().unwrap();
        assert_eq!(obj(&table, 1).child().unwrap(), Object::from_number(3));
    }

    #[test]
    fn test_remove_middle_child_relinks_sibling() {
        let table = test_table();
        obj(&table, 3).remove_from_parent().unwrap();
        assert_eq!(obj(&table, 1).child().unwrap(), Object::from_number(2));
        assert!(obj(&table, 2).sibling().unwrap().is_null());
        assert!(obj(&table, 3).parent().unwrap().is_null());
    }

    #[test]
    fn test_insert_makes_first_child() {
        let table = test_table();
        obj(&table, 3).insert_into(Object::from_number(2)).unwrap();
        assert_eq!(obj(&table, 3).parent().unwrap(), Object::from_number(2));
        assert_eq!(obj(&table, 2).child().unwrap(), Object::from_number(3));
        assert!(obj(&table, 3).sibling().unwrap().is_null());
        assert_eq!(obj(&table, 1).child().unwrap(), Object::from_number(2));

        // moving it back in front of object 2
        obj(&table, 3).insert_into(Object::from_number(1)).unwrap();
        assert_eq!(obj(&table, 1).child().unwrap(), Object::from_number(3));
        assert_eq!(obj(&table, 3).sibling().unwrap(), Object::from_number(2));
    }

    #[test]
    fn test_insert_into_self_is_fatal() {
        let table = test_table();
        assert!(matches!(
            obj(&table, 2).insert_into(Object::from_number(2)),
            Err(RuntimeError::InsertIntoSelf(_))
        ));
    }

    #[test]
    fn test_insert_into_current_parent_is_noop() {
        let table = test_table();
        obj(&table, 2).insert_into(Object::from_number(1)).unwrap();
        // sibling chain is untouched: 2 is still followed by 3
        assert_eq!(obj(&table, 1).child().unwrap(), Object::from_number(2));
        assert_eq!(obj(&table, 2).sibling().unwrap(), Object::from_number(3));
    }

    #[test]
    fn test_properties_in_descending_order() {
        let table = test_table();
        let one = obj(&table, 1);
        let nums: Vec<u8> = one
            .props()
            .unwrap()
            .map(|p| p.unwrap().prop().number())
            .collect();
        assert_eq!(nums, [12, 5]);

        let twelve = one.prop(Property::from_number(12)).unwrap().unwrap();
        assert_eq!(twelve.len(), 2);
        assert_eq!(twelve.get().unwrap(), 0x1234);

        let five = one.prop(Property::from_number(5)).unwrap().unwrap();
        assert_eq!(five.len(), 1);
        assert_eq!(five.get().unwrap(), 0xab);

        assert!(one.prop(Property::from_number(7)).unwrap().is_none());
    }

    #[test]
    fn test_property_defaults() {
        let table = test_table();
        assert_eq!(table.prop_default(Property::from_number(5)).unwrap(), 0xcafe);
        assert_eq!(table.prop_default(Property::from_number(6)).unwrap(), 0);
    }

    #[test]
    fn test_object_name() {
        let table = test_table();
        let name = obj(&table, 1).name(Address::from_index(0)).unwrap();
        assert_eq!(name, "box");
        assert_eq!(obj(&table, 2).name(Address::from_index(0)).unwrap(), "");
    }

    #[test]
    fn test_object_zero_is_invalid() {
        let table = test_table();
        assert!(matches!(
            table.obj(Object::null()),
            Err(RuntimeError::InvalidObject(0))
        ));
    }
}
