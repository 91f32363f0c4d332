//! Constant literals: boxed values with their ECMA element-type tag, serialized
//! into the blob heap and attached to fields, parameters or properties through the
//! Constant table (sorted by parent).

use crate::{
    cilassembly::{CilAssembly, ConstantParent, FieldAttributes, ParamAttributes, PropertyAttributes},
    file::io::emit_le,
    metadata::signatures::ELEMENT_TYPE,
    metadata::tables::TableId,
    Result,
};

/// A compile-time constant value with its serialization tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `bool`, one byte 0/1
    Boolean(bool),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 8-bit
    I1(i8),
    /// Unsigned 8-bit
    U1(u8),
    /// Signed 16-bit
    I2(i16),
    /// Unsigned 16-bit
    U2(u16),
    /// Signed 32-bit
    I4(i32),
    /// Unsigned 32-bit
    U4(u32),
    /// Signed 64-bit
    I8(i64),
    /// Unsigned 64-bit
    U8(u64),
    /// 32-bit float
    R4(f32),
    /// 64-bit float
    R8(f64),
    /// UTF-16 string
    String(String),
    /// Null object reference (serialized as a 4-byte zero with the class tag)
    Null,
}

impl Constant {
    /// The ECMA element-type tag recorded in the Constant row.
    #[must_use]
    pub fn element_type(&self) -> u8 {
        match self {
            Constant::Boolean(_) => ELEMENT_TYPE::BOOLEAN,
            Constant::Char(_) => ELEMENT_TYPE::CHAR,
            Constant::I1(_) => ELEMENT_TYPE::I1,
            Constant::U1(_) => ELEMENT_TYPE::U1,
            Constant::I2(_) => ELEMENT_TYPE::I2,
            Constant::U2(_) => ELEMENT_TYPE::U2,
            Constant::I4(_) => ELEMENT_TYPE::I4,
            Constant::U4(_) => ELEMENT_TYPE::U4,
            Constant::I8(_) => ELEMENT_TYPE::I8,
            Constant::U8(_) => ELEMENT_TYPE::U8,
            Constant::R4(_) => ELEMENT_TYPE::R4,
            Constant::R8(_) => ELEMENT_TYPE::R8,
            Constant::String(_) => ELEMENT_TYPE::STRING,
            Constant::Null => ELEMENT_TYPE::CLASS_CONST,
        }
    }

    /// Serializes the value bytes for the blob heap.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Constant::Boolean(value) => buf.push(u8::from(*value)),
            Constant::Char(value) => emit_le(&mut buf, *value),
            Constant::I1(value) => emit_le(&mut buf, *value),
            Constant::U1(value) => buf.push(*value),
            Constant::I2(value) => emit_le(&mut buf, *value),
            Constant::U2(value) => emit_le(&mut buf, *value),
            Constant::I4(value) => emit_le(&mut buf, *value),
            Constant::U4(value) => emit_le(&mut buf, *value),
            Constant::I8(value) => emit_le(&mut buf, *value),
            Constant::U8(value) => emit_le(&mut buf, *value),
            Constant::R4(value) => emit_le(&mut buf, *value),
            Constant::R8(value) => emit_le(&mut buf, *value),
            Constant::String(value) => {
                for unit in value.encode_utf16() {
                    emit_le(&mut buf, unit);
                }
            }
            Constant::Null => emit_le(&mut buf, 0_u32),
        }
        buf
    }
}

/// One Constant row (sorted by parent coded index).
pub(crate) struct ConstantEntry {
    pub(crate) row: u32,
    pub(crate) parent: ConstantParent,
    pub(crate) element_type: u8,
    pub(crate) value_ix: u32,
}

impl CilAssembly {
    /// Attaches a constant value to a field, parameter or property.
    ///
    /// Marks the parent's HAS_DEFAULT flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the value blob cannot be added to the heap.
    pub fn add_constant(&mut self, parent: ConstantParent, value: &Constant) -> Result<()> {
        let value_ix = self.blobs.add(&value.to_bytes())?;
        let row = self.tables.add_row(TableId::Constant);
        self.constants.push(ConstantEntry {
            row,
            parent,
            element_type: value.element_type(),
            value_ix,
        });

        match parent {
            ConstantParent::Field(field) => {
                self.fields[field.index()].flags |= FieldAttributes::HAS_DEFAULT;
            }
            ConstantParent::Param(param) => {
                self.params[param.index()].flags |= ParamAttributes::HAS_DEFAULT;
            }
            ConstantParent::Property(property) => {
                self.properties[property.index()].flags |= PropertyAttributes::HAS_DEFAULT;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_tags() {
        assert_eq!(Constant::Boolean(true).element_type(), 0x02);
        assert_eq!(Constant::I4(7).element_type(), 0x08);
        assert_eq!(Constant::String("x".into()).element_type(), 0x0E);
        assert_eq!(Constant::Null.element_type(), 0x12);
    }

    #[test]
    fn serialized_bytes() {
        assert_eq!(Constant::Boolean(true).to_bytes(), [1]);
        assert_eq!(Constant::I4(-2).to_bytes(), (-2_i32).to_le_bytes());
        assert_eq!(Constant::R8(1.5).to_bytes(), 1.5_f64.to_le_bytes());
        assert_eq!(Constant::String("Hi".into()).to_bytes(), [b'H', 0, b'i', 0]);
        assert_eq!(Constant::Null.to_bytes(), [0, 0, 0, 0]);
    }
}
