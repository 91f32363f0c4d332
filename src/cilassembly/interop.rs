//! Platform interop: P/Invoke implementation maps and field/parameter marshalling
//! descriptors.

use crate::{
    cilassembly::{
        CilAssembly, MarshalParent, MethodAttributes, MethodDefId, ModuleRefId,
        PInvokeAttributes, FieldAttributes, ParamAttributes,
    },
    metadata::compression::write_compressed_u32,
    metadata::tables::TableId,
    Result,
};

/// One ImplMap row (sorted by forwarded member).
pub(crate) struct ImplMapEntry {
    pub(crate) row: u32,
    pub(crate) flags: PInvokeAttributes,
    pub(crate) method: MethodDefId,
    pub(crate) import_name_ix: u32,
    pub(crate) scope: ModuleRefId,
}

/// One FieldMarshal row (sorted by parent).
pub(crate) struct FieldMarshalEntry {
    pub(crate) row: u32,
    pub(crate) parent: MarshalParent,
    pub(crate) native_type_ix: u32,
}

/// A native type descriptor for marshalling (ECMA-335 II.23.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeType {
    /// One of the simple intrinsic natives, by its NATIVE_TYPE tag byte
    Simple(u8),
    /// A fixed-length system string (`NATIVE_TYPE_FIXEDSYSSTRING`)
    FixedSysString(u32),
    /// A fixed-length array of a simple native (`NATIVE_TYPE_FIXEDARRAY`)
    FixedArray {
        /// Number of elements
        length: u32,
        /// Element native tag
        element: u8,
    },
    /// A counted array (`NATIVE_TYPE_ARRAY`): element tag, size parameter index,
    /// optional fixed element count
    Array {
        /// Element native tag
        element: u8,
        /// Index of the parameter carrying the element count
        size_param: u32,
        /// Additional fixed element count
        extra_elements: u32,
    },
    /// A SAFEARRAY of the given variant type (`NATIVE_TYPE_SAFEARRAY`)
    SafeArray(u16),
    /// A custom marshaller: marshaller type name and its cookie string
    Custom {
        /// Assembly-qualified marshaller type name
        marshaller: String,
        /// Cookie string handed to the marshaller
        cookie: String,
    },
}

/// Well-known NATIVE_TYPE tag bytes for [`NativeType::Simple`].
#[allow(non_snake_case, dead_code, missing_docs)]
pub mod NATIVE_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const I1: u8 = 0x03;
    pub const U1: u8 = 0x04;
    pub const I2: u8 = 0x05;
    pub const U2: u8 = 0x06;
    pub const I4: u8 = 0x07;
    pub const U4: u8 = 0x08;
    pub const I8: u8 = 0x09;
    pub const U8: u8 = 0x0A;
    pub const R4: u8 = 0x0B;
    pub const R8: u8 = 0x0C;
    pub const LPSTR: u8 = 0x14;
    pub const LPWSTR: u8 = 0x15;
    pub const LPTSTR: u8 = 0x16;
    pub const FIXEDSYSSTRING: u8 = 0x17;
    pub const IUNKNOWN: u8 = 0x19;
    pub const IDISPATCH: u8 = 0x1A;
    pub const STRUCT: u8 = 0x1B;
    pub const INTERFACE: u8 = 0x1C;
    pub const SAFEARRAY: u8 = 0x1D;
    pub const FIXEDARRAY: u8 = 0x1E;
    pub const INT: u8 = 0x1F;
    pub const UINT: u8 = 0x20;
    pub const FUNC: u8 = 0x26;
    pub const ASANY: u8 = 0x28;
    pub const ARRAY: u8 = 0x2A;
    pub const LPSTRUCT: u8 = 0x2B;
    pub const CUSTOMMARSHALER: u8 = 0x2C;
    pub const ERROR: u8 = 0x2D;
}

impl NativeType {
    /// Serializes the marshalling descriptor blob.
    ///
    /// # Errors
    ///
    /// Returns an error if a count exceeds the compressed-integer range.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            NativeType::Simple(tag) => buf.push(*tag),
            NativeType::FixedSysString(length) => {
                buf.push(NATIVE_TYPE::FIXEDSYSSTRING);
                write_compressed_u32(*length, &mut buf)?;
            }
            NativeType::FixedArray { length, element } => {
                buf.push(NATIVE_TYPE::FIXEDARRAY);
                write_compressed_u32(*length, &mut buf)?;
                buf.push(*element);
            }
            NativeType::Array {
                element,
                size_param,
                extra_elements,
            } => {
                buf.push(NATIVE_TYPE::ARRAY);
                buf.push(*element);
                write_compressed_u32(*size_param, &mut buf)?;
                write_compressed_u32(*extra_elements, &mut buf)?;
            }
            NativeType::SafeArray(variant) => {
                buf.push(NATIVE_TYPE::SAFEARRAY);
                write_compressed_u32(u32::from(*variant), &mut buf)?;
            }
            NativeType::Custom { marshaller, cookie } => {
                buf.push(NATIVE_TYPE::CUSTOMMARSHALER);
                // Two leading empty strings (reserved GUID and native-type-name slots).
                buf.push(0);
                buf.push(0);
                write_counted_utf8(marshaller, &mut buf)?;
                write_counted_utf8(cookie, &mut buf)?;
            }
        }
        Ok(buf)
    }
}

fn write_counted_utf8(value: &str, buf: &mut Vec<u8>) -> Result<()> {
    #[allow(clippy::cast_possible_truncation)]
    write_compressed_u32(value.len() as u32, buf)?;
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

impl CilAssembly {
    /// Forwards `method` to a native export (P/Invoke).
    ///
    /// Marks the method `PINVOKE_IMPL` and records the ImplMap row.
    pub fn add_impl_map(
        &mut self,
        method: MethodDefId,
        flags: PInvokeAttributes,
        import_scope: ModuleRefId,
        import_name: &str,
    ) {
        let import_name_ix = self.strings.add(import_name);
        self.methods[method.index()].flags |= MethodAttributes::PINVOKE_IMPL;
        let row = self.tables.add_row(TableId::ImplMap);
        self.impl_maps.push(ImplMapEntry {
            row,
            flags,
            method,
            import_name_ix,
            scope: import_scope,
        });
    }

    /// Attaches a marshalling descriptor to a field or parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor blob cannot be encoded or added.
    pub fn add_field_marshal(&mut self, parent: MarshalParent, native: &NativeType) -> Result<()> {
        let native_type_ix = self.blobs.add(&native.to_blob()?)?;
        match parent {
            MarshalParent::Field(field) => {
                self.fields[field.index()].flags |= FieldAttributes::HAS_FIELD_MARSHAL;
            }
            MarshalParent::Param(param) => {
                self.params[param.index()].flags |= ParamAttributes::HAS_FIELD_MARSHAL;
            }
        }
        let row = self.tables.add_row(TableId::FieldMarshal);
        self.field_marshals.push(FieldMarshalEntry {
            row,
            parent,
            native_type_ix,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_native_blob() {
        assert_eq!(
            NativeType::Simple(NATIVE_TYPE::LPWSTR).to_blob().unwrap(),
            [0x15]
        );
    }

    #[test]
    fn fixed_array_blob() {
        assert_eq!(
            NativeType::FixedArray {
                length: 16,
                element: NATIVE_TYPE::U1
            }
            .to_blob()
            .unwrap(),
            [0x1E, 16, 0x04]
        );
    }

    #[test]
    fn custom_marshaller_blob() {
        let blob = NativeType::Custom {
            marshaller: "M".to_string(),
            cookie: String::new(),
        }
        .to_blob()
        .unwrap();
        assert_eq!(blob, [0x2C, 0, 0, 1, b'M', 0]);
    }
}
