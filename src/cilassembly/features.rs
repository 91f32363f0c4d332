//! Events, properties, accessor semantics and explicit method overrides.
//!
//! The first event or property added to a class creates that class's EventMap or
//! PropertyMap row; members of one class must therefore be added together, the same
//! contiguity rule field and method lists follow.

use crate::{
    cilassembly::{
        CilAssembly, ClassDefId, EventAttributes, EventId, MethodDefId,
        MethodSemanticsAttributes, MethodTarget, PropertyAttributes, PropertyId,
    },
    metadata::signatures::{TypeDefOrRef, TypeSignature},
    metadata::tables::TableId,
    Result,
};

/// One Event row.
pub(crate) struct EventEntry {
    pub(crate) row: u32,
    pub(crate) flags: EventAttributes,
    pub(crate) name_ix: u32,
    pub(crate) event_type: TypeDefOrRef,
}

/// One EventMap row.
pub(crate) struct EventMapEntry {
    pub(crate) parent: ClassDefId,
    pub(crate) event_list: u32,
}

/// One Property row; the signature blob is built during `build_tables`.
pub(crate) struct PropertyEntry {
    pub(crate) row: u32,
    pub(crate) flags: PropertyAttributes,
    pub(crate) name_ix: u32,
    pub(crate) property_type: TypeSignature,
    pub(crate) params: Vec<TypeSignature>,
    pub(crate) has_this: bool,
    pub(crate) sig_ix: u32,
}

/// One PropertyMap row.
pub(crate) struct PropertyMapEntry {
    pub(crate) parent: ClassDefId,
    pub(crate) property_list: u32,
}

/// The association side of a MethodSemantics row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticsTarget {
    /// Accessor of an event
    Event(EventId),
    /// Accessor of a property
    Property(PropertyId),
}

/// One MethodSemantics row (sorted by association).
pub(crate) struct MethodSemanticsEntry {
    pub(crate) row: u32,
    pub(crate) semantics: MethodSemanticsAttributes,
    pub(crate) method: MethodDefId,
    pub(crate) association: SemanticsTarget,
}

/// One MethodImpl row.
pub(crate) struct MethodImplEntry {
    pub(crate) class: ClassDefId,
    pub(crate) body: MethodTarget,
    pub(crate) declaration: MethodTarget,
}

impl CilAssembly {
    /// Adds an event to `class`, creating the class's EventMap row on first use.
    pub fn add_event(
        &mut self,
        class: ClassDefId,
        flags: EventAttributes,
        name: &str,
        event_type: TypeDefOrRef,
    ) -> EventId {
        if !self.event_maps.iter().any(|map| map.parent == class) {
            let event_list = self.tables.next_row(TableId::Event);
            self.tables.add_row(TableId::EventMap);
            self.event_maps.push(EventMapEntry {
                parent: class,
                event_list,
            });
        }

        let name_ix = self.strings.add(name);
        let row = self.tables.add_row(TableId::Event);
        self.events.push(EventEntry {
            row,
            flags,
            name_ix,
            event_type,
        });
        #[allow(clippy::cast_possible_truncation)]
        EventId(self.events.len() as u32 - 1)
    }

    /// Adds a property to `class`, creating the class's PropertyMap row on first use.
    pub fn add_property(
        &mut self,
        class: ClassDefId,
        flags: PropertyAttributes,
        name: &str,
        has_this: bool,
        property_type: TypeSignature,
        params: Vec<TypeSignature>,
    ) -> PropertyId {
        if !self.property_maps.iter().any(|map| map.parent == class) {
            let property_list = self.tables.next_row(TableId::Property);
            self.tables.add_row(TableId::PropertyMap);
            self.property_maps.push(PropertyMapEntry {
                parent: class,
                property_list,
            });
        }

        let name_ix = self.strings.add(name);
        let row = self.tables.add_row(TableId::Property);
        self.properties.push(PropertyEntry {
            row,
            flags,
            name_ix,
            property_type,
            params,
            has_this,
            sig_ix: 0,
        });
        #[allow(clippy::cast_possible_truncation)]
        PropertyId(self.properties.len() as u32 - 1)
    }

    /// Associates an accessor method with an event or property.
    pub fn add_method_semantics(
        &mut self,
        association: SemanticsTarget,
        semantics: MethodSemanticsAttributes,
        method: MethodDefId,
    ) {
        let row = self.tables.add_row(TableId::MethodSemantics);
        self.method_semantics.push(MethodSemanticsEntry {
            row,
            semantics,
            method,
            association,
        });
    }

    /// Records that `body` implements `declaration` on `class` (explicit override).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if either side is a method
    /// specification - overrides bind definitions and references only.
    pub fn add_method_impl(
        &mut self,
        class: ClassDefId,
        body: MethodTarget,
        declaration: MethodTarget,
    ) -> Result<()> {
        if matches!(body, MethodTarget::Spec(_)) || matches!(declaration, MethodTarget::Spec(_)) {
            return Err(malformed_error!(
                "method overrides cannot involve method specifications"
            ));
        }
        self.tables.add_row(TableId::MethodImpl);
        self.method_impls.push(MethodImplEntry {
            class,
            body,
            declaration,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cilassembly::{ModuleKind, TypeAttributes};

    #[test]
    fn event_map_created_once_per_class() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let object = asm.system_class("Object");
        let handler = asm.system_class("EventHandler");
        let class = asm.add_class(TypeAttributes::PUBLIC, "Demo", "P", Some(object.into()));

        asm.add_event(class, EventAttributes::default(), "Changed", handler.into());
        asm.add_event(class, EventAttributes::default(), "Closed", handler.into());

        assert_eq!(asm.event_maps.len(), 1);
        assert_eq!(asm.event_maps[0].event_list, 1);
        assert_eq!(asm.events.len(), 2);
        assert_eq!(asm.events[1].row, 2);
    }

    #[test]
    fn property_map_lists_start_at_first_property() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let object = asm.system_class("Object");
        let a = asm.add_class(TypeAttributes::PUBLIC, "Demo", "A", Some(object.into()));
        let b = asm.add_class(TypeAttributes::PUBLIC, "Demo", "B", Some(object.into()));

        asm.add_property(a, PropertyAttributes::default(), "X", true, TypeSignature::I4, vec![]);
        asm.add_property(b, PropertyAttributes::default(), "Y", true, TypeSignature::I4, vec![]);
        asm.add_property(b, PropertyAttributes::default(), "Z", true, TypeSignature::I4, vec![]);

        assert_eq!(asm.property_maps.len(), 2);
        assert_eq!(asm.property_maps[0].property_list, 1);
        assert_eq!(asm.property_maps[1].property_list, 2);
    }
}
