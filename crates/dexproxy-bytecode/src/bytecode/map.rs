//! The `map_list` directory at the end of the data section.

/// Item kinds that can appear in a map list.
///
/// Only the kinds a proxy container can contain are listed; the reader
/// rejects anything else.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[repr(u16)]
pub enum MapItemType {
    Header = 0x0000,
    StringId = 0x0001,
    TypeId = 0x0002,
    ProtoId = 0x0003,
    FieldId = 0x0004,
    MethodId = 0x0005,
    ClassDef = 0x0006,
    MapList = 0x1000,
    TypeList = 0x1001,
    ClassData = 0x2000,
    CodeItem = 0x2001,
    StringData = 0x2002,
}

impl MapItemType {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0x0000 => Self::Header,
            0x0001 => Self::StringId,
            0x0002 => Self::TypeId,
            0x0003 => Self::ProtoId,
            0x0004 => Self::FieldId,
            0x0005 => Self::MethodId,
            0x0006 => Self::ClassDef,
            0x1000 => Self::MapList,
            0x1001 => Self::TypeList,
            0x2000 => Self::ClassData,
            0x2001 => Self::CodeItem,
            0x2002 => Self::StringData,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Header => "header_item",
            Self::StringId => "string_id_item",
            Self::TypeId => "type_id_item",
            Self::ProtoId => "proto_id_item",
            Self::FieldId => "field_id_item",
            Self::MethodId => "method_id_item",
            Self::ClassDef => "class_def_item",
            Self::MapList => "map_list",
            Self::TypeList => "type_list",
            Self::ClassData => "class_data_item",
            Self::CodeItem => "code_item",
            Self::StringData => "string_data_item",
        }
    }
}

/// One `map_item`: 12 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MapItem {
    pub item_type: MapItemType,
    pub size: u32,
    pub offset: u32,
}

impl MapItem {
    pub const SIZE: usize = 12;

    pub fn new(item_type: MapItemType, size: u32, offset: u32) -> Self {
        Self {
            item_type,
            size,
            offset,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&(self.item_type as u16).to_le_bytes());
        bytes[4..8].copy_from_slice(&self.size.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.offset.to_le_bytes());
        bytes
    }
}
