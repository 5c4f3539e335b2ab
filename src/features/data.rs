use crate::features::aligned::AlignedData;
use crate::features::nested::NestedData;
use crate::features::stacked::StackedData;
use crate::features::subsup::SubSupData;
use crate::features::ExtractorKind;

/// Per-blob record written by an extractor, keyed on the blob by its kind.
#[derive(Debug, Clone)]
pub enum ExtractorData {
    Aligned(AlignedData),
    Nested(NestedData),
    Stacked(StackedData),
    SubSup(SubSupData),
}

impl ExtractorData {
    pub fn kind(&self) -> ExtractorKind {
        match self {
            ExtractorData::Aligned(_) => ExtractorKind::Aligned,
            ExtractorData::Nested(_) => ExtractorKind::Nested,
            ExtractorData::Stacked(_) => ExtractorKind::Stacked,
            ExtractorData::SubSup(_) => ExtractorKind::SubSup,
        }
    }

    pub fn as_aligned(&self) -> Option<&AlignedData> {
        match self {
            ExtractorData::Aligned(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_aligned_mut(&mut self) -> Option<&mut AlignedData> {
        match self {
            ExtractorData::Aligned(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&NestedData> {
        match self {
            ExtractorData::Nested(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stacked(&self) -> Option<&StackedData> {
        match self {
            ExtractorData::Stacked(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_subsup(&self) -> Option<&SubSupData> {
        match self {
            ExtractorData::SubSup(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_subsup_mut(&mut self) -> Option<&mut SubSupData> {
        match self {
            ExtractorData::SubSup(d) => Some(d),
            _ => None,
        }
    }
}
