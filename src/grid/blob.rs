use std::collections::BTreeMap;

use crate::core::geometry::BlobBox;
use crate::features::data::ExtractorData;
use crate::features::description::DoubleFeature;
use crate::features::ExtractorKind;
use crate::grid::merge::BlobMergeData;

#[derive(Debug, Clone)]
pub struct BlobData {
    pub bbox: BlobBox,
    pub char_id: Option<usize>,
    extractor_data: BTreeMap<ExtractorKind, ExtractorData>,
    pub features: Vec<DoubleFeature>,
    pub is_math: bool,
    merge: Option<BlobMergeData>,
}

impl BlobData {
    pub fn new(bbox: BlobBox, char_id: Option<usize>) -> Self {
        Self {
            bbox,
            char_id,
            extractor_data: BTreeMap::new(),
            features: Vec::new(),
            is_math: false,
            merge: None,
        }
    }

    pub fn extractor_data(&self, kind: ExtractorKind) -> Option<&ExtractorData> {
        self.extractor_data.get(&kind)
    }

    pub fn extractor_data_mut(&mut self, kind: ExtractorKind) -> Option<&mut ExtractorData> {
        self.extractor_data.get_mut(&kind)
    }

    /// Stores `data` under its own extractor kind, replacing any previous record.
    pub fn set_extractor_data(&mut self, data: ExtractorData) {
        self.extractor_data.insert(data.kind(), data);
    }

    pub fn feature_vector(&self) -> Vec<f64> {
        self.features.iter().map(|f| f.value).collect()
    }

    pub fn merge_data(&self) -> Option<&BlobMergeData> {
        self.merge.as_ref()
    }

    pub fn merge_data_mut(&mut self) -> &mut BlobMergeData {
        self.merge.get_or_insert_with(BlobMergeData::default)
    }

    pub fn clear_merge_data(&mut self) {
        self.merge = None;
    }
}
