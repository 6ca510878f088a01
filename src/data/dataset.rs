use burn::data::dataset::Dataset;

use crate::domain::feature::ReadingFeature;

/// A feature together with its position in the loaded list, so
/// batched outputs can be joined back to their feature.
#[derive(Debug, Clone)]
pub struct IndexedFeature {
    pub index:   usize,
    pub feature: ReadingFeature,
}

pub struct FeatureDataset {
    features: Vec<ReadingFeature>,
}

impl FeatureDataset {
    pub fn new(features: Vec<ReadingFeature>) -> Self { Self { features } }
}

impl Dataset<IndexedFeature> for FeatureDataset {
    fn get(&self, index: usize) -> Option<IndexedFeature> {
        self.features
            .get(index)
            .cloned()
            .map(|feature| IndexedFeature { index, feature })
    }

    fn len(&self) -> usize {
        self.features.len()
    }
}
