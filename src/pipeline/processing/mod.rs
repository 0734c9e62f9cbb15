// Pipeline processing: normalization, merge, quality evaluation and analysis

pub mod analysis;
pub mod merge;
pub mod normalize;
pub mod quality_gate;
