pub mod mercator;
pub mod quadtree;
pub mod stats;

pub use mercator::WebMercator;
pub use quadtree::cluster_key;
pub use stats::MeanAccumulator;
