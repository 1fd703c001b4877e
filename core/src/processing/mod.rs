pub mod binning;
pub mod cluster;
pub mod filter;
pub mod normalize;
pub mod reproject;

pub use binning::{bin_points, BinningStage};
pub use cluster::{sort_cells, ClusterStage};
pub use filter::{FilterStage, RejectReason, Sanitizer};
pub use normalize::DoseNormalizer;
pub use reproject::{ReprojectStage, Reprojector};
