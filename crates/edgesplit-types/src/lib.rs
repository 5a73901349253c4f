pub mod config;
pub mod error;
pub mod profile;
pub mod tensor;

pub use error::EdgeSplitError;
pub use profile::{BoundaryCandidate, ProfileReport, ShapeRecord};
pub use tensor::{Shape, Tensor};
