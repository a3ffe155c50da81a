//! Shared types for incremental scan fusion.
//!
//! - [`PointCloud`]: structure-of-arrays points with optional colors and normals
//! - [`Transform`]: validated SE(3) rigid transform
//! - [`GeometryFrame`]: one immutable captured scan with an optional pose guess
//! - [`Model`]: the accumulated global cloud

pub mod error;
pub mod frame;
pub mod model;
pub mod point_cloud;
pub mod runtime;
pub mod transform;

pub use error::{Error, Result};
pub use frame::GeometryFrame;
pub use model::Model;
pub use point_cloud::PointCloud;
pub use runtime::{current_cpu_threads, init_global_thread_pool};
pub use transform::Transform;
