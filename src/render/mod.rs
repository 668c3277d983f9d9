//! Rendering: the retained preview scene and the offline export raster.
//!
//! Both sides lay cells out through [`crate::scene`] and resolve them through
//! [`crate::transform`]; only the final drawing differs.

pub mod export;
pub mod preview;
pub mod raster;
