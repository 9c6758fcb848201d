//! Geometry utilities: rotation algebra and coordinate convention conversion.

pub mod frames;
pub mod rotation;

pub use frames::{
    ConventionBasis, Convention, ConversionReport, FailurePolicy, FrameConverter,
    content_camera_axes, content_camera_axes_inverse,
};
pub use rotation::{
    camera_center, direction_invert, matrix_to_euler_xyz, matrix_to_quat, quat_to_matrix,
    similarity_transform,
};
