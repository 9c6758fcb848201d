//! Table readers and writers at the edges of the pipeline.

pub mod colmap;
pub mod depth_csv;
pub mod keyframes;
pub mod poses_csv;
pub mod source;

pub use colmap::{ColmapImage, read_images_txt, write_images_txt};
pub use depth_csv::{read_depth_summary_csv, write_depth_summary};
pub use keyframes::{Keyframe, KeyframeTrack, build_keyframes, write_engine_table_csv, write_keyframes_json};
pub use poses_csv::{read_poses_csv, write_poses_csv};
pub use source::{LoadedInput, ResolvedInput, TableFormat, load_input, resolve_input, resolve_output};
