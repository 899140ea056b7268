//! File collaborators: landmark CSV, reference OBJ mesh, assessment JSON.
//! The algorithm modules never touch the filesystem.

pub mod input;
pub mod output;

pub use input::{load_reference_model, read_landmarks, read_obj_mesh};
pub use output::{write_assessment_json, write_landmarks_csv, write_obj_mesh};
