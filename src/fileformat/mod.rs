pub mod bam;
pub mod error;

pub use bam::{
    clip_record, create_writer, detect_input_kind, group_key, open_dataset, subread_view,
    InputKind,
};
pub use error::Error;
