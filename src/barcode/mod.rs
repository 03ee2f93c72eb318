pub mod align;
pub mod catalog;
pub mod filter;
pub mod tag;

pub use align::{AlignParameters, SwAligner, WindowAligner};
pub use catalog::{read_barcodes, revcomp, Barcode};
pub use filter::{evaluate_group, GroupVerdict};
pub use tag::{tag_group, BarcodeHit, BarcodeHitPair, Subread};
