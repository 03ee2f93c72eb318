use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("File at {:?} not found.", path)]
    FileNotFound { path: std::path::PathBuf },

    #[error(
        "Cannot detect input type of {:?}; expected a read dataset (.bam/.sam/.cram) or a barcode FASTA (.fa/.fasta/.fna)",
        path
    )]
    UnsupportedInput { path: std::path::PathBuf },

    #[error("Record '{}' carries no ZMW hole number", name)]
    MissingGroupKey { name: String },
}
