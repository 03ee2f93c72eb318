use crate::barcode::align::AlignParameters;

pub struct IO {
    pub datasets: Vec<std::path::PathBuf>,
    pub barcode_files: Vec<std::path::PathBuf>,

    pub no_bam: bool,
    pub no_reports: bool,
    pub split_bam: bool,
}

pub struct Runtime {
    pub align: AlignParameters,
    pub window_size_mult: f64,

    pub min_score: i32,
    pub min_length: i32,
    pub min_passes: i32,
    pub max_scored_reads: i32,

    pub keep_symmetric: bool,
    pub per_subread: bool,
}

pub struct Threading {
    pub threads_work: usize,
    pub chunk_size: usize,
}
