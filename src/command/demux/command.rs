use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use log::info;

use super::constants::*;
use super::core::core::Demux;
use super::core::params;
use crate::barcode::align::AlignParameters;
use crate::barcode::catalog;
use crate::fileformat::{self, InputKind};

#[derive(Args)]
pub struct DemuxCMD {
    /// Read datasets (BAM/SAM/CRAM) and barcode FASTA files
    #[arg(value_name = "FILE", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Score for a sequence match
    #[arg(short = 'A', long)]
    pub match_score: Option<i32>,
    /// Penalty for a mismatch
    #[arg(short = 'B', long)]
    pub mismatch_penalty: Option<i32>,
    /// Penalty for a deletion
    #[arg(short = 'D', long)]
    pub deletion_penalty: Option<i32>,
    /// Penalty for an insertion
    #[arg(short = 'I', long)]
    pub insertion_penalty: Option<i32>,
    /// Penalty for an insertion extending a homopolymer run
    #[arg(short = 'X', long)]
    pub branch_penalty: Option<i32>,
    /// Candidate window width: max barcode length * multiplier
    #[arg(short = 'w', long)]
    pub window_size_mult: Option<f64>,
    /// Use the penalty profile for high-accuracy consensus reads
    #[arg(long)]
    pub ccs: bool,

    /// Minimum mean barcode score
    #[arg(short = 'm', long, default_value_t = 51)]
    pub min_score: i32,
    /// Minimum sequence length after clipping
    #[arg(short = 'l', long, default_value_t = 50)]
    pub min_length: i32,
    /// Minimum number of subreads with both ends scored
    #[arg(short = 'p', long, default_value_t = 1)]
    pub min_passes: i32,
    /// Cap on adapter-complete subreads feeding the ranking, 0 = unlimited
    #[arg(long, default_value_t = 0)]
    pub max_scored_reads: i32,
    /// Only keep pairs with identical left and right barcode
    #[arg(short = 's', long)]
    pub symmetric: bool,
    /// Score every record on its own instead of per ZMW
    #[arg(long)]
    pub per_subread: bool,

    /// Do not generate BAM output
    #[arg(long)]
    pub no_bam: bool,
    /// Do not generate report, summary and counts
    #[arg(long)]
    pub no_reports: bool,
    /// Split BAM output by barcode pair
    #[arg(long)]
    pub split_bam: bool,

    /// Worker threads; 0 = all cores, negative = all cores but that many
    #[arg(short = 'j', long, default_value_t = 0, allow_hyphen_values = true)]
    pub num_threads: i32,
    /// Groups per work unit
    #[arg(long, default_value_t = 10)]
    pub chunk_size: i32,
}

impl DemuxCMD {
    pub fn try_execute(&mut self) -> Result<()> {
        if self.split_bam && self.no_bam {
            anyhow::bail!("Options --split-bam and --no-bam are mutually exclusive!");
        }
        if self.chunk_size < 1 {
            anyhow::bail!("Chunk size must be at least 1");
        }

        let (datasets, barcode_files) = self.route_inputs()?;

        let mut barcodes = Vec::new();
        for file in &barcode_files {
            barcodes.extend(catalog::read_barcodes(file)?);
        }

        let align = resolve_align_parameters(
            self.ccs,
            self.match_score,
            self.mismatch_penalty,
            self.deletion_penalty,
            self.insertion_penalty,
            self.branch_penalty,
        );
        let window_size_mult = self
            .window_size_mult
            .unwrap_or(DEMUX_DEFAULT_WINDOW_SIZE_MULT);

        let threads_work = resolve_thread_count(self.num_threads);
        info!("Using {} worker threads", threads_work);

        let params_io = params::IO {
            datasets,
            barcode_files,
            no_bam: self.no_bam,
            no_reports: self.no_reports,
            split_bam: self.split_bam,
        };
        let params_runtime = params::Runtime {
            align,
            window_size_mult,
            min_score: self.min_score,
            min_length: self.min_length,
            min_passes: self.min_passes,
            max_scored_reads: self.max_scored_reads,
            keep_symmetric: self.symmetric,
            per_subread: self.per_subread,
        };
        let params_threading = params::Threading {
            threads_work,
            chunk_size: self.chunk_size as usize,
        };

        Demux::run(
            Arc::new(params_io),
            Arc::new(params_runtime),
            Arc::new(params_threading),
            Arc::new(barcodes),
        )
    }

    /// Positional arguments are either read containers or barcode FASTA
    /// files; anything else is a fatal argument error
    fn route_inputs(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut datasets = Vec::new();
        let mut barcode_files = Vec::new();
        for path in &self.inputs {
            if !path.exists() {
                return Err(fileformat::Error::FileNotFound { path: path.clone() }.into());
            }
            match fileformat::detect_input_kind(path)? {
                InputKind::Dataset(_) => datasets.push(path.clone()),
                InputKind::Catalog => barcode_files.push(path.clone()),
            }
        }
        if datasets.is_empty() {
            anyhow::bail!("No read dataset given, see --help");
        }
        if barcode_files.is_empty() {
            anyhow::bail!("No barcode file given, see --help");
        }
        Ok((datasets, barcode_files))
    }
}

/// Explicitly set penalties win over the profile chosen by --ccs
fn resolve_align_parameters(
    ccs: bool,
    match_score: Option<i32>,
    mismatch_penalty: Option<i32>,
    deletion_penalty: Option<i32>,
    insertion_penalty: Option<i32>,
    branch_penalty: Option<i32>,
) -> AlignParameters {
    let (m, mm, del, ins, branch) = if ccs {
        (
            DEMUX_CCS_MATCH_SCORE,
            DEMUX_CCS_MISMATCH_PENALTY,
            DEMUX_CCS_DELETION_PENALTY,
            DEMUX_CCS_INSERTION_PENALTY,
            DEMUX_CCS_BRANCH_PENALTY,
        )
    } else {
        (
            DEMUX_DEFAULT_MATCH_SCORE,
            DEMUX_DEFAULT_MISMATCH_PENALTY,
            DEMUX_DEFAULT_DELETION_PENALTY,
            DEMUX_DEFAULT_INSERTION_PENALTY,
            DEMUX_DEFAULT_BRANCH_PENALTY,
        )
    };
    AlignParameters::from_magnitudes(
        match_score.unwrap_or(m),
        mismatch_penalty.unwrap_or(mm),
        deletion_penalty.unwrap_or(del),
        insertion_penalty.unwrap_or(ins),
        branch_penalty.unwrap_or(branch),
    )
}

/// 0 uses every core, a negative count leaves that many cores free, a
/// positive count is capped at what the machine offers
fn resolve_thread_count(requested: i32) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if requested == 0 {
        available
    } else if requested < 0 {
        (available as i64 + requested as i64).max(1) as usize
    } else {
        (requested as usize).min(available)
    }
}
