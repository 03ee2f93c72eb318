use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;

use crate::barcode::tag::BarcodeHitPair;

///////////////////////////////
/// Run-wide tallies. The only shared mutable state on the hot path; workers
/// bump these with relaxed atomics and the final values are read after all
/// threads have joined.
#[derive(Debug, Default)]
pub struct Summary {
    pub zmws_input: AtomicU64,
    pub above_thresholds: AtomicU64,
    pub below_min_length: AtomicU64,
    pub below_min_score: AtomicU64,
    pub below_num_passes: AtomicU64,
    pub symmetric_counts: AtomicU64,
    pub asymmetric_counts: AtomicU64,
    pub subreads_above_min_length: AtomicU64,
    pub subreads_below_min_length: AtomicU64,
}

impl Summary {
    pub fn new() -> Summary {
        Summary::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let input = get(&self.zmws_input);
        let above = get(&self.above_thresholds);

        writeln!(f, "ZMWs input                    : {}", input)?;
        writeln!(f, "ZMWs above all thresholds (A) : {}", above)?;
        writeln!(
            f,
            "ZMWs below any threshold  (B) : {}",
            input.saturating_sub(above)
        )?;
        writeln!(f)?;
        writeln!(f, "Marginals for (B)")?;
        writeln!(
            f,
            "ZMWs below length threshold   : {}",
            get(&self.below_min_length)
        )?;
        writeln!(
            f,
            "ZMWs below score threshold    : {}",
            get(&self.below_min_score)
        )?;
        writeln!(
            f,
            "ZMWs below passes threshold   : {}",
            get(&self.below_num_passes)
        )?;
        writeln!(f)?;
        writeln!(f, "For (A)")?;
        writeln!(
            f,
            "ZMWs symmetric                : {}",
            get(&self.symmetric_counts)
        )?;
        writeln!(
            f,
            "ZMWs asymmetric               : {}",
            get(&self.asymmetric_counts)
        )?;
        writeln!(f)?;
        writeln!(f, "For (A)")?;
        writeln!(
            f,
            "Reads above length            : {}",
            get(&self.subreads_above_min_length)
        )?;
        writeln!(
            f,
            "Reads below length            : {}",
            get(&self.subreads_below_min_length)
        )
    }
}

pub fn report_header() -> &'static str {
    "ZMW\tIndexLeft\tIndexRight\tScoreLeft\tScoreRight\tMeanScore\tClipsLeft\tClipsRight\tScoresLeft\tScoresRight\tNumPasses\tPassedFilters"
}

fn join_column(values: &[i32]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.iter().join(",")
    }
}

///////////////////////////////
/// One report line per group, multi-valued columns comma separated
pub fn report_line(zmw: i32, pair: &BarcodeHitPair, num_passes: i32, passing: bool) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        zmw,
        pair.left.idx,
        pair.right.idx,
        pair.left.score,
        pair.right.score,
        pair.mean_score,
        join_column(&pair.left.clips),
        join_column(&pair.right.clips),
        join_column(&pair.left.scores),
        join_column(&pair.right.scores),
        num_passes,
        passing as u8
    )
}

///////////////////////////////
/// Barcode pair count matrix, kept ordered so the output file is sorted by
/// (IndexLeft, IndexRight)
#[derive(Debug, Default)]
pub struct PairCounts {
    counts: BTreeMap<(u16, u16), u64>,
}

impl PairCounts {
    pub fn new() -> PairCounts {
        PairCounts::default()
    }

    pub fn inc(&mut self, left: u16, right: u16) {
        *self.counts.entry((left, right)).or_insert(0) += 1;
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "IndexLeft\tIndexRight\tCounts")?;
        for ((left, right), count) in self.counts.iter() {
            writeln!(writer, "{}\t{}\t{}", left, right, count)?;
        }
        writer.flush()?;
        Ok(())
    }
}
