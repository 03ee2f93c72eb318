use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use crossbeam::channel::Receiver;
use log::{debug, info};
use rust_htslib::bam;
use rust_htslib::bam::Read as BamRead;

use super::params;
use crate::barcode::align::WindowAligner;
use crate::barcode::catalog::{self, Barcode};
use crate::barcode::filter::{evaluate_group, GroupVerdict};
use crate::barcode::tag::{tag_group, BarcodeHitPair, Subread};
use crate::fileformat;
use crate::report::{report_header, report_line, PairCounts, Summary};

///////////////////////////////
/// One unit of work: all records of one ZMW, in source order
struct GroupTask {
    zmw: i32,
    records: Vec<bam::Record>,
}

/// What the sink needs per finished group
struct GroupResult {
    left_idx: u16,
    right_idx: u16,
    keep_output: bool,
    report: Option<String>,
    records: Vec<bam::Record>,
}

type Chunk = (u64, Vec<GroupTask>);
type ChunkResult = (u64, anyhow::Result<Vec<GroupResult>>);

///////////////////////////////
/// Holds results until their serial comes up, so the sink emits chunks in
/// submission order no matter which worker finishes first
struct ReorderBuffer<T> {
    pending: HashMap<u64, T>,
    next_serial: u64,
}

impl<T> ReorderBuffer<T> {
    fn new() -> ReorderBuffer<T> {
        ReorderBuffer {
            pending: HashMap::new(),
            next_serial: 0,
        }
    }

    fn push(&mut self, serial: u64, item: T) {
        self.pending.insert(serial, item);
    }

    fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next_serial)?;
        self.next_serial += 1;
        Some(item)
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

pub struct Demux {}

impl Demux {
    pub fn run(
        params_io: Arc<params::IO>,
        params_runtime: Arc<params::Runtime>,
        params_threading: Arc<params::Threading>,
        barcodes: Arc<Vec<Barcode>>,
    ) -> anyhow::Result<()> {
        info!("Running command: demux");

        for dataset in params_io.datasets.iter() {
            Self::process_dataset(
                dataset,
                &params_io,
                &params_runtime,
                &params_threading,
                &barcodes,
            )?;
        }

        info!("done!");
        Ok(())
    }

    ///////////////////////////////
    /// Stream one dataset through the worker pool. A single producer (this
    /// thread) reads and groups records, workers score whole chunks of
    /// groups, a single sink thread owns every output file.
    fn process_dataset(
        dataset: &Path,
        params_io: &Arc<params::IO>,
        params_runtime: &Arc<params::Runtime>,
        params_threading: &Arc<params::Threading>,
        barcodes: &Arc<Vec<Barcode>>,
    ) -> anyhow::Result<()> {
        info!("Demultiplexing {}", dataset.display());

        let mut reader = fileformat::open_dataset(dataset)?;
        let mut header = bam::Header::from_template(reader.header());
        header.push_comment(b"Demultiplexed by lima");
        let prefix = dataset.with_extension("");

        let summary = Arc::new(Summary::new());
        let abort = Arc::new(AtomicBool::new(false));

        //Bounded queues keep the number of in-flight chunks proportional to
        //the worker count, so the producer cannot outrun the sink
        let queue_cap = 4 * params_threading.threads_work;
        let (tx_work, rx_work) = crossbeam::channel::bounded::<Option<Chunk>>(queue_cap);
        let (tx_result, rx_result) = crossbeam::channel::bounded::<Option<ChunkResult>>(queue_cap);

        let pool_work = threadpool::ThreadPool::new(params_threading.threads_work);
        for tidx in 0..params_threading.threads_work {
            let rx_work = rx_work.clone();
            let tx_result = tx_result.clone();
            let barcodes = Arc::clone(barcodes);
            let params_runtime = Arc::clone(params_runtime);
            let params_io = Arc::clone(params_io);
            let summary = Arc::clone(&summary);
            let abort = Arc::clone(&abort);

            pool_work.execute(move || {
                debug!("Starting worker thread {}", tidx);
                let max_bc_len = catalog::max_barcode_len(&barcodes);
                let mut aligner = WindowAligner::new(
                    params_runtime.align,
                    max_bc_len,
                    params_runtime.window_size_mult,
                );

                while let Ok(Some((serial, chunk))) = rx_work.recv() {
                    let result = process_chunk(
                        &chunk,
                        &barcodes,
                        &mut aligner,
                        &params_runtime,
                        &params_io,
                        &summary,
                    );
                    if result.is_err() {
                        abort.store(true, Ordering::Relaxed);
                    }
                    if tx_result.send(Some((serial, result))).is_err() {
                        break;
                    }
                }
                debug!("Stopping worker thread {}", tidx);
            });
        }
        drop(rx_work);

        let sink_handle = {
            let params_io = Arc::clone(params_io);
            let summary = Arc::clone(&summary);
            let prefix = prefix.clone();
            std::thread::spawn(move || sink_loop(rx_result, header, prefix, params_io, summary))
        };

        let produced = produce_chunks(
            &mut reader,
            &tx_work,
            params_runtime.per_subread,
            params_threading.chunk_size,
            &abort,
            &summary,
        );

        //Shut down workers, then the sink; only then judge the outcome
        for _ in 0..params_threading.threads_work {
            let _ = tx_work.send(None);
        }
        pool_work.join();
        let _ = tx_result.send(None);
        let sink_result = sink_handle
            .join()
            .map_err(|_| anyhow!("Output thread panicked"))?;

        produced?;
        sink_result?;

        info!("Finished {}", dataset.display());
        Ok(())
    }
}

///////////////////////////////
/// Read records, cut them into per-ZMW groups and ship chunks of groups to
/// the workers. Blocks on the bounded queue when the workers are behind.
fn produce_chunks(
    reader: &mut bam::Reader,
    tx_work: &crossbeam::channel::Sender<Option<Chunk>>,
    per_subread: bool,
    chunk_size: usize,
    abort: &AtomicBool,
    summary: &Summary,
) -> anyhow::Result<()> {
    let mut serial = 0u64;
    let mut chunk: Vec<GroupTask> = Vec::with_capacity(chunk_size);
    let mut current_zmw: Option<i32> = None;
    let mut current_records: Vec<bam::Record> = Vec::new();
    let mut num_read: u64 = 0;

    for r in reader.records() {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        let record = r.context("Failed to read input record")?;
        let zmw = fileformat::group_key(&record)?;
        num_read += 1;
        if num_read % 100_000 == 0 {
            debug!("read: {}", num_read);
        }

        let boundary = per_subread || current_zmw.map(|z| z != zmw).unwrap_or(false);
        if boundary && !current_records.is_empty() {
            Summary::inc(&summary.zmws_input);
            chunk.push(GroupTask {
                zmw: current_zmw.unwrap(),
                records: std::mem::take(&mut current_records),
            });
            if chunk.len() == chunk_size {
                if tx_work
                    .send(Some((serial, std::mem::replace(&mut chunk, Vec::with_capacity(chunk_size)))))
                    .is_err()
                {
                    return Ok(());
                }
                serial += 1;
            }
        }
        current_zmw = Some(zmw);
        current_records.push(record);
    }

    if !current_records.is_empty() {
        Summary::inc(&summary.zmws_input);
        chunk.push(GroupTask {
            zmw: current_zmw.unwrap(),
            records: current_records,
        });
    }
    if !chunk.is_empty() {
        let _ = tx_work.send(Some((serial, chunk)));
    }
    Ok(())
}

///////////////////////////////
/// Score, filter and clip every group of one chunk. Pure CPU work on memory
/// owned by this worker; the only shared writes are the atomic tallies.
fn process_chunk(
    chunk: &[GroupTask],
    barcodes: &[Barcode],
    aligner: &mut WindowAligner,
    params_runtime: &params::Runtime,
    params_io: &params::IO,
    summary: &Summary,
) -> anyhow::Result<Vec<GroupResult>> {
    let mut results = Vec::with_capacity(chunk.len());
    for task in chunk {
        let subreads: Vec<Subread> = task.records.iter().map(fileformat::subread_view).collect();
        let pair = tag_group(
            &subreads,
            barcodes,
            aligner,
            params_runtime.max_scored_reads,
        )?;
        let verdict = evaluate_group(
            &pair,
            params_runtime.min_score,
            params_runtime.min_length,
            params_runtime.min_passes,
            params_runtime.keep_symmetric,
        );
        tally(summary, &verdict, &pair);

        let mut records = Vec::new();
        if verdict.keep_output && !params_io.no_bam {
            for (i, rec) in task.records.iter().enumerate() {
                if verdict.subread_keep[i] {
                    records.push(fileformat::clip_record(
                        rec,
                        pair.left.clips[i],
                        pair.right.clips[i],
                        (pair.left.idx, pair.right.idx),
                        pair.mean_score,
                    )?);
                }
            }
        }

        let report = if params_io.no_reports {
            None
        } else {
            Some(report_line(
                task.zmw,
                &pair,
                verdict.num_passes,
                verdict.keep_output,
            ))
        };

        results.push(GroupResult {
            left_idx: pair.left.idx,
            right_idx: pair.right.idx,
            keep_output: verdict.keep_output,
            report,
            records,
        });
    }
    Ok(results)
}

fn tally(summary: &Summary, verdict: &GroupVerdict, pair: &BarcodeHitPair) {
    if verdict.keep {
        Summary::inc(&summary.above_thresholds);
        if pair.left.idx == pair.right.idx {
            Summary::inc(&summary.symmetric_counts);
        } else {
            Summary::inc(&summary.asymmetric_counts);
        }
        for &keep in &verdict.subread_keep {
            if keep {
                Summary::inc(&summary.subreads_above_min_length);
            } else {
                Summary::inc(&summary.subreads_below_min_length);
            }
        }
    } else {
        if !verdict.above_min_length {
            Summary::inc(&summary.below_min_length);
        }
        if !verdict.above_min_score {
            Summary::inc(&summary.below_min_score);
        }
        if !verdict.above_min_passes {
            Summary::inc(&summary.below_num_passes);
        }
    }
}

///////////////////////////////
/// Single owner of every output file. Drains worker results, restores
/// submission order, writes records, report lines and the count matrix, and
/// emits summary and counts once all producers are done.
fn sink_loop(
    rx_result: Receiver<Option<ChunkResult>>,
    header: bam::Header,
    prefix: PathBuf,
    params_io: Arc<params::IO>,
    summary: Arc<Summary>,
) -> anyhow::Result<()> {
    let mut writer: Option<bam::Writer> = if !params_io.no_bam && !params_io.split_bam {
        let path = with_suffix(&prefix, "demux.bam");
        info!("Creating output file: {}", path.display());
        Some(fileformat::create_writer(&path, &header)?)
    } else {
        None
    };
    let mut split_writers: HashMap<(u16, u16), bam::Writer> = HashMap::new();

    let mut report: Option<BufWriter<File>> = if !params_io.no_reports {
        let path = with_suffix(&prefix, "demux.report");
        let file = File::create(&path)
            .with_context(|| format!("Failed to create report file {:?}", path))?;
        let mut w = BufWriter::new(file);
        writeln!(w, "{}", report_header())?;
        Some(w)
    } else {
        None
    };

    let mut counts = PairCounts::new();
    let mut buffer: ReorderBuffer<Vec<GroupResult>> = ReorderBuffer::new();
    let mut first_error: Option<anyhow::Error> = None;
    let mut n_written: u64 = 0;

    while let Ok(Some((serial, result))) = rx_result.recv() {
        match result {
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Ok(groups) => {
                buffer.push(serial, groups);
                while let Some(groups) = buffer.pop_ready() {
                    for group in groups {
                        if let (Some(w), Some(line)) = (report.as_mut(), group.report.as_ref()) {
                            writeln!(w, "{}", line)?;
                        }
                        if !group.keep_output {
                            continue;
                        }
                        counts.inc(group.left_idx, group.right_idx);

                        if params_io.split_bam && !group.records.is_empty() {
                            let key = (group.left_idx, group.right_idx);
                            let w = match split_writers.entry(key) {
                                Entry::Occupied(e) => e.into_mut(),
                                Entry::Vacant(v) => {
                                    let path = with_suffix(
                                        &prefix,
                                        &format!("{}-{}.demux.bam", key.0, key.1),
                                    );
                                    info!("Creating output file: {}", path.display());
                                    v.insert(fileformat::create_writer(&path, &header)?)
                                }
                            };
                            for rec in &group.records {
                                w.write(rec)?;
                                n_written += 1;
                            }
                        } else if let Some(w) = writer.as_mut() {
                            for rec in &group.records {
                                w.write(rec)?;
                                n_written += 1;
                            }
                        }
                    }
                }
            }
        }
    }
    debug!("records written: {}", n_written);

    //Flush on every exit path, also after a worker error
    if let Some(w) = report.as_mut() {
        w.flush()?;
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    if !params_io.no_reports {
        let summary_path = with_suffix(&prefix, "demux.summary");
        std::fs::write(&summary_path, summary.to_string())
            .with_context(|| format!("Failed to write summary file {:?}", summary_path))?;
        counts.write(&with_suffix(&prefix, "demux.counts"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_buffer_restores_submission_order() {
        let mut buffer: ReorderBuffer<u64> = ReorderBuffer::new();
        let mut delivered = Vec::new();

        for serial in [2u64, 0, 3, 1, 4] {
            buffer.push(serial, serial * 10);
            while let Some(item) = buffer.pop_ready() {
                delivered.push(item);
            }
        }
        assert_eq!(delivered, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_reorder_buffer_holds_gaps() {
        let mut buffer: ReorderBuffer<&str> = ReorderBuffer::new();
        buffer.push(1, "b");
        assert!(buffer.pop_ready().is_none());
        buffer.push(0, "a");
        assert_eq!(buffer.pop_ready(), Some("a"));
        assert_eq!(buffer.pop_ready(), Some("b"));
        assert!(buffer.pop_ready().is_none());
    }

    #[test]
    fn test_output_paths_keep_full_stem() {
        let prefix = PathBuf::from("/data/movie.subreads");
        assert_eq!(
            with_suffix(&prefix, "demux.report"),
            PathBuf::from("/data/movie.subreads.demux.report")
        );
        assert_eq!(
            with_suffix(&prefix, "0-1.demux.bam"),
            PathBuf::from("/data/movie.subreads.0-1.demux.bam")
        );
    }
}
