//! End to end runs over a small synthetic dataset: three ZMWs exercising the
//! pass, missing-adapter and too-short cases, checked against every output
//! file the demux command produces.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_htslib::bam;
use rust_htslib::bam::record::Aux;
use rust_htslib::bam::Read;

use lima::barcode::align::AlignParameters;
use lima::command::demux::core::core::Demux;
use lima::command::demux::core::params;

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lima_demux_{}_{}", std::process::id(), name));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_catalog(dir: &Path) -> PathBuf {
    let path = dir.join("barcodes.fasta");
    std::fs::write(&path, ">BC1\nACGTACGT\n>BC2\nTTTTAAAA\n").unwrap();
    path
}

fn make_record(name: &[u8], seq: &[u8], zmw: i32, cx: u8) -> bam::Record {
    let mut rec = bam::Record::new();
    let qual = vec![30u8; seq.len()];
    rec.set(name, None, seq, &qual);
    rec.set_flags(4);
    rec.set_tid(-1);
    rec.set_pos(-1);
    rec.set_mtid(-1);
    rec.set_mpos(-1);
    rec.push_aux(b"zm", Aux::I32(zmw)).unwrap();
    rec.push_aux(b"cx", Aux::U8(cx)).unwrap();
    rec
}

fn bc1_read(middle: usize) -> Vec<u8> {
    let mut seq = b"ACGTACGT".to_vec();
    seq.extend(std::iter::repeat(b'N').take(middle));
    seq.extend_from_slice(b"ACGTACGT");
    seq
}

/// ZMW 1: two good subreads; ZMW 2: right adapter only; ZMW 3: too short
fn write_dataset(dir: &Path) -> PathBuf {
    let path = dir.join("movie.subreads.bam");
    let header = bam::Header::new();
    {
        let mut writer = bam::Writer::from_path(&path, &header, bam::Format::Bam).unwrap();

        writer
            .write(&make_record(b"m1/1/0_216", &bc1_read(200), 1, 3))
            .unwrap();
        writer
            .write(&make_record(b"m1/1/216_432", &bc1_read(200), 1, 3))
            .unwrap();

        let mut bc2_right: Vec<u8> = std::iter::repeat(b'N').take(100).collect();
        bc2_right.extend_from_slice(b"TTTTAAAA");
        writer
            .write(&make_record(b"m1/2/0_108", &bc2_right, 2, 2))
            .unwrap();

        writer
            .write(&make_record(b"m1/3/0_36", &bc1_read(20), 3, 3))
            .unwrap();
    }
    path
}

fn run_demux(dataset: &Path, catalog: &Path, threads: usize, chunk_size: usize) {
    let params_io = params::IO {
        datasets: vec![dataset.to_path_buf()],
        barcode_files: vec![catalog.to_path_buf()],
        no_bam: false,
        no_reports: false,
        split_bam: false,
    };
    let params_runtime = params::Runtime {
        align: AlignParameters::from_magnitudes(4, 13, 7, 7, 4),
        window_size_mult: 1.2,
        min_score: 51,
        min_length: 50,
        min_passes: 1,
        max_scored_reads: 0,
        keep_symmetric: false,
        per_subread: false,
    };
    let params_threading = params::Threading {
        threads_work: threads,
        chunk_size,
    };
    let barcodes = lima::barcode::catalog::read_barcodes(catalog).unwrap();

    Demux::run(
        Arc::new(params_io),
        Arc::new(params_runtime),
        Arc::new(params_threading),
        Arc::new(barcodes),
    )
    .unwrap();
}

#[test]
fn test_demux_outputs() {
    let dir = test_dir("outputs");
    let catalog = write_catalog(&dir);
    let dataset = write_dataset(&dir);

    run_demux(&dataset, &catalog, 2, 1);

    // only the two subreads of ZMW 1 survive, clipped to the middle part
    let mut reader = bam::Reader::from_path(dir.join("movie.subreads.demux.bam")).unwrap();
    let mut n_records = 0;
    for r in reader.records() {
        let rec = r.unwrap();
        n_records += 1;
        assert_eq!(rec.seq().len(), 200);
        match rec.aux(b"bc").unwrap() {
            Aux::ArrayU16(arr) => {
                let v: Vec<u16> = arr.iter().collect();
                assert_eq!(v, vec![0, 0]);
            }
            _ => panic!("bc tag has wrong type"),
        }
        match rec.aux(b"bq").unwrap() {
            Aux::U8(v) => assert_eq!(v, 100),
            _ => panic!("bq tag has wrong type"),
        }
    }
    assert_eq!(n_records, 2);

    // one report line per ZMW, in input order
    let report = std::fs::read_to_string(dir.join("movie.subreads.demux.report")).unwrap();
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("ZMW\tIndexLeft\tIndexRight"));
    assert_eq!(
        lines[1],
        "1\t0\t0\t100\t100\t100\t8,8\t208,208\t100,100\t100,100\t2\t1"
    );
    assert_eq!(lines[2], "2\t0\t1\t0\t100\t50\t0\t100\t-1\t100\t0\t0");
    assert_eq!(lines[3], "3\t0\t0\t100\t100\t100\t8\t28\t100\t100\t1\t0");

    let summary = std::fs::read_to_string(dir.join("movie.subreads.demux.summary")).unwrap();
    assert!(summary.contains("ZMWs input                    : 3"));
    assert!(summary.contains("ZMWs above all thresholds (A) : 1"));
    assert!(summary.contains("ZMWs below any threshold  (B) : 2"));
    assert!(summary.contains("ZMWs below length threshold   : 1"));
    assert!(summary.contains("ZMWs below score threshold    : 1"));
    assert!(summary.contains("ZMWs below passes threshold   : 1"));
    assert!(summary.contains("ZMWs symmetric                : 1"));
    assert!(summary.contains("Reads above length            : 2"));

    let counts = std::fs::read_to_string(dir.join("movie.subreads.demux.counts")).unwrap();
    assert_eq!(counts, "IndexLeft\tIndexRight\tCounts\n0\t0\t1\n");
}

#[test]
fn test_report_is_deterministic_across_thread_counts() {
    let dir_a = test_dir("threads_1");
    let dir_b = test_dir("threads_4");

    let mut reports = Vec::new();
    for (dir, threads) in [(&dir_a, 1usize), (&dir_b, 4usize)] {
        let catalog = write_catalog(dir);
        let dataset = write_dataset(dir);
        run_demux(&dataset, &catalog, threads, 1);
        reports.push(
            std::fs::read_to_string(dir.join("movie.subreads.demux.report")).unwrap(),
        );
    }
    assert_eq!(reports[0], reports[1]);
}

#[test]
fn test_split_bam_routes_by_pair() {
    let dir = test_dir("split");
    let catalog = write_catalog(&dir);
    let dataset = write_dataset(&dir);

    let params_io = params::IO {
        datasets: vec![dataset.clone()],
        barcode_files: vec![catalog.clone()],
        no_bam: false,
        no_reports: false,
        split_bam: true,
    };
    let params_runtime = params::Runtime {
        align: AlignParameters::from_magnitudes(4, 13, 7, 7, 4),
        window_size_mult: 1.2,
        min_score: 51,
        min_length: 50,
        min_passes: 1,
        max_scored_reads: 0,
        keep_symmetric: false,
        per_subread: false,
    };
    let params_threading = params::Threading {
        threads_work: 2,
        chunk_size: 10,
    };
    let barcodes = lima::barcode::catalog::read_barcodes(&catalog).unwrap();

    Demux::run(
        Arc::new(params_io),
        Arc::new(params_runtime),
        Arc::new(params_threading),
        Arc::new(barcodes),
    )
    .unwrap();

    let split_path = dir.join("movie.subreads.0-0.demux.bam");
    assert!(split_path.exists());
    let mut reader = bam::Reader::from_path(&split_path).unwrap();
    assert_eq!(reader.records().count(), 2);
    assert!(!dir.join("movie.subreads.demux.bam").exists());
}
