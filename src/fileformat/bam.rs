use std::path::Path;

use anyhow::Context;
use rust_htslib::bam;
use rust_htslib::bam::record::Aux;

use crate::barcode::tag::Subread;
use crate::fileformat::error::Error;

///////////////////////////////
/// How a positional input is routed: read datasets go to the demultiplexer,
/// FASTA files join the barcode catalog.
#[derive(Clone, Copy, Debug)]
pub enum InputKind {
    Dataset(bam::Format),
    Catalog,
}

//detect file role from file extension
pub fn detect_input_kind(fname: &Path) -> anyhow::Result<InputKind> {
    let fext = fname
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");
    match fext {
        "sam" => Ok(InputKind::Dataset(bam::Format::Sam)),
        "bam" => Ok(InputKind::Dataset(bam::Format::Bam)),
        "cram" => Ok(InputKind::Dataset(bam::Format::Cram)),
        "fa" | "fasta" | "fna" => Ok(InputKind::Catalog),
        _ => Err(Error::UnsupportedInput {
            path: fname.to_path_buf(),
        }
        .into()),
    }
}

pub fn open_dataset(fname: &Path) -> anyhow::Result<bam::Reader> {
    bam::Reader::from_path(fname).with_context(|| format!("Failed to open dataset {:?}", fname))
}

pub fn create_writer(fname: &Path, header: &bam::Header) -> anyhow::Result<bam::Writer> {
    let writer = bam::Writer::from_path(fname, header, bam::Format::Bam)
        .with_context(|| format!("Failed to create output file {:?}", fname))?;
    Ok(writer)
}

fn aux_int(record: &bam::Record, tag: &[u8]) -> Option<i64> {
    match record.aux(tag) {
        Ok(Aux::I8(v)) => Some(v as i64),
        Ok(Aux::U8(v)) => Some(v as i64),
        Ok(Aux::I16(v)) => Some(v as i64),
        Ok(Aux::U16(v)) => Some(v as i64),
        Ok(Aux::I32(v)) => Some(v as i64),
        Ok(Aux::U32(v)) => Some(v as i64),
        _ => None,
    }
}

///////////////////////////////
/// The ZMW hole number that groups subreads. Taken from the zm tag, with a
/// fallback to the movie/zmw/range read name convention.
pub fn group_key(record: &bam::Record) -> anyhow::Result<i32> {
    if let Some(zm) = aux_int(record, b"zm") {
        return Ok(zm as i32);
    }

    let name = String::from_utf8_lossy(record.qname()).to_string();
    if let Some(field) = name.split('/').nth(1) {
        if let Ok(zm) = field.parse::<i32>() {
            return Ok(zm);
        }
    }
    Err(Error::MissingGroupKey { name }.into())
}

pub fn context_flags(record: &bam::Record) -> Option<u8> {
    aux_int(record, b"cx").map(|cx| cx as u8)
}

pub fn query_start(record: &bam::Record) -> Option<i32> {
    aux_int(record, b"qs").map(|qs| qs as i32)
}

///////////////////////////////
/// Extract the fields the engine works on
pub fn subread_view(record: &bam::Record) -> Subread {
    Subread {
        seq: record.seq().as_bytes(),
        context_flags: context_flags(record),
        query_start: query_start(record),
    }
}

///////////////////////////////
/// Clone a record clipped to [clip_left, clip_right) in read-local
/// coordinates, with the chosen barcode pair and its quality attached. The
/// qs/qe tags are advanced by the clip so they stay in query coordinates.
pub fn clip_record(
    record: &bam::Record,
    clip_left: i32,
    clip_right: i32,
    barcode_pair: (u16, u16),
    barcode_quality: u8,
) -> anyhow::Result<bam::Record> {
    let seq = record.seq().as_bytes();
    let left = clip_left.max(0) as usize;
    let right = (clip_right.max(clip_left).max(0) as usize).min(seq.len());

    let qual = record.qual();
    let clipped_qual: &[u8] = if qual.len() == seq.len() {
        &qual[left..right]
    } else {
        &[]
    };

    let mut out = bam::Record::new();
    out.set(record.qname(), None, &seq[left..right], clipped_qual);
    out.set_flags(record.flags());
    out.set_tid(-1);
    out.set_pos(-1);
    out.set_mtid(-1);
    out.set_mpos(-1);

    if let Some(zm) = aux_int(record, b"zm") {
        out.push_aux(b"zm", Aux::I32(zm as i32))?;
    }
    if let Some(cx) = aux_int(record, b"cx") {
        out.push_aux(b"cx", Aux::U8(cx as u8))?;
    }
    if let Some(qs) = query_start(record) {
        out.push_aux(b"qs", Aux::I32(qs + left as i32))?;
        out.push_aux(b"qe", Aux::I32(qs + right as i32))?;
    }

    let pair = vec![barcode_pair.0, barcode_pair.1];
    out.push_aux(b"bc", Aux::ArrayU16((&pair).into()))?;
    out.push_aux(b"bq", Aux::U8(barcode_quality))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &[u8], seq: &[u8]) -> bam::Record {
        let mut rec = bam::Record::new();
        let qual: Vec<u8> = vec![30; seq.len()];
        rec.set(name, None, seq, &qual);
        rec.set_flags(4);
        rec
    }

    #[test]
    fn test_detect_input_kind() {
        assert!(matches!(
            detect_input_kind(Path::new("movie.subreads.bam")).unwrap(),
            InputKind::Dataset(_)
        ));
        assert!(matches!(
            detect_input_kind(Path::new("bc.fasta")).unwrap(),
            InputKind::Catalog
        ));
        assert!(detect_input_kind(Path::new("reads.fastq")).is_err());
    }

    #[test]
    fn test_group_key_from_tag_and_name() {
        let mut rec = record(b"m54006/4391/0_100", b"ACGT");
        rec.push_aux(b"zm", Aux::I32(77)).unwrap();
        assert_eq!(group_key(&rec).unwrap(), 77);

        let rec = record(b"m54006/4391/0_100", b"ACGT");
        assert_eq!(group_key(&rec).unwrap(), 4391);

        let rec = record(b"anonymous-read", b"ACGT");
        assert!(group_key(&rec).is_err());
    }

    #[test]
    fn test_subread_view_picks_up_tags() {
        let mut rec = record(b"m54006/1/0_8", b"ACGTACGT");
        rec.push_aux(b"cx", Aux::U8(3)).unwrap();
        rec.push_aux(b"qs", Aux::I32(1000)).unwrap();

        let view = subread_view(&rec);
        assert_eq!(view.seq, b"ACGTACGT".to_vec());
        assert_eq!(view.context_flags, Some(3));
        assert_eq!(view.query_start, Some(1000));
    }

    #[test]
    fn test_clip_record_trims_and_tags() {
        let mut rec = record(b"m54006/1/1000_1012", b"AACCGGTTAACC");
        rec.push_aux(b"qs", Aux::I32(1000)).unwrap();

        let out = clip_record(&rec, 2, 10, (3, 5), 88).unwrap();
        assert_eq!(out.seq().as_bytes(), b"CCGGTTAA".to_vec());
        assert_eq!(out.qual().len(), 8);

        match out.aux(b"bc").unwrap() {
            Aux::ArrayU16(arr) => {
                let v: Vec<u16> = arr.iter().collect();
                assert_eq!(v, vec![3, 5]);
            }
            _ => panic!("bc tag has wrong type"),
        }
        match out.aux(b"bq").unwrap() {
            Aux::U8(v) => assert_eq!(v, 88),
            _ => panic!("bq tag has wrong type"),
        }
        match out.aux(b"qs").unwrap() {
            Aux::I32(v) => assert_eq!(v, 1002),
            _ => panic!("qs tag has wrong type"),
        }
        match out.aux(b"qe").unwrap() {
            Aux::I32(v) => assert_eq!(v, 1010),
            _ => panic!("qe tag has wrong type"),
        }
    }

    #[test]
    fn test_clip_record_clamps_out_of_range() {
        let rec = record(b"m54006/1/0_4", b"ACGT");
        let out = clip_record(&rec, -3, 99, (0, 0), 50).unwrap();
        assert_eq!(out.seq().as_bytes(), b"ACGT".to_vec());
    }
}
