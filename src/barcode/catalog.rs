use std::path::Path;

use anyhow::Context;
use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid base '{}' in barcode '{}'", *base as char, name)]
    InvalidBase { base: u8, name: String },

    #[error("Barcode file contains no entries: {:?}", path)]
    EmptyCatalog { path: std::path::PathBuf },

    #[error("Too many barcodes ({n}); indices are 16 bit")]
    TooManyBarcodes { n: usize },
}

///////////////////////////////
/// One entry of the barcode catalog. The index into the catalog vector is
/// the barcode id used in tags, reports and counts.
///
/// All four orientation strings are precomputed on load: the plain bases and
/// their reverse complement are aligned against the left read window, while
/// the reversed variants are aligned against the reversed right window
/// (rev(bases) = bases_rev, rev(bases_rc) = bases_comp).
#[derive(Clone, Debug)]
pub struct Barcode {
    pub name: String,
    pub bases: Vec<u8>,
    pub bases_rc: Vec<u8>,
    pub bases_rev: Vec<u8>,
    pub bases_comp: Vec<u8>,
}

impl Barcode {
    pub fn new(name: &str, bases: &[u8]) -> Result<Barcode, CatalogError> {
        let mut bases_comp = Vec::with_capacity(bases.len());
        for &b in bases {
            match complement(b) {
                Some(c) => bases_comp.push(c),
                None => {
                    return Err(CatalogError::InvalidBase {
                        base: b,
                        name: name.to_string(),
                    })
                }
            }
        }
        let bases_rc: Vec<u8> = bases_comp.iter().rev().cloned().collect();
        let bases_rev: Vec<u8> = bases.iter().rev().cloned().collect();
        Ok(Barcode {
            name: name.to_string(),
            bases: bases.to_vec(),
            bases_rc,
            bases_rev,
            bases_comp,
        })
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }
}

/// Case is preserved. Anything outside {A,C,G,T,a,c,g,t,-} has no complement.
pub fn complement(base: u8) -> Option<u8> {
    match base {
        b'A' => Some(b'T'),
        b'a' => Some(b't'),
        b'C' => Some(b'G'),
        b'c' => Some(b'g'),
        b'G' => Some(b'C'),
        b'g' => Some(b'c'),
        b'T' => Some(b'A'),
        b't' => Some(b'a'),
        b'-' => Some(b'-'),
        _ => None,
    }
}

///////////////////////////////
/// Reverse complement, None if the sequence contains a non-base byte
pub fn revcomp(seq: &[u8]) -> Option<Vec<u8>> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

///////////////////////////////
/// Read a barcode FASTA file, preserving input order
pub fn read_barcodes(path: &Path) -> anyhow::Result<Vec<Barcode>> {
    let reader = bio::io::fasta::Reader::from_file(path)
        .with_context(|| format!("Failed to open barcode file {:?}", path))?;

    let mut barcodes: Vec<Barcode> = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to parse barcode file {:?}", path))?;
        barcodes.push(Barcode::new(record.id(), record.seq())?);
    }

    if barcodes.is_empty() {
        return Err(CatalogError::EmptyCatalog {
            path: path.to_path_buf(),
        }
        .into());
    }
    if barcodes.len() > u16::MAX as usize {
        return Err(CatalogError::TooManyBarcodes { n: barcodes.len() }.into());
    }

    info!("Loaded {} barcodes from {:?}", barcodes.len(), path);
    Ok(barcodes)
}

/// Catalog-wide maximum barcode length; the score normalization denominator
pub fn max_barcode_len(barcodes: &[Barcode]) -> usize {
    barcodes.iter().map(|b| b.len()).max().unwrap_or(0)
}
