use anyhow::ensure;

use crate::barcode::align::{EndScore, WindowAligner};
use crate::barcode::catalog::Barcode;

/// Adapter-context bits carried by the cx tag
pub const ADAPTER_BEFORE: u8 = 1;
pub const ADAPTER_AFTER: u8 = 2;

///////////////////////////////
/// The part of a read record the engine needs. Extracted once per record so
/// tagging works on plain memory.
#[derive(Clone, Debug)]
pub struct Subread {
    pub seq: Vec<u8>,
    pub context_flags: Option<u8>,
    pub query_start: Option<i32>,
}

impl Subread {
    /// Both ends are assumed present when no context is annotated
    pub fn has_adapter_left(&self) -> bool {
        self.context_flags
            .map(|cx| cx & ADAPTER_BEFORE != 0)
            .unwrap_or(true)
    }

    pub fn has_adapter_right(&self) -> bool {
        self.context_flags
            .map(|cx| cx & ADAPTER_AFTER != 0)
            .unwrap_or(true)
    }
}

///////////////////////////////
/// Running state for one barcode at one read end.
///
/// Invariant: scores and clips grow in lockstep, one entry per subread of the
/// group; -1 in scores marks a subread this end was not scored on. score_sum
/// only accumulates entries that were admitted to the ranking.
#[derive(Clone, Debug)]
struct ScoreClip {
    score_sum: f64,
    scores: Vec<i32>,
    clips: Vec<i32>,
}

impl ScoreClip {
    fn with_capacity(n: usize) -> ScoreClip {
        ScoreClip {
            score_sum: 0.0,
            scores: Vec::with_capacity(n),
            clips: Vec::with_capacity(n),
        }
    }

    fn add(&mut self, norm: f64, clip: i32, summed: bool) {
        self.scores.push(norm as i32);
        self.clips.push(clip);
        if summed {
            self.score_sum += norm;
        }
    }

    fn miss(&mut self, clip: i32) {
        self.scores.push(-1);
        self.clips.push(clip);
    }
}

///////////////////////////////
/// The chosen barcode for one read end of one group
#[derive(Clone, Debug)]
pub struct BarcodeHit {
    pub idx: u16,
    pub score: u8,
    pub scores: Vec<i32>,
    pub clips: Vec<i32>,
}

///////////////////////////////
/// Left and right call for one group
#[derive(Clone, Debug)]
pub struct BarcodeHitPair {
    pub left: BarcodeHit,
    pub right: BarcodeHit,
    pub mean_score: u8,
}

impl BarcodeHitPair {
    pub fn new(left: BarcodeHit, right: BarcodeHit) -> BarcodeHitPair {
        let mean_score = ((left.score as u16 + right.score as u16) / 2) as u8;
        BarcodeHitPair {
            left,
            right,
            mean_score,
        }
    }
}

///////////////////////////////
/// Aggregate end-window scores over all subreads of one group and pick the
/// best left and right catalog index.
///
/// Sum gating: with max_scored_reads == 0 every scored end feeds the ranking
/// sum. With a positive cap only adapter-complete subreads do, and only the
/// first cap-many of them; later subreads keep their per-subread scores for
/// reporting but do not move the ranking.
pub fn tag_group(
    subreads: &[Subread],
    barcodes: &[Barcode],
    aligner: &mut WindowAligner,
    max_scored_reads: i32,
) -> anyhow::Result<BarcodeHitPair> {
    let n_barcodes = barcodes.len();
    let n_subreads = subreads.len();
    ensure!(n_barcodes > 0, "Empty barcode catalog");
    ensure!(n_subreads > 0, "Empty subread group");

    let mut left: Vec<ScoreClip> = (0..n_barcodes)
        .map(|_| ScoreClip::with_capacity(n_subreads))
        .collect();
    let mut right: Vec<ScoreClip> = (0..n_barcodes)
        .map(|_| ScoreClip::with_capacity(n_subreads))
        .collect();

    let mut n_summed_left = 0usize;
    let mut n_summed_right = 0usize;
    let mut n_complete_summed = 0i32;
    let mut scratch: Vec<EndScore> = Vec::with_capacity(n_barcodes);

    for sr in subreads {
        let has_left = sr.has_adapter_left();
        let has_right = sr.has_adapter_right();
        let read_len = sr.seq.len() as i32;

        let summed = if max_scored_reads > 0 {
            let admit = has_left && has_right && n_complete_summed < max_scored_reads;
            if admit {
                n_complete_summed += 1;
            }
            admit
        } else {
            true
        };

        if has_left && !sr.seq.is_empty() {
            aligner.align_left(&sr.seq, barcodes, &mut scratch);
            for (acc, es) in left.iter_mut().zip(scratch.iter()) {
                acc.add(es.norm, es.clip, summed);
            }
            if summed {
                n_summed_left += 1;
            }
        } else {
            for acc in left.iter_mut() {
                acc.miss(0);
            }
        }

        if has_right && !sr.seq.is_empty() {
            aligner.align_right(&sr.seq, barcodes, &mut scratch);
            for (acc, es) in right.iter_mut().zip(scratch.iter()) {
                acc.add(es.norm, es.clip, summed);
            }
            if summed {
                n_summed_right += 1;
            }
        } else {
            //A missing right end keeps the full subread length clippable
            for acc in right.iter_mut() {
                acc.miss(read_len);
            }
        }
    }

    let left_hit = best_hit(&left, n_summed_left, n_subreads)?;
    let right_hit = best_hit(&right, n_summed_right, n_subreads)?;
    Ok(BarcodeHitPair::new(left_hit, right_hit))
}

/// Divide each barcode's sum by the number of admitted subreads and take the
/// argmax, ties to the lowest index. With nothing admitted all sums are zero
/// and the hit degrades to index 0 with score 0 over the recorded sentinels.
fn best_hit(accs: &[ScoreClip], n_summed: usize, n_subreads: usize) -> anyhow::Result<BarcodeHit> {
    for acc in accs {
        ensure!(
            acc.scores.len() == n_subreads && acc.clips.len() == n_subreads,
            "Accumulator length mismatch: {} scores, {} clips, {} subreads",
            acc.scores.len(),
            acc.clips.len(),
            n_subreads
        );
    }

    let denom = n_summed.max(1) as f64;
    let mut best = 0usize;
    let mut best_score = f64::MIN;
    for (i, acc) in accs.iter().enumerate() {
        let s = acc.score_sum / denom;
        if s > best_score {
            best = i;
            best_score = s;
        }
    }

    Ok(BarcodeHit {
        idx: best as u16,
        score: best_score.round().clamp(0.0, 255.0) as u8,
        scores: accs[best].scores.clone(),
        clips: accs[best].clips.clone(),
    })
}
