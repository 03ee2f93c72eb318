use crate::barcode::tag::BarcodeHitPair;

///////////////////////////////
/// Outcome of the threshold checks for one group. keep covers the three
/// score, length and passes thresholds; keep_output additionally applies the
/// symmetry policy and decides whether records leave the sink.
#[derive(Clone, Debug)]
pub struct GroupVerdict {
    pub above_min_score: bool,
    pub above_min_length: bool,
    pub above_min_passes: bool,
    pub num_passes: i32,
    pub keep: bool,
    pub keep_output: bool,
    /// Per subread: clipped span longer than the length threshold
    pub subread_keep: Vec<bool>,
}

///////////////////////////////
/// Apply min-score, min-length and min-passes thresholds plus the symmetry
/// policy to a scored group.
///
/// A pass is a subread with both ends scored. The length check is strict:
/// a clipped span must exceed min_length, and one qualifying subread is
/// enough to keep the group.
pub fn evaluate_group(
    pair: &BarcodeHitPair,
    min_score: i32,
    min_length: i32,
    min_passes: i32,
    keep_symmetric: bool,
) -> GroupVerdict {
    let above_min_score = (pair.mean_score as i32) >= min_score;

    let n = pair.left.clips.len();
    let mut subread_keep = Vec::with_capacity(n);
    let mut num_passes = 0;
    for i in 0..n {
        subread_keep.push(pair.right.clips[i] - pair.left.clips[i] > min_length);
        if pair.left.scores[i] != -1 && pair.right.scores[i] != -1 {
            num_passes += 1;
        }
    }
    let above_min_length = subread_keep.iter().any(|&k| k);
    let above_min_passes = num_passes >= min_passes;

    let keep = above_min_score && above_min_length && above_min_passes;
    let symmetric = pair.left.idx == pair.right.idx;
    let keep_output = keep && (!keep_symmetric || symmetric);

    GroupVerdict {
        above_min_score,
        above_min_length,
        above_min_passes,
        num_passes,
        keep,
        keep_output,
        subread_keep,
    }
}
