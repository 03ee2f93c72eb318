use crate::barcode::catalog::Barcode;

///////////////////////////////
/// Integer alignment scores. Stored with the sign the recurrence adds
/// directly: match positive, all penalties negative. Constructed from the
/// positive magnitudes the CLI exposes.
///
/// The branch penalty is charged for an insertion of a base identical to the
/// next barcode base (extension of a homopolymer run); any other insertion
/// costs the full insertion penalty.
#[derive(Clone, Copy, Debug)]
pub struct AlignParameters {
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub deletion_penalty: i32,
    pub insertion_penalty: i32,
    pub branch_penalty: i32,
}

impl AlignParameters {
    pub fn from_magnitudes(
        match_score: i32,
        mismatch_penalty: i32,
        deletion_penalty: i32,
        insertion_penalty: i32,
        branch_penalty: i32,
    ) -> AlignParameters {
        AlignParameters {
            match_score,
            mismatch_penalty: -mismatch_penalty.abs(),
            deletion_penalty: -deletion_penalty.abs(),
            insertion_penalty: -insertion_penalty.abs(),
            branch_penalty: -branch_penalty.abs(),
        }
    }
}

///////////////////////////////
/// Semi-global Smith-Waterman over a flat integer matrix. The matrix buffer
/// is grown on demand and reused across alignments, so a worker allocates at
/// most once per distinct window size.
pub struct SwAligner {
    params: AlignParameters,
    matrix: Vec<i32>,
}

impl SwAligner {
    pub fn new(params: AlignParameters) -> SwAligner {
        SwAligner {
            params,
            matrix: Vec::new(),
        }
    }

    ///////////////////////////////
    /// Align the query against the window and return (max score, end column)
    /// on the query-terminal row. Ties take the smallest column.
    pub fn align(&mut self, query: &[u8], window: &[u8]) -> (i32, i32) {
        self.compute_matrix(query, window, false);
        self.last_row_max(query.len(), window.len())
    }

    /// Row 0 and column 0 are free on the read side. With global_in_query the
    /// query must be consumed from its first base and column 0 carries the
    /// accumulated deletion penalty instead.
    fn compute_matrix(&mut self, query: &[u8], window: &[u8], global_in_query: bool) {
        let m = query.len() + 1;
        let n = window.len() + 1;
        if self.matrix.len() < m * n {
            self.matrix.resize(m * n, 0);
        }
        let p = self.params;
        let mismatch_delta = p.match_score - p.mismatch_penalty;
        let insertion_delta = p.branch_penalty - p.insertion_penalty;

        self.matrix[0] = 0;
        for i in 1..m {
            self.matrix[i * n] = if global_in_query {
                i as i32 * p.deletion_penalty
            } else {
                0
            };
        }
        for j in 1..n {
            self.matrix[j] = 0;
        }

        for i in 1..m {
            let q_before = query[i - 1];
            if i < m - 1 {
                let q_next = query[i];
                for j in 1..n {
                    let r = window[j - 1];
                    let mut a = self.matrix[(i - 1) * n + j - 1] + p.match_score;
                    let mut b = self.matrix[i * n + j - 1] + p.branch_penalty;
                    let c = self.matrix[(i - 1) * n + j] + p.deletion_penalty;
                    if r != q_before {
                        a -= mismatch_delta;
                    }
                    if r != q_next {
                        b -= insertion_delta;
                    }
                    self.matrix[i * n + j] = a.max(b).max(c);
                }
            } else {
                //Final query row: there is no next base, a left move is a plain insertion
                for j in 1..n {
                    let r = window[j - 1];
                    let mut a = self.matrix[(i - 1) * n + j - 1] + p.match_score;
                    let b = self.matrix[i * n + j - 1] + p.insertion_penalty;
                    let c = self.matrix[(i - 1) * n + j] + p.deletion_penalty;
                    if r != q_before {
                        a -= mismatch_delta;
                    }
                    self.matrix[i * n + j] = a.max(b).max(c);
                }
            }
        }
    }

    fn last_row_max(&self, query_len: usize, window_len: usize) -> (i32, i32) {
        let n = window_len + 1;
        let begin_last_row = query_len * n;

        let mut max_score = -1;
        let mut end_pos = 0;
        for j in 0..n {
            if self.matrix[begin_last_row + j] > max_score {
                max_score = self.matrix[begin_last_row + j];
                end_pos = j as i32;
            }
        }
        (max_score, end_pos)
    }
}

///////////////////////////////
/// Best score of one barcode against one read window. The score is already
/// normalized to the 0..100 scale; the clip is in read-local coordinates.
#[derive(Clone, Copy, Debug)]
pub struct EndScore {
    pub norm: f64,
    pub clip: i32,
}

///////////////////////////////
/// Aligns every catalog entry, forward and reverse complement, against the
/// left or right window of a read.
///
/// The left window is the read prefix of width W = floor(B * mult) with B the
/// catalog-wide maximum barcode length. The right window is the suffix of the
/// same width. For the right end both the window and the barcode orientations
/// are reversed, so the end column of the alignment converts directly to the
/// forward-coordinate begin of the barcode on the read:
/// clip = right_begin + (|window| - end).
pub struct WindowAligner {
    sw: SwAligner,
    window_len: usize,
    max_bc_len: usize,
    match_score: i32,
    rev_window: Vec<u8>,
}

impl WindowAligner {
    pub fn new(params: AlignParameters, max_bc_len: usize, window_size_mult: f64) -> WindowAligner {
        WindowAligner {
            sw: SwAligner::new(params),
            window_len: (max_bc_len as f64 * window_size_mult) as usize,
            max_bc_len,
            match_score: params.match_score,
            rev_window: Vec::new(),
        }
    }

    /// 100 is the per-base maximum for a match of full catalog-wide length,
    /// so scores are comparable across catalog entries
    fn normalize(&self, score: i32) -> f64 {
        (100.0 * score as f64).round() / (self.max_bc_len as i32 * self.match_score) as f64
    }

    ///////////////////////////////
    /// Score all barcodes against the left window. The clip column is the
    /// read coordinate just past the barcode.
    pub fn align_left(&mut self, read: &[u8], barcodes: &[Barcode], out: &mut Vec<EndScore>) {
        out.clear();
        let window = &read[..read.len().min(self.window_len)];
        for bc in barcodes {
            let (score_fwd, end_fwd) = self.sw.align(&bc.bases, window);
            let (score_rc, end_rc) = self.sw.align(&bc.bases_rc, window);
            let (score, end) = if score_fwd >= score_rc {
                (score_fwd, end_fwd)
            } else {
                (score_rc, end_rc)
            };
            out.push(EndScore {
                norm: self.normalize(score),
                clip: end,
            });
        }
    }

    ///////////////////////////////
    /// Score all barcodes against the right window. The clip column is the
    /// read coordinate where the barcode begins.
    pub fn align_right(&mut self, read: &[u8], barcodes: &[Barcode], out: &mut Vec<EndScore>) {
        out.clear();
        let wlen = read.len().min(self.window_len);
        let right_begin = (read.len() - wlen) as i32;

        self.rev_window.clear();
        self.rev_window.extend(read[read.len() - wlen..].iter().rev());
        let rev_window = std::mem::take(&mut self.rev_window);

        for bc in barcodes {
            let (score_fwd, end_fwd) = self.sw.align(&bc.bases_rev, &rev_window);
            let (score_rc, end_rc) = self.sw.align(&bc.bases_comp, &rev_window);
            let (score, end) = if score_fwd >= score_rc {
                (score_fwd, end_fwd)
            } else {
                (score_rc, end_rc)
            };
            out.push(EndScore {
                norm: self.normalize(score),
                clip: right_begin + (wlen as i32 - end),
            });
        }
        self.rev_window = rev_window;
    }
}
