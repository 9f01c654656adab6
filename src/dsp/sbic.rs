/// Two-pass change-point detection over a per-frame feature matrix.
///
/// A coarse pass slides a large window over the frames and scores how
/// different the two half-windows are (mean distance normalized by pooled
/// variance, against a complexity-penalty threshold). A finer pass then
/// re-scores a neighbourhood of each candidate with a smaller window and
/// keeps the best position. Boundaries closer together than the minimum
/// segment length collapse to the earlier one.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterParams {
    pub size1: usize,
    pub inc1: usize,
    pub size2: usize,
    pub inc2: usize,
    pub cpw: f32,
    pub min_length: usize,
}

/// Boundary frame indices, always starting at 0 and ending at
/// `features.len()` when the input is usable. An input too short for even
/// one coarse window yields fewer than two points, which callers must
/// treat as "no usable segmentation".
pub fn segment_boundaries(features: &[Vec<f32>], params: &SegmenterParams) -> Vec<usize> {
    let n = features.len();
    let size1 = params.size1.max(4);
    if n < size1 {
        return Vec::new();
    }

    // coarse scan
    let mut scores = Vec::new();
    let mut center = size1 / 2;
    while center + size1 / 2 <= n {
        scores.push((center, split_distance(features, center, size1)));
        center += params.inc1.max(1);
    }
    if scores.is_empty() {
        return Vec::new();
    }

    let mean_score =
        scores.iter().map(|(_, s)| *s).sum::<f32>() / scores.len() as f32;
    let threshold = params.cpw * mean_score;

    let mut candidates = Vec::new();
    for i in 0..scores.len() {
        let (center, score) = scores[i];
        let left = if i > 0 { scores[i - 1].1 } else { f32::NEG_INFINITY };
        let right = if i + 1 < scores.len() { scores[i + 1].1 } else { f32::NEG_INFINITY };
        if score > threshold && score >= left && score >= right {
            candidates.push(center);
        }
    }

    // refinement around each candidate with the smaller window
    let size2 = params.size2.max(4).min(size1);
    let mut cuts = Vec::new();
    for candidate in candidates {
        let radius = params.inc1.max(1);
        let lo = candidate.saturating_sub(radius).max(size2 / 2);
        let hi = (candidate + radius).min(n.saturating_sub(size2 / 2));
        let mut best = (candidate, f32::NEG_INFINITY);
        let mut pos = lo;
        while pos <= hi {
            let score = split_distance(features, pos, size2);
            if score > best.1 {
                best = (pos, score);
            }
            pos += params.inc2.max(1);
        }
        cuts.push(best.0);
    }

    cuts.sort_unstable();
    cuts.dedup();

    let mut boundaries = vec![0usize];
    for cut in cuts {
        if cut > 0
            && cut < n
            && cut - boundaries.last().copied().unwrap_or(0) >= params.min_length
        {
            boundaries.push(cut);
        }
    }
    // the final segment must also respect the minimum length
    if n - boundaries.last().copied().unwrap_or(0) < params.min_length && boundaries.len() > 1 {
        boundaries.pop();
    }
    boundaries.push(n);
    boundaries
}

/// Distance between the two halves of a window centered at `center`:
/// squared mean difference per dimension over pooled variance.
fn split_distance(features: &[Vec<f32>], center: usize, window: usize) -> f32 {
    let half = window / 2;
    if center < half || center + half > features.len() {
        return 0.0;
    }
    let dims = features[0].len();
    let mut distance = 0.0f32;
    for d in 0..dims {
        let left: Vec<f32> = features[center - half..center].iter().map(|f| f[d]).collect();
        let right: Vec<f32> = features[center..center + half].iter().map(|f| f[d]).collect();
        let (ml, vl) = mean_var(&left);
        let (mr, vr) = mean_var(&right);
        distance += (ml - mr).powi(2) / (vl + vr + 1e-6);
    }
    distance / dims as f32
}

fn mean_var(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, var)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: SegmenterParams =
        SegmenterParams { size1: 40, inc1: 10, size2: 20, inc2: 5, cpw: 1.5, min_length: 10 };

    fn blocky_features(block_a: usize, block_b: usize) -> Vec<Vec<f32>> {
        let mut features = Vec::new();
        for i in 0..block_a {
            features.push(vec![0.0 + 0.01 * (i % 3) as f32, 1.0]);
        }
        for i in 0..block_b {
            features.push(vec![5.0 + 0.01 * (i % 3) as f32, -1.0]);
        }
        features
    }

    #[test]
    fn block_boundary_is_found() {
        let features = blocky_features(100, 100);
        let boundaries = segment_boundaries(&features, &PARAMS);
        assert_eq!(*boundaries.first().unwrap(), 0);
        assert_eq!(*boundaries.last().unwrap(), 200);
        assert!(boundaries.len() >= 3, "no interior cut found: {boundaries:?}");
        let interior = &boundaries[1..boundaries.len() - 1];
        assert!(
            interior.iter().any(|&b| (b as i64 - 100).unsigned_abs() <= 15),
            "cuts {interior:?} not near frame 100"
        );
    }

    #[test]
    fn short_input_yields_no_usable_segmentation() {
        let features = blocky_features(5, 5);
        assert!(segment_boundaries(&features, &PARAMS).len() < 2);
    }

    #[test]
    fn homogeneous_input_yields_one_segment() {
        let features = vec![vec![1.0, 1.0]; 120];
        let boundaries = segment_boundaries(&features, &PARAMS);
        assert_eq!(boundaries, vec![0, 120]);
    }

    #[test]
    fn boundaries_are_strictly_increasing() {
        let features = blocky_features(80, 150);
        let boundaries = segment_boundaries(&features, &PARAMS);
        assert!(boundaries.windows(2).all(|w| w[0] < w[1]));
    }
}
