use candle_core::Tensor;

/// Finite stand-in for the cost of a target no frame path can produce. Large
/// enough to dominate any real cost while staying safe in f32 arithmetic.
pub const IMPOSSIBLE_COST: f32 = 1e10;

/// Probabilities are clipped to this floor before taking logs.
const PROB_FLOOR: f64 = 1e-12;

/// Negative log-likelihood of each target under per-frame class distributions.
///
/// `probs` is `(batch, frames, classes)` with rows already normalized and the
/// blank in the last class. Targets hold true-length label sequences, one per
/// batch row. Entries for targets with no legal path come back as
/// [`IMPOSSIBLE_COST`]. The result is detached from the autodiff graph; use
/// [`ctc_pseudo_cost`] for the training signal.
pub fn ctc_cost(probs: &Tensor, targets: &[Vec<usize>]) -> candle_core::Result<Tensor> {
    let (batch, _t_len, num_classes) = probs.dims3()?;
    check_targets(batch, num_classes, targets)?;

    let rows = probs.to_vec3::<f32>()?;
    let blank = num_classes - 1;
    let mut costs = Vec::with_capacity(batch);
    for (example, labels) in rows.iter().zip(targets) {
        costs.push(sequence_cost(example, labels, blank));
    }
    Tensor::from_vec(costs, batch, probs.device())
}

/// Per-batch surrogate cost whose autodiff gradient w.r.t. `logits` equals
/// softmax(logits) minus the per-frame label marginals of the target.
///
/// The likelihood itself is never differentiated through the lattice. The
/// gradient is assembled on the host from a forward/backward pass and enters
/// the graph as a constant factor of a plain product, so backpropagation
/// reproduces it exactly. Keep the product form intact: collapsing it
/// algebraically changes the backward pass and breaks training.
pub fn ctc_pseudo_cost(logits: &Tensor, targets: &[Vec<usize>]) -> candle_core::Result<Tensor> {
    let (batch, t_len, num_classes) = logits.dims3()?;
    check_targets(batch, num_classes, targets)?;

    // host copy, the graph only ever sees the final product
    let rows = logits.to_vec3::<f32>()?;
    let blank = num_classes - 1;
    let mut grad = Vec::with_capacity(batch * t_len * num_classes);
    for (example, labels) in rows.iter().zip(targets) {
        let probs = softmax_rows(example);
        let states = interleave_blanks(labels, blank);
        match label_marginals(&probs, t_len, num_classes, &states) {
            Some(gamma) => grad.extend(
                probs
                    .iter()
                    .zip(&gamma)
                    .map(|(&p, &g)| (p - g) as f32),
            ),
            // unalignable targets contribute nothing to the update
            None => grad.extend(std::iter::repeat(0f32).take(t_len * num_classes)),
        }
    }

    let grad = Tensor::from_vec(grad, (batch, t_len, num_classes), logits.device())?;
    logits.mul(&grad)?.sum(2)?.sum(1)
}

/// Negative log-likelihood of `labels` for a single example.
///
/// Rows are frames, columns class probabilities with the blank at index
/// `blank`. Returns [`IMPOSSIBLE_COST`] when no legal path exists, e.g. when
/// the frame count cannot fit the blank-expanded target.
pub fn sequence_cost(probs: &[Vec<f32>], labels: &[usize], blank: usize) -> f32 {
    let t_len = probs.len();
    let num_classes = blank + 1;
    debug_assert!(probs.iter().all(|row| row.len() == num_classes));

    let flat: Vec<f64> = probs
        .iter()
        .flat_map(|row| row.iter().map(|&p| f64::from(p)))
        .collect();
    let states = interleave_blanks(labels, blank);
    let log_lik = forward_lattice(&flat, t_len, num_classes, &states).log_lik;
    if log_lik == f64::NEG_INFINITY {
        IMPOSSIBLE_COST
    } else {
        (-log_lik) as f32
    }
}

fn check_targets(
    batch: usize,
    num_classes: usize,
    targets: &[Vec<usize>],
) -> candle_core::Result<()> {
    if num_classes < 2 {
        return Err(candle_core::Error::Msg(format!(
            "class dimension must hold at least one symbol plus the blank, got {num_classes}"
        )));
    }
    if targets.len() != batch {
        return Err(candle_core::Error::Msg(format!(
            "batch of {batch} slabs but {} target sequences",
            targets.len()
        )));
    }
    let blank = num_classes - 1;
    for (i, labels) in targets.iter().enumerate() {
        if let Some(&bad) = labels.iter().find(|&&l| l >= blank) {
            return Err(candle_core::Error::Msg(format!(
                "target {i} contains label {bad}, outside {blank} real symbols"
            )));
        }
    }
    Ok(())
}

/// Blank-interleaved target: blank, l0, blank, l1, ..., blank.
fn interleave_blanks(labels: &[usize], blank: usize) -> Vec<usize> {
    let mut states = Vec::with_capacity(2 * labels.len() + 1);
    states.push(blank);
    for &label in labels {
        states.push(label);
        states.push(blank);
    }
    states
}

fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

struct ForwardLattice {
    /// `t_len * s_len`, log mass of prefixes ending at each state.
    alpha: Vec<f64>,
    /// `t_len * s_len`, floored log probability of each state's class.
    log_emit: Vec<f64>,
    log_lik: f64,
}

/// Forward recurrence over the interleaved target, restricted to the band of
/// states that can both be reached from the start and still make the end.
fn forward_lattice(
    probs: &[f64],
    t_len: usize,
    num_classes: usize,
    states: &[usize],
) -> ForwardLattice {
    let s_len = states.len();
    if t_len == 0 {
        return ForwardLattice {
            alpha: Vec::new(),
            log_emit: Vec::new(),
            log_lik: f64::NEG_INFINITY,
        };
    }

    let mut log_emit = vec![0f64; t_len * s_len];
    for t in 0..t_len {
        for (s, &state) in states.iter().enumerate() {
            log_emit[t * s_len + s] = probs[t * num_classes + state].max(PROB_FLOOR).ln();
        }
    }

    let mut alpha = vec![f64::NEG_INFINITY; t_len * s_len];
    alpha[0] = log_emit[0];
    if s_len > 1 {
        alpha[1] = log_emit[1];
    }

    let final_floor_state = s_len.saturating_sub(2);
    for t in 1..t_len {
        let remaining = t_len - 1 - t;
        let row_start = final_floor_state.saturating_sub(2 * remaining);
        let row_end = (2 * t + 1).min(s_len - 1);
        let prev = (t - 1) * s_len;
        let curr = t * s_len;
        for s in row_start..=row_end {
            let mut acc = alpha[prev + s];
            if s >= 1 {
                acc = log_add(acc, alpha[prev + s - 1]);
            }
            // blanks repeat at even states, so the inequality alone also
            // forbids skipping into a blank
            if s >= 2 && states[s] != states[s - 2] {
                acc = log_add(acc, alpha[prev + s - 2]);
            }
            alpha[curr + s] = acc + log_emit[curr + s];
        }
    }

    let last = (t_len - 1) * s_len;
    let mut log_lik = alpha[last + s_len - 1];
    if s_len >= 2 {
        log_lik = log_add(log_lik, alpha[last + s_len - 2]);
    }
    ForwardLattice {
        alpha,
        log_emit,
        log_lik,
    }
}

/// Posterior mass per frame and class, summed over lattice states that carry
/// each class. Rows sum to one. `None` when no legal path exists.
fn label_marginals(
    probs: &[f64],
    t_len: usize,
    num_classes: usize,
    states: &[usize],
) -> Option<Vec<f64>> {
    let fwd = forward_lattice(probs, t_len, num_classes, states);
    if fwd.log_lik == f64::NEG_INFINITY {
        return None;
    }

    let s_len = states.len();
    let last = t_len - 1;
    let mut beta = vec![f64::NEG_INFINITY; t_len * s_len];
    beta[last * s_len + s_len - 1] = fwd.log_emit[last * s_len + s_len - 1];
    if s_len >= 2 {
        beta[last * s_len + s_len - 2] = fwd.log_emit[last * s_len + s_len - 2];
    }

    let final_floor_state = s_len.saturating_sub(2);
    for t in (0..last).rev() {
        let remaining = last - t;
        let row_start = final_floor_state.saturating_sub(2 * remaining);
        let row_end = (2 * t + 1).min(s_len - 1);
        let next = (t + 1) * s_len;
        let curr = t * s_len;
        for s in row_start..=row_end {
            let mut acc = beta[next + s];
            if s + 1 < s_len {
                acc = log_add(acc, beta[next + s + 1]);
            }
            if s + 2 < s_len && states[s + 2] != states[s] {
                acc = log_add(acc, beta[next + s + 2]);
            }
            beta[curr + s] = acc + fwd.log_emit[curr + s];
        }
    }

    // alpha and beta both count the emission at t, so divide one copy out
    let mut gamma = vec![0f64; t_len * num_classes];
    for t in 0..t_len {
        for (s, &state) in states.iter().enumerate() {
            let a = fwd.alpha[t * s_len + s];
            let b = beta[t * s_len + s];
            if a == f64::NEG_INFINITY || b == f64::NEG_INFINITY {
                continue;
            }
            let log_post = a + b - fwd.log_emit[t * s_len + s] - fwd.log_lik;
            gamma[t * num_classes + state] += log_post.exp();
        }
    }
    Some(gamma)
}

fn softmax_rows(rows: &[Vec<f32>]) -> Vec<f64> {
    let mut out = Vec::with_capacity(rows.len() * rows.first().map_or(0, Vec::len));
    for row in rows {
        let max = row
            .iter()
            .fold(f64::NEG_INFINITY, |m, &v| m.max(f64::from(v)));
        let exps: Vec<f64> = row.iter().map(|&v| (f64::from(v) - max).exp()).collect();
        let denom: f64 = exps.iter().sum();
        out.extend(exps.iter().map(|e| e / denom));
    }
    out
}
