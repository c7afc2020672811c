use candle_core::{Module, Tensor, D};
use candle_nn::rnn::{gru, GRUConfig, GRU, RNN};
use candle_nn::{linear, Linear, VarBuilder, VarMap};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    pub input_dim: usize,
    pub l1_units: usize,
    pub l2_units: usize,
    /// Symbols plus the trailing blank.
    pub num_classes: usize,
    pub noise_sigma: f64,
}

/// Whether a forward pass perturbs its input. Evaluation never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

pub struct TranscriberOutput {
    /// `(batch, time, classes)`, pre-softmax.
    pub logits: Tensor,
    /// Softmax of `logits` over the class dimension.
    pub probs: Tensor,
}

/// Two stacked unidirectional GRU layers over slab columns, followed by a
/// per-frame linear head.
pub struct Transcriber {
    rnn1: GRU,
    rnn2: GRU,
    head: Linear,
    noise_sigma: f64,
}

impl Transcriber {
    pub fn new(cfg: &TranscriberConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let rnn1 = gru(cfg.input_dim, cfg.l1_units, GRUConfig::default(), vb.pp("rnn1"))?;
        let rnn2 = gru(cfg.l1_units, cfg.l2_units, GRUConfig::default(), vb.pp("rnn2"))?;
        let head = linear(cfg.l2_units, cfg.num_classes, vb.pp("head"))?;
        Ok(Self {
            rnn1,
            rnn2,
            head,
            noise_sigma: cfg.noise_sigma,
        })
    }

    /// Run slabs of shape `(batch, time, features)` through the network.
    ///
    /// In [`Mode::Train`] with a positive sigma, Gaussian noise drawn from
    /// `rng` is added to the input first. A zero sigma leaves `rng` untouched
    /// so training and evaluation stay step-for-step identical.
    pub fn forward(
        &self,
        slabs: &Tensor,
        mode: Mode,
        rng: &mut ChaCha8Rng,
    ) -> candle_core::Result<TranscriberOutput> {
        let xs = match mode {
            Mode::Train if self.noise_sigma > 0.0 => {
                let noise = gaussian_like(slabs, self.noise_sigma, rng)?;
                (slabs + noise)?
            }
            _ => slabs.clone(),
        };

        let h1 = self.rnn1.states_to_tensor(&self.rnn1.seq(&xs)?)?;
        let h2 = self.rnn2.states_to_tensor(&self.rnn2.seq(&h1)?)?;
        let logits = self.head.forward(&h2)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;
        Ok(TranscriberOutput { logits, probs })
    }
}

/// Overwrite every tracked parameter with a draw from `seed`. Matrices get
/// Glorot-uniform values, vectors start at zero. Names are visited in sorted
/// order so identical seeds give identical networks.
pub fn seed_parameters(varmap: &VarMap, seed: u64) -> candle_core::Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| candle_core::Error::Msg("variable map mutex poisoned".to_string()))?;
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for name in names {
        let var = &data[name];
        let dims = var.dims();
        let count = var.elem_count();
        let values: Vec<f32> = if dims.len() >= 2 {
            let fan_sum = dims[0] + dims[1..].iter().product::<usize>();
            let bound = (6.0 / fan_sum as f64).sqrt();
            (0..count)
                .map(|_| rng.random_range(-bound..bound) as f32)
                .collect()
        } else {
            vec![0f32; count]
        };
        let tensor = Tensor::from_vec(values, var.shape(), var.device())?;
        var.set(&tensor)?;
    }
    Ok(())
}

fn gaussian_like(
    xs: &Tensor,
    sigma: f64,
    rng: &mut ChaCha8Rng,
) -> candle_core::Result<Tensor> {
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| candle_core::Error::Msg(format!("invalid noise sigma {sigma}: {e}")))?;
    let noise: Vec<f32> = (0..xs.elem_count())
        .map(|_| normal.sample(rng) as f32)
        .collect();
    Tensor::from_vec(noise, xs.shape(), xs.device())
}
