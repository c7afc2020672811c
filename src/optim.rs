use candle_core::backprop::GradStore;
use candle_core::{Result, Var};
use candle_nn::optim::Optimizer;

/// RMSProp settings. The defaults match the common recipe for this kind of
/// recurrent net: decay 0.9 and epsilon 1e-6.
#[derive(Debug, Clone, Copy)]
pub struct ParamsRmsProp {
    pub lr: f64,
    pub rho: f64,
    pub eps: f64,
}

impl Default for ParamsRmsProp {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            rho: 0.9,
            eps: 1e-6,
        }
    }
}

#[derive(Debug)]
struct VarRmsProp {
    var: Var,
    mean_square: Var,
}

/// RMSProp with a running mean of squared gradients per parameter:
/// `ms = rho * ms + (1 - rho) * g^2` and `p -= lr * g / sqrt(ms + eps)`.
/// The epsilon sits inside the root; a vanishing mean square caps the step
/// at `lr * g / sqrt(eps)` rather than dividing by nearly zero.
#[derive(Debug)]
pub struct RmsProp {
    vars: Vec<VarRmsProp>,
    params: ParamsRmsProp,
}

impl Optimizer for RmsProp {
    type Config = ParamsRmsProp;

    fn new(vars: Vec<Var>, params: ParamsRmsProp) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let mean_square = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok(VarRmsProp { var, mean_square })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        for var in self.vars.iter() {
            let theta = &var.var;
            let ms = &var.mean_square;
            if let Some(grad) = grads.get(theta) {
                let new_ms = ((ms.as_tensor() * self.params.rho)?
                    + (grad.sqr()? * (1.0 - self.params.rho))?)?;
                let denom = (&new_ms + self.params.eps)?.sqrt()?;
                let delta = (grad.div(&denom)? * self.params.lr)?;
                theta.set(&theta.sub(&delta)?)?;
                ms.set(&new_ms)?;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }
}
