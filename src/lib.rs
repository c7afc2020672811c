pub mod config;
pub mod ctc;
pub mod data;
pub mod datagen;
pub mod error;
pub mod model;
pub mod optim;
pub mod render;
pub mod train;

pub use config::TrainConfig;
pub use ctc::{ctc_cost, ctc_pseudo_cost, sequence_cost, IMPOSSIBLE_COST};
pub use data::{Alphabet, PaddedBatch, RawDataset, ScribeDataset};
pub use error::ScribeError;
pub use model::{Mode, Transcriber, TranscriberConfig, TranscriberOutput};
pub use train::{train, TrainReport, TrainRun};
