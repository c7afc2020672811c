use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::data::RawDataset;
use crate::error::ScribeError;

const GLYPH_ROWS: usize = 6;
const GLYPH_COLS: usize = 3;
/// One empty padding row above and below the glyphs.
const FEATURE_ROWS: usize = GLYPH_ROWS + 2;

/// Dot-matrix digits for the synthetic alphabet "01234".
const GLYPHS: [[&str; GLYPH_ROWS]; 5] = [
    ["###", "# #", "# #", "# #", "# #", "###"],
    [" # ", "## ", " # ", " # ", " # ", "###"],
    ["###", "  #", "###", "#  ", "#  ", "###"],
    ["###", "  #", " ##", "  #", "  #", "###"],
    ["# #", "# #", "###", "  #", "  #", "  #"],
];

#[derive(Debug, Clone)]
pub struct DatagenConfig {
    pub examples: usize,
    pub min_labels: usize,
    pub max_labels: usize,
    pub seed: u64,
}

impl Default for DatagenConfig {
    fn default() -> Self {
        Self {
            examples: 100,
            min_labels: 1,
            max_labels: 4,
            seed: 42,
        }
    }
}

/// Render a dataset of noisy digit slabs. The same config always produces
/// the same dataset.
pub fn synthesize(config: &DatagenConfig) -> Result<RawDataset, ScribeError> {
    if config.examples == 0 {
        return Err(ScribeError::invalid_config("examples", "must be at least 1"));
    }
    if config.min_labels > config.max_labels {
        return Err(ScribeError::invalid_config(
            "min_labels",
            format!("{} exceeds max_labels {}", config.min_labels, config.max_labels),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut x = Vec::with_capacity(config.examples);
    let mut y = Vec::with_capacity(config.examples);
    for _ in 0..config.examples {
        let count = rng.random_range(config.min_labels..=config.max_labels);
        let labels: Vec<usize> = (0..count)
            .map(|_| rng.random_range(0..GLYPHS.len()))
            .collect();
        // each glyph is followed by a small gap, the last one doubling as
        // the right margin
        let gaps: Vec<usize> = (0..count).map(|_| rng.random_range(1..=2)).collect();
        let width = 1 + count * GLYPH_COLS + gaps.iter().sum::<usize>();

        let mut slab: Vec<Vec<f32>> = (0..FEATURE_ROWS)
            .map(|_| (0..width).map(|_| rng.random::<f32>() * 0.08).collect())
            .collect();
        let mut cursor = 1;
        for (&label, &gap) in labels.iter().zip(&gaps) {
            for (row_index, pattern) in GLYPHS[label].iter().enumerate() {
                for (col_index, cell) in pattern.bytes().enumerate() {
                    if cell == b'#' {
                        slab[1 + row_index][cursor + col_index] =
                            0.75 + rng.random::<f32>() * 0.25;
                    }
                }
            }
            cursor += GLYPH_COLS + gap;
        }

        x.push(slab);
        y.push(labels);
    }

    Ok(RawDataset {
        chars: vec!['0', '1', '2', '3', '4'],
        x,
        y,
    })
}

pub fn write_dataset(raw: &RawDataset, path: &Path) -> Result<(), ScribeError> {
    let text =
        serde_json::to_string(raw).map_err(|e| ScribeError::dataset_json(path, e))?;
    std::fs::write(path, text).map_err(|e| ScribeError::dataset_io(path, e))
}
