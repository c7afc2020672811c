use std::path::Path;

use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ScribeError;

/// On-disk dataset layout: glyph alphabet plus per-example slabs and labels.
///
/// `x[i]` is a slab stored as `feature_dim` rows of `width_i` columns, darkest
/// ink at 1.0. `y[i]` holds indices into `chars`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    pub chars: Vec<char>,
    pub x: Vec<Vec<Vec<f32>>>,
    pub y: Vec<Vec<usize>>,
}

/// The label alphabet. The blank symbol is implicit and sits one past the
/// last real symbol.
#[derive(Debug, Clone)]
pub struct Alphabet {
    chars: Vec<char>,
}

impl Alphabet {
    pub fn new(chars: Vec<char>) -> Result<Self, ScribeError> {
        if chars.is_empty() {
            return Err(ScribeError::invalid_input(
                "alphabet must contain at least one symbol",
            ));
        }
        for (i, c) in chars.iter().enumerate() {
            if chars[..i].contains(c) {
                return Err(ScribeError::invalid_input(format!(
                    "alphabet contains duplicate symbol {c:?}"
                )));
            }
        }
        Ok(Self { chars })
    }

    /// Number of real symbols, excluding the blank.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn blank(&self) -> usize {
        self.chars.len()
    }

    /// Output width of the network head: every symbol plus the blank.
    pub fn num_classes(&self) -> usize {
        self.chars.len() + 1
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Render label ids as text. The blank id comes out as a space.
    pub fn decode(&self, labels: &[usize]) -> String {
        labels
            .iter()
            .map(|&id| self.chars.get(id).copied().unwrap_or(' '))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ScribeExample {
    /// `feature_dim` rows, one `Vec<f32>` per row, all the same width.
    pub slab: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
}

impl ScribeExample {
    pub fn width(&self) -> usize {
        self.slab.first().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone)]
pub struct ScribeDataset {
    alphabet: Alphabet,
    examples: Vec<ScribeExample>,
    feature_dim: usize,
}

impl ScribeDataset {
    pub fn load(path: &Path) -> Result<Self, ScribeError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| ScribeError::dataset_io(path, e))?;
        let raw: RawDataset =
            serde_json::from_str(&data).map_err(|e| ScribeError::dataset_json(path, e))?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawDataset) -> Result<Self, ScribeError> {
        let alphabet = Alphabet::new(raw.chars)?;
        if raw.x.len() != raw.y.len() {
            return Err(ScribeError::invalid_input(format!(
                "{} slabs but {} label sequences",
                raw.x.len(),
                raw.y.len()
            )));
        }
        if raw.x.is_empty() {
            return Err(ScribeError::invalid_input("dataset contains no examples"));
        }
        let feature_dim = raw.x[0].len();
        if feature_dim == 0 {
            return Err(ScribeError::invalid_input(
                "slabs must have at least one feature row",
            ));
        }

        let mut examples = Vec::with_capacity(raw.x.len());
        for (i, (slab, labels)) in raw.x.into_iter().zip(raw.y).enumerate() {
            if slab.len() != feature_dim {
                return Err(ScribeError::invalid_example(
                    i,
                    format!("{} feature rows, expected {feature_dim}", slab.len()),
                ));
            }
            let width = slab[0].len();
            if width == 0 {
                return Err(ScribeError::invalid_example(i, "zero width"));
            }
            if slab.iter().any(|row| row.len() != width) {
                return Err(ScribeError::invalid_example(i, "rows of uneven width"));
            }
            if let Some(&bad) = labels.iter().find(|&&id| id >= alphabet.len()) {
                return Err(ScribeError::invalid_example(
                    i,
                    format!("label {bad} outside alphabet of {} symbols", alphabet.len()),
                ));
            }
            examples.push(ScribeExample { slab, labels });
        }

        Ok(Self {
            alphabet,
            examples,
            feature_dim,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn example(&self, index: usize) -> Option<&ScribeExample> {
        self.examples.get(index)
    }

    pub fn examples(&self) -> &[ScribeExample] {
        &self.examples
    }
}

/// One mini-batch with slabs transposed to time-major order and padded to a
/// fixed width.
#[derive(Debug)]
pub struct PaddedBatch {
    /// `(batch, max_time, feature_dim)`, zero beyond each slab's true width.
    pub inputs: Tensor,
    /// True-length label sequences, in batch order.
    pub labels: Vec<Vec<usize>>,
    /// Dataset indices the batch was drawn from.
    pub indices: Vec<usize>,
}

impl PaddedBatch {
    pub fn build(
        dataset: &ScribeDataset,
        indices: &[usize],
        max_time: usize,
        device: &Device,
    ) -> Result<Self, ScribeError> {
        let d = dataset.feature_dim();
        let mut flat = vec![0f32; indices.len() * max_time * d];
        let mut labels = Vec::with_capacity(indices.len());

        for (slot, &index) in indices.iter().enumerate() {
            let example = dataset.example(index).ok_or_else(|| {
                ScribeError::invalid_input(format!(
                    "example index {index} out of range for dataset of {}",
                    dataset.len()
                ))
            })?;
            let width = example.width().min(max_time);
            let base = slot * max_time * d;
            for (row, values) in example.slab.iter().enumerate() {
                for (col, &value) in values.iter().take(width).enumerate() {
                    flat[base + col * d + row] = value;
                }
            }
            labels.push(example.labels.clone());
        }

        let inputs = Tensor::from_vec(flat, (indices.len(), max_time, d), device)
            .map_err(|e| ScribeError::runtime("batch tensor creation", e))?;
        Ok(Self {
            inputs,
            labels,
            indices: indices.to_vec(),
        })
    }
}

/// Deterministic permutation of `0..n` for one epoch.
pub fn shuffled_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_raw() -> RawDataset {
        RawDataset {
            chars: vec!['a', 'b'],
            x: vec![
                vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
                vec![
                    vec![7.0, 8.0, 9.0, 10.0, 11.0],
                    vec![12.0, 13.0, 14.0, 15.0, 16.0],
                ],
            ],
            y: vec![vec![0], vec![1, 0]],
        }
    }

    #[test]
    fn alphabet_blank_sits_past_last_symbol() {
        let alphabet = Alphabet::new(vec!['a', 'b', 'c']).expect("alphabet");
        assert_eq!(alphabet.len(), 3);
        assert_eq!(alphabet.blank(), 3);
        assert_eq!(alphabet.num_classes(), 4);
    }

    #[test]
    fn alphabet_rejects_duplicates_and_empty() {
        assert!(Alphabet::new(vec!['a', 'a']).is_err());
        assert!(Alphabet::new(Vec::new()).is_err());
    }

    #[test]
    fn decode_renders_blank_as_space() {
        let alphabet = Alphabet::new(vec!['a', 'b']).expect("alphabet");
        assert_eq!(alphabet.decode(&[0, 2, 1]), "a b");
    }

    #[test]
    fn from_raw_accepts_well_formed_data() {
        let dataset = ScribeDataset::from_raw(small_raw()).expect("dataset");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.feature_dim(), 2);
        assert_eq!(dataset.example(0).map(ScribeExample::width), Some(3));
        assert_eq!(dataset.example(1).map(ScribeExample::width), Some(5));
        assert!(dataset.example(2).is_none());
    }

    #[test]
    fn from_raw_rejects_mismatched_lengths() {
        let mut raw = small_raw();
        raw.y.pop();
        assert!(matches!(
            ScribeDataset::from_raw(raw),
            Err(ScribeError::InvalidInput { .. })
        ));
    }

    #[test]
    fn from_raw_rejects_ragged_rows() {
        let mut raw = small_raw();
        raw.x[0][1].pop();
        assert!(matches!(
            ScribeDataset::from_raw(raw),
            Err(ScribeError::InvalidExample { index: 0, .. })
        ));
    }

    #[test]
    fn from_raw_rejects_uneven_feature_rows() {
        let mut raw = small_raw();
        raw.x[1].push(vec![0.0; 5]);
        assert!(matches!(
            ScribeDataset::from_raw(raw),
            Err(ScribeError::InvalidExample { index: 1, .. })
        ));
    }

    #[test]
    fn from_raw_rejects_label_outside_alphabet() {
        let mut raw = small_raw();
        raw.y[1] = vec![2];
        assert!(matches!(
            ScribeDataset::from_raw(raw),
            Err(ScribeError::InvalidExample { index: 1, .. })
        ));
    }

    #[test]
    fn load_round_trips_through_json() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let text = serde_json::to_string(&small_raw()).expect("serialize");
        std::fs::write(file.path(), text).expect("write dataset");

        let dataset = ScribeDataset::load(file.path()).expect("load");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.alphabet().chars(), ['a', 'b']);
        assert_eq!(dataset.example(1).map(|e| e.labels.as_slice()), Some(&[1, 0][..]));
    }

    #[test]
    fn load_reports_missing_file_with_its_path() {
        let missing = Path::new("/nonexistent/scribe.json");
        let err = ScribeDataset::load(missing).expect_err("missing file");
        match err {
            ScribeError::DatasetIo { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn load_reports_malformed_json_with_its_path() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), "not a dataset").expect("write");
        let err = ScribeDataset::load(file.path()).expect_err("parse failure");
        match err {
            ScribeError::DatasetJson { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn padded_batch_transposes_pads_and_truncates() {
        let dataset = ScribeDataset::from_raw(small_raw()).expect("dataset");
        let batch =
            PaddedBatch::build(&dataset, &[1, 0], 4, &Device::Cpu).expect("batch");

        assert_eq!(batch.labels, vec![vec![1, 0], vec![0]]);
        assert_eq!(batch.indices, vec![1, 0]);

        let inputs = batch.inputs.to_vec3::<f32>().expect("to_vec3");
        // example 1 is 5 wide, truncated to 4 columns of (row0, row1) pairs
        assert_eq!(
            inputs[0],
            vec![
                vec![7.0, 12.0],
                vec![8.0, 13.0],
                vec![9.0, 14.0],
                vec![10.0, 15.0]
            ]
        );
        // example 0 is 3 wide, fourth column zero-padded
        assert_eq!(
            inputs[1],
            vec![
                vec![1.0, 4.0],
                vec![2.0, 5.0],
                vec![3.0, 6.0],
                vec![0.0, 0.0]
            ]
        );
    }

    #[test]
    fn padded_batch_rejects_out_of_range_index() {
        let dataset = ScribeDataset::from_raw(small_raw()).expect("dataset");
        assert!(PaddedBatch::build(&dataset, &[5], 4, &Device::Cpu).is_err());
    }

    #[test]
    fn shuffled_indices_is_a_seeded_permutation() {
        let a = shuffled_indices(16, 7);
        let b = shuffled_indices(16, 7);
        let c = shuffled_indices(16, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }
}
