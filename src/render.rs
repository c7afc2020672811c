/// Console rendering of a slab: one shaded line per feature row, each
/// bracketed by `¦` and prefixed with the row index.
pub fn render_slab(slab: &[Vec<f32>]) -> String {
    let mut out = String::new();
    for (index, row) in slab.iter().enumerate() {
        out.push_str(&format!("{index:2}¦"));
        for &value in row {
            out.push(shade(value));
        }
        out.push('¦');
        out.push('\n');
    }
    out
}

fn shade(value: f32) -> char {
    if value < 0.0 {
        '-'
    } else if value < 0.15 {
        ' '
    } else if value < 0.35 {
        '░'
    } else if value < 0.65 {
        '▒'
    } else if value < 0.85 {
        '▓'
    } else if value <= 1.0 {
        '█'
    } else {
        '+'
    }
}

/// Most likely class per frame. Ties go to the lowest class index.
pub fn best_path(probs: &[Vec<f32>]) -> Vec<usize> {
    probs.iter().map(|row| argmax(row)).collect()
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (index, &value) in row.iter().enumerate() {
        if value > row[best] {
            best = index;
        }
    }
    best
}

/// Collapse a frame-level path: merge consecutive repeats, then drop blanks.
pub fn collapse_path(frames: &[usize], blank: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut prev = None;
    for &frame in frames {
        if Some(frame) != prev {
            if frame != blank {
                out.push(frame);
            }
            prev = Some(frame);
        }
    }
    out
}

/// Rows-of-columns view of a time-major frame matrix, for rendering.
pub fn transpose_frames(frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let rows = frames.first().map_or(0, Vec::len);
    (0..rows)
        .map(|r| frames.iter().map(|frame| frame[r]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_covers_every_shade_band() {
        let slab = vec![vec![-0.5, 0.0, 0.2, 0.5, 0.7, 1.0, 1.5]];
        assert_eq!(render_slab(&slab), " 0¦- ░▒▓█+¦\n");
    }

    #[test]
    fn render_prefixes_each_row_with_its_index() {
        let slab = vec![vec![0.0]; 3];
        let rendered = render_slab(&slab);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec![" 0¦ ¦", " 1¦ ¦", " 2¦ ¦"]);
    }

    #[test]
    fn collapse_merges_repeats_then_drops_blanks() {
        assert_eq!(collapse_path(&[2, 0, 0, 2, 1, 1, 2], 2), vec![0, 1]);
        assert_eq!(collapse_path(&[0, 2, 0], 2), vec![0, 0]);
        assert_eq!(collapse_path(&[2, 2, 2], 2), Vec::<usize>::new());
        assert_eq!(collapse_path(&[], 2), Vec::<usize>::new());
    }

    #[test]
    fn best_path_prefers_the_first_of_tied_classes() {
        let probs = vec![vec![0.1, 0.8, 0.1], vec![0.4, 0.4, 0.2]];
        assert_eq!(best_path(&probs), vec![1, 0]);
    }

    #[test]
    fn transpose_swaps_time_and_feature_axes() {
        let frames = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        assert_eq!(
            transpose_frames(&frames),
            vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]
        );
    }
}
