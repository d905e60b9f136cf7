//! Box sums through summed-area tables.

/// Summed-area table of a row-major grid.
pub struct Integral {
    width: usize,
    table: Vec<f64>,
}

impl Integral {
    pub fn new(values: &[f64], width: usize, height: usize) -> Self {
        let stride = width + 1;
        let mut table = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0.0;
            for x in 0..width {
                row_sum += values[y * width + x];
                table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
            }
        }
        Self { width, table }
    }

    /// Sum over the inclusive rectangle `[x0, x1] x [y0, y1]`.
    pub fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let stride = self.width + 1;
        self.table[(y1 + 1) * stride + x1 + 1] - self.table[y0 * stride + x1 + 1] - self.table[(y1 + 1) * stride + x0]
            + self.table[y0 * stride + x0]
    }
}

/// Sums over every `(2r+1) x (2r+1)` window lying fully inside the grid.
/// Window `(wx, wy)` covers pixels `[wx, wx + 2r] x [wy, wy + 2r]`; the
/// result has `(width - 2r) x (height - 2r)` entries.
pub fn box_valid(values: &[f64], width: usize, height: usize, r: usize) -> Vec<f64> {
    let (ww, wh) = (width - 2 * r, height - 2 * r);
    let integral = Integral::new(values, width, height);
    let mut out = Vec::with_capacity(ww * wh);
    for wy in 0..wh {
        for wx in 0..ww {
            out.push(integral.sum(wx, wy, wx + 2 * r, wy + 2 * r));
        }
    }
    out
}

/// Adjoint of [`box_valid`]: for every pixel, the sum of the window values
/// of all windows that cover it.
pub fn box_full(window_values: &[f64], width: usize, height: usize, r: usize) -> Vec<f64> {
    let (ww, wh) = (width - 2 * r, height - 2 * r);
    let integral = Integral::new(window_values, ww, wh);
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let y0 = y.saturating_sub(2 * r);
        let y1 = y.min(wh - 1);
        for x in 0..width {
            let x0 = x.saturating_sub(2 * r);
            let x1 = x.min(ww - 1);
            out.push(if x0 <= x1 && y0 <= y1 { integral.sum(x0, y0, x1, y1) } else { 0.0 });
        }
    }
    out
}

/// Mean over the `(2r+1) x (2r+1)` window centered on each pixel, clipped
/// at the borders.
pub fn box_mean_clipped(values: &[f64], width: usize, height: usize, r: usize) -> Vec<f64> {
    let integral = Integral::new(values, width, height);
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let (y0, y1) = (y.saturating_sub(r), (y + r).min(height - 1));
        for x in 0..width {
            let (x0, x1) = (x.saturating_sub(r), (x + r).min(width - 1));
            let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
            out.push(integral.sum(x0, y0, x1, y1) / count);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize) -> Vec<f64> {
        (0..width * height).map(|i| (i % 7) as f64 + 0.5 * (i / width) as f64).collect()
    }

    #[test]
    fn test_valid_and_full_are_adjoint() {
        let (w, h, r) = (9, 7, 1);
        let p = grid(w, h);
        let q: Vec<f64> = (0..(w - 2 * r) * (h - 2 * r)).map(|i| ((i * 3) % 5) as f64).collect();

        let lhs: f64 = box_valid(&p, w, h, r).iter().zip(&q).map(|(a, b)| a * b).sum();
        let rhs: f64 = p.iter().zip(box_full(&q, w, h, r)).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-9);
    }

    #[test]
    fn test_clipped_mean_of_constant() {
        let values = vec![3.0; 20];
        assert!(box_mean_clipped(&values, 5, 4, 2).iter().all(|v| (v - 3.0).abs() < 1e-12));
    }
}
