//! Packed per-stratum accumulators
//!
//! Grouped likelihoods need three arrays of length N (numerator, denominator,
//! squared numerator). They share one allocation, each starting on a 16-entry
//! boundary, laid out as `[numer | denom | numer2]`.

/// Round `n` up to the next multiple of 16
fn aligned_length(n: usize) -> usize {
    n.div_ceil(16) * 16
}

/// One allocation holding numerator, denominator and squared-numerator views
#[derive(Debug, Clone)]
pub struct NumerDenomBuffer {
    data: Vec<f64>,
    stride: usize,
    len: usize,
}

/// Mutable views into a [`NumerDenomBuffer`]
pub struct TriViewMut<'a> {
    pub numer: &'a mut [f64],
    pub denom: &'a mut [f64],
    pub numer2: &'a mut [f64],
}

impl NumerDenomBuffer {
    pub fn new(len: usize) -> Self {
        let stride = aligned_length(len);
        Self {
            data: vec![0.0; 3 * stride],
            stride,
            len,
        }
    }

    /// Number of strata covered by each view
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn numer(&self) -> &[f64] {
        &self.data[..self.len]
    }

    pub fn denom(&self) -> &[f64] {
        &self.data[self.stride..self.stride + self.len]
    }

    pub fn numer2(&self) -> &[f64] {
        &self.data[2 * self.stride..2 * self.stride + self.len]
    }

    pub fn denom_mut(&mut self) -> &mut [f64] {
        &mut self.data[self.stride..self.stride + self.len]
    }

    /// Split into three disjoint mutable views
    pub fn views_mut(&mut self) -> TriViewMut<'_> {
        let (numer, rest) = self.data.split_at_mut(self.stride);
        let (denom, numer2) = rest.split_at_mut(self.stride);
        TriViewMut {
            numer: &mut numer[..self.len],
            denom: &mut denom[..self.len],
            numer2: &mut numer2[..self.len],
        }
    }
}
