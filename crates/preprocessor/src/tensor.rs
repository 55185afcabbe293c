//! Normalized model input

use ndarray::Array3;

/// `(channels, img_size, img_size)` float tensor in CHW layout
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array3<f32>,
}

impl NormalizedTensor {
    pub(crate) fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// Build a tensor from raw CHW values (mainly for tests and tooling)
    pub fn from_shape_vec(shape: [usize; 3], values: Vec<f32>) -> Option<Self> {
        Array3::from_shape_vec((shape[0], shape[1], shape[2]), values)
            .ok()
            .map(Self::new)
    }

    pub fn shape(&self) -> [usize; 3] {
        let (c, h, w) = self.data.dim();
        [c, h, w]
    }

    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    /// Values in row-major CHW order
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Smallest and largest value
    pub fn value_range(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}
