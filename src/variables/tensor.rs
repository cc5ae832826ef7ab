/// A dense host tensor as kept by a variable store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tensor {
    dims: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new `Tensor`.
    ///
    /// # Arguments
    /// * `dims` - The shape of the tensor.
    /// * `data` - The flat row-major values, its length must be the product of `dims`.
    ///
    /// # Returns
    /// A new `Tensor` instance.
    ///
    /// # Panics
    /// If the length of `data` doesn't match the shape.
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Self {
        assert_eq!(
            dims.iter().product::<usize>(),
            data.len(),
            "tensor data doesn't match its dims"
        );

        Self { dims, data }
    }

    /// A tensor of shape `dims` filled with `value`.
    pub fn filled(dims: Vec<usize>, value: f32) -> Self {
        let len = dims.iter().product();
        Self::new(dims, vec![value; len])
    }

    /// A one element tensor, used for scalars like learning rates.
    pub fn scalar(value: f32) -> Self {
        Self::new(vec![1], vec![value])
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Replaces the contents and shape of this tensor.
    pub fn assign(&mut self, dims: &[usize], data: &[f32]) {
        self.dims = dims.to_vec();
        self.data.clear();
        self.data.extend_from_slice(data);
    }
}
