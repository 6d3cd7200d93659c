use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapfitError {
    #[error("Operator of shape ({nrows}, {ncols}) applied to a vector of length {len}")]
    ShapeMismatch {
        nrows: usize,
        ncols: usize,
        len: usize,
    },

    #[error("Cannot {operation} operators of shapes ({left_rows}, {left_cols}) and ({right_rows}, {right_cols})")]
    IncompatibleShapes {
        operation: &'static str,
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    #[error("Invalid GLS parameter: {0}")]
    InvalidGlsParameter(String),

    #[error("Invalid noise model: {0}")]
    InvalidNoiseModel(String),

    #[error("Input arrays have mismatched lengths: {0}")]
    InputLengthMismatch(String),

    #[error("Pointing index {index} is outside the pixel range 0..{npix}")]
    PixelIndexOutOfRange { index: usize, npix: usize },

    #[error("Polarization angles are required for the {0} solver mode")]
    MissingPolarizationAngles(&'static str),

    #[error("No pixel is observed by any valid sample across all processes")]
    NoObservedPixels,

    #[error("Noise variance must be strictly positive (found {value} at index {index})")]
    NonPositiveNoiseVariance { index: usize, value: f64 },

    #[error("Noise spectrum is singular or not positive-definite (mode {index}: {value})")]
    SingularNoiseSpectrum { index: usize, value: f64 },

    #[error("Degenerate polarization block at pixel {0}; cannot build its inverse")]
    DegenerateBlock(usize),

    #[error("Block-diagonal operator requires at least one block")]
    EmptyBlockDiagonal,
}
