use crate::space::Resolution;

#[derive(thiserror::Error, Debug)]
pub enum CompositeError {
    #[error("dimension mismatch: projection {projection} vs background {background}")]
    DimensionMismatch {
        projection: Resolution,
        background: Resolution,
    },

    #[error("empty image: {0}")]
    EmptyImage(String),

    #[error("invalid resolution '{0}', expected WxH")]
    Resolution(String),
}

impl CompositeError {
    pub fn empty(what: impl Into<String>) -> Self {
        Self::EmptyImage(what.into())
    }

    pub fn resolution(raw: impl Into<String>) -> Self {
        Self::Resolution(raw.into())
    }
}
