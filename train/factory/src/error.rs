use imaging::CompositeError;

pub type FactoryResult<T> = Result<T, FactoryError>;

#[derive(thiserror::Error, Debug)]
pub enum FactoryError {
    #[error("dataset load failure: {0}")]
    DatasetLoad(String),

    #[error("background unavailable: {0}")]
    BackgroundUnavailable(String),

    #[error("projection failure: {0}")]
    Projection(String),

    #[error("compositing failure: {0}")]
    Compositing(#[from] CompositeError),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FactoryError {
    pub fn dataset_load(msg: impl Into<String>) -> Self {
        Self::DatasetLoad(msg.into())
    }

    pub fn background(msg: impl Into<String>) -> Self {
        Self::BackgroundUnavailable(msg.into())
    }

    pub fn projection(msg: impl Into<String>) -> Self {
        Self::Projection(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Failures that will hit every task alike, not just the one that saw them.
    pub fn is_fatal_resource(&self) -> bool {
        matches!(self, Self::BackgroundUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        let cases = [
            (FactoryError::dataset_load("x"), "dataset load failure:"),
            (FactoryError::background("x"), "background unavailable:"),
            (FactoryError::projection("x"), "projection failure:"),
            (FactoryError::persistence("x"), "persistence failure:"),
            (FactoryError::config("x"), "configuration error:"),
        ];
        for (err, prefix) in cases {
            assert!(err.to_string().starts_with(prefix), "{err}");
        }
    }

    #[test]
    fn compositing_wraps_source() {
        let err: FactoryError = CompositeError::empty("projection").into();
        assert!(err.to_string().contains("compositing failure: empty image: projection"));
        assert!(!err.is_fatal_resource());
    }

    #[test]
    fn only_background_starvation_is_fatal() {
        assert!(FactoryError::background("empty").is_fatal_resource());
        assert!(!FactoryError::projection("bad mesh").is_fatal_resource());
        assert!(!FactoryError::persistence("disk full").is_fatal_resource());
    }
}
