use thiserror::Error;
use vidtax_io::IoError;

#[derive(Debug, Error, Clone)]
pub enum TaxonomyError {
    #[error(transparent)]
    Io(#[from] IoError),
}

impl From<TaxonomyError> for vidtax_error::Error {
    fn from(e: TaxonomyError) -> Self {
        match e {
            TaxonomyError::Io(io) => io.into(),
        }
    }
}
