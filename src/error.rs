use thiserror::Error;

use crate::codec::CodecError;
use crate::form::ValidationError;
use crate::geolocation::GeoError;
use crate::storage::StorageError;
use crate::store::StoreError;
use crate::workout::ParseLocationError;

/// Top-level error for the binary's fallible setup and one-shot commands.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid workout: {0}")]
    Validation(#[from] ValidationError),
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Location(#[from] GeoError),
    #[error("invalid location: {0}")]
    ParseLocation(#[from] ParseLocationError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn parse(raw: &str) -> Result<crate::workout::Location> {
        Ok(raw.parse()?)
    }

    #[test]
    fn test_conversions() {
        assert_matches!(parse("1,x"), Err(Error::ParseLocation(_)));
        let err: Error = GeoError::Unavailable.into();
        assert!(err.to_string().starts_with("could not get your position"));
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert_eq!(err.to_string(), "io error: boom");
    }
}
