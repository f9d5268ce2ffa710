use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("store error: {0}")]
    Store(#[from] folio_store::StoreError),

    #[error("index error: {0}")]
    Index(#[from] folio_index::IndexError),

    #[error(transparent)]
    Gate(#[from] folio_gate::GateError),

    #[error("serialization error: {0}")]
    Pack(#[from] folio_pack::PackError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
