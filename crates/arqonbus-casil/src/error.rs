#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid CASIL pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
