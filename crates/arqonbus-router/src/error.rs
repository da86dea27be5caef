#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("envelope has no resolvable target")]
    NoTarget,
}

pub type Result<T> = std::result::Result<T, Error>;
