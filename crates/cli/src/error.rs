use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not start the image loader")]
    Startup,
    #[display("could not clear caches")]
    Clear,
    #[display("{_0} of {_1} images failed to load")]
    Failed(#[error(not(source))] usize, #[error(not(source))] usize),
}
