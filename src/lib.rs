pub mod cli;
pub mod experiment;
pub mod ipam;
pub mod report;
pub mod scenario;
pub mod utils;

pub use crate::experiment::Experiment;
pub use crate::ipam::{AddressSpace, IpamClient};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadtestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IPAM API error: {0}")]
    Api(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for LoadtestError {
    fn from(err: reqwest::Error) -> Self {
        LoadtestError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoadtestError>;
