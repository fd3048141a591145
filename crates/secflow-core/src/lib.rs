pub mod aggregate;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod formats;
pub mod ingest;
pub mod localnet;
pub mod models;
pub mod naming;
pub mod output;
pub mod pdns;
pub mod protocols;
pub mod schema;

pub use config::ConverterConfig;
pub use convert::{convert, Input, Outcome};
pub use error::{ConvertError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
