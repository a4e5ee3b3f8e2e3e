mod catalog;
mod overrides;

use thiserror::Error;

pub use catalog::{RuleSetCatalog, category_name};
pub use overrides::HistoricalOverrides;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse rule data TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("default category '{0}' is not defined in the catalog")]
    UnknownDefaultCategory(String),
}
