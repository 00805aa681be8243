//! Loading rule catalogs from JSON.
//!
//! A rule file is a serialized [`RuleSet`]; loading validates it before the
//! catalog is handed out, so every reference inside it resolves.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use outpost_logic::rules::{RuleCatalog, RuleError, RuleSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed rule file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid rule set: {0}")]
    Rules(#[from] RuleError),
}

pub fn load_catalog_str(json: &str) -> Result<RuleCatalog, CatalogError> {
    let set: RuleSet = serde_json::from_str(json)?;
    build(set)
}

pub fn load_catalog_reader<R: Read>(reader: R) -> Result<RuleCatalog, CatalogError> {
    let set: RuleSet = serde_json::from_reader(reader)?;
    build(set)
}

pub fn load_catalog_file(path: impl AsRef<Path>) -> Result<RuleCatalog, CatalogError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let catalog = load_catalog_reader(BufReader::new(file))?;
    log::info!(
        "loaded {} facility rules from {}",
        catalog.facilities().count(),
        path.display()
    );
    Ok(catalog)
}

fn build(set: RuleSet) -> Result<RuleCatalog, CatalogError> {
    Ok(RuleCatalog::from_rule_set(set)?)
}
