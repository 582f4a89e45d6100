//! Handoff channel between this restore run and whatever reads its results.
//!
//! Values are kept in memory and, when the runner provides them, appended to
//! the `GITHUB_STATE` and `GITHUB_OUTPUT` files that a later save step and the
//! workflow read back.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::Result;

/// State name holding the primary key exactly as supplied.
pub const STATE_PRIMARY_KEY: &str = "CACHE_KEY";
/// State name holding the key that was actually restored.
pub const STATE_MATCHED_KEY: &str = "CACHE_RESULT";

pub const OUTPUT_CACHE_HIT: &str = "cache-hit";
pub const OUTPUT_MATCHED_KEY: &str = "cache-matched-key";

#[derive(Debug, Default)]
pub struct RunState {
    state_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    state: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

impl RunState {
    pub fn new(state_file: Option<PathBuf>, output_file: Option<PathBuf>) -> Self {
        RunState {
            state_file,
            output_file,
            ..Default::default()
        }
    }

    pub fn save_state(&mut self, name: &str, value: &str) -> Result<()> {
        self.state.insert(name.to_string(), value.to_string());
        match &self.state_file {
            Some(path) => append_entry(path, name, value),
            None => Ok(()),
        }
    }

    /// Later calls overwrite earlier ones, in memory and for file readers.
    pub fn set_output(&mut self, name: &str, value: &str) -> Result<()> {
        self.outputs.insert(name.to_string(), value.to_string());
        match &self.output_file {
            Some(path) => append_entry(path, name, value),
            None => Ok(()),
        }
    }

    pub fn state(&self, name: &str) -> Option<&str> {
        self.state.get(name).map(String::as_str)
    }

    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }
}

fn append_entry(path: &Path, name: &str, value: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format_entry(name, value).as_bytes())?;
    Ok(())
}

fn format_entry(name: &str, value: &str) -> String {
    if !value.contains('\n') && !value.contains('\r') {
        return format!("{}={}\n", name, value);
    }
    // The delimiter is derived from the value, so it cannot occur inside it.
    let delimiter = format!("ghadelimiter_{}", hex::encode(Sha256::digest(value.as_bytes())));
    format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
}
