use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

/// Issues artifact version numbers for one product
///
/// The next version is one past the larger of the highest version already on
/// disk and the last one this counter issued. Other processes writing to the
/// same directory are not coordinated with.
#[derive(Debug, Clone)]
pub struct VersionCounter {
    product: String,
    pattern: Regex,
    last_issued: u32,
}

impl VersionCounter {
    pub fn new(product: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"^{} #(\d+)\.json$", regex::escape(product)))
            .map_err(|e| Error::ConfigError(format!("invalid product name '{}': {}", product, e)))?;
        Ok(Self {
            product: product.to_string(),
            pattern,
            last_issued: 0,
        })
    }

    /// File name for a given version
    pub fn file_name(&self, version: u32) -> String {
        format!("{} #{}.json", self.product, version)
    }

    /// Highest version present in `dir`, 0 when there is none
    pub fn highest_on_disk(&self, dir: &Path) -> Result<u32> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut highest = 0;
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(version) = self
                .pattern
                .captures(name)
                .and_then(|c| c[1].parse::<u32>().ok())
            {
                highest = highest.max(version);
            }
        }
        Ok(highest)
    }

    /// Reserve the next version for `dir`
    pub fn next(&mut self, dir: &Path) -> Result<u32> {
        let highest = self.highest_on_disk(dir)?.max(self.last_issued);
        let version = highest.checked_add(1).ok_or_else(|| {
            Error::Other(format!("artifact versions for '{}' are exhausted", self.product))
        })?;
        self.last_issued = version;
        Ok(version)
    }
}
