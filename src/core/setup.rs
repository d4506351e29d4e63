//! Setup file loader: labeled whitespace-separated text describing the
//! initial resource state.
//!
//! ```text
//! 3 resources
//! 5 processes
//! Available: 3 3 2
//! Max:
//! 7 5 3
//! ...
//! Allocation:
//! 0 1 0
//! ...
//! ```
//!
//! Labels are any non-numeric words; their text is not interpreted. Line
//! breaks carry no meaning, only token order does.

#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{BankerError, Result};
use crate::engine::state::ResourceState;

/// Parsed setup, before derivation of Need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setup {
    pub available: Vec<u32>,
    pub max: Vec<Vec<u32>>,
    pub allocation: Vec<Vec<u32>>,
}

impl Setup {
    pub fn num_resources(&self) -> usize {
        self.available.len()
    }

    pub fn num_processes(&self) -> usize {
        self.max.len()
    }

    /// Read and parse a setup file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| BankerError::io(path, source))?;
        Self::parse(&raw)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = Tokens::new(text);

        let resources = tokens.count("resource count")?;
        tokens.label("resource count label")?;
        let processes = tokens.count("process count")?;
        tokens.label("process count label")?;

        tokens.label("available label")?;
        let available = tokens.row("available", resources)?;

        tokens.label("max label")?;
        let max = tokens.matrix("max", processes, resources)?;

        tokens.label("allocation label")?;
        let allocation = tokens.matrix("allocation", processes, resources)?;

        tokens.finish()?;

        Ok(Self {
            available,
            max,
            allocation,
        })
    }

    /// Derive Need and build the resource state.
    pub fn into_state(self) -> Result<ResourceState> {
        ResourceState::initialize(self.available, self.max, self.allocation)
    }
}

/// Load a setup file straight into a [`ResourceState`].
pub fn load_state(path: &Path) -> Result<ResourceState> {
    Setup::load(path)?.into_state()
}

// ──────────────────── tokenizer ────────────────────

struct Tokens<'a> {
    iter: std::str::SplitWhitespace<'a>,
    position: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.split_whitespace(),
            position: 0,
        }
    }

    fn next(&mut self, context: &str) -> Result<&'a str> {
        self.position += 1;
        self.iter.next().ok_or_else(|| BankerError::SetupParse {
            position: self.position,
            context: context.to_string(),
            details: "unexpected end of input".to_string(),
        })
    }

    fn error(&self, context: &str, details: String) -> BankerError {
        BankerError::SetupParse {
            position: self.position,
            context: context.to_string(),
            details,
        }
    }

    fn number(&mut self, context: &str) -> Result<u32> {
        let token = self.next(context)?;
        let value: i64 = token
            .parse()
            .map_err(|_| self.error(context, format!("expected an integer, found {token:?}")))?;
        if value < 0 {
            return Err(self.error(context, format!("negative value {value}")));
        }
        u32::try_from(value).map_err(|_| self.error(context, format!("value {value} is too large")))
    }

    fn count(&mut self, context: &str) -> Result<usize> {
        let value = self.number(context)?;
        if value == 0 {
            return Err(self.error(context, "count must be at least 1".to_string()));
        }
        Ok(value as usize)
    }

    fn label(&mut self, context: &str) -> Result<()> {
        let token = self.next(context)?;
        if token.parse::<i64>().is_ok() {
            return Err(self.error(
                context,
                format!("expected a label, found number {token} (row too long?)"),
            ));
        }
        Ok(())
    }

    fn row(&mut self, name: &str, len: usize) -> Result<Vec<u32>> {
        (0..len).map(|_| self.number(name)).collect()
    }

    fn matrix(&mut self, name: &str, rows: usize, cols: usize) -> Result<Vec<Vec<u32>>> {
        (0..rows)
            .map(|i| self.row(&format!("{name} row {i}"), cols))
            .collect()
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(extra) = self.iter.next() {
            self.position += 1;
            return Err(self.error(
                "end of setup",
                format!("unexpected trailing token {extra:?}"),
            ));
        }
        Ok(())
    }
}
