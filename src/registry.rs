use std::collections::HashSet;

use rand::Rng;

use crate::error::{Result, SdtError};

pub const ID_MIN: u32 = 10_000_000;
pub const ID_MAX: u32 = 99_999_999;

const RANDOM_ATTEMPTS: usize = 32;

/// Issues unique 8-digit content-control ids for one authoring session.
/// Random draws first; after too many collisions, a sequential scan that
/// skips used ids takes over.
#[derive(Debug, Default)]
pub struct IdRegistry {
    issued: HashSet<u32>,
    cursor: u32,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> Result<String> {
        let mut rng = rand::rng();
        for _ in 0..RANDOM_ATTEMPTS {
            let candidate = rng.random_range(ID_MIN..=ID_MAX);
            if self.issued.insert(candidate) {
                return Ok(candidate.to_string());
            }
        }

        let span = ID_MAX - ID_MIN + 1;
        for _ in 0..span {
            let candidate = ID_MIN + self.cursor;
            self.cursor = (self.cursor + 1) % span;
            if self.issued.insert(candidate) {
                return Ok(candidate.to_string());
            }
        }
        Err(SdtError::IdSpaceExhausted)
    }

    /// Record an externally-chosen id so `next_id` never re-issues it.
    pub fn reserve(&mut self, id: &str) -> Result<()> {
        let value = validate_id(id)?;
        self.issued.insert(value);
        Ok(())
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}

/// An id must be exactly 8 digits in 10000000..=99999999.
pub fn validate_id(id: &str) -> Result<u32> {
    if id.len() != 8 || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SdtError::InvalidInput(format!(
            "content-control id must be 8 digits: {id:?}"
        )));
    }
    let value: u32 = id
        .parse()
        .map_err(|_| SdtError::InvalidInput(format!("content-control id out of range: {id:?}")))?;
    if !(ID_MIN..=ID_MAX).contains(&value) {
        return Err(SdtError::InvalidInput(format!(
            "content-control id out of range: {id:?}"
        )));
    }
    Ok(value)
}
