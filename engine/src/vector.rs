//! Brute-force vector index.
//!
//! Vectors are stored contiguously, one row per document ordinal, and searched
//! with an exhaustive dot-product scan. An approximate index can replace
//! [`VectorIndex::scan`] as long as it keeps the same ranking contract.

use crate::embedding::{check_vector, dot};
use crate::error::Result;
use crate::query::Deadline;
use crate::store::DocOrd;

/// How many rows are scored between deadline checks.
const DEADLINE_STRIDE: usize = 1024;

#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, data: Vec::new() }
    }

    /// Append the vector for the next ordinal.
    pub(crate) fn push(&mut self, v: &[f32]) -> Result<()> {
        check_vector(v, self.dimension)?;
        self.data.extend_from_slice(v);
        Ok(())
    }

    pub fn get(&self, ord: DocOrd) -> &[f32] {
        let start = ord as usize * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Dot product of `query` against every live row.
    pub fn scan<F>(&self, query: &[f32], mut live: F, deadline: Option<&Deadline>) -> Result<Vec<(DocOrd, f32)>>
    where
        F: FnMut(DocOrd) -> bool,
    {
        check_vector(query, self.dimension)?;
        let mut out = Vec::new();
        if self.dimension == 0 {
            return Ok(out);
        }
        for (i, row) in self.data.chunks_exact(self.dimension).enumerate() {
            if i % DEADLINE_STRIDE == 0 {
                if let Some(d) = deadline {
                    d.check()?;
                }
            }
            let ord = i as DocOrd;
            if live(ord) {
                out.push((ord, dot(query, row)));
            }
        }
        Ok(out)
    }

    /// Merge rows of several indexes into one, following the same remapping
    /// convention as [`crate::index::InvertedIndex`] merges.
    pub(crate) fn merge(dimension: usize, parts: &[(&VectorIndex, &[Option<DocOrd>])], total: usize) -> Self {
        let mut data = vec![0.0f32; total * dimension];
        for (index, remap) in parts {
            for (old, new) in remap.iter().enumerate() {
                if let Some(new) = new {
                    let start = *new as usize * dimension;
                    data[start..start + dimension].copy_from_slice(index.get(old as DocOrd));
                }
            }
        }
        Self { dimension, data }
    }
}
