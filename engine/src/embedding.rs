//! Embedding generation.
//!
//! [`Embedder`] is the seam where a trained model can replace the hash-derived
//! [`HashEmbedder`] without touching the vector index: all it has to honour is a
//! fixed output dimension and unit-length (or zero) vectors.

use crate::error::{EngineError, Result};
use crate::tokenizer::tokenize;

pub const DEFAULT_DIMENSION: usize = 128;

/// Norms below this are treated as zero and left unnormalized.
const NORM_EPSILON: f32 = 1e-6;

pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Map text to a unit vector, or the zero vector when the text has no tokens.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic stand-in for a semantic model: every token contributes a
/// pseudo-random vector derived from its hash, and the sum is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let h = token_hash(&token);
            for (i, x) in v.iter_mut().enumerate() {
                *x += token_component(h, i);
            }
        }
        normalize(&mut v);
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }
}

/// Embed `text` with the default 128-dimensional [`HashEmbedder`].
pub fn embed(text: &str) -> Vec<f32> {
    HashEmbedder::default().vector(text)
}

/// 32-bit polynomial string hash over UTF-16 code units. Stable across
/// platforms and releases, unlike the std hashers.
fn token_hash(token: &str) -> i32 {
    token
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

fn token_component(hash: i32, dim: usize) -> f32 {
    let seed = hash.wrapping_add((dim as i32).wrapping_mul(31)) & 0xFF;
    (seed as f64).sin() as f32
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > NORM_EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Check that an embedder's output fits the index it is going into.
pub(crate) fn check_vector(v: &[f32], dimension: usize) -> Result<()> {
    if v.len() != dimension {
        return Err(EngineError::internal(format!(
            "embedding has dimension {}, index expects {dimension}",
            v.len()
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(EngineError::internal("embedding contains non-finite values"));
    }
    Ok(())
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn identical_text_yields_identical_bits() {
        let a = embed("The quick brown fox");
        let b = embed("The quick brown fox");
        let a_bits: Vec<u32> = a.iter().map(|x| x.to_bits()).collect();
        let b_bits: Vec<u32> = b.iter().map(|x| x.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }

    #[test]
    fn vectors_are_unit_length() {
        for text in ["hello", "apple banana", "Document 42 with some words", "ünïcödé text"] {
            let v = embed(text);
            assert_eq!(v.len(), DEFAULT_DIMENSION);
            assert!((norm(&v) - 1.0).abs() < 1e-4, "{text}: norm {}", norm(&v));
        }
    }

    #[test]
    fn tokenless_text_is_the_zero_vector() {
        assert!(embed("").iter().all(|x| *x == 0.0));
        assert!(embed("  --- ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn case_and_punctuation_do_not_change_the_vector() {
        assert_eq!(embed("Apple, BANANA!"), embed("apple banana"));
    }

    #[test]
    fn repeated_text_keeps_the_same_direction() {
        let once = embed("apple banana");
        let twice = embed("apple banana apple banana");
        assert!((dot(&once, &twice) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn custom_dimension_is_respected() {
        let e = HashEmbedder::new(16);
        let v = e.embed("hello world").unwrap();
        assert_eq!(v.len(), 16);
        assert!(check_vector(&v, 16).is_ok());
        assert!(check_vector(&v, 128).is_err());
    }

    #[test]
    fn token_hash_matches_polynomial_definition() {
        assert_eq!(token_hash(""), 0);
        assert_eq!(token_hash("a"), 97);
        assert_eq!(token_hash("ab"), 97 * 31 + 98);
    }
}
