use crate::error::{Error, Result};

/// Prefix marking text embedded as a searchable passage.
pub const PASSAGE_PREFIX: &str = "passage: ";

/// Prefix marking text embedded as a search query.
pub const QUERY_PREFIX: &str = "query: ";

/// A text embedding backend producing one unit-norm vector per input.
///
/// Implementations must be deterministic for a given model and return
/// vectors of the same dimension for every call.
pub trait Embedder {
    /// Identifier of the model producing the vectors.
    ///
    /// Stored next to the index so queries can be checked against it.
    fn model_id(&self) -> &str;

    /// Embed a batch of texts, returning vectors in input order.
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

/// Embed passages for indexing, applying the passage prefix.
///
/// Fails if the backend returns a different number of vectors than inputs.
pub fn embed_passages<E: Embedder + ?Sized>(
    embedder: &mut E,
    passages: &[String],
) -> Result<Vec<Vec<f32>>> {
    if passages.is_empty() {
        return Ok(Vec::new());
    }

    let prefixed: Vec<String> = passages
        .iter()
        .map(|p| format!("{PASSAGE_PREFIX}{p}"))
        .collect();
    let vectors = embedder.embed(&prefixed)?;

    if vectors.len() != passages.len() {
        return Err(Error::Embedding(format!(
            "expected {} vectors, model returned {}",
            passages.len(),
            vectors.len()
        )));
    }

    Ok(vectors)
}

/// Embed a single search query, applying the query prefix.
pub fn embed_query<E: Embedder + ?Sized>(
    embedder: &mut E,
    query: &str,
) -> Result<Vec<f32>> {
    embedder
        .embed(&[format!("{QUERY_PREFIX}{query}")])?
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::Embedding("model returned no vector for query".into())
        })
}

/// Scale a vector to unit length in place. Zero vectors are left as is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
