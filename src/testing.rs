//! Deterministic in-process stand-ins for the embedding and generation
//! services, used by unit tests.

use std::sync::Mutex;

use crate::{
    embedding::{Embedder, l2_normalize},
    error::{Error, Result},
    llm::{GenerationRequest, Generator},
};

pub const HASH_MODEL_ID: &str = "test/hash-embedder";

const HASH_DIMENSION: usize = 64;

/// Bag-of-words embedder hashing lowercase alphanumeric tokens into buckets.
pub struct HashEmbedder {
    model_id: String,
    seen: Vec<String>,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::with_model_id(HASH_MODEL_ID)
    }
}

impl HashEmbedder {
    pub fn with_model_id(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            seen: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        HASH_DIMENSION
    }

    pub fn seen(&self) -> Vec<&str> {
        self.seen.iter().map(String::as_str).collect()
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASH_DIMENSION];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            if token == "passage" || token == "query" {
                continue;
            }
            vector[fnv1a(&token) as usize % HASH_DIMENSION] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.seen.extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Generator returning a canned response and recording every request.
pub struct ScriptedGenerator {
    response: std::result::Result<String, String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn replying(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.response.clone().map_err(Error::Upstream)
    }
}
