use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use rayon::prelude::*;

use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"JMVI";
const FORMAT_VERSION: u32 = 1;

/// Header size: 4 bytes magic + 4 bytes version + 4 bytes dimension +
/// 8 bytes row count.
const HEADER_SIZE: usize = 20;

/// Row id reported for result slots that have no candidate.
pub const MISSING_ID: i64 = -1;

/// Flat inner-product index over unit-norm vectors.
///
/// Rows are stored in insertion order; row `i` belongs to the chunk with
/// id `i`. Binary format on disk:
/// - 4 bytes: magic `JMVI`
/// - 4 bytes: format version (u32 LE)
/// - 4 bytes: dimension D (u32 LE)
/// - 8 bytes: row count N (u64 LE)
/// - N * D * 4 bytes: f32 LE values in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

/// One search hit: a row id (or [`MISSING_ID`]) and its inner product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: i64,
    pub score: f32,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimension.
    ///
    /// # Examples
    ///
    /// ```
    /// use jobmatch::vector_index::VectorIndex;
    ///
    /// let mut index = VectorIndex::new(2);
    /// index.add(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    ///
    /// let hits = index.search(&[1.0, 0.0], 1).unwrap();
    /// assert_eq!(hits[0].id, 0);
    /// ```
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the stored vector for a row.
    pub fn row(&self, id: usize) -> Option<&[f32]> {
        let start = id.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Append vectors in order. Every vector must match the dimension.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "vector has dimension {}, index expects {}",
                bad.len(),
                self.dimension
            )));
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Return the `k` rows with the highest inner product, best first.
    ///
    /// Always returns `k` entries; when the index holds fewer than `k` rows
    /// the remaining slots carry [`MISSING_ID`]. Ties keep row order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(Error::Embedding(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<Neighbor> = (0..self.len())
            .into_par_iter()
            .map(|id| {
                let row = &self.data
                    [id * self.dimension..(id + 1) * self.dimension];
                Neighbor {
                    id: id as i64,
                    score: dot(row, query),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored.resize(
            k,
            Neighbor {
                id: MISSING_ID,
                score: f32::MIN,
            },
        );

        Ok(scored)
    }

    /// Write the index to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        let mut out = BufWriter::new(file);

        out.write_all(MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        out.write_all(&(self.dimension as u32).to_le_bytes())?;
        out.write_all(&(self.len() as u64).to_le_bytes())?;
        out.write_all(bytemuck::cast_slice(&self.data))?;
        out.flush()?;
        Ok(())
    }

    /// Read an index previously written with [`VectorIndex::write`].
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
            return Err(Error::IndexCorrupt(format!(
                "{} is not a vector index file",
                path.display()
            )));
        }

        let version = u32::from_le_bytes(read_array(&bytes[4..8]));
        if version != FORMAT_VERSION {
            return Err(Error::IndexCorrupt(format!(
                "unsupported vector index version {version}"
            )));
        }

        let dimension = u32::from_le_bytes(read_array(&bytes[8..12])) as usize;
        let rows = u64::from_le_bytes(read_array(&bytes[12..20]));

        let sizes = usize::try_from(rows).ok().and_then(|rows| {
            let values = rows.checked_mul(dimension)?;
            let len = values.checked_mul(4)?.checked_add(HEADER_SIZE)?;
            Some((values, len))
        });
        let Some((values, expected_len)) = sizes else {
            return Err(Error::IndexCorrupt(format!(
                "vector index header claims {rows} rows of dimension {dimension}"
            )));
        };
        if bytes.len() != expected_len {
            return Err(Error::IndexCorrupt(format!(
                "vector index holds {} bytes, header promises {expected_len}",
                bytes.len()
            )));
        }

        // Copy into an f32 buffer so the cast is always aligned.
        let mut data = vec![0.0f32; values];
        bytemuck::cast_slice_mut::<f32, u8>(&mut data)
            .copy_from_slice(&bytes[HEADER_SIZE..]);

        Ok(Self { dimension, data })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
