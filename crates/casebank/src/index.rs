//! Flat inner-product vector index.
//!
//! Vectors are L2-normalized on insert, so inner product equals cosine
//! similarity. Search is exact: every row is scored against the query.
//! Corpus sizes here are per-tenant conversation histories, well within
//! exact-scan range.

use anyhow::{bail, Context, Result};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const INDEX_MAGIC: &[u8; 4] = b"CBIX";
const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    /// Row-major, `len * dimension` values, each row unit length.
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Build an index from pre-computed vectors, normalizing each row.
    /// Fails on any dimension mismatch; no partial index is produced.
    pub fn from_vectors(dimension: usize, vectors: Vec<Vec<f32>>) -> Result<Self> {
        let mut index = Self::new(dimension);
        for vector in vectors {
            index.add(vector)?;
        }
        Ok(index)
    }

    pub fn add(&mut self, mut vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            bail!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            );
        }
        l2_normalize(&mut vector);
        self.data.extend_from_slice(&vector);
        Ok(())
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

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Top-k rows by inner product against `query`, descending; ties keep
    /// insertion order. An empty index yields an empty list, not an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            bail!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            );
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, vector)| {
                let score: f32 = vector.iter().zip(&query).map(|(a, b)| a * b).sum();
                (row, score)
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Serialize to the companion snapshot artifact: a fixed header
    /// followed by row-major little-endian f32 data. Write failures are
    /// plain IO errors; the caller decides how to classify them.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(INDEX_MAGIC)?;
        writer.write_all(&INDEX_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dimension as u32).to_le_bytes())?;
        writer.write_all(&(self.len() as u32).to_le_bytes())?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open index file {}", path.display()))?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != INDEX_MAGIC {
            bail!("Not a vector index file: bad magic");
        }

        let version = read_u32(&mut reader)?;
        if version != INDEX_VERSION {
            bail!("Unsupported index version {}", version);
        }

        let dimension = read_u32(&mut reader)? as usize;
        let rows = read_u32(&mut reader)? as usize;

        // Validate the header against the file length before trusting its
        // counts for the data allocation.
        let header_len = (INDEX_MAGIC.len() + 3 * std::mem::size_of::<u32>()) as u128;
        let expected_len = (rows as u128) * (dimension as u128) * 4 + header_len;
        if u128::from(file_len) != expected_len {
            bail!(
                "Index file is {} bytes but the header ({} rows x {} dims) implies {}",
                file_len,
                rows,
                dimension,
                expected_len
            );
        }

        let mut data = Vec::with_capacity(rows * dimension);
        let mut buf = [0u8; 4];
        for _ in 0..rows * dimension {
            reader.read_exact(&mut buf)?;
            data.push(f32::from_le_bytes(buf));
        }

        Ok(Self { dimension, data })
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Scale `vector` to unit length; zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
