/// AGM-style L0-sampling linear sketch over one vertex's edge-incidence
/// vector.
///
/// Layout: `num_rows` independent hash rows, each with `num_cols` buckets
/// sampling the coordinate space at geometrically decreasing rates, plus a
/// deterministic bucket that absorbs every update and provides exact
/// zero-vector detection. Insert and delete both toggle, so the sketch
/// state is the GF(2) sum of the stream.
use std::io::{Read, Write};

use crate::core::errors::{ErrorCode, GraphError, Result};
use crate::core::types::VecIndex;
use crate::sketch::bucket::{ceil_log2, hash64, Bucket};

/// Outcome of sampling one sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SketchSample {
    /// A (probably uniform) nonzero coordinate of the incidence vector.
    Index(VecIndex),
    /// The vector is provably zero.
    Zero,
    /// No bucket isolated a single coordinate this round.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sketch {
    seed: u64,
    len: VecIndex,
    num_rows: usize,
    num_cols: usize,
    deterministic: Bucket,
    buckets: Vec<Bucket>,
}

impl Sketch {
    pub fn new(len: VecIndex, seed: u64, fail_factor: u64) -> Sketch {
        let num_rows = Self::rows_for(fail_factor);
        let num_cols = Self::cols_for(len);
        Sketch {
            seed,
            len,
            num_rows,
            num_cols,
            deterministic: Bucket::default(),
            buckets: vec![Bucket::default(); num_rows * num_cols],
        }
    }

    /// Independent hash rows; each halves the per-sketch failure odds.
    pub fn rows_for(fail_factor: u64) -> usize {
        ceil_log2(fail_factor).max(1)
    }

    /// Geometric columns covering sampling rates down past `1/len`.
    pub fn cols_for(len: VecIndex) -> usize {
        ceil_log2(len) + 1
    }

    #[inline]
    fn deterministic_seed(&self) -> u64 {
        hash64(0, self.seed)
    }

    #[inline]
    fn column_seed(&self, row: usize) -> u64 {
        hash64(2 * row as u64 + 1, self.seed)
    }

    #[inline]
    fn checksum_seed(&self, row: usize) -> u64 {
        hash64(2 * row as u64 + 2, self.seed)
    }

    /// How deep into a row's columns a coordinate reaches. Column `c`
    /// receives coordinates with probability `2^-c`.
    #[inline]
    fn depth(&self, encoded: u64, row: usize) -> usize {
        (hash64(encoded, self.column_seed(row)).trailing_zeros() as usize).min(self.num_cols - 1)
    }

    /// Toggle one coordinate of the incidence vector.
    pub fn update(&mut self, idx: VecIndex) {
        debug_assert!(idx < self.len);
        // indices are stored one-shifted so coordinate 0 is distinguishable
        // from an empty bucket
        let encoded = idx + 1;
        self.deterministic
            .toggle(encoded, hash64(encoded, self.deterministic_seed()));
        for row in 0..self.num_rows {
            let depth = self.depth(encoded, row);
            let checksum = hash64(encoded, self.checksum_seed(row));
            for col in 0..=depth {
                self.buckets[row * self.num_cols + col].toggle(encoded, checksum);
            }
        }
    }

    /// Draw a nonzero coordinate, report the vector zero, or fail.
    ///
    /// `Err(NoGoodBucket)` is the checksum-collision case: a bucket passed
    /// the single-survivor test but decodes outside the vector range.
    pub fn sample(&self) -> Result<SketchSample> {
        if self.deterministic.is_empty() {
            return Ok(SketchSample::Zero);
        }
        if self.deterministic.checksum_matches(self.deterministic_seed()) {
            return self.decode(self.deterministic.alpha).map(SketchSample::Index);
        }
        for row in 0..self.num_rows {
            // deep columns are sparse, so scan them first
            for col in (0..self.num_cols).rev() {
                let bucket = &self.buckets[row * self.num_cols + col];
                if !bucket.checksum_matches(self.checksum_seed(row)) {
                    continue;
                }
                // the survivor must actually route to this column
                if self.depth(bucket.alpha, row) < col {
                    continue;
                }
                return self.decode(bucket.alpha).map(SketchSample::Index);
            }
        }
        Ok(SketchSample::Fail)
    }

    fn decode(&self, encoded: u64) -> Result<VecIndex> {
        let idx = encoded - 1;
        if idx >= self.len {
            return Err(GraphError::NoGoodBucket);
        }
        Ok(idx)
    }

    /// Bitwise merge with a sketch built over the same seed and length.
    pub fn merge(&mut self, other: &Sketch) {
        debug_assert_eq!(self.seed, other.seed);
        debug_assert_eq!(self.len, other.len);
        self.deterministic.merge(&other.deterministic);
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            mine.merge(theirs);
        }
    }

    /// Zero all buckets without touching the hash configuration.
    pub fn clear(&mut self) {
        self.deterministic = Bucket::default();
        for bucket in &mut self.buckets {
            *bucket = Bucket::default();
        }
    }

    /// Packed little-endian bucket dump: the deterministic bucket followed
    /// by the rows in order, `(alpha, gamma)` per bucket.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_bucket(writer, &self.deterministic)?;
        for bucket in &self.buckets {
            write_bucket(writer, bucket)?;
        }
        Ok(())
    }

    /// Inverse of `write_binary`; geometry is rederived from the graph
    /// header parameters.
    pub fn read_binary<R: Read>(
        len: VecIndex,
        seed: u64,
        fail_factor: u64,
        reader: &mut R,
    ) -> Result<Sketch> {
        let mut sketch = Sketch::new(len, seed, fail_factor);
        sketch.deterministic = read_bucket(reader)?;
        for bucket in &mut sketch.buckets {
            *bucket = read_bucket(reader)?;
        }
        Ok(sketch)
    }
}

fn write_bucket<W: Write>(writer: &mut W, bucket: &Bucket) -> Result<()> {
    writer
        .write_all(&bucket.alpha.to_le_bytes())
        .and_then(|_| writer.write_all(&bucket.gamma.to_le_bytes()))
        .map_err(|e| GraphError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("sketch write error: {}", e),
        })
}

fn read_bucket<R: Read>(reader: &mut R) -> Result<Bucket> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(|e| GraphError::StorageError {
        code: ErrorCode::StorageIOError,
        message: format!("sketch read error: {}", e),
    })?;
    let alpha = u64::from_le_bytes(buf);
    reader.read_exact(&mut buf).map_err(|e| GraphError::StorageError {
        code: ErrorCode::StorageIOError,
        message: format!("sketch read error: {}", e),
    })?;
    let gamma = u64::from_le_bytes(buf);
    Ok(Bucket { alpha, gamma })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEN: VecIndex = 1000;
    const FAIL_FACTOR: u64 = 100;

    #[test]
    fn test_empty_sketch_samples_zero() {
        let sketch = Sketch::new(LEN, 1, FAIL_FACTOR);
        assert_eq!(sketch.sample().unwrap(), SketchSample::Zero);
    }

    #[test]
    fn test_single_coordinate_is_recovered_exactly() {
        // one survivor lands in the deterministic bucket, so recovery does
        // not depend on the seed
        for seed in 0..20 {
            let mut sketch = Sketch::new(LEN, seed, FAIL_FACTOR);
            sketch.update(317);
            assert_eq!(sketch.sample().unwrap(), SketchSample::Index(317));
        }
    }

    #[test]
    fn test_coordinate_zero_is_representable() {
        let mut sketch = Sketch::new(LEN, 7, FAIL_FACTOR);
        sketch.update(0);
        assert_eq!(sketch.sample().unwrap(), SketchSample::Index(0));
    }

    #[test]
    fn test_double_update_cancels() {
        let mut sketch = Sketch::new(LEN, 3, FAIL_FACTOR);
        sketch.update(11);
        sketch.update(11);
        assert_eq!(sketch.sample().unwrap(), SketchSample::Zero);
        let fresh = Sketch::new(LEN, 3, FAIL_FACTOR);
        assert_eq!(sketch, fresh);
    }

    #[test]
    fn test_two_coordinates_usually_sampled() {
        let mut recovered = 0;
        for seed in 0..50 {
            let mut sketch = Sketch::new(LEN, seed, FAIL_FACTOR);
            sketch.update(3);
            sketch.update(500);
            match sketch.sample().unwrap() {
                SketchSample::Index(idx) => {
                    assert!(idx == 3 || idx == 500);
                    recovered += 1;
                }
                SketchSample::Fail => {}
                SketchSample::Zero => panic!("nonzero vector sampled as zero"),
            }
        }
        assert!(recovered >= 45, "only {}/50 seeds recovered a coordinate", recovered);
    }

    #[test]
    fn test_dense_vector_usually_sampled() {
        let mut recovered = 0;
        for seed in 0..50 {
            let mut sketch = Sketch::new(LEN, seed, FAIL_FACTOR);
            for idx in 0..200 {
                sketch.update(idx);
            }
            match sketch.sample().unwrap() {
                SketchSample::Index(idx) => {
                    assert!(idx < 200);
                    recovered += 1;
                }
                SketchSample::Fail => {}
                SketchSample::Zero => panic!("nonzero vector sampled as zero"),
            }
        }
        assert!(recovered >= 40, "only {}/50 seeds recovered a coordinate", recovered);
    }

    #[test]
    fn test_merge_equals_xor_of_streams() {
        let seed = 99;
        let mut a = Sketch::new(LEN, seed, FAIL_FACTOR);
        a.update(1);
        a.update(2);
        let mut b = Sketch::new(LEN, seed, FAIL_FACTOR);
        b.update(2);
        b.update(3);
        a.merge(&b);

        let mut expected = Sketch::new(LEN, seed, FAIL_FACTOR);
        expected.update(1);
        expected.update(3);
        assert_eq!(a, expected);
    }

    #[test]
    fn test_binary_round_trip() {
        let mut sketch = Sketch::new(LEN, 42, FAIL_FACTOR);
        for idx in [0, 5, 999, 5] {
            sketch.update(idx);
        }
        let mut bytes = Vec::new();
        sketch.write_binary(&mut bytes).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        let restored = Sketch::read_binary(LEN, 42, FAIL_FACTOR, &mut cursor).unwrap();
        assert_eq!(sketch, restored);
    }

    #[test]
    fn test_read_binary_rejects_truncation() {
        let mut sketch = Sketch::new(LEN, 42, FAIL_FACTOR);
        sketch.update(9);
        let mut bytes = Vec::new();
        sketch.write_binary(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 1);
        let mut cursor = std::io::Cursor::new(bytes);
        assert!(Sketch::read_binary(LEN, 42, FAIL_FACTOR, &mut cursor).is_err());
    }
}
