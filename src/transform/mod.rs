//! Inverse block transforms.
//!
//! Block segments are stored as the composition of three reversible byte
//! transforms over the raw segment, applied by the offline builder and
//! undone here in reverse order:
//!
//! 1. [`Zrlt`] — zero run-length transform. Runs of zeroes are stored as
//!    their run length written bit-by-bit (values `0`/`1`) below an
//!    implicit leading one; literals are stored as `value + 1` with `0xFF`
//!    escaping the two top values.
//! 2. [`Sbrt`] — sort-by-rank transform (rank mode): a move-to-front
//!    relative that promotes symbols by the recency key
//!    `(position + previous_position) / 2`.
//! 3. [`Bwts`] — bijective Burrows-Wheeler transform, inverted by bucket
//!    counting, an LF-mapping array, and cycle-following that writes the
//!    output right to left.
//!
//! Every `inverse` returns the number of bytes written into `dst`. The
//! contract is a byte-identical round trip with the builder's forward
//! transforms; on any breach the transform reports an error and the caller
//! treats the block as corrupt.


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors raised when an inverse transform cannot reproduce the original
/// bytes.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The zero run-length stream was not fully consumed or did not fit.
    #[error("inverse ZRLT failed")]
    Zrlt,

    /// The rank stream did not fit the destination buffer.
    #[error("inverse SBRT failed")]
    Sbrt,

    /// The Burrows-Wheeler cycles did not cover the block.
    #[error("inverse BWTS failed")]
    Bwts,
}

// ------------------------------------------------------------------------------------------------
// Zero run-length transform
// ------------------------------------------------------------------------------------------------

/// Inverse zero run-length transform.
#[derive(Debug)]
pub struct Zrlt;

impl Zrlt {
    /// Expand `src` into `dst`, returning the number of bytes written.
    ///
    /// `dst.len()` bounds the expansion; the transform fails if the
    /// destination fills before the source is consumed.
    pub fn inverse(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, TransformError> {
        if src.is_empty() {
            return Ok(0);
        }

        let src_end = src.len();
        let dst_end = dst.len();
        let mut src_idx = 0usize;
        let mut dst_idx = 0usize;
        let mut run_length: u64 = 1;

        'main: while dst_idx < dst_end {
            if run_length > 1 {
                run_length -= 1;
                dst[dst_idx] = 0;
                dst_idx += 1;
                continue;
            }

            if src_idx >= src_end {
                break;
            }
            let mut val = src[src_idx];

            if val <= 1 {
                // Rebuild the run length bit by bit below the implicit MSB.
                run_length = 1;
                loop {
                    run_length = run_length.wrapping_shl(1) | u64::from(val);
                    src_idx += 1;
                    if src_idx >= src_end {
                        break 'main;
                    }
                    val = src[src_idx];
                    if val > 1 {
                        break;
                    }
                }
                continue;
            }

            if val == 0xFF {
                src_idx += 1;
                if src_idx >= src_end {
                    break;
                }
                dst[dst_idx] = 0xFEu8.wrapping_add(src[src_idx]);
            } else {
                dst[dst_idx] = val - 1;
            }
            src_idx += 1;
            dst_idx += 1;
        }

        // Flush a run truncated by the end of the source.
        while run_length > 1 && dst_idx < dst_end {
            run_length -= 1;
            dst[dst_idx] = 0;
            dst_idx += 1;
        }

        if src_idx != src_end {
            return Err(TransformError::Zrlt);
        }
        Ok(dst_idx)
    }
}

// ------------------------------------------------------------------------------------------------
// Sort-by-rank transform
// ------------------------------------------------------------------------------------------------

/// Inverse sort-by-rank transform, rank mode.
#[derive(Debug)]
pub struct Sbrt;

impl Sbrt {
    /// Map each rank back to its symbol, replaying the same rank promotions
    /// the forward pass performed.
    pub fn inverse(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, TransformError> {
        let count = src.len();
        if count == 0 {
            return Ok(0);
        }
        if dst.len() < count {
            return Err(TransformError::Sbrt);
        }

        let mut prev = [0i32; 256];
        let mut curr = [0i32; 256];
        let mut rank_to_symbol = [0u8; 256];
        for (i, slot) in rank_to_symbol.iter_mut().enumerate() {
            *slot = i as u8;
        }

        for i in 0..count {
            let mut r = src[i] as usize;
            let c = rank_to_symbol[r] as usize;
            dst[i] = c as u8;

            // Rank mode recency key: midpoint of current and previous
            // positions of the symbol.
            let qc = (i as i32 + prev[c]) >> 1;
            prev[c] = i as i32;
            curr[c] = qc;

            while r > 0 && curr[rank_to_symbol[r - 1] as usize] <= qc {
                rank_to_symbol[r] = rank_to_symbol[r - 1];
                r -= 1;
            }
            rank_to_symbol[r] = c as u8;
        }

        Ok(count)
    }
}

// ------------------------------------------------------------------------------------------------
// Bijective Burrows-Wheeler transform
// ------------------------------------------------------------------------------------------------

/// Inverse bijective Burrows-Wheeler transform.
///
/// Owns the LF-mapping array so repeated inversions reuse one allocation.
#[derive(Debug)]
pub struct Bwts {
    lf: Vec<i32>,
}

impl Bwts {
    /// New transform with an empty scratch array.
    pub fn new() -> Self {
        Self { lf: Vec::new() }
    }

    /// Invert `src` into `dst`, returning the number of bytes written.
    pub fn inverse(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize, TransformError> {
        let count = src.len();
        if dst.len() < count {
            return Err(TransformError::Bwts);
        }
        if count < 2 {
            dst[..count].copy_from_slice(src);
            return Ok(count);
        }

        let mut buckets = [0i32; 256];
        for &byte in src {
            buckets[byte as usize] += 1;
        }
        let mut sum = 0i32;
        for bucket in buckets.iter_mut() {
            let val = *bucket;
            *bucket = sum;
            sum += val;
        }

        self.lf.clear();
        self.lf.reserve(count);
        for &byte in src {
            self.lf.push(buckets[byte as usize]);
            buckets[byte as usize] += 1;
        }

        // Follow each unvisited cycle, writing right to left and marking
        // visited entries negative.
        let lf = &mut self.lf;
        let mut j = count as i64 - 1;
        for i in 0..count {
            if j < 0 {
                break;
            }
            if lf[i] < 0 {
                continue;
            }
            let mut p = i;
            loop {
                dst[j as usize] = src[p];
                j -= 1;
                let next = lf[p];
                lf[p] = -1;
                p = next as usize;
                if lf[p] < 0 {
                    break;
                }
            }
        }
        if j >= 0 {
            return Err(TransformError::Bwts);
        }

        Ok(count)
    }
}

impl Default for Bwts {
    fn default() -> Self {
        Self::new()
    }
}
