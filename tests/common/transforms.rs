//! Forward counterparts of the block transforms, mirroring what the
//! offline builder applies: BWTS, then SBRT (rank), then ZRLT.

use std::cmp::Ordering;

// ------------------------------------------------------------------------------------------------
// Zero run-length transform
// ------------------------------------------------------------------------------------------------

const ZRLT_MAX_RUN: u64 = 1 << 24;

/// Forward zero run-length transform. Runs of zeroes become their length's
/// binary digits below the leading one; literals shift up by one with
/// `0xFF` escaping the top two values.
pub fn zrlt_forward(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() + 8);
    let mut run_length: u64 = 1;
    let mut i = 0;
    while i < src.len() {
        let val = src[i];
        if val == 0 {
            run_length += 1;
            i += 1;
            if i < src.len() && run_length < ZRLT_MAX_RUN {
                continue;
            }
        }
        if run_length > 1 {
            let log2 = 63 - run_length.leading_zeros();
            for bit in (0..log2).rev() {
                dst.push(((run_length >> bit) & 1) as u8);
            }
            run_length = 1;
            continue;
        }
        if val >= 0xFE {
            dst.push(0xFF);
            dst.push(val - 0xFE);
        } else {
            dst.push(val + 1);
        }
        i += 1;
    }
    dst
}

// ------------------------------------------------------------------------------------------------
// Sort-by-rank transform
// ------------------------------------------------------------------------------------------------

/// Forward sort-by-rank transform, rank mode.
pub fn sbrt_forward(src: &[u8]) -> Vec<u8> {
    let mut prev = [0i32; 256];
    let mut curr = [0i32; 256];
    let mut symbol_to_rank = [0u8; 256];
    let mut rank_to_symbol = [0u8; 256];
    for i in 0..256 {
        symbol_to_rank[i] = i as u8;
        rank_to_symbol[i] = i as u8;
    }

    let mut dst = Vec::with_capacity(src.len());
    for (i, &byte) in src.iter().enumerate() {
        let c = byte as usize;
        let mut r = symbol_to_rank[c] as usize;
        dst.push(r as u8);

        let qc = (i as i32 + prev[c]) >> 1;
        prev[c] = i as i32;
        curr[c] = qc;

        while r > 0 && curr[rank_to_symbol[r - 1] as usize] <= qc {
            rank_to_symbol[r] = rank_to_symbol[r - 1];
            symbol_to_rank[rank_to_symbol[r] as usize] = r as u8;
            r -= 1;
        }
        rank_to_symbol[r] = c as u8;
        symbol_to_rank[c] = r as u8;
    }
    dst
}

// ------------------------------------------------------------------------------------------------
// Bijective Burrows-Wheeler transform
// ------------------------------------------------------------------------------------------------

/// Forward bijective Burrows-Wheeler transform, computed from the
/// definition: factor into Lyndon words, sort all factor rotations by
/// their infinite periodic expansion, emit each rotation's last character.
/// Quadratic, which is fine for test-sized blocks.
pub fn bwts_forward(src: &[u8]) -> Vec<u8> {
    if src.len() < 2 {
        return src.to_vec();
    }

    let mut rotations: Vec<(usize, usize, usize)> = Vec::with_capacity(src.len());
    for (start, len) in lyndon_factors(src) {
        for rot in 0..len {
            rotations.push((start, len, rot));
        }
    }
    rotations.sort_by(|&a, &b| compare_rotations(src, a, b));
    rotations
        .iter()
        .map(|&(start, len, rot)| src[start + (rot + len - 1) % len])
        .collect()
}

/// Duval's algorithm: the unique non-increasing factorization into Lyndon
/// words, as `(start, len)` pairs.
fn lyndon_factors(s: &[u8]) -> Vec<(usize, usize)> {
    let n = s.len();
    let mut factors = Vec::new();
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        let mut k = i;
        while j < n && s[k] <= s[j] {
            if s[k] < s[j] {
                k = i;
            } else {
                k += 1;
            }
            j += 1;
        }
        while i <= k {
            factors.push((i, j - k));
            i += j - k;
        }
    }
    factors
}

/// Order two factor rotations by their infinite periodic expansions.
/// `|a| + |b|` characters decide the comparison (Fine and Wilf).
fn compare_rotations(s: &[u8], a: (usize, usize, usize), b: (usize, usize, usize)) -> Ordering {
    let (a_start, a_len, a_rot) = a;
    let (b_start, b_len, b_rot) = b;
    for i in 0..(a_len + b_len) {
        let ca = s[a_start + (a_rot + i) % a_len];
        let cb = s[b_start + (b_rot + i) % b_len];
        match ca.cmp(&cb) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}
