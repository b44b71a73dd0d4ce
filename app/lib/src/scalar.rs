//! Plain-Rust models of the primitives.
//!
//! These operate directly on little-endian 64-bit limbs and are used as
//! oracles for the generated code: by the self-test, the integration tests
//! and the benchmarks. They are written for clarity, not speed.

/// Field `index` of width `fw` (at most 64 bits).
pub fn field(limbs: &[u64], fw: u32, index: u32) -> u64 {
    assert!(fw <= 64, "field width {} exceeds 64 bits", fw);
    let bit = (index * fw) as usize;
    let word = limbs[bit / 64] >> (bit % 64);
    if fw == 64 {
        word
    } else {
        word & ((1u64 << fw) - 1)
    }
}

fn set_field(limbs: &mut [u64], fw: u32, index: u32, value: u64) {
    let bit = (index * fw) as usize;
    let mask = if fw == 64 { u64::MAX } else { (1u64 << fw) - 1 };
    limbs[bit / 64] &= !(mask << (bit % 64));
    limbs[bit / 64] |= (value & mask) << (bit % 64);
}

fn get_bit(limbs: &[u64], i: usize) -> bool {
    (limbs[i / 64] >> (i % 64)) & 1 == 1
}

fn put_bit(limbs: &mut [u64], i: usize, value: bool) {
    if value {
        limbs[i / 64] |= 1 << (i % 64);
    } else {
        limbs[i / 64] &= !(1 << (i % 64));
    }
}

/// Copy `width` bits starting at bit `from` of `src` to bit `to` of `dst`.
fn copy_bits(dst: &mut [u64], to: usize, src: &[u64], from: usize, width: usize) {
    for k in 0..width {
        put_bit(dst, to + k, get_bit(src, from + k));
    }
}

/// Sign bit of every `fw` field; bit `i` of the result is field `i`'s sign.
///
/// Returned as limbs since 1-bit and 4-bit fields produce masks wider than
/// 64 bits.
pub fn signmask(limbs: &[u64], fw: u32) -> Vec<u64> {
    let width = limbs.len() * 64;
    let count = width / fw as usize;
    let mut mask = vec![0u64; count.div_ceil(64)];
    for i in 0..count {
        put_bit(&mut mask, i, get_bit(limbs, i * fw as usize + fw as usize - 1));
    }
    mask
}

/// High (`high`) or low halves of every field of `a`, then of `b`.
pub fn pack(a: &[u64], b: &[u64], fw: u32, high: bool) -> Vec<u64> {
    let width = a.len() * 64;
    let half = (fw / 2) as usize;
    let count = width / fw as usize;
    let offset = if high { half } else { 0 };
    let mut out = vec![0u64; a.len()];
    for (n, src) in [a, b].into_iter().enumerate() {
        for i in 0..count {
            let to = (n * count + i) * half;
            copy_bits(&mut out, to, src, i * fw as usize + offset, half);
        }
    }
    out
}

/// Interleave the fields of the high (`high`) or low halves of `a` and `b`.
pub fn merge(a: &[u64], b: &[u64], fw: u32, high: bool) -> Vec<u64> {
    let width = a.len() * 64;
    let fw = fw as usize;
    let count = width / fw;
    let base = if high { count / 2 } else { 0 };
    let mut out = vec![0u64; a.len()];
    for i in 0..count / 2 {
        copy_bits(&mut out, 2 * i * fw, a, (base + i) * fw, fw);
        copy_bits(&mut out, (2 * i + 1) * fw, b, (base + i) * fw, fw);
    }
    out
}

/// [`pack`] applied independently within each of `lanes` lanes.
pub fn pack_in_lanes(a: &[u64], b: &[u64], lanes: u32, fw: u32, high: bool) -> Vec<u64> {
    let lane_limbs = a.len() / lanes as usize;
    let mut out = Vec::with_capacity(a.len());
    for lane in 0..lanes as usize {
        let range = lane * lane_limbs..(lane + 1) * lane_limbs;
        out.extend(pack(&a[range.clone()], &b[range], fw, high));
    }
    out
}

/// Field `i` all-ones iff bit `i` of `mask` is set.
pub fn bitspread(mask: u64, fw: u32, limbs: usize) -> Vec<u64> {
    let count = (limbs * 64) as u32 / fw;
    let mut out = vec![0u64; limbs];
    for i in 0..count.min(64) {
        if (mask >> i) & 1 == 1 {
            for k in 0..fw as usize {
                put_bit(&mut out, (i * fw) as usize + k, true);
            }
        }
    }
    out
}

/// Number of set bits in every `fw` field (at most 64 bits).
pub fn popcount(limbs: &[u64], fw: u32) -> Vec<u64> {
    let count = (limbs.len() * 64) as u32 / fw;
    let mut out = vec![0u64; limbs.len()];
    for i in 0..count {
        set_field(&mut out, fw, i, field(limbs, fw, i).count_ones() as u64);
    }
    out
}

/// Schoolbook multi-limb addition; returns `(carry_out, sum)`.
pub fn add_with_carry(e1: &[u64], e2: &[u64], carry_in: bool) -> (bool, Vec<u64>) {
    let mut carry = carry_in;
    let sum = e1
        .iter()
        .zip(e2)
        .map(|(x, y)| {
            let (s, c1) = x.overflowing_add(*y);
            let (s, c2) = s.overflowing_add(carry as u64);
            carry = c1 || c2;
            s
        })
        .collect();
    (carry, sum)
}

/// Indexed advance on the selected subsequence; returns `(carry_out, result)`.
///
/// The selected bits of `strm`, in order, form a stream. The result's
/// selected positions receive the low bits of `shift_in` followed by that
/// stream, delayed by `shift` positions. For shifts up to the block width the
/// carry out holds the `shift` bits pushed past the end; beyond the block
/// width it holds the selected stream itself. Bits of `shift_in` at or above
/// `shift` must be zero.
pub fn indexed_advance(
    strm: &[u64],
    index: &[u64],
    shift_in: &[u64],
    shift: u32,
) -> (Vec<u64>, Vec<u64>) {
    let width = strm.len() * 64;
    let shift = shift as usize;
    let selected: Vec<usize> = (0..width).filter(|&i| get_bit(index, i)).collect();
    let stream: Vec<bool> = selected.iter().map(|&i| get_bit(strm, i)).collect();
    // Incoming bits first, then the selected stream.
    let delayed = |k: usize| -> bool {
        if k < shift {
            k < width && get_bit(shift_in, k)
        } else {
            stream[k - shift]
        }
    };

    let mut result = vec![0u64; strm.len()];
    for (k, &pos) in selected.iter().enumerate() {
        put_bit(&mut result, pos, delayed(k));
    }

    let mut carry = vec![0u64; strm.len()];
    if shift <= width {
        let total = selected.len();
        for k in 0..shift {
            put_bit(&mut carry, k, delayed(total + k));
        }
    } else {
        for (k, bit) in stream.iter().enumerate() {
            put_bit(&mut carry, k, *bit);
        }
    }
    (carry, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_access() {
        let limbs = [0x1122_3344_5566_7788, 0x99aa_bbcc_ddee_ff00];
        assert_eq!(field(&limbs, 8, 0), 0x88);
        assert_eq!(field(&limbs, 16, 7), 0x99aa);
        assert_eq!(field(&limbs, 64, 1), 0x99aa_bbcc_ddee_ff00);
    }

    #[test]
    fn test_signmask() {
        let limbs = [1 << 63, 1 << 31];
        assert_eq!(signmask(&limbs, 64), vec![0b01]);
        assert_eq!(signmask(&limbs, 32), vec![0b0110]);
        assert_eq!(signmask(&[u64::MAX, u64::MAX], 1), vec![u64::MAX, u64::MAX]);
    }

    #[test]
    fn test_pack_and_merge() {
        let a = [0x0000_0002_0000_0001, 0];
        let b = [0, 0x0000_0004_0000_0003];
        assert_eq!(pack(&a, &b, 64, false), vec![0x0000_0000_0000_0001, 0x0000_0003_0000_0000]);
        assert_eq!(pack(&a, &b, 64, true), vec![0x0000_0000_0000_0002, 0x0000_0004_0000_0000]);
        assert_eq!(merge(&[1, 2], &[3, 4], 64, false), vec![1, 3]);
        assert_eq!(merge(&[1, 2], &[3, 4], 64, true), vec![2, 4]);
    }

    #[test]
    fn test_bitspread_and_popcount() {
        assert_eq!(bitspread(0b101, 64, 4), vec![u64::MAX, 0, u64::MAX, 0]);
        assert_eq!(bitspread(0b10, 8, 1), vec![0xff00]);
        assert_eq!(popcount(&[0xff, 0x0f0f], 8), vec![8, 0x0404]);
    }

    #[test]
    fn test_add_with_carry() {
        assert_eq!(add_with_carry(&[u64::MAX, 0], &[0, 0], true), (false, vec![0, 1]));
        assert_eq!(add_with_carry(&[u64::MAX, u64::MAX], &[1, 0], false), (true, vec![0, 0]));
    }

    #[test]
    fn test_indexed_advance_regimes() {
        assert_eq!(
            indexed_advance(&[0b1010, 0], &[0b1111, 0b1], &[1, 0], 1),
            (vec![0, 0], vec![0b0101, 1])
        );
        assert_eq!(
            indexed_advance(&[0b11, 0], &[0b11, 0b1], &[5, 0], 64),
            (vec![0x6000_0000_0000_0000, 0], vec![1, 1])
        );
        assert_eq!(
            indexed_advance(&[0b10, 0b1], &[0b11, 0b1], &[0b101, 0], 129),
            (vec![0b110, 0], vec![0b01, 1])
        );
    }
}
