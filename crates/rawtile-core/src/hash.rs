//! Run-stable hashing for cache keys and plugin state fingerprints.
//!
//! Cache keys must survive repeated renders with identical state, so
//! nothing here may depend on process-random seeds or addresses. Strings
//! are hashed byte-accurately (parameter names can be any UTF-8).

use crate::ParamValue;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over a byte slice.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Order-sensitive hash combiner (splitmix golden-ratio mix).
#[inline]
pub fn combine(a: u64, b: u64) -> u64 {
    a ^ b
        .wrapping_add(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(a << 6)
        .wrapping_add(a >> 2)
}

/// Stable hash of a float via its bit pattern.
#[inline]
pub fn hash_f32(v: f32) -> u64 {
    fnv1a(&v.to_bits().to_le_bytes())
}

/// Stable hash of a parameter value, tagged by kind so that e.g.
/// `Int(0)` and `Bool(false)` cannot collide trivially.
pub fn hash_param(v: &ParamValue) -> u64 {
    match v {
        ParamValue::Float(f) => combine(1, hash_f32(*f)),
        ParamValue::Int(i) => combine(2, fnv1a(&i.to_le_bytes())),
        ParamValue::Bool(b) => combine(3, *b as u64),
        ParamValue::Text(s) => combine(4, fnv1a(s.as_bytes())),
    }
}
