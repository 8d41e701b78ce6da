//! Content fixtures

/// Deterministic pseudo-content of `len` bytes.
///
/// The pattern avoids long runs of a single byte so accidental truncation
/// or reordering shows up in equality checks.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}
