//! Little-endian integer decoding for the binary containers.
//! Every reader returns `None` when the slice is too short.

/// Reads a u16 from the first 2 bytes.
#[inline]
pub(crate) fn to_u16(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(..2)?.try_into().ok()?))
}

/// Reads a u32 from the first 4 bytes.
#[inline]
pub(crate) fn to_u32(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?))
}

/// Reads a u64 from the first 8 bytes.
#[inline]
pub(crate) fn to_u64(bytes: &[u8]) -> Option<u64> {
    Some(u64::from_le_bytes(bytes.get(..8)?.try_into().ok()?))
}

/// Reads a u32 from the first 4 bytes, widened to usize.
#[inline]
pub(crate) fn to_usize(bytes: &[u8]) -> Option<usize> {
    to_u32(bytes).and_then(|value| usize::try_from(value).ok())
}

/// Splits a slice into consecutive u32 values widened to usize; a trailing partial chunk is dropped.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes.chunks_exact(4).filter_map(to_usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian() {
        assert_eq!(to_u16(&[0x34, 0x12, 0xFF]), Some(0x1234));
        assert_eq!(to_u32(&[0x78, 0x56, 0x34, 0x12]), Some(0x1234_5678));
        assert_eq!(to_u64(&1.5f64.to_le_bytes()), Some(1.5f64.to_bits()));
        assert_eq!(to_usize(&[1, 0, 0, 0]), Some(1));
    }

    #[test]
    fn short_slices() {
        assert_eq!(to_u16(&[1]), None);
        assert_eq!(to_u32(&[1, 2, 3]), None);
        assert_eq!(to_u64(&[]), None);
        assert_eq!(to_usize_iter(&[1, 0, 0, 0, 2, 0, 0, 0, 9]).collect::<Vec<_>>(), vec![1, 2]);
    }
}
