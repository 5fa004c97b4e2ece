//! HTTP byte-range calculation for parts.

use std::fmt;

use super::Part;
use crate::error::{TransportError, TransportResult};

/// An inclusive, zero-based byte range within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte of the range.
    pub start: u64,
    /// Last byte of the range (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Computes the range covered by `part`.
    ///
    /// Rejects empty parts and parts whose last byte would not fit in a `u64`
    /// rather than producing a malformed range.
    pub fn for_part(part: &Part) -> TransportResult<Self> {
        if part.part_size == 0 {
            return Err(TransportError::InvalidPart {
                part_number: part.part_number,
                reason: "part size must be at least 1 byte".to_string(),
            });
        }

        let end = part
            .offset
            .checked_add(part.part_size - 1)
            .ok_or_else(|| TransportError::InvalidPart {
                part_number: part.part_number,
                reason: format!(
                    "range starting at {} with size {} overflows",
                    part.offset, part.part_size
                ),
            })?;

        Ok(Self {
            start: part.offset,
            end,
        })
    }

    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// Generates the `Range` header value for a part's URL.
pub fn http_range_value(part: &Part) -> TransportResult<String> {
    ByteRange::for_part(part).map(|range| range.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(offset: u64, part_size: u64) -> Part {
        Part::new(1, offset, part_size, "http://store/part1")
    }

    #[test]
    fn test_range_value_is_inclusive() {
        assert_eq!(http_range_value(&part(100, 50)).unwrap(), "bytes=100-149");
    }

    #[test]
    fn test_single_byte_part() {
        let range = ByteRange::for_part(&part(0, 1)).unwrap();
        assert_eq!(range.to_string(), "bytes=0-0");
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn test_zero_size_rejected() {
        let result = http_range_value(&part(10, 0));
        assert!(matches!(
            result,
            Err(TransportError::InvalidPart { part_number: 1, .. })
        ));
    }

    #[test]
    fn test_overflow_rejected() {
        let result = ByteRange::for_part(&part(u64::MAX, 2));
        assert!(matches!(result, Err(TransportError::InvalidPart { .. })));
    }

    #[test]
    fn test_range_ending_at_max_is_valid() {
        let range = ByteRange::for_part(&part(u64::MAX - 1, 2)).unwrap();
        assert_eq!(range.end, u64::MAX);
    }
}
