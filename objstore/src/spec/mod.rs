//! Transfer specifications issued by the storage proxy.
//!
//! A [`TransferSpecification`] is the plan for moving one object: the object
//! id, the backend session (upload id), and an ordered list of [`Part`]s, each
//! carrying its own signed URL. Specifications are immutable once issued; when
//! a URL expires the engine asks the proxy for a fresh specification instead
//! of mutating this one.

mod range;

pub use range::{http_range_value, ByteRange};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};

/// One contiguous byte range of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// 1-based ordinal, unique within a specification.
    pub part_number: u32,
    /// Byte offset within the whole object.
    pub offset: u64,
    /// Length of the part in bytes.
    pub part_size: u64,
    /// Signed endpoint for this part. May expire before the transfer ends.
    pub url: String,
    /// Backend-supplied MD5 digest of the part, when known.
    #[serde(default, alias = "md5", skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Part {
    /// Creates a part without a checksum.
    pub fn new(part_number: u32, offset: u64, part_size: u64, url: impl Into<String>) -> Self {
        Self {
            part_number,
            offset,
            part_size,
            url: url.into(),
            checksum: None,
        }
    }

    /// Attaches the backend checksum.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Returns a copy of this part pointing at a different URL.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    /// The inclusive byte range covered by this part.
    pub fn range(&self) -> TransportResult<ByteRange> {
        ByteRange::for_part(self)
    }

    /// True if `other` covers exactly the same bytes as this part.
    pub fn same_geometry(&self, other: &Part) -> bool {
        self.part_number == other.part_number
            && self.offset == other.offset
            && self.part_size == other.part_size
    }
}

/// The plan for one object transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSpecification {
    /// Stable identifier of the object in the store.
    pub object_id: String,
    /// Backend session correlating all parts of this transfer.
    #[serde(rename = "uploadId", default)]
    pub session_id: String,
    /// Parts in ascending `part_number` / `offset` order.
    pub parts: Vec<Part>,
}

impl TransferSpecification {
    /// Creates a specification, ordering the parts by offset.
    pub fn new(
        object_id: impl Into<String>,
        session_id: impl Into<String>,
        mut parts: Vec<Part>,
    ) -> Self {
        parts.sort_by_key(|p| (p.offset, p.part_number));
        Self {
            object_id: object_id.into(),
            session_id: session_id.into(),
            parts,
        }
    }

    /// Decodes a specification from the proxy's JSON representation.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let spec: TransferSpecification = serde_json::from_slice(body)?;
        Ok(Self::new(spec.object_id, spec.session_id, spec.parts))
    }

    /// Checks that the parts tile the object exactly.
    ///
    /// # Errors
    ///
    /// - [`TransportError::EmptySpecification`] if there are no parts
    /// - [`TransportError::InvalidPart`] for a zero-sized part or part number 0
    /// - [`TransportError::NonContiguousParts`] on a gap, overlap, or
    ///   duplicated part number
    pub fn validate(&self) -> TransportResult<()> {
        if self.parts.is_empty() {
            return Err(TransportError::EmptySpecification);
        }

        let mut ordered: Vec<&Part> = self.parts.iter().collect();
        ordered.sort_by_key(|p| (p.offset, p.part_number));

        let mut seen = HashSet::with_capacity(ordered.len());
        let mut expected_offset = 0u64;

        for part in ordered {
            if part.part_number == 0 {
                return Err(TransportError::InvalidPart {
                    part_number: 0,
                    reason: "part numbers are 1-based".to_string(),
                });
            }
            // Rejects empty and overflowing parts.
            part.range()?;

            if !seen.insert(part.part_number) || part.offset != expected_offset {
                return Err(TransportError::NonContiguousParts {
                    part_number: part.part_number,
                    expected_offset,
                    actual_offset: part.offset,
                });
            }

            expected_offset = part.offset.saturating_add(part.part_size);
        }

        Ok(())
    }

    /// Sum of all part sizes.
    pub fn total_size(&self) -> u64 {
        self.parts.iter().map(|p| p.part_size).sum()
    }

    /// Looks up a part by its number.
    pub fn part(&self, part_number: u32) -> Option<&Part> {
        self.parts.iter().find(|p| p.part_number == part_number)
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True if there are no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec_from_sizes(sizes: &[u64]) -> TransferSpecification {
        let mut offset = 0;
        let parts = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let part = Part::new(i as u32 + 1, offset, *size, format!("http://s/{}", i + 1));
                offset += size;
                part
            })
            .collect();
        TransferSpecification::new("obj", "upload-1", parts)
    }

    #[test]
    fn test_validate_contiguous() {
        let spec = spec_from_sizes(&[10, 10, 5]);
        assert!(spec.validate().is_ok());
        assert_eq!(spec.total_size(), 25);
        assert_eq!(spec.len(), 3);
    }

    #[test]
    fn test_validate_empty() {
        let spec = TransferSpecification::new("obj", "", vec![]);
        assert!(matches!(
            spec.validate(),
            Err(TransportError::EmptySpecification)
        ));
    }

    #[test]
    fn test_validate_gap() {
        let spec = TransferSpecification::new(
            "obj",
            "",
            vec![Part::new(1, 0, 10, "a"), Part::new(2, 12, 10, "b")],
        );
        match spec.validate() {
            Err(TransportError::NonContiguousParts {
                part_number,
                expected_offset,
                actual_offset,
            }) => {
                assert_eq!(part_number, 2);
                assert_eq!(expected_offset, 10);
                assert_eq!(actual_offset, 12);
            }
            other => panic!("expected NonContiguousParts, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_overlap() {
        let spec = TransferSpecification::new(
            "obj",
            "",
            vec![Part::new(1, 0, 10, "a"), Part::new(2, 5, 10, "b")],
        );
        assert!(matches!(
            spec.validate(),
            Err(TransportError::NonContiguousParts { .. })
        ));
    }

    #[test]
    fn test_validate_not_starting_at_zero() {
        let spec = TransferSpecification::new("obj", "", vec![Part::new(1, 4, 10, "a")]);
        assert!(matches!(
            spec.validate(),
            Err(TransportError::NonContiguousParts {
                expected_offset: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_duplicate_part_number() {
        let spec = TransferSpecification::new(
            "obj",
            "",
            vec![Part::new(1, 0, 10, "a"), Part::new(1, 10, 10, "b")],
        );
        assert!(matches!(
            spec.validate(),
            Err(TransportError::NonContiguousParts { part_number: 1, .. })
        ));
    }

    #[test]
    fn test_validate_zero_part_number() {
        let spec = TransferSpecification::new("obj", "", vec![Part::new(0, 0, 10, "a")]);
        assert!(matches!(
            spec.validate(),
            Err(TransportError::InvalidPart { part_number: 0, .. })
        ));
    }

    #[test]
    fn test_new_orders_parts_by_offset() {
        let spec = TransferSpecification::new(
            "obj",
            "",
            vec![Part::new(2, 10, 10, "b"), Part::new(1, 0, 10, "a")],
        );
        assert_eq!(spec.parts[0].part_number, 1);
        assert_eq!(spec.parts[1].part_number, 2);
    }

    #[test]
    fn test_from_json_camel_case() {
        let body = br#"{
            "objectId": "a82efa12",
            "uploadId": "u-1",
            "parts": [
                {"partNumber": 2, "offset": 5, "partSize": 5, "url": "http://s/2", "md5": "abc"},
                {"partNumber": 1, "offset": 0, "partSize": 5, "url": "http://s/1"}
            ]
        }"#;
        let spec = TransferSpecification::from_json(body).unwrap();
        assert_eq!(spec.object_id, "a82efa12");
        assert_eq!(spec.session_id, "u-1");
        assert_eq!(spec.parts[0].part_number, 1);
        assert_eq!(spec.parts[1].checksum.as_deref(), Some("abc"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_with_url_keeps_geometry() {
        let part = Part::new(3, 20, 10, "old").with_checksum("abc");
        let fresh = part.with_url("new");
        assert!(part.same_geometry(&fresh));
        assert_eq!(fresh.url, "new");
        assert_eq!(fresh.checksum.as_deref(), Some("abc"));
    }

    proptest! {
        #[test]
        fn prop_ranges_tile_object(sizes in prop::collection::vec(1u64..10_000, 1..64)) {
            let spec = spec_from_sizes(&sizes);
            prop_assert!(spec.validate().is_ok());

            let mut next = 0u64;
            for part in &spec.parts {
                let range = part.range().unwrap();
                prop_assert_eq!(range.start, next);
                prop_assert_eq!(range.len(), part.part_size);
                next = range.end + 1;
            }
            prop_assert_eq!(next, spec.total_size());
        }
    }
}
