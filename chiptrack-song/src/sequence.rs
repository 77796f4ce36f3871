//! Arrangement rows

use serde::Serialize;

use crate::CHANNEL_COUNT;

/// One slot of the arrangement: a pattern id per channel
///
/// Channels may play different patterns in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SequenceRow(pub [u32; CHANNEL_COUNT]);

impl SequenceRow {
    /// Same pattern on every channel
    pub fn uniform(pattern_id: u32) -> Self {
        Self([pattern_id; CHANNEL_COUNT])
    }

    /// Pattern id for a channel
    pub fn pattern_for(&self, channel: usize) -> u32 {
        self.0.get(channel).copied().unwrap_or(self.0[0])
    }

    /// Check whether any channel references the pattern
    pub fn references(&self, pattern_id: u32) -> bool {
        self.0.contains(&pattern_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_row() {
        let row = SequenceRow::uniform(4);
        assert_eq!(row.0, [4, 4, 4, 4]);
        assert!(row.references(4));
        assert!(!row.references(0));
    }

    #[test]
    fn test_pattern_for_out_of_range_channel_uses_first() {
        let row = SequenceRow([1, 2, 3, 4]);
        assert_eq!(row.pattern_for(2), 3);
        assert_eq!(row.pattern_for(9), 1);
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let value = serde_json::to_value(SequenceRow([0, 1, 0, 2])).unwrap();
        assert_eq!(value, serde_json::json!([0, 1, 0, 2]));
    }
}
