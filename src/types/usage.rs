//! Token usage tracking.

use serde::{Deserialize, Serialize};

/// Token usage for a round or a whole turn.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_every_counter() {
        let mut total = Usage::default();
        total.merge(&Usage {
            input_tokens: 10,
            output_tokens: 4,
            total_tokens: 14,
        });
        total.merge(&Usage {
            input_tokens: 3,
            output_tokens: 1,
            total_tokens: 4,
        });
        assert_eq!(total.total_tokens, 18);
        assert_eq!(total.input_tokens, 13);
    }
}
