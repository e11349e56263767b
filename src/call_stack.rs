use std::collections::HashMap;

/// Outcome of checking a return against the shadow stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCheck {
    Matched,
    /// No call was recorded for the slot the return reads.
    Untagged,
    /// A call was recorded for the slot, but the stack now holds a different address.
    Mismatched { expected: u32 },
}

/// Shadow tags keyed by hardware stack slot: the address a call expects its
/// matching return to land on. Lives only for the current session.
#[derive(Debug, Default, Clone)]
pub struct ShadowStack {
    tags: HashMap<u16, u32>,
}

impl ShadowStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any stale tag at `slot`; a call reusing a slot means the
    /// earlier frame was abandoned.
    pub fn record_call(&mut self, slot: u16, return_to: u32) {
        self.tags.insert(slot, return_to);
    }

    /// Consumes the tag at `slot`, if any.
    pub fn check_return(&mut self, slot: u16, actual: u32) -> ReturnCheck {
        match self.tags.remove(&slot) {
            None => ReturnCheck::Untagged,
            Some(expected) if expected == actual => ReturnCheck::Matched,
            Some(expected) => ReturnCheck::Mismatched { expected },
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_return_consumes_tag() {
        let mut stack = ShadowStack::new();
        stack.record_call(0x01FE, 0x8003);

        assert_eq!(stack.check_return(0x01FE, 0x8003), ReturnCheck::Matched);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_mismatched_return_discards_tag() {
        let mut stack = ShadowStack::new();
        stack.record_call(0x01FE, 0x8003);

        assert_eq!(
            stack.check_return(0x01FE, 0x9000),
            ReturnCheck::Mismatched { expected: 0x8003 }
        );
        assert!(stack.is_empty());
        assert_eq!(stack.check_return(0x01FE, 0x8003), ReturnCheck::Untagged);
    }

    #[test]
    fn test_nested_frames_use_distinct_slots() {
        let mut stack = ShadowStack::new();
        stack.record_call(0x01FE, 0x8003);
        stack.record_call(0x01FC, 0x8103);
        assert_eq!(stack.len(), 2);

        assert_eq!(stack.check_return(0x01FC, 0x8103), ReturnCheck::Matched);
        assert_eq!(stack.check_return(0x01FE, 0x8003), ReturnCheck::Matched);
    }

    #[test]
    fn test_dangling_tags_are_harmless() {
        let mut stack = ShadowStack::new();
        stack.record_call(0x01FE, 0x8003);
        assert_eq!(stack.check_return(0x01F0, 0x8003), ReturnCheck::Untagged);
        assert_eq!(stack.len(), 1);
    }
}
