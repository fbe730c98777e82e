//! Recorder: user-tagged scalars collected per tick.

/// Pending recorded fields for the current tick, in first-write order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pending: Vec<(String, f64)>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` for this tick. A second write to the same key in one tick wins.
    pub fn record(&mut self, key: impl Into<String>, value: f64) {
        let key = key.into();
        match self.pending.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pending.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.pending
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything recorded so far (start of a tick).
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Hand over this tick's fields and reset.
    pub fn take(&mut self) -> Vec<(String, f64)> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let mut rec = Recorder::new();
        rec.record("price", 1.0);
        rec.record("short_mavg", 2.0);
        rec.record("price", 3.0);
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.get("price"), Some(3.0));
        assert_eq!(
            rec.take(),
            vec![("price".to_string(), 3.0), ("short_mavg".to_string(), 2.0)]
        );
        assert!(rec.is_empty());
    }

    #[test]
    fn clear_drops_pending() {
        let mut rec = Recorder::new();
        rec.record("x", 1.0);
        rec.clear();
        assert_eq!(rec.get("x"), None);
    }
}
