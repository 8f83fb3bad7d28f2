use std::collections::VecDeque;

pub const RECENT_LINES_CAPACITY: usize = 2000;

/// Fixed-capacity ring of recent lines keyed by absolute line number.
///
/// Diagnostic only: nothing emitted depends on its contents.
#[derive(Debug)]
pub struct RecentLines {
    capacity: usize,
    lines: VecDeque<(u64, String)>,
}

impl Default for RecentLines {
    fn default() -> Self {
        Self::with_capacity(RECENT_LINES_CAPACITY)
    }
}

impl RecentLines {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::with_capacity(capacity.min(RECENT_LINES_CAPACITY)),
        }
    }

    pub fn push(&mut self, line_no: u64, line: &str) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back((line_no, line.to_string()));
    }

    /// Line by absolute number, if still retained.
    pub fn get(&self, line_no: u64) -> Option<&str> {
        let (first, _) = self.lines.front()?;
        let idx = line_no.checked_sub(*first)? as usize;
        self.lines.get(idx).map(|(_, l)| l.as_str())
    }

    pub fn oldest(&self) -> Option<u64> {
        self.lines.front().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.lines.iter().map(|(n, l)| (*n, l.as_str()))
    }
}
