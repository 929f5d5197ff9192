//! Fragment buffer used to assemble the DATA payload before one write.

/// Ordered sequence of text fragments with explicit, multiplicative growth.
///
/// `len` counts fragments, not bytes. Once `len` reaches `capacity` the
/// buffer grows to `capacity * resize_factor`, so the capacity is never
/// exceeded without a resize. [`reset`](Self::reset) keeps the allocation.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    fragments: Vec<String>,
    capacity: usize,
    resize_factor: usize,
}

impl LineBuffer {
    /// Creates an empty buffer.
    ///
    /// `capacity` is raised to 1 and `resize_factor` to 2 when smaller, so
    /// growth always makes progress.
    #[must_use]
    pub fn new(capacity: usize, resize_factor: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            fragments: Vec::with_capacity(capacity),
            capacity,
            resize_factor: resize_factor.max(2),
        }
    }

    /// Appends fragments in order, growing whenever the buffer fills up.
    pub fn append<I, S>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for fragment in fragments {
            self.fragments.push(fragment.into());
            if self.fragments.len() >= self.capacity {
                self.grow();
            }
        }
    }

    /// Appends a single fragment.
    pub fn push(&mut self, fragment: impl Into<String>) {
        self.append(std::iter::once(fragment));
    }

    /// Concatenates every fragment in insertion order, without separators.
    #[must_use]
    pub fn render(&self) -> String {
        self.fragments.concat()
    }

    /// Empties the buffer. Capacity is retained.
    pub fn reset(&mut self) {
        self.fragments.clear();
    }

    /// Number of fragments held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Returns true if no fragment is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Current fragment capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn grow(&mut self) {
        let capacity = self.capacity.saturating_mul(self.resize_factor);
        let mut fragments = Vec::with_capacity(capacity);
        fragments.append(&mut self.fragments);
        self.fragments = fragments;
        self.capacity = capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_renders_in_order() {
        let mut buf = LineBuffer::new(2, 2);
        buf.append(["a", "b", "c", "d", "e"]);

        assert_eq!(buf.len(), 5);
        assert!(buf.capacity() >= 5);
        assert_eq!(buf.render(), "abcde");
    }

    #[test]
    fn growth_is_multiplicative() {
        let mut buf = LineBuffer::new(3, 3);
        buf.push("one");
        buf.push("two");
        assert_eq!(buf.capacity(), 3);
        buf.push("three");
        assert_eq!(buf.capacity(), 9);
    }

    #[test]
    fn capacity_always_exceeds_len() {
        let mut buf = LineBuffer::new(1, 2);
        for i in 0..40 {
            buf.push(i.to_string());
            assert!(buf.len() < buf.capacity());
        }
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut buf = LineBuffer::new(2, 2);
        buf.append(["x", "y", "z"]);
        let capacity = buf.capacity();

        buf.reset();

        assert!(buf.is_empty());
        assert_eq!(buf.render(), "");
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn render_adds_no_separators() {
        let mut buf = LineBuffer::new(4, 2);
        buf.append(["Subject: hi\r\n", "\r\n", "body"]);
        assert_eq!(buf.render(), "Subject: hi\r\n\r\nbody");
    }

    #[test]
    fn degenerate_parameters_are_clamped() {
        let mut buf = LineBuffer::new(0, 1);
        buf.append(["a", "b", "c"]);
        assert_eq!(buf.render(), "abc");
        assert!(buf.capacity() > buf.len());
    }
}
