//! Odometer-style cross product over N re-creatable sources.

/// Enumerates every tuple of the cross product of `n` sources.
///
/// Sources are produced by a factory closure so that an exhausted source can be
/// restarted when a source to its left advances. The current tuple lives in one
/// internal buffer that is overwritten in place on every call to
/// [`next_combination`](Self::next_combination); the returned slice borrows the
/// iterator, so each tuple must be consumed (or copied) before requesting the next.
///
/// The rightmost source varies fastest. With zero sources exactly one empty tuple
/// is produced; if any source is empty, nothing is produced.
///
/// # Example
///
/// ```
/// use fixpoint_foundation::CombinationIterator;
///
/// let sources = [vec![1, 2], vec![10, 20]];
/// let mut it = CombinationIterator::new(2, |i| sources[i].iter().copied());
/// let mut seen = Vec::new();
/// while let Some(tuple) = it.next_combination() {
///     seen.push(tuple.to_vec());
/// }
/// assert_eq!(seen, vec![vec![1, 10], vec![1, 20], vec![2, 10], vec![2, 20]]);
/// ```
pub struct CombinationIterator<T, I, F>
where
    I: Iterator<Item = T>,
    F: FnMut(usize) -> I,
{
    factory: F,
    arity: usize,
    sources: Vec<I>,
    buffer: Vec<T>,
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Running,
    Done,
}

impl<T, I, F> CombinationIterator<T, I, F>
where
    I: Iterator<Item = T>,
    F: FnMut(usize) -> I,
{
    /// Creates an iterator over `arity` sources obtained from `factory`.
    pub fn new(arity: usize, factory: F) -> Self {
        Self {
            factory,
            arity,
            sources: Vec::with_capacity(arity),
            buffer: Vec::with_capacity(arity),
            state: State::Fresh,
        }
    }

    /// Returns the number of sources.
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Restarts the enumeration from the first tuple, reusing the buffer.
    pub fn reset(&mut self) {
        self.sources.clear();
        self.buffer.clear();
        self.state = State::Fresh;
    }

    /// Advances to the next tuple and returns it.
    ///
    /// The slice is only valid until the next call.
    pub fn next_combination(&mut self) -> Option<&[T]> {
        match self.state {
            State::Done => return None,
            State::Fresh => {
                self.state = State::Running;
                for i in 0..self.arity {
                    let mut source = (self.factory)(i);
                    let Some(first) = source.next() else {
                        self.state = State::Done;
                        return None;
                    };
                    self.sources.push(source);
                    self.buffer.push(first);
                }
                return Some(&self.buffer);
            }
            State::Running => {}
        }

        // Find the rightmost source that still has elements
        let mut i = self.arity;
        loop {
            if i == 0 {
                self.state = State::Done;
                return None;
            }
            i -= 1;
            if let Some(value) = self.sources[i].next() {
                self.buffer[i] = value;
                break;
            }
        }

        // Restart everything to its right
        for j in i + 1..self.arity {
            let mut source = (self.factory)(j);
            let Some(first) = source.next() else {
                self.state = State::Done;
                return None;
            };
            self.sources[j] = source;
            self.buffer[j] = first;
        }
        Some(&self.buffer)
    }
}
