//! Replacement selection run generator.

use std::cmp::Ordering;

use crate::heap::BoundedHeap;

/// Replacement selection run generator.
/// Reorders its input into a concatenation of ascending runs using a heap of at most `heap_size` items.
/// Runs are not delimited: a run ends wherever the next item is smaller than the previous one.
/// For random input the expected run length is about twice the heap size.
pub struct RunGenerator<T, E, I, F>
where
    I: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering,
{
    input: I,
    heap: BoundedHeap<T, F>,
    compare: F,
    /// Last emitted item of the current run.
    last: Option<T>,
    /// Input item read but not yet taken into the heap.
    pending: Option<T>,
    input_done: bool,
    initiated: bool,
    runs: usize,
    records: u64,
}

impl<T, E, I, F> RunGenerator<T, E, I, F>
where
    T: Clone,
    I: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering + Copy,
{
    /// Creates a run generator over `input`.
    ///
    /// # Arguments
    /// * `input` - Items to be reordered into runs
    /// * `heap_size` - Maximum number of items held in memory, values below 1 are treated as 1
    /// * `compare` - Function to be used to compare items
    pub fn new<C>(input: C, heap_size: usize, compare: F) -> Self
    where
        C: IntoIterator<Item = Result<T, E>, IntoIter = I>,
    {
        return RunGenerator {
            input: input.into_iter(),
            heap: BoundedHeap::new(heap_size.max(1), compare),
            compare,
            last: None,
            pending: None,
            input_done: false,
            initiated: false,
            runs: 0,
            records: 0,
        };
    }

    /// Number of runs started so far.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Number of items emitted so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    fn fill(&mut self) -> Result<(), E> {
        while !self.heap.is_full() {
            match self.input.next() {
                Some(item) => {
                    if let Err(item) = self.heap.insert(item?) {
                        self.pending = Some(item);
                        break;
                    }
                }
                None => {
                    self.input_done = true;
                    break;
                }
            }
        }

        return Ok(());
    }

    fn extends_run(&self, item: &T) -> bool {
        match &self.last {
            Some(last) => (self.compare)(item, last) != Ordering::Less,
            None => true,
        }
    }

    fn next_input(&mut self) -> Option<Result<T, E>> {
        match self.pending.take() {
            Some(item) => Some(Ok(item)),
            None => self.input.next(),
        }
    }

    fn take_root(&mut self) -> Option<Result<T, E>> {
        if !self.input_done {
            match self.next_input() {
                Some(Ok(next)) => return Some(Ok(self.heap.replace_root(next))),
                Some(Err(err)) => return Some(Err(err)),
                None => self.input_done = true,
            }
        }

        self.heap.pop().map(Ok)
    }
}

impl<T, E, I, F> Iterator for RunGenerator<T, E, I, F>
where
    T: Clone,
    I: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering + Copy,
{
    type Item = Result<T, E>;

    /// Returns the next item of the run concatenation.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            if let Err(err) = self.fill() {
                return Some(Err(err));
            }
        }

        loop {
            if self.heap.active_len() == 0 {
                if self.heap.is_empty() {
                    return None;
                }
                // nothing left can extend the current run, the frozen items start the next one
                self.heap.reactivate();
                self.last = None;
            }

            let extends = match self.heap.peek() {
                Some(root) => self.extends_run(root),
                None => false,
            };
            if !extends {
                self.heap.shrink();
                continue;
            }

            if self.last.is_none() {
                self.runs += 1;
            }

            let item = match self.take_root()? {
                Ok(item) => item,
                Err(err) => return Some(Err(err)),
            };
            self.last = Some(item.clone());
            self.records += 1;

            return Some(Ok(item));
        }
    }
}
