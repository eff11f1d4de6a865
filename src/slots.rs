/// Fixed-capacity table of values addressed by slot index.
///
/// Freed slots are reused. The reactor uses the slot index as the poll
/// token, so an event always resolves to whatever currently lives in the
/// slot, never to a value that was already released.
#[derive(Debug)]
pub(crate) struct Slots<T> {
    entries: Vec<Option<T>>,
    free: Vec<usize>,
    len: usize,
    capacity: usize,
}

impl<T> Slots<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Slots {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Index the next [`insert`](Slots::insert) will use, if there is room.
    pub fn vacant(&self) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        Some(self.free.last().copied().unwrap_or(self.entries.len()))
    }

    /// Stores `value` and returns its slot, or hands it back when full.
    pub fn insert(&mut self, value: T) -> Result<usize, T> {
        let Some(index) = self.vacant() else {
            return Err(value);
        };

        if index == self.entries.len() {
            self.entries.push(Some(value));
        } else {
            self.free.pop();
            self.entries[index] = Some(value);
        }
        self.len += 1;
        Ok(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)?.as_mut()
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.entries.get_mut(index)?.take()?;
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    /// Removes and yields every stored value.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free.clear();
        self.len = 0;
        self.entries.drain(..).flatten()
    }
}
