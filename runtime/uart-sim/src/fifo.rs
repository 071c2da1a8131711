//! Fixed-depth byte FIFO modelling the UART's RX path

/// Returned by [`Fifo::push`] when the FIFO is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overrun;

/// Ring buffer for bytes
pub struct Fifo<const N: usize> {
    buffer: [u8; N],
    head: usize,  // Write position
    tail: usize,  // Read position
    count: usize, // Number of items
}

impl<const N: usize> Fifo<N> {
    /// Create a new empty FIFO
    pub const fn new() -> Self {
        Self {
            buffer: [0; N],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Push a byte into the FIFO, failing with [`Overrun`] when full
    pub fn push(&mut self, byte: u8) -> Result<(), Overrun> {
        if self.is_full() {
            return Err(Overrun);
        }

        self.buffer[self.head] = byte;
        self.head = (self.head + 1) % N;
        self.count += 1;
        Ok(())
    }

    /// Pop the oldest byte
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }

        let byte = self.buffer[self.tail];
        self.tail = (self.tail + 1) % N;
        self.count -= 1;
        Some(byte)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

impl<const N: usize> Default for Fifo<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_and_wrap() {
        let mut fifo = Fifo::<4>::new();
        for round in 0..3u8 {
            fifo.push(round).unwrap();
            fifo.push(round + 10).unwrap();
            assert_eq!(fifo.pop(), Some(round));
            assert_eq!(fifo.pop(), Some(round + 10));
        }
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_fifo_overrun() {
        let mut fifo = Fifo::<2>::new();
        fifo.push(1).unwrap();
        fifo.push(2).unwrap();
        assert_eq!(fifo.push(3), Err(Overrun));
        assert_eq!(fifo.len(), 2);

        fifo.clear();
        assert_eq!(fifo.pop(), None);
    }
}
