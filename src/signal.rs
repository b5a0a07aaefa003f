//! Ordered, synchronous callback lists.
//!
//! A [`Signal`] runs its handlers inline, in connection order, on the
//! caller's thread. Handlers receive whatever context the emitter passes,
//! which for engine hooks includes mutable GPU state.

/// Identifies one connected handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

/// An ordered list of boxed handlers of type `H`, typically a
/// `dyn FnMut(..)`.
pub struct Signal<H: ?Sized> {
    slots: Vec<(SlotId, Box<H>)>,
    next_id: u64,
}

impl<H: ?Sized> Default for Signal<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> std::fmt::Debug for Signal<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.slots.len())
            .finish()
    }
}

impl<H: ?Sized> Signal<H> {
    /// Signal with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 0,
        }
    }

    /// Append a handler. It runs after every handler connected before it.
    pub fn connect(&mut self, handler: Box<H>) -> SlotId {
        let id = SlotId(self.next_id);
        self.next_id += 1;
        self.slots.push((id, handler));
        id
    }

    /// Remove one handler. Returns whether it was connected.
    pub fn disconnect(&mut self, id: SlotId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|(slot, _)| *slot != id);
        self.slots.len() != before
    }

    /// Remove every handler.
    pub fn disconnect_all(&mut self) {
        self.slots.clear();
    }

    /// Number of connected handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no handler is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run `invoke` on every handler, in connection order.
    ///
    /// ```
    /// # use nebula::signal::Signal;
    /// let mut signal: Signal<dyn FnMut(&mut Vec<u32>)> = Signal::new();
    /// let _ = signal.connect(Box::new(|log| log.push(1)));
    /// let mut log = Vec::new();
    /// signal.emit(|handler| handler(&mut log));
    /// assert_eq!(log, [1]);
    /// ```
    pub fn emit(&mut self, mut invoke: impl FnMut(&mut H)) {
        for (_, handler) in &mut self.slots {
            invoke(handler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Recorder = dyn FnMut(&mut Vec<&'static str>);

    #[test]
    fn handlers_run_in_connection_order() {
        let mut signal: Signal<Recorder> = Signal::new();
        let _ = signal.connect(Box::new(|log| log.push("a")));
        let _ = signal.connect(Box::new(|log| log.push("b")));
        let _ = signal.connect(Box::new(|log| log.push("c")));

        let mut log = Vec::new();
        signal.emit(|handler| handler(&mut log));
        signal.emit(|handler| handler(&mut log));
        assert_eq!(log, ["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn disconnect_removes_only_that_handler() {
        let mut signal: Signal<Recorder> = Signal::new();
        let a = signal.connect(Box::new(|log| log.push("a")));
        let _ = signal.connect(Box::new(|log| log.push("b")));

        assert!(signal.disconnect(a));
        assert!(!signal.disconnect(a));
        assert_eq!(signal.len(), 1);

        let mut log = Vec::new();
        signal.emit(|handler| handler(&mut log));
        assert_eq!(log, ["b"]);

        signal.disconnect_all();
        assert!(signal.is_empty());
    }

    #[test]
    fn handlers_keep_state_between_emits() {
        let mut signal: Signal<dyn FnMut() -> u32> = Signal::new();
        let mut calls = 0;
        let _ = signal.connect(Box::new(move || {
            calls += 1;
            calls
        }));
        let mut seen = Vec::new();
        for _ in 0..3 {
            signal.emit(|handler| seen.push(handler()));
        }
        assert_eq!(seen, [1, 2, 3]);
    }
}
