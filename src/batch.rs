//! Batch collaborator owned by the host pipeline.

use crate::event::Event;

/// Ordered set of events acknowledged or retried as a unit.
///
/// The pipeline owns the batch. The engine borrows it for the duration of a
/// single publish call and invokes exactly one terminal operation on it.
pub trait Batch: Send {
    /// Events in submission order.
    fn events(&self) -> &[Event];

    /// Every event was delivered.
    fn acknowledge(&mut self);

    /// Resubmit `events` upstream, counting against the retry budget.
    fn retry_all(&mut self, events: Vec<Event>);

    /// Hand the events back upstream without consuming a retry.
    fn cancel_all(&mut self);
}

impl<B: Batch + ?Sized> Batch for Box<B> {
    fn events(&self) -> &[Event] {
        (**self).events()
    }

    fn acknowledge(&mut self) {
        (**self).acknowledge();
    }

    fn retry_all(&mut self, events: Vec<Event>) {
        (**self).retry_all(events);
    }

    fn cancel_all(&mut self) {
        (**self).cancel_all();
    }
}
