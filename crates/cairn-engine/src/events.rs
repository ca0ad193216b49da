//! Typed publish/subscribe bus.
//!
//! One [`EventBus`] lives in the application context and is handed to
//! behaviors and states; there is no global instance. Listeners are called
//! synchronously, in subscription order, from [`EventBus::publish`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId {
    id: u64,
    event: TypeId,
}

type Listener<E> = Box<dyn FnMut(&E)>;

/// Listeners of one event type.
struct Channel<E: 'static> {
    listeners: Vec<(u64, Listener<E>)>,
}

/// Type-erased channel operations.
trait AnyChannel {
    fn remove(&mut self, id: u64) -> bool;
    fn len(&self) -> usize;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: 'static> AnyChannel for Channel<E> {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    fn len(&self) -> usize {
        self.listeners.len()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Dispatches events to listeners keyed by the event's type.
#[derive(Default)]
pub struct EventBus {
    channels: HashMap<TypeId, Box<dyn AnyChannel>>,
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.channels.len())
            .field("listeners", &self.channels.values().map(|c| c.len()).sum::<usize>())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_mut<E: 'static>(&mut self) -> Option<&mut Channel<E>> {
        self.channels
            .get_mut(&TypeId::of::<E>())
            .and_then(|c| c.as_any_mut().downcast_mut::<Channel<E>>())
    }

    /// Register `listener` for events of type `E`.
    pub fn subscribe<E: 'static>(&mut self, listener: impl FnMut(&E) + 'static) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.channels
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Channel::<E> { listeners: Vec::new() }));
        if let Some(channel) = self.channel_mut::<E>() {
            channel.listeners.push((id, Box::new(listener)));
        }
        ListenerId {
            id,
            event: TypeId::of::<E>(),
        }
    }

    /// Remove a listener. `false` if it was already gone.
    pub fn unsubscribe(&mut self, listener: ListenerId) -> bool {
        self.channels
            .get_mut(&listener.event)
            .is_some_and(|c| c.remove(listener.id))
    }

    /// Call every listener of `E` with `event`. Returns how many ran.
    pub fn publish<E: 'static>(&mut self, event: &E) -> usize {
        let Some(channel) = self.channel_mut::<E>() else {
            return 0;
        };
        for (_, listener) in channel.listeners.iter_mut() {
            listener(event);
        }
        channel.listeners.len()
    }

    /// Listeners currently subscribed to `E`.
    pub fn listener_count<E: 'static>(&self) -> usize {
        self.channels.get(&TypeId::of::<E>()).map_or(0, |c| c.len())
    }

    /// Remove every listener.
    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    struct Scored(u32);

    #[derive(Debug)]
    struct Died;

    #[test]
    fn publish_reaches_typed_listeners_only() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe::<Scored>(move |e| sink.borrow_mut().push(e.0));

        assert_eq!(bus.publish(&Scored(3)), 1);
        assert_eq!(bus.publish(&Died), 0);
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let mut bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Rc::clone(&order);
            bus.subscribe::<Died>(move |_| order.borrow_mut().push(tag));
        }
        bus.publish(&Died);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let id = bus.subscribe::<Died>(move |_| *c.borrow_mut() += 1);

        bus.publish(&Died);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&Died);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.listener_count::<Died>(), 0);
    }
}
