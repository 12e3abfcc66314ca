use crate::core::models::Pin;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum PinEvent {
    Added(Pin),
    Removed(Pin),
    Changed(Pin),
}

impl PinEvent {
    pub fn pin(&self) -> &Pin {
        match self {
            PinEvent::Added(pin) | PinEvent::Removed(pin) | PinEvent::Changed(pin) => pin,
        }
    }
}

pub trait PinListener: Send {
    fn on_pin_event(&mut self, event: &PinEvent);
}

impl PinListener for mpsc::UnboundedSender<PinEvent> {
    fn on_pin_event(&mut self, event: &PinEvent) {
        let _ = self.send(event.clone());
    }
}

/// Listeners registered on the coordinator. Delivery is synchronous and in
/// registration order.
#[derive(Default)]
pub struct PinEventBus {
    listeners: Vec<Box<dyn PinListener>>,
}

impl PinEventBus {
    pub fn subscribe(&mut self, listener: Box<dyn PinListener>) {
        self.listeners.push(listener);
    }

    pub fn publish(&mut self, event: PinEvent) {
        for listener in &mut self.listeners {
            listener.on_pin_event(&event);
        }
    }
}
