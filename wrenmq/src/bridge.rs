use std::collections::VecDeque;

use wren_bytes::Publish;

/// What the gate decided to do with an incoming publish.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// Credit was available and claimed, deliver the publish now
    Deliver(Publish),
    /// No credit, the publish waits in the parked queue
    Parked,
    /// Delivery is cancelled, the publish is dropped
    Dropped,
}

/// Flow control between the network reader and the application.
///
/// Each delivered incoming publish consumes one credit. When credit runs out,
/// publishes queue up here and the event loop stops reading from the socket,
/// which pushes backpressure onto TCP. The application replenishes credit
/// through [`AsyncClient::grant_credit`](crate::AsyncClient::grant_credit).
///
/// The default ceiling is effectively unlimited, so a client that never
/// grants credit is not gated at all.
#[derive(Debug)]
pub struct CreditGate {
    credit: usize,
    ceiling: usize,
    cancelled: bool,
    parked: VecDeque<Publish>,
}

impl CreditGate {
    pub fn new(ceiling: usize) -> Self {
        CreditGate {
            // starts full so an application that ignores credit still
            // receives everything
            credit: ceiling,
            ceiling,
            cancelled: false,
            parked: VecDeque::new(),
        }
    }

    /// May the event loop read more publishes from the socket?
    /// Reading stops while earlier publishes are still parked.
    pub fn ready(&self) -> bool {
        self.parked.is_empty()
    }

    /// Replenish credit. A grant also lifts a previous cancellation.
    pub fn grant(&mut self, n: usize) {
        self.cancelled = false;
        self.credit = self.credit.saturating_add(n).min(self.ceiling);
    }

    /// Stop delivering publishes to the application. Parked and future
    /// publishes are dropped until credit is granted again.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.credit = 0;
        self.parked.clear();
    }

    /// Route an incoming publish through the gate.
    pub fn admit(&mut self, publish: Publish) -> Admission {
        if self.cancelled {
            return Admission::Dropped;
        }
        if self.credit > 0 && self.parked.is_empty() {
            self.credit -= 1;
            return Admission::Deliver(publish);
        }
        self.parked.push_back(publish);
        Admission::Parked
    }

    /// The next parked publish for which credit is now available, if any.
    pub fn release(&mut self) -> Option<Publish> {
        if self.credit == 0 || self.parked.is_empty() {
            return None;
        }
        self.credit -= 1;
        self.parked.pop_front()
    }
}

#[cfg(test)]
mod test {
    use wren_bytes::QoS;

    use super::*;

    fn publish(n: u8) -> Publish {
        Publish::new("hello/world", QoS::AtMostOnce, vec![n])
    }

    #[test]
    fn default_gate_delivers_everything() {
        let mut gate = CreditGate::new(usize::MAX);
        for n in 0..100 {
            assert_eq!(gate.admit(publish(n)), Admission::Deliver(publish(n)));
        }
        assert!(gate.ready());
    }

    #[test]
    fn exhausted_credit_parks_and_blocks_reading() {
        let mut gate = CreditGate::new(2);
        assert!(matches!(gate.admit(publish(0)), Admission::Deliver(_)));
        assert!(matches!(gate.admit(publish(1)), Admission::Deliver(_)));
        assert_eq!(gate.admit(publish(2)), Admission::Parked);
        assert!(!gate.ready());

        // a grant lets the parked publish through, in arrival order
        assert_eq!(gate.release(), None);
        gate.grant(1);
        assert_eq!(gate.release(), Some(publish(2)));
        assert!(gate.ready());
    }

    #[test]
    fn parked_publishes_keep_arrival_order() {
        let mut gate = CreditGate::new(1);
        assert!(matches!(gate.admit(publish(0)), Admission::Deliver(_)));
        gate.admit(publish(1));
        gate.admit(publish(2));

        // the ceiling of one clamps each grant, so draining the backlog
        // takes one grant per parked publish
        gate.grant(5);
        assert_eq!(gate.release(), Some(publish(1)));
        assert_eq!(gate.release(), None);
        gate.grant(5);
        assert_eq!(gate.release(), Some(publish(2)));
        assert_eq!(gate.release(), None);
        assert!(gate.ready());
    }

    #[test]
    fn grants_never_exceed_the_ceiling() {
        let mut gate = CreditGate::new(1);
        gate.grant(100);
        assert!(matches!(gate.admit(publish(0)), Admission::Deliver(_)));
        // ceiling is 1, the oversized grant left exactly one credit
        assert_eq!(gate.admit(publish(1)), Admission::Parked);
    }

    #[test]
    fn cancel_drops_parked_and_new_publishes() {
        let mut gate = CreditGate::new(1);
        assert!(matches!(gate.admit(publish(0)), Admission::Deliver(_)));
        gate.admit(publish(1));

        gate.cancel();
        assert!(gate.ready());
        assert_eq!(gate.admit(publish(2)), Admission::Dropped);

        // granting credit resumes delivery
        gate.grant(1);
        assert!(matches!(gate.admit(publish(3)), Admission::Deliver(_)));
    }
}
