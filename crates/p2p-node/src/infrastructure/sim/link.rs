//! Link-layer flags kept in memory.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::application::ports::{LinkError, LinkLayer};

#[derive(Debug, Default)]
pub struct SimulatedLink {
    admin_up: AtomicBool,
    carrier: AtomicBool,
    dormant: AtomicBool,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self {
            dormant: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Admin up, carrier on, and not dormant.
    pub fn is_operational(&self) -> bool {
        self.admin_up.load(Ordering::SeqCst)
            && self.carrier.load(Ordering::SeqCst)
            && !self.dormant.load(Ordering::SeqCst)
    }
}

impl LinkLayer for SimulatedLink {
    fn set_admin_up(&self) -> Result<(), LinkError> {
        if self.admin_up.swap(true, Ordering::SeqCst) {
            return Err(LinkError::AlreadyUp);
        }
        debug!("link admin up");
        Ok(())
    }

    fn carrier_on(&self) -> Result<(), LinkError> {
        self.carrier.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dormant_off(&self) -> Result<(), LinkError> {
        self.dormant.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::activate_link;

    #[test]
    fn test_new_link_is_not_operational() {
        assert!(!SimulatedLink::new().is_operational());
    }

    #[test]
    fn test_second_admin_up_reports_already_up() {
        let link = SimulatedLink::new();
        link.set_admin_up().unwrap();
        assert_eq!(link.set_admin_up(), Err(LinkError::AlreadyUp));
    }

    #[test]
    fn test_activation_is_idempotent() {
        let link = SimulatedLink::new();

        activate_link(&link);
        activate_link(&link);

        assert!(link.is_operational());
    }
}
