// Blocking delays for line settling
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::config::MAX_SIGNAL_CHANGE_TIME;

/// `DelayNs` backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
}

/// Split one signal change time into the delays before and after a transition.
/// The two halves always sum to the full duration. `None` outside (0, 1 s].
pub(crate) fn settle_halves(signal_change_time: Duration) -> Option<(u32, u32)> {
    if signal_change_time.is_zero() || signal_change_time > MAX_SIGNAL_CHANGE_TIME {
        return None;
    }
    let total = u32::try_from(signal_change_time.as_nanos()).ok()?;
    let before = total / 2;
    Some((before, total - before))
}
