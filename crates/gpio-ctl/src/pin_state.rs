//! Configuration the dispatcher has applied to each pin since the
//! controller was last opened.

use heapless::Vec;

use crate::icd::{Direction, Pin, PullMode, MAX_PIN};

const CAPACITY: usize = MAX_PIN as usize + 1;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    /// Last direction set explicitly, `None` if never set.
    pub direction: Option<Direction>,
    /// Last pull mode set explicitly, `None` if never set.
    pub pull: Option<PullMode>,
    /// Whether the PWM range has been set to full scale.
    pub pwm_ranged: bool,
}

/// Per-pin records, created on first touch and dropped on every reopen.
#[derive(Debug, Default)]
pub struct PinStateTable {
    entries: Vec<(Pin, PinState), CAPACITY>,
}

impl PinStateTable {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Record for `pin`; the default record if it was never touched.
    pub fn get(&self, pin: Pin) -> PinState {
        self.entries
            .iter()
            .find(|(p, _)| *p == pin)
            .map(|(_, state)| *state)
            .unwrap_or_default()
    }

    pub fn set_direction(&mut self, pin: Pin, direction: Direction) {
        self.update(pin, |state| state.direction = Some(direction));
    }

    pub fn set_pull(&mut self, pin: Pin, pull: PullMode) {
        self.update(pin, |state| state.pull = Some(pull));
    }

    pub fn mark_pwm_ranged(&mut self, pin: Pin) {
        self.update(pin, |state| state.pwm_ranged = true);
    }

    /// Number of pins with a record.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn update(&mut self, pin: Pin, f: impl FnOnce(&mut PinState)) {
        if let Some((_, state)) = self.entries.iter_mut().find(|(p, _)| *p == pin)
        {
            f(state);
            return;
        }
        let mut state = PinState::default();
        f(&mut state);
        // Every valid pin fits, so the push cannot overflow.
        let _ = self.entries.push((pin, state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(n: i32) -> Pin {
        Pin::try_from(n).unwrap()
    }

    #[test]
    fn untouched_pin_has_default_record() {
        let table = PinStateTable::new();
        assert_eq!(table.get(pin(4)), PinState::default());
        assert!(table.is_empty());
    }

    #[test]
    fn updates_accumulate_per_pin() {
        let mut table = PinStateTable::new();
        table.set_direction(pin(4), Direction::Output);
        table.set_pull(pin(4), PullMode::PullUp);
        table.mark_pwm_ranged(pin(18));

        assert_eq!(
            table.get(pin(4)),
            PinState {
                direction: Some(Direction::Output),
                pull: Some(PullMode::PullUp),
                pwm_ranged: false,
            }
        );
        assert!(table.get(pin(18)).pwm_ranged);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn holds_every_pin() {
        let mut table = PinStateTable::new();
        for n in 0..=i32::from(MAX_PIN) {
            table.mark_pwm_ranged(pin(n));
        }
        assert_eq!(table.len(), CAPACITY);
        assert!(table.get(pin(53)).pwm_ranged);

        table.clear();
        assert!(!table.get(pin(53)).pwm_ranged);
    }
}
