use car_core::utils::controllers::{Actuator, CommandState, Intent, MotorDriver};
use car_core::utils::Instant;
use embedded_hal_mock::eh1::digital::{
    Mock as PinMock,
    State as PinState,
    Transaction as PinTrans,
};

use PinState::{High, Low};

/// Create a pin mock expecting the given sequence of writes.
pub fn pin(states: &[PinState]) -> PinMock {
    let expectations: Vec<PinTrans> = states.iter().map(|&s| PinTrans::set(s)).collect();
    PinMock::new(&expectations)
}

/// Four pins in (left fwd, left rev, right fwd, right rev) order.
struct Bridge {
    pins: [PinMock; 4],
}

impl Bridge {
    fn expect(
        left_fwd: &[PinState],
        left_rev: &[PinState],
        right_fwd: &[PinState],
        right_rev: &[PinState],
    ) -> Self {
        Bridge {
            pins: [pin(left_fwd), pin(left_rev), pin(right_fwd), pin(right_rev)],
        }
    }

    fn driver(&self) -> MotorDriver<PinMock> {
        let [lf, lr, rf, rr] = self.pins.clone();
        MotorDriver::new(lf, lr, rf, rr).unwrap()
    }

    fn done(&mut self) {
        for pin in self.pins.iter_mut() {
            pin.done();
        }
    }
}

#[test]
fn test_new_pulls_all_low() {
    let mut bridge = Bridge::expect(&[Low], &[Low], &[Low], &[Low]);
    let motors = bridge.driver();
    assert_eq!(motors.driven(), Intent::Stop);
    bridge.done();
}

#[test]
fn test_forward() {
    let mut bridge = Bridge::expect(&[Low, High], &[Low, Low], &[Low, High], &[Low, Low]);
    let mut motors = bridge.driver();
    motors.forward().unwrap();
    assert_eq!(motors.driven(), Intent::Forward);
    bridge.done();
}

#[test]
fn test_backward() {
    let mut bridge = Bridge::expect(&[Low, Low], &[Low, High], &[Low, Low], &[Low, High]);
    let mut motors = bridge.driver();
    motors.backward().unwrap();
    bridge.done();
}

#[test]
fn test_turn_left() {
    let mut bridge = Bridge::expect(&[Low, Low], &[Low, High], &[Low, High], &[Low, Low]);
    let mut motors = bridge.driver();
    motors.turn_left().unwrap();
    bridge.done();
}

#[test]
fn test_turn_right() {
    let mut bridge = Bridge::expect(&[Low, High], &[Low, Low], &[Low, Low], &[Low, High]);
    let mut motors = bridge.driver();
    motors.turn_right().unwrap();
    bridge.done();
}

#[test]
fn test_drive_stop_clears_everything() {
    let mut bridge = Bridge::expect(
        &[Low, High, Low],
        &[Low, Low, Low],
        &[Low, High, Low],
        &[Low, Low, Low],
    );
    let mut motors = bridge.driver();
    motors.drive(Intent::Forward).unwrap();
    motors.drive(Intent::Stop).unwrap();
    assert_eq!(motors.driven(), Intent::Stop);
    bridge.done();
}

/// An intent change always passes through the all-low combination.
#[test]
fn test_intent_change_stops_first() {
    let mut bridge = Bridge::expect(
        &[Low, Low, High, Low, Low],
        &[Low, Low, Low, Low, High],
        &[Low, Low, High, Low, Low],
        &[Low, Low, Low, Low, High],
    );
    let mut motors = bridge.driver();
    let mut state = CommandState::new(Instant::from_millis(0));

    state.set_intent(Intent::Forward, Instant::from_millis(10));
    assert_eq!(state.apply_if_changed(&mut motors).unwrap(), true);
    state.set_intent(Intent::Backward, Instant::from_millis(20));
    assert_eq!(state.apply_if_changed(&mut motors).unwrap(), true);
    // Nothing changed: no pin writes.
    assert_eq!(state.apply_if_changed(&mut motors).unwrap(), false);

    bridge.done();
}
