//! Motor control for the two-sided differential drive.
//!
//! Each side of the car is one H-bridge channel pair (IN1/IN2 for the left
//! motor, IN3/IN4 for the right on an L298N). Pins are only ever written
//! through [`MotorDriver`], which drops a side's low pin before raising the
//! other so neither side ever sees both pins high.

use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;

use super::command::Intent;

/// Anything that can turn an [`Intent`] into a physical effect.
pub trait Actuator {
    type Error: core::fmt::Debug;

    /// Release every channel.
    fn stop(&mut self) -> Result<(), Self::Error>;

    /// Drive the channel combination for `intent`.
    fn drive(
        &mut self,
        intent: Intent,
    ) -> Result<(), Self::Error>;
}

/// Errors raised while driving the H-bridge pins.
#[derive(Debug)]
pub enum MotorError<E: core::fmt::Debug> {
    LeftPin(E),
    RightPin(E),
}

/// Direction of one side of the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spin {
    Idle,
    Ahead,
    Reverse,
}

/// Forward/reverse pin pair for one motor.
struct Bridge<P> {
    fwd: P,
    rev: P,
}

impl<P: OutputPin> Bridge<P> {
    fn set(
        &mut self,
        spin: Spin,
    ) -> Result<(), P::Error> {
        match spin {
            Spin::Idle => {
                self.fwd.set_low()?;
                self.rev.set_low()
            }
            Spin::Ahead => {
                self.rev.set_low()?;
                self.fwd.set_high()
            }
            Spin::Reverse => {
                self.fwd.set_low()?;
                self.rev.set_high()
            }
        }
    }
}

/// Left/right spin for each intent.
fn layout(intent: Intent) -> (Spin, Spin) {
    match intent {
        Intent::Stop => (Spin::Idle, Spin::Idle),
        Intent::Forward => (Spin::Ahead, Spin::Ahead),
        Intent::Backward => (Spin::Reverse, Spin::Reverse),
        Intent::TurnLeft => (Spin::Reverse, Spin::Ahead),
        Intent::TurnRight => (Spin::Ahead, Spin::Reverse),
    }
}

/// Dual H-bridge driver over four digital outputs.
pub struct MotorDriver<P> {
    left: Bridge<P>,
    right: Bridge<P>,
    driven: Intent,
}

impl<P> MotorDriver<P>
where
    P: OutputPin,
{
    /// Take ownership of the four bridge inputs and pull them all low.
    pub fn new(
        left_fwd: P,
        left_rev: P,
        right_fwd: P,
        right_rev: P,
    ) -> Result<Self, MotorError<P::Error>> {
        let mut driver = MotorDriver {
            left: Bridge {
                fwd: left_fwd,
                rev: left_rev,
            },
            right: Bridge {
                fwd: right_fwd,
                rev: right_rev,
            },
            driven: Intent::Stop,
        };
        driver.set(Intent::Stop)?;
        tracing::info!("motor pins configured");
        Ok(driver)
    }

    /// The intent whose pin combination is currently asserted.
    pub fn driven(&self) -> Intent {
        self.driven
    }

    pub fn forward(&mut self) -> Result<(), MotorError<P::Error>> {
        self.set(Intent::Forward)
    }

    pub fn backward(&mut self) -> Result<(), MotorError<P::Error>> {
        self.set(Intent::Backward)
    }

    pub fn turn_left(&mut self) -> Result<(), MotorError<P::Error>> {
        self.set(Intent::TurnLeft)
    }

    pub fn turn_right(&mut self) -> Result<(), MotorError<P::Error>> {
        self.set(Intent::TurnRight)
    }

    pub fn halt(&mut self) -> Result<(), MotorError<P::Error>> {
        self.set(Intent::Stop)
    }

    fn set(
        &mut self,
        intent: Intent,
    ) -> Result<(), MotorError<P::Error>> {
        let (left, right) = layout(intent);
        self.left.set(left).map_err(MotorError::LeftPin)?;
        self.right.set(right).map_err(MotorError::RightPin)?;
        self.driven = intent;
        tracing::debug!(%intent, "motor pins driven");
        Ok(())
    }
}

impl<P: OutputPin> Actuator for MotorDriver<P> {
    type Error = MotorError<P::Error>;

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.halt()
    }

    fn drive(
        &mut self,
        intent: Intent,
    ) -> Result<(), Self::Error> {
        match intent {
            Intent::Stop => self.halt(),
            Intent::Forward => self.forward(),
            Intent::Backward => self.backward(),
            Intent::TurnLeft => self.turn_left(),
            Intent::TurnRight => self.turn_right(),
        }
    }
}

/// Startup check: pulse forward then backward, stopping after each.
pub async fn self_test<A: Actuator>(
    actuator: &mut A,
    hold: Duration,
) -> Result<(), A::Error> {
    tracing::info!("running motor self-test");
    for intent in [Intent::Forward, Intent::Backward] {
        actuator.drive(intent)?;
        Timer::after(hold).await;
        actuator.stop()?;
    }
    tracing::info!("motor self-test complete");
    Ok(())
}
