//! Command state machine.
//!
//! Holds the single effective motion intent, when it was set, and which intent
//! was last pushed to the motors. A non-stop intent that is not refreshed
//! within the command timeout reverts to [`Intent::Stop`].

use core::{fmt, str::FromStr};

use embassy_time::{Duration, Instant};

use super::motors::Actuator;

/// The single currently-desired motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intent {
    #[default]
    Stop,
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Stop,
        Intent::Forward,
        Intent::Backward,
        Intent::TurnLeft,
        Intent::TurnRight,
    ];

    /// Wire token used in `{"action": ...}` commands.
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Stop => "stop",
            Intent::Forward => "forward",
            Intent::Backward => "backward",
            Intent::TurnLeft => "left",
            Intent::TurnRight => "right",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action token outside the known intent set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownIntent;

impl fmt::Display for UnknownIntent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("unknown action")
    }
}

impl FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == s)
            .ok_or(UnknownIntent)
    }
}

/// Current intent plus the bookkeeping needed for timeout and
/// change-only application.
#[derive(Debug, Clone)]
pub struct CommandState {
    intent: Intent,
    set_at: Instant,
    last_applied: Intent,
}

impl CommandState {
    /// Start stopped. The motor driver clears every channel when it is built,
    /// so stop is already the applied state.
    pub fn new(now: Instant) -> Self {
        CommandState {
            intent: Intent::Stop,
            set_at: now,
            last_applied: Intent::Stop,
        }
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn set_at(&self) -> Instant {
        self.set_at
    }

    pub fn last_applied(&self) -> Intent {
        self.last_applied
    }

    /// Overwrite the intent and restart its timeout window.
    pub fn set_intent(
        &mut self,
        intent: Intent,
        now: Instant,
    ) {
        tracing::info!(%intent, previous = %self.intent, "intent set");
        self.intent = intent;
        self.set_at = now;
    }

    /// Revert to stop once a non-stop intent has been held for longer than
    /// `timeout`. Returns `true` when the revert happened on this call.
    pub fn tick(
        &mut self,
        now: Instant,
        timeout: Duration,
    ) -> bool {
        if self.intent == Intent::Stop || now.saturating_duration_since(self.set_at) <= timeout {
            return false;
        }

        tracing::warn!(
            intent = %self.intent,
            timeout_ms = timeout.as_millis(),
            "command timed out, auto stop"
        );
        self.intent = Intent::Stop;
        true
    }

    /// Push the current intent to the actuator if it differs from the last
    /// one applied. The actuator is always stopped first.
    ///
    /// Returns `Ok(false)` without touching the actuator when nothing changed.
    /// On error `last_applied` is kept so the next call retries.
    pub fn apply_if_changed<A: Actuator>(
        &mut self,
        actuator: &mut A,
    ) -> Result<bool, A::Error> {
        if self.intent == self.last_applied {
            return Ok(false);
        }

        actuator.stop()?;
        if self.intent != Intent::Stop {
            actuator.drive(self.intent)?;
        }

        tracing::info!(from = %self.last_applied, to = %self.intent, "motors updated");
        self.last_applied = self.intent;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    /// Records every call instead of driving pins.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<Option<Intent>>,
    }

    impl Actuator for Recorder {
        type Error = ();

        fn stop(&mut self) -> Result<(), ()> {
            self.calls.push(None);
            Ok(())
        }

        fn drive(
            &mut self,
            intent: Intent,
        ) -> Result<(), ()> {
            self.calls.push(Some(intent));
            Ok(())
        }
    }

    struct Broken;

    impl Actuator for Broken {
        type Error = ();

        fn stop(&mut self) -> Result<(), ()> {
            Err(())
        }

        fn drive(
            &mut self,
            _intent: Intent,
        ) -> Result<(), ()> {
            Err(())
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    const TIMEOUT: Duration = Duration::from_millis(2000);

    #[test]
    fn parses_wire_tokens() {
        assert_eq!("forward".parse::<Intent>(), Ok(Intent::Forward));
        assert_eq!("backward".parse::<Intent>(), Ok(Intent::Backward));
        assert_eq!("left".parse::<Intent>(), Ok(Intent::TurnLeft));
        assert_eq!("right".parse::<Intent>(), Ok(Intent::TurnRight));
        assert_eq!("stop".parse::<Intent>(), Ok(Intent::Stop));
        assert_eq!("jump".parse::<Intent>(), Err(UnknownIntent));
        assert_eq!("Forward".parse::<Intent>(), Err(UnknownIntent));
    }

    #[test]
    fn starts_stopped_and_applied() {
        let mut state = CommandState::new(at(0));
        let mut motors = Recorder::default();
        assert_eq!(state.intent(), Intent::Stop);
        assert_eq!(state.apply_if_changed(&mut motors), Ok(false));
        assert!(motors.calls.is_empty());
    }

    #[test]
    fn latest_intent_wins_within_timeout() {
        let mut state = CommandState::new(at(0));
        let mut motors = Recorder::default();

        state.set_intent(Intent::Forward, at(100));
        state.set_intent(Intent::TurnRight, at(200));
        assert!(!state.tick(at(2200), TIMEOUT));
        assert_eq!(state.apply_if_changed(&mut motors), Ok(true));

        assert_eq!(motors.calls, [None, Some(Intent::TurnRight)]);
        assert_eq!(state.last_applied(), Intent::TurnRight);
    }

    #[test]
    fn timeout_reverts_to_stop_once() {
        let mut state = CommandState::new(at(0));
        let mut motors = Recorder::default();

        state.set_intent(Intent::Backward, at(0));
        state.apply_if_changed(&mut motors).unwrap();
        motors.calls.clear();

        assert!(state.tick(at(2001), TIMEOUT));
        assert_eq!(state.intent(), Intent::Stop);
        assert_eq!(state.apply_if_changed(&mut motors), Ok(true));
        assert_eq!(motors.calls, [None]);

        assert!(!state.tick(at(5000), TIMEOUT));
        assert_eq!(state.apply_if_changed(&mut motors), Ok(false));
        assert_eq!(motors.calls, [None]);
    }

    #[test]
    fn timeout_boundary_is_exclusive() {
        let mut state = CommandState::new(at(0));
        state.set_intent(Intent::Forward, at(1000));
        assert!(!state.tick(at(3000), TIMEOUT));
        assert_eq!(state.intent(), Intent::Forward);
        assert!(state.tick(at(3001), TIMEOUT));
    }

    #[test]
    fn apply_is_idempotent() {
        let mut state = CommandState::new(at(0));
        let mut motors = Recorder::default();

        state.set_intent(Intent::TurnLeft, at(10));
        assert_eq!(state.apply_if_changed(&mut motors), Ok(true));
        assert_eq!(state.apply_if_changed(&mut motors), Ok(false));
        assert_eq!(motors.calls.len(), 2);
    }

    #[test]
    fn repeated_command_restarts_timeout() {
        let mut state = CommandState::new(at(0));

        state.set_intent(Intent::TurnLeft, at(0));
        assert!(!state.tick(at(1000), TIMEOUT));
        state.set_intent(Intent::TurnLeft, at(1000));
        assert!(!state.tick(at(2500), TIMEOUT));
        assert_eq!(state.intent(), Intent::TurnLeft);
        assert!(state.tick(at(3500), TIMEOUT));
        assert_eq!(state.intent(), Intent::Stop);
    }

    #[test]
    fn clock_going_backwards_never_times_out() {
        let mut state = CommandState::new(at(0));
        state.set_intent(Intent::Forward, at(5000));
        assert!(!state.tick(at(10), TIMEOUT));
    }

    #[test]
    fn failed_apply_is_retried() {
        let mut state = CommandState::new(at(0));
        state.set_intent(Intent::Forward, at(0));

        assert_eq!(state.apply_if_changed(&mut Broken), Err(()));
        assert_eq!(state.last_applied(), Intent::Stop);

        let mut motors = Recorder::default();
        assert_eq!(state.apply_if_changed(&mut motors), Ok(true));
        assert_eq!(state.last_applied(), Intent::Forward);
    }
}
