//! The car's main loop.
//!
//! [`ControlLoop`] owns every piece of mutable state and every collaborator.
//! Each [`ControlLoop::step`] runs one cycle in a fixed order:
//!
//! 1. advance the broker connection (at most one connect attempt),
//! 2. drain pending commands while connected,
//! 3. apply the command timeout and push any intent change to the motors,
//! 4. build and publish telemetry when the interval has elapsed,
//! 5. emit the heartbeat trace.
//!
//! [`ControlLoop::run`] repeats `step` on a ticker and never returns.

use core::fmt;

use embassy_time::{Instant, Ticker};
use rand_core::RngCore;

use crate::utils::{
    config::{CarConfig, ConfigError, Topics},
    connection::{
        ConnectionEvent,
        ConnectionManager,
        Dispatch,
        Dispatcher,
        EncodeError,
        LinkMonitor,
        MqttTransport,
    },
    controllers::{Actuator, CommandState, DistanceSensor, RangingSensor},
};

/// Upper bound on messages handled per cycle.
pub const MAX_MESSAGES_PER_CYCLE: usize = 16;

#[derive(Debug)]
pub enum SetupError {
    Config(ConfigError),
    Encode(EncodeError),
}

impl fmt::Display for SetupError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            SetupError::Config(e) => write!(f, "invalid configuration: {e}"),
            SetupError::Encode(e) => write!(f, "status payload: {e}"),
        }
    }
}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        SetupError::Config(e)
    }
}

impl From<EncodeError> for SetupError {
    fn from(e: EncodeError) -> Self {
        SetupError::Encode(e)
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub connection: ConnectionEvent,
    /// Messages taken off the transport this cycle.
    pub dispatched: usize,
    /// The command timeout forced a stop this cycle.
    pub reverted: bool,
    /// The motors were re-driven this cycle.
    pub applied: bool,
    /// Sequence number of the sample built this cycle, if any.
    pub telemetry: Option<u32>,
}

/// The hardware and network collaborators the loop drives.
pub struct Peripherals<T, A, S, L, R> {
    pub transport: T,
    pub actuator: A,
    pub sensor: S,
    pub monitor: L,
    pub rng: R,
}

pub struct ControlLoop<T, A, S, L, R> {
    config: CarConfig,
    transport: T,
    actuator: A,
    sensor: DistanceSensor<S>,
    monitor: L,
    rng: R,
    commands: CommandState,
    connection: ConnectionManager,
    dispatcher: Dispatcher,
    last_telemetry: Instant,
    last_heartbeat: Instant,
}

impl<T, A, S, L, R> ControlLoop<T, A, S, L, R>
where
    T: MqttTransport,
    A: Actuator,
    S: RangingSensor,
    L: LinkMonitor,
    R: RngCore,
{
    /// Validate `config` and assemble the loop. `now` is boot time: the first
    /// telemetry sample is due one interval later.
    pub fn new(
        config: CarConfig,
        peripherals: Peripherals<T, A, S, L, R>,
        now: Instant,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let topics = Topics::from_config(&config);
        let connection = ConnectionManager::new(&config, &topics)?;
        let dispatcher = Dispatcher::new(&config, &topics);
        let Peripherals {
            transport,
            actuator,
            sensor,
            monitor,
            rng,
        } = peripherals;

        tracing::info!(
            device_id = %config.device_id,
            broker = %config.broker_host,
            port = config.broker_port,
            "control loop ready"
        );

        Ok(ControlLoop {
            sensor: DistanceSensor::new(sensor, config.max_distance_cm),
            config,
            transport,
            actuator,
            monitor,
            rng,
            commands: CommandState::new(now),
            connection,
            dispatcher,
            last_telemetry: now,
            last_heartbeat: now,
        })
    }

    /// Run one cycle at time `now`.
    pub fn step(
        &mut self,
        now: Instant,
    ) -> CycleReport {
        let connection = self
            .connection
            .poll(&mut self.transport, &mut self.rng, now);

        let mut dispatched = 0;
        while self.connection.is_connected() && dispatched < MAX_MESSAGES_PER_CYCLE {
            let Some(message) = self.transport.poll() else {
                break;
            };
            dispatched += 1;
            if let Dispatch::Applied { intent, acked: false } = self.dispatcher.handle(
                &message,
                &mut self.commands,
                &self.connection,
                &mut self.transport,
                now,
            ) {
                tracing::debug!(%intent, "command applied without acknowledgement");
            }
        }

        let reverted = self.commands.tick(now, self.config.command_timeout());
        let applied = match self.commands.apply_if_changed(&mut self.actuator) {
            Ok(applied) => applied,
            Err(error) => {
                tracing::error!(?error, intent = %self.commands.intent(), "failed to drive motors");
                false
            }
        };

        let telemetry = if now.saturating_duration_since(self.last_telemetry)
            >= self.config.telemetry_interval()
        {
            self.last_telemetry = now;
            let sample = self
                .dispatcher
                .build_telemetry(&mut self.sensor, &self.monitor, now);
            self.dispatcher
                .publish_telemetry(&sample, &self.connection, &mut self.transport);
            Some(sample.message_count)
        } else {
            None
        };

        if now.saturating_duration_since(self.last_heartbeat) >= self.config.heartbeat_interval() {
            self.last_heartbeat = now;
            tracing::trace!(
                uptime_ms = now.as_millis(),
                intent = %self.commands.intent(),
                state = ?self.connection.state(),
                "heartbeat"
            );
        }

        CycleReport {
            connection,
            dispatched,
            reverted,
            applied,
            telemetry,
        }
    }

    /// Step forever at the configured poll period.
    pub async fn run(&mut self) -> ! {
        let mut ticker = Ticker::every(self.config.poll_period());
        loop {
            self.step(Instant::now());
            ticker.next().await;
        }
    }

    pub fn config(&self) -> &CarConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandState {
        &self.commands
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        self.sensor.sensor_mut()
    }
}
