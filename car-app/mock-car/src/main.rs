use std::{
    convert::Infallible,
    error::Error,
    fs,
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use car_core::mk_static;
use car_core::utils::connection::{
    ConnectOptions,
    InboundMessage,
    LinkMonitor,
    MqttTransport,
    TransportError,
};
use car_core::utils::controllers::{MotorDriver, RangingSensor, self_test};
use car_core::utils::{CarConfig, ControlLoop, Peripherals, Topics};
use clap::Parser;
use embassy_executor::{Executor, Spawner};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, TrySendError},
};
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::{ErrorType, OutputPin};
use rand_core::{OsRng, UnwrapErr};
use serde::Deserialize;
use serde_json::{Value, json};
use static_cell::StaticCell;
use tracing::{debug, error, info, warn};

const INBOX_DEPTH: usize = 16;

type Inbox = Channel<CriticalSectionRawMutex, InboundMessage, INBOX_DEPTH>;

/// Messages the simulated broker will hand to the car.
static INBOX: Inbox = Channel::new();

/// Set to sever the broker session without a clean disconnect.
static LINK_DROPPED: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// JSON file overriding configuration defaults
    #[clap(long)]
    config: Option<PathBuf>,
    /// override the device id
    #[clap(long)]
    device_id: Option<String>,
    /// refuse this many connect attempts before accepting
    #[clap(long, default_value_t = 1)]
    fail_connects: u32,
    /// JSON list of `{"at_ms": .., "payload": ..}` steps sent on the command topic
    #[clap(long)]
    script: Option<PathBuf>,
    /// sever the broker link at this time (ms after start)
    #[clap(long)]
    drop_link_at_ms: Option<u64>,
    /// exit after this long (ms)
    #[clap(long, default_value_t = 20_000)]
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ScriptStep {
    at_ms: u64,
    /// Sent verbatim when a string, re-serialized otherwise.
    payload: Value,
}

impl ScriptStep {
    fn bytes(&self) -> Vec<u8> {
        match &self.payload {
            Value::String(raw) => raw.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        }
    }
}

fn default_script() -> Vec<ScriptStep> {
    let step = |at_ms, payload| ScriptStep { at_ms, payload };
    vec![
        step(6_000, json!({"action": "forward"})),
        step(7_000, json!({"test": true})),
        step(9_500, json!({"action": "left"})),
        step(10_500, json!({"action": "left"})),
        step(11_000, json!({"action": "jump"})),
        step(11_500, json!({"speed": 3})),
        step(12_000, Value::String("{\"action\":".into())),
        step(16_000, json!({"action": "backward"})),
        step(16_800, json!({"action": "stop"})),
    ]
}

/// GPIO stand-in that logs level changes.
struct LoggedPin {
    name: &'static str,
    high: bool,
}

impl LoggedPin {
    fn new(name: &'static str) -> Self {
        LoggedPin { name, high: true }
    }

    fn write(
        &mut self,
        high: bool,
    ) {
        if self.high != high {
            debug!(pin = self.name, level = if high { "HIGH" } else { "LOW" }, "gpio");
        }
        self.high = high;
    }
}

impl ErrorType for LoggedPin {
    type Error = Infallible;
}

impl OutputPin for LoggedPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true);
        Ok(())
    }
}

/// Ultrasonic stand-in sweeping through near, far, missing and
/// out-of-range echoes.
struct SweepSonar {
    next: usize,
}

impl RangingSensor for SweepSonar {
    type Error = Infallible;

    fn ping_cm(&mut self) -> Result<u32, Self::Error> {
        const SWEEP: [u32; 5] = [35, 120, 0, 260, 410];
        let cm = SWEEP[self.next % SWEEP.len()];
        self.next += 1;
        Ok(cm)
    }
}

struct HostBoard;

impl LinkMonitor for HostBoard {
    fn rssi(&self) -> i32 {
        -55
    }

    fn free_heap(&self) -> u32 {
        180_000
    }
}

/// Broker session that logs every publication.
struct SimBroker {
    refuse: u32,
    up: bool,
    subscriptions: Vec<String>,
}

impl MqttTransport for SimBroker {
    fn connect(
        &mut self,
        options: &ConnectOptions<'_>,
    ) -> Result<(), TransportError> {
        info!(
            client_id = options.client_id,
            will_topic = options.last_will.topic,
            will = %String::from_utf8_lossy(options.last_will.payload),
            "broker: CONNECT"
        );
        if self.refuse > 0 {
            self.refuse -= 1;
            return Err(TransportError::ConnectFailed(-2));
        }
        LINK_DROPPED.store(false, Ordering::Relaxed);
        self.up = true;
        self.subscriptions.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.up && !LINK_DROPPED.load(Ordering::Relaxed)
    }

    fn subscribe(
        &mut self,
        topic: &str,
    ) -> Result<(), TransportError> {
        info!(topic, "broker: SUBSCRIBE");
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        info!(
            topic,
            retain,
            payload = %String::from_utf8_lossy(payload),
            "broker: PUBLISH"
        );
        Ok(())
    }

    fn poll(&mut self) -> Option<InboundMessage> {
        if !self.is_connected() {
            return None;
        }
        loop {
            let message = INBOX.try_receive().ok()?;
            if self.subscriptions.contains(&message.topic) {
                return Some(message);
            }
            debug!(topic = %message.topic, "broker: no subscriber, message discarded");
        }
    }

    fn disconnect(&mut self) {
        info!("broker: DISCONNECT");
        self.up = false;
        self.subscriptions.clear();
    }
}

type Car = ControlLoop<SimBroker, MotorDriver<LoggedPin>, SweepSonar, HostBoard, UnwrapErr<OsRng>>;

enum Event {
    Deliver(Vec<u8>),
    DropLink,
}

fn load_config(opts: &Opts) -> Result<CarConfig, Box<dyn Error>> {
    let mut config = match &opts.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => CarConfig::default(),
    };
    if let Some(device_id) = &opts.device_id {
        config.device_id = device_id.clone();
    }
    Ok(config)
}

fn load_script(opts: &Opts) -> Result<Vec<ScriptStep>, Box<dyn Error>> {
    match &opts.script {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(default_script()),
    }
}

/// Queue a scripted message without waiting; a full inbox (car offline and
/// not draining) drops it so the script keeps its schedule.
fn deliver(
    inbox: &Inbox,
    message: InboundMessage,
) -> bool {
    match inbox.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            warn!(
                payload = %String::from_utf8_lossy(&message.payload),
                "script: broker inbox full, command dropped"
            );
            false
        }
    }
}

#[embassy_executor::task]
async fn control_task(car: &'static mut Car) -> ! {
    car.run().await
}

#[embassy_executor::task]
async fn script_task(
    command_topic: String,
    mut events: Vec<(u64, Event)>,
    duration_ms: u64,
) {
    let start = Instant::now();
    events.sort_by_key(|(at_ms, _)| *at_ms);

    for (at_ms, event) in events {
        Timer::at(start + Duration::from_millis(at_ms)).await;
        match event {
            Event::Deliver(payload) => {
                info!(payload = %String::from_utf8_lossy(&payload), "script: sending command");
                deliver(
                    &INBOX,
                    InboundMessage {
                        topic: command_topic.clone(),
                        payload,
                    },
                );
            }
            Event::DropLink => {
                warn!("script: dropping broker link");
                LINK_DROPPED.store(true, Ordering::Relaxed);
            }
        }
    }

    Timer::at(start + Duration::from_millis(duration_ms)).await;
    info!("simulation finished");
    std::process::exit(0);
}

#[embassy_executor::task]
async fn main_task(spawner: Spawner) {
    let opts: Opts = Opts::parse();

    let (config, script) = match load_config(&opts).and_then(|c| load_script(&opts).map(|s| (c, s))) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("failed to load simulation inputs: {e}");
            std::process::exit(1);
        }
    };
    let topics = Topics::from_config(&config);

    let mut motors = MotorDriver::new(
        LoggedPin::new("IN1"),
        LoggedPin::new("IN2"),
        LoggedPin::new("IN3"),
        LoggedPin::new("IN4"),
    )
    .expect("logged pins cannot fail");
    self_test(&mut motors, Duration::from_millis(100))
        .await
        .expect("logged pins cannot fail");

    let peripherals = Peripherals {
        transport: SimBroker {
            refuse: opts.fail_connects,
            up: false,
            subscriptions: Vec::new(),
        },
        actuator: motors,
        sensor: SweepSonar { next: 0 },
        monitor: HostBoard,
        rng: UnwrapErr(OsRng),
    };
    let car = match ControlLoop::new(config, peripherals, Instant::now()) {
        Ok(car) => car,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let car = mk_static!(Car, car);

    let mut events: Vec<(u64, Event)> = script
        .iter()
        .map(|step| (step.at_ms, Event::Deliver(step.bytes())))
        .collect();
    if let Some(at_ms) = opts.drop_link_at_ms {
        events.push((at_ms, Event::DropLink));
    }

    info!(topic = %topics.command, steps = events.len(), "starting simulation");
    spawner
        .spawn(script_task(topics.command.clone(), events, opts.duration_ms))
        .unwrap();
    spawner.spawn(control_task(car)).unwrap();
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner)).unwrap();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(n: usize) -> InboundMessage {
        InboundMessage {
            topic: "iot-car/car-001/command".to_string(),
            payload: format!("{{\"seq\":{n}}}").into_bytes(),
        }
    }

    #[test]
    fn full_inbox_drops_instead_of_blocking() {
        let inbox = Inbox::new();
        for n in 0..INBOX_DEPTH {
            assert!(deliver(&inbox, command(n)));
        }

        assert!(!deliver(&inbox, command(INBOX_DEPTH)));
        assert_eq!(inbox.try_receive().unwrap().payload, b"{\"seq\":0}");
        assert!(deliver(&inbox, command(INBOX_DEPTH + 1)));
    }

    #[test]
    fn disconnect_ends_the_session() {
        let mut broker = SimBroker {
            refuse: 0,
            up: true,
            subscriptions: vec!["iot-car/car-001/command".to_string()],
        };

        broker.disconnect();

        assert!(!broker.is_connected());
        assert!(broker.subscriptions.is_empty());
        assert!(broker.poll().is_none());
    }
}
