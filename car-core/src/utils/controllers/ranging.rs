//! Distance ranging for the front ultrasonic sensor.
//!
//! The pulse-timing driver sits behind [`RangingSensor`]. [`DistanceSensor`]
//! turns its raw echo into centimeters and folds every "no usable echo" case
//! into [`OUT_OF_RANGE_CM`].

/// Reported when there is no echo, a zero echo, or an echo beyond range.
pub const OUT_OF_RANGE_CM: f32 = 999.0;

/// Raw ranging primitive, e.g. an HC-SR04 trigger/echo pair.
pub trait RangingSensor {
    type Error: core::fmt::Debug;

    /// Fire one pulse and wait (bounded by the driver's own timeout) for the
    /// echo. Returns whole centimeters; `Ok(0)` means no echo was seen.
    fn ping_cm(&mut self) -> Result<u32, Self::Error>;
}

/// Ranging sensor with out-of-range folding.
pub struct DistanceSensor<S> {
    sensor: S,
    max_distance_cm: u32,
}

impl<S: RangingSensor> DistanceSensor<S> {
    pub fn new(
        sensor: S,
        max_distance_cm: u32,
    ) -> Self {
        DistanceSensor {
            sensor,
            max_distance_cm,
        }
    }

    /// Measure once. Never fails: timeouts and empty echoes come back as
    /// [`OUT_OF_RANGE_CM`].
    pub fn read_distance(&mut self) -> f32 {
        match self.sensor.ping_cm() {
            Ok(0) => OUT_OF_RANGE_CM,
            Ok(cm) if cm > self.max_distance_cm => {
                tracing::trace!(cm, max = self.max_distance_cm, "echo beyond range");
                OUT_OF_RANGE_CM
            }
            Ok(cm) => cm as f32,
            Err(error) => {
                tracing::debug!(?error, "ranging failed");
                OUT_OF_RANGE_CM
            }
        }
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}

/// Whether `distance` is the out-of-range sentinel rather than a measurement.
pub fn is_out_of_range(distance: f32) -> bool {
    distance == OUT_OF_RANGE_CM
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays one canned result per ping.
    struct Canned(Result<u32, &'static str>);

    impl RangingSensor for Canned {
        type Error = &'static str;

        fn ping_cm(&mut self) -> Result<u32, Self::Error> {
            self.0
        }
    }

    fn read(result: Result<u32, &'static str>) -> f32 {
        DistanceSensor::new(Canned(result), 400).read_distance()
    }

    #[test]
    fn in_range_echo_is_reported_in_cm() {
        assert_eq!(read(Ok(1)), 1.0);
        assert_eq!(read(Ok(123)), 123.0);
        assert_eq!(read(Ok(400)), 400.0);
    }

    #[test]
    fn zero_echo_is_out_of_range() {
        assert_eq!(read(Ok(0)), OUT_OF_RANGE_CM);
    }

    #[test]
    fn timeout_is_out_of_range() {
        assert_eq!(read(Err("echo timeout")), OUT_OF_RANGE_CM);
    }

    #[test]
    fn beyond_max_is_out_of_range() {
        assert_eq!(read(Ok(401)), OUT_OF_RANGE_CM);
    }

    #[test]
    fn sentinel_is_distinguishable() {
        assert!(is_out_of_range(read(Ok(0))));
        assert!(!is_out_of_range(read(Ok(399))));
    }
}
