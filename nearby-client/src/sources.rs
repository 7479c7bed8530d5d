use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nearby_core::error::LocationError;
use nearby_core::geo::EARTH_RADIUS_MILES;
use nearby_core::{now_unix_ms, Coordinate, PositionEvent, PositionFix, PositionSource, Subscription};
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

/// A line of the position stream: either a fix or an error report from the
/// platform location service.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PositionLine {
    Error { error: String },
    Fix(PositionFix),
}

pub fn parse_line(line: &str) -> Option<PositionEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match serde_json::from_str::<PositionLine>(line) {
        Ok(PositionLine::Fix(mut fix)) => {
            if fix.timestamp_ms == 0 {
                fix.timestamp_ms = now_unix_ms();
            }
            Some(PositionEvent::Fix(fix))
        }
        Ok(PositionLine::Error { error }) => Some(PositionEvent::Error(location_error(&error))),
        Err(err) => {
            warn!("skipping malformed position line: {err}");
            None
        }
    }
}

fn location_error(reason: &str) -> LocationError {
    match reason {
        "permission_denied" => LocationError::PermissionDenied,
        "timeout" => LocationError::Timeout,
        other => LocationError::Unavailable(other.to_string()),
    }
}

/// JSON fixes, one per line, from a file or stdin (`-`). End of input closes
/// the source.
pub struct JsonlSource {
    path: String,
}

impl JsonlSource {
    pub fn new(path: String) -> Self {
        Self { path }
    }

    fn open(&self) -> io::Result<Box<dyn BufRead + Send>> {
        if self.path == "-" {
            Ok(Box::new(BufReader::new(io::stdin())))
        } else {
            Ok(Box::new(BufReader::new(File::open(&self.path)?)))
        }
    }
}

impl PositionSource for JsonlSource {
    fn subscribe(&mut self, tx: Sender<PositionEvent>) -> Result<Subscription, LocationError> {
        let reader = self
            .open()
            .map_err(|e| LocationError::Unavailable(format!("{}: {}", self.path, e)))?;
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let worker = thread::spawn(move || {
            for line in reader.lines() {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let event = match line {
                    Ok(line) => match parse_line(&line) {
                        Some(event) => event,
                        None => continue,
                    },
                    Err(err) => PositionEvent::Error(LocationError::Unavailable(err.to_string())),
                };
                let is_error = matches!(event, PositionEvent::Error(_));
                if tx.send(event).is_err() || is_error {
                    break;
                }
            }
            debug!("position stream ended");
        });
        Ok(Subscription::new(cancelled, Some(worker)))
    }
}

/// Random walk around a starting point, for demos and field-free testing.
pub struct SimulatedWalk {
    start: Coordinate,
    step_miles: f64,
    interval: Duration,
    steps: Option<usize>,
}

impl SimulatedWalk {
    pub fn new(start: Coordinate, step_miles: f64, interval: Duration, steps: Option<usize>) -> Self {
        Self {
            start,
            step_miles,
            interval,
            steps,
        }
    }
}

pub fn step(from: Coordinate, miles: f64, bearing_rad: f64) -> Coordinate {
    let deg_per_mile = 1.0 / EARTH_RADIUS_MILES.to_radians();
    let dlat = miles * bearing_rad.cos() * deg_per_mile;
    let cos_lat = from.latitude.to_radians().cos().max(1e-6);
    let dlon = miles * bearing_rad.sin() * deg_per_mile / cos_lat;
    Coordinate::new(
        (from.latitude + dlat).clamp(-90.0, 90.0),
        ((from.longitude + dlon + 540.0) % 360.0) - 180.0,
    )
}

impl PositionSource for SimulatedWalk {
    fn subscribe(&mut self, tx: Sender<PositionEvent>) -> Result<Subscription, LocationError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let (start, step_miles, interval, steps) = (self.start, self.step_miles, self.interval, self.steps);
        let worker = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut here = start;
            let mut sent = 0usize;
            while steps.map_or(true, |n| sent < n) {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let fix = PositionFix {
                    coordinate: here,
                    accuracy_m: Some(rng.gen_range(5.0..25.0)),
                    timestamp_ms: now_unix_ms(),
                };
                if tx.send(PositionEvent::Fix(fix)).is_err() {
                    break;
                }
                sent += 1;
                let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
                here = step(here, step_miles, bearing);
                thread::sleep(interval);
            }
        });
        Ok(Subscription::new(cancelled, Some(worker)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearby_core::distance_miles;
    use std::sync::mpsc;

    const TEST_EPSILON: f64 = 1e-6;

    #[test]
    fn lines_parse_into_fixes_and_errors() {
        match parse_line(r#"{"latitude": 26.64, "longitude": -81.87, "timestamp": 5}"#) {
            Some(PositionEvent::Fix(fix)) => {
                assert_eq!(fix.coordinate, Coordinate::new(26.64, -81.87));
                assert_eq!(fix.timestamp_ms, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            parse_line(r#"{"error": "permission_denied"}"#),
            Some(PositionEvent::Error(LocationError::PermissionDenied))
        );
        assert!(parse_line("# comment").is_none());
        assert!(parse_line("not json").is_none());
    }

    #[test]
    fn step_moves_the_requested_distance() {
        let from = Coordinate::new(26.64, -81.87);
        for bearing in [0.0, 1.0, 2.5, 4.0] {
            let to = step(from, 0.1, bearing);
            assert!((distance_miles(from, to) - 0.1).abs() < 1e-3);
        }
        assert!((distance_miles(from, step(from, 0.0, 1.0))).abs() < TEST_EPSILON);
    }

    #[test]
    fn jsonl_file_ends_on_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixes.jsonl");
        std::fs::write(
            &path,
            "{\"latitude\": 1.0, \"longitude\": 2.0}\n{\"error\": \"timeout\"}\n{\"latitude\": 3.0, \"longitude\": 4.0}\n",
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        let _sub = JsonlSource::new(path.display().to_string()).subscribe(tx).unwrap();
        let events: Vec<PositionEvent> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], PositionEvent::Error(LocationError::Timeout));
    }

    #[test]
    fn simulated_walk_stops_after_steps() {
        let (tx, rx) = mpsc::channel();
        let mut walk = SimulatedWalk::new(Coordinate::new(26.64, -81.87), 0.01, Duration::ZERO, Some(3));
        let _sub = walk.subscribe(tx).unwrap();
        assert_eq!(rx.iter().count(), 3);
    }

    #[test]
    fn missing_file_is_a_location_error() {
        let (tx, _rx) = mpsc::channel();
        let err = JsonlSource::new("/definitely/not/here.jsonl".to_string()).subscribe(tx);
        assert!(matches!(err, Err(LocationError::Unavailable(_))));
    }
}
