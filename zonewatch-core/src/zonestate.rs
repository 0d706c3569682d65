//! Per-worker zone state machine: turns per-frame detection centers into
//! `enter`/`exit` events against a camera's configured zones.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::model::{EventKind, Zone, ZoneEvent, ZoneMetric};
use crate::polygon::Polygon;

/// One tracked detection's center for the current frame, as handed to the
/// state machine by the worker after the external detector/tracker ran.
#[derive(Debug, Clone, Copy)]
pub struct TrackCenter {
    pub track_id: i32,
    pub center: (f64, f64),
}

struct ZoneGeometry {
    zone: Zone,
    polygon: Polygon,
}

/// Tracks, per camera, which `(track_id, zone_id)` pairs are currently
/// "inside" and since when (a monotonic clock, never the wall clock, so
/// dwell arithmetic is immune to clock adjustments).
pub struct ZoneStateMachine {
    tenant_id: i32,
    camera_id: i32,
    zones: Vec<ZoneGeometry>,
    prev_tracks: HashMap<(i32, i32), Instant>,
}

impl ZoneStateMachine {
    pub fn new(tenant_id: i32, camera_id: i32, zones: Vec<Zone>) -> anyhow::Result<Self> {
        let zones = zones
            .into_iter()
            .map(|zone| {
                let polygon = Polygon::new(zone.polygon.clone())?;
                Ok(ZoneGeometry { zone, polygon })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            tenant_id,
            camera_id,
            zones,
            prev_tracks: HashMap::new(),
        })
    }

    /// Advance the state machine by one frame. `now` is the wall-clock
    /// timestamp to stamp onto emitted events; `monotonic_now` backs the
    /// dwell arithmetic and must be non-decreasing across calls.
    pub fn process_frame(
        &mut self,
        tracks: &[TrackCenter],
        now: DateTime<Utc>,
        monotonic_now: Instant,
    ) -> Vec<ZoneEvent> {
        let mut events = Vec::new();
        let current: HashMap<i32, (f64, f64)> =
            tracks.iter().map(|t| (t.track_id, t.center)).collect();

        for (&track_id, &center) in &current {
            for zg in &self.zones {
                let key = (track_id, zg.zone.id);
                if zg.polygon.contains(center) && !self.prev_tracks.contains_key(&key) {
                    events.push(ZoneEvent {
                        tenant_id: self.tenant_id,
                        camera_id: self.camera_id,
                        zone_id: zg.zone.id,
                        track_id,
                        event: EventKind::Enter,
                        ts: now,
                        dwell_seconds: None,
                    });
                    self.prev_tracks.insert(key, monotonic_now);
                }
            }
        }

        let mut exited = Vec::new();
        for (&(track_id, zone_id), &enter_at) in &self.prev_tracks {
            let zg = match self.zones.iter().find(|z| z.zone.id == zone_id) {
                Some(z) => z,
                None => continue,
            };
            let still_inside = current
                .get(&track_id)
                .map(|&c| zg.polygon.contains(c))
                .unwrap_or(false);

            if !still_inside {
                let dwell_seconds = if zg.zone.has_metric(ZoneMetric::Dwell) {
                    Some(monotonic_now.saturating_duration_since(enter_at).as_secs_f64())
                } else {
                    None
                };
                events.push(ZoneEvent {
                    tenant_id: self.tenant_id,
                    camera_id: self.camera_id,
                    zone_id,
                    track_id,
                    event: EventKind::Exit,
                    ts: now,
                    dwell_seconds,
                });
                exited.push((track_id, zone_id));
            }
        }
        for key in exited {
            self.prev_tracks.remove(&key);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn square_zone(id: i32) -> Zone {
        Zone {
            id,
            tenant_id: 1,
            camera_id: 1,
            name: "Z".into(),
            polygon: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            metrics: vec![ZoneMetric::Occupancy, ZoneMetric::Dwell],
            ghost_timeout_minutes: 60,
        }
    }

    #[test]
    fn single_enter_exit_emits_dwell() {
        // scenario 1: track 7 at (5,5) then (5,5) then (20,20).
        let mut sm = ZoneStateMachine::new(1, 1, vec![square_zone(1)]).unwrap();
        let t0 = Instant::now();
        let now = Utc::now();

        let e1 = sm.process_frame(&[TrackCenter { track_id: 7, center: (5.0, 5.0) }], now, t0);
        assert_eq!(e1.len(), 1);
        assert_eq!(e1[0].event, EventKind::Enter);

        let t1 = t0 + Duration::from_secs(3);
        let e2 = sm.process_frame(&[TrackCenter { track_id: 7, center: (5.0, 5.0) }], now, t1);
        assert!(e2.is_empty());

        let t2 = t0 + Duration::from_secs(4);
        let e3 = sm.process_frame(&[TrackCenter { track_id: 7, center: (20.0, 20.0) }], now, t2);
        assert_eq!(e3.len(), 1);
        assert_eq!(e3[0].event, EventKind::Exit);
        let dwell = e3[0].dwell_seconds.expect("dwell enabled zone");
        assert!((dwell - 4.0).abs() < 0.01);
    }

    #[test]
    fn exit_on_track_disappearance() {
        let mut sm = ZoneStateMachine::new(1, 1, vec![square_zone(1)]).unwrap();
        let t0 = Instant::now();
        let now = Utc::now();
        sm.process_frame(&[TrackCenter { track_id: 1, center: (5.0, 5.0) }], now, t0);
        let events = sm.process_frame(&[], now, t0 + Duration::from_secs(1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, EventKind::Exit);
    }

    #[test]
    fn boundary_point_never_triggers_enter() {
        // scenario 6.
        let mut sm = ZoneStateMachine::new(1, 1, vec![square_zone(1)]).unwrap();
        let t0 = Instant::now();
        let now = Utc::now();
        let events = sm.process_frame(&[TrackCenter { track_id: 1, center: (10.0, 5.0) }], now, t0);
        assert!(events.is_empty());
    }

    #[test]
    fn never_emits_two_consecutive_enters_for_same_triple() {
        let mut sm = ZoneStateMachine::new(1, 1, vec![square_zone(1)]).unwrap();
        let t0 = Instant::now();
        let now = Utc::now();
        let e1 = sm.process_frame(&[TrackCenter { track_id: 1, center: (5.0, 5.0) }], now, t0);
        let e2 = sm.process_frame(&[TrackCenter { track_id: 1, center: (5.0, 5.0) }], now, t0);
        assert_eq!(e1.len(), 1);
        assert!(e2.is_empty());
    }

    #[test]
    fn dwell_omitted_when_zone_metric_disabled() {
        let mut zone = square_zone(1);
        zone.metrics = vec![ZoneMetric::Occupancy];
        let mut sm = ZoneStateMachine::new(1, 1, vec![zone]).unwrap();
        let t0 = Instant::now();
        let now = Utc::now();
        sm.process_frame(&[TrackCenter { track_id: 1, center: (5.0, 5.0) }], now, t0);
        let events = sm.process_frame(&[], now, t0 + Duration::from_secs(2));
        assert_eq!(events[0].dwell_seconds, None);
    }
}
