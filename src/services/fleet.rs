//! Fleet service: buses, routes and the live-position simulation.
//!
//! DESIGN
//! ======
//! The fleet is seeded in memory with the campus routes. Route data is
//! fixed after construction; bus state sits behind a `RwLock` and changes
//! through `update_location` or a simulation tick. Every position change is
//! broadcast as a `BusLocationEvent` while the write guard is still held,
//! so subscribers observe changes in the order they were applied.
//!
//! The simulation task mirrors the persistence flusher's shape: a spawned
//! loop on a fixed interval, returning its `JoinHandle` for shutdown.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::macros::time;
use time::{OffsetDateTime, Time};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::events::{EventHub, Subscription};

pub type BusId = u32;
pub type RouteId = u32;
pub type StopId = u32;

/// Largest per-tick drift on each axis, in degrees.
pub const MAX_DRIFT_DEGREES: f64 = 0.0005;
/// Simulated speed range in km/h.
pub const SPEED_RANGE_KMH: std::ops::RangeInclusive<u32> = 15..=44;
/// Chance per tick that a moving bus's passenger count changes.
pub const PASSENGER_CHANGE_PROBABILITY: f64 = 0.1;
/// Estimated arrivals fall this many minutes ahead.
pub const ARRIVAL_MINUTES: std::ops::Range<i64> = 1..15;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    Stopped,
    Moving,
    AtStop,
    OutOfService,
    Maintenance,
    InService,
    Delayed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    pub id: BusId,
    pub bus_number: String,
    pub driver_name: String,
    pub route_id: RouteId,
    pub latitude: f64,
    pub longitude: f64,
    pub status: BusStatus,
    pub capacity: u32,
    pub current_passengers: u32,
    pub speed_kmh: f64,
    pub direction: String,
    pub next_stop: String,
    pub estimated_arrival: Option<OffsetDateTime>,
    pub last_updated: OffsetDateTime,
    pub active: bool,
}

impl Bus {
    /// Passengers as a percentage of capacity; zero for a zero-capacity bus.
    #[must_use]
    pub fn occupancy_percentage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        f64::from(self.current_passengers) / f64::from(self.capacity) * 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusStop {
    pub id: StopId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Position along the route, starting at 1.
    pub order: u32,
    pub active: bool,
    pub description: String,
    pub amenities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub description: String,
    /// Display color as `#RRGGBB`.
    pub color: String,
    pub stops: Vec<BusStop>,
    pub first_departure: Time,
    pub last_departure: Time,
    pub frequency_minutes: u32,
    pub total_distance_km: f64,
    pub estimated_duration_minutes: u32,
    pub active_bus_ids: Vec<BusId>,
    pub active: bool,
}

impl Route {
    /// Whether `at` falls inside the service window, inclusive.
    #[must_use]
    pub fn in_service_at(&self, at: Time) -> bool {
        self.first_departure <= at && at <= self.last_departure
    }
}

/// Position update broadcast for one bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusLocationEvent {
    pub bus_id: BusId,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub current_passengers: u32,
    pub at: OffsetDateTime,
}

impl BusLocationEvent {
    fn of(bus: &Bus) -> Self {
        Self {
            bus_id: bus.id,
            latitude: bus.latitude,
            longitude: bus.longitude,
            speed_kmh: bus.speed_kmh,
            current_passengers: bus.current_passengers,
            at: bus.last_updated,
        }
    }
}

// =============================================================================
// FLEET
// =============================================================================

pub struct Fleet {
    buses: RwLock<Vec<Bus>>,
    routes: Vec<Route>,
    events: EventHub<BusLocationEvent>,
}

impl Fleet {
    #[must_use]
    pub fn new(buses: Vec<Bus>, routes: Vec<Route>) -> Self {
        Self { buses: RwLock::new(buses), routes, events: EventHub::new() }
    }

    /// Fleet with the campus routes and their three buses.
    #[must_use]
    pub fn seeded() -> Self {
        Self::new(seed_buses(OffsetDateTime::now_utc()), seed_routes())
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription<BusLocationEvent> {
        self.events.subscribe()
    }

    /// Active buses.
    pub async fn buses(&self) -> Vec<Bus> {
        self.buses.read().await.iter().filter(|b| b.active).cloned().collect()
    }

    pub async fn bus(&self, id: BusId) -> Option<Bus> {
        self.buses.read().await.iter().find(|b| b.id == id && b.active).cloned()
    }

    pub async fn buses_on_route(&self, route_id: RouteId) -> Vec<Bus> {
        self.buses
            .read()
            .await
            .iter()
            .filter(|b| b.route_id == route_id && b.active)
            .cloned()
            .collect()
    }

    /// Active routes.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.routes.iter().filter(|r| r.active).cloned().collect()
    }

    #[must_use]
    pub fn route(&self, id: RouteId) -> Option<Route> {
        self.routes.iter().find(|r| r.id == id && r.active).cloned()
    }

    /// Active stops of a route in travel order. Empty for an unknown route.
    #[must_use]
    pub fn stops(&self, route_id: RouteId) -> Vec<BusStop> {
        let Some(route) = self.routes.iter().find(|r| r.id == route_id) else {
            return Vec::new();
        };
        let mut stops: Vec<BusStop> = route.stops.iter().filter(|s| s.active).cloned().collect();
        stops.sort_by_key(|s| s.order);
        stops
    }

    /// Rough arrival estimate for `bus_id` at `stop_id`. `None` for an
    /// unknown bus.
    pub async fn estimated_arrival(&self, bus_id: BusId, stop_id: StopId) -> Option<OffsetDateTime> {
        if !self.buses.read().await.iter().any(|b| b.id == bus_id) {
            return None;
        }
        let minutes = rand::rng().random_range(ARRIVAL_MINUTES);
        debug!(bus_id, stop_id, minutes, "arrival estimated");
        Some(OffsetDateTime::now_utc() + time::Duration::minutes(minutes))
    }

    /// Move a bus to a reported position. Returns `false` for an unknown bus.
    pub async fn update_location(&self, bus_id: BusId, latitude: f64, longitude: f64) -> bool {
        let mut buses = self.buses.write().await;
        let Some(bus) = buses.iter_mut().find(|b| b.id == bus_id) else {
            return false;
        };
        bus.latitude = latitude;
        bus.longitude = longitude;
        bus.last_updated = OffsetDateTime::now_utc();
        self.events.emit(&BusLocationEvent::of(bus));
        true
    }

    /// Advance every moving bus by one simulation step. Returns how many
    /// buses moved.
    pub async fn tick<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let mut buses = self.buses.write().await;
        let now = OffsetDateTime::now_utc();
        let mut moved = 0;
        for bus in buses.iter_mut().filter(|b| b.status == BusStatus::Moving) {
            perturb(bus, rng);
            bus.last_updated = now;
            self.events.emit(&BusLocationEvent::of(bus));
            moved += 1;
        }
        moved
    }
}

/// One random simulation step for a moving bus: small drift, a new speed,
/// and occasionally a few passengers on or off.
pub fn perturb<R: Rng + ?Sized>(bus: &mut Bus, rng: &mut R) {
    bus.latitude += (rng.random::<f64>() - 0.5) * 2.0 * MAX_DRIFT_DEGREES;
    bus.longitude += (rng.random::<f64>() - 0.5) * 2.0 * MAX_DRIFT_DEGREES;
    bus.speed_kmh = f64::from(rng.random_range(SPEED_RANGE_KMH));

    if rng.random_bool(PASSENGER_CHANGE_PROBABILITY) {
        let change: i64 = rng.random_range(-3..=4);
        let next = (i64::from(bus.current_passengers) + change).clamp(0, i64::from(bus.capacity));
        bus.current_passengers = u32::try_from(next).unwrap_or(bus.capacity);
    }
}

/// Spawn the simulation loop. Returns a handle for shutdown.
pub fn spawn_simulation(fleet: Arc<Fleet>, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs_f64(), "fleet simulation configured");
    tokio::spawn(async move {
        let mut rng = StdRng::from_os_rng();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; positions start as seeded.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let moved = fleet.tick(&mut rng).await;
            debug!(moved, "fleet tick");
        }
    })
}

// =============================================================================
// SEED DATA
// =============================================================================

fn stop(id: StopId, name: &str, latitude: f64, longitude: f64, order: u32) -> BusStop {
    BusStop {
        id,
        name: name.to_owned(),
        latitude,
        longitude,
        order,
        active: true,
        description: String::new(),
        amenities: Vec::new(),
    }
}

fn seed_routes() -> Vec<Route> {
    vec![
        Route {
            id: 1,
            name: "Campus Loop".into(),
            description: "Main campus circular route".into(),
            color: "#2196F3".into(),
            stops: vec![
                stop(1, "Central Station", -33.8688, 151.2093, 1),
                stop(2, "Library", -33.8678, 151.2103, 2),
                stop(3, "Engineering Building", -33.8668, 151.2113, 3),
                stop(4, "Student Center", -33.8658, 151.2123, 4),
                stop(5, "Sports Complex", -33.8648, 151.2133, 5),
            ],
            first_departure: time!(6:00),
            last_departure: time!(22:00),
            frequency_minutes: 15,
            total_distance_km: 8.5,
            estimated_duration_minutes: 25,
            active_bus_ids: vec![1, 2],
            active: true,
        },
        Route {
            id: 2,
            name: "City Express".into(),
            description: "Direct route to city center".into(),
            color: "#FF5722".into(),
            stops: vec![
                stop(6, "UTS Main Gate", -33.8838, 151.2003, 1),
                stop(7, "Town Hall", -33.8728, 151.2063, 2),
                stop(8, "Circular Quay", -33.8618, 151.2113, 3),
            ],
            first_departure: time!(7:00),
            last_departure: time!(19:00),
            frequency_minutes: 20,
            total_distance_km: 12.3,
            estimated_duration_minutes: 35,
            active_bus_ids: vec![3],
            active: true,
        },
    ]
}

fn seed_buses(now: OffsetDateTime) -> Vec<Bus> {
    let bus = |id: BusId, number: &str, driver: &str, route_id: RouteId, (latitude, longitude): (f64, f64)| Bus {
        id,
        bus_number: number.to_owned(),
        driver_name: driver.to_owned(),
        route_id,
        latitude,
        longitude,
        status: BusStatus::Moving,
        capacity: 50,
        current_passengers: 0,
        speed_kmh: 0.0,
        direction: String::new(),
        next_stop: String::new(),
        estimated_arrival: None,
        last_updated: now,
        active: true,
    };

    vec![
        Bus {
            current_passengers: 23,
            speed_kmh: 25.5,
            direction: "Clockwise".into(),
            next_stop: "Library".into(),
            estimated_arrival: Some(now + time::Duration::minutes(3)),
            ..bus(1, "UTS001", "Michael Chen", 1, (-33.8688, 151.2093))
        },
        Bus {
            status: BusStatus::AtStop,
            current_passengers: 31,
            direction: "Clockwise".into(),
            next_stop: "Sports Complex".into(),
            estimated_arrival: Some(now + time::Duration::minutes(1)),
            ..bus(2, "UTS002", "Sarah Johnson", 1, (-33.8658, 151.2123))
        },
        Bus {
            capacity: 60,
            current_passengers: 18,
            speed_kmh: 35.0,
            direction: "To City".into(),
            next_stop: "Town Hall".into(),
            estimated_arrival: Some(now + time::Duration::minutes(8)),
            ..bus(3, "UTS003", "David Wilson", 2, (-33.8838, 151.2003))
        },
    ]
}

#[cfg(test)]
#[path = "fleet_test.rs"]
mod tests;
