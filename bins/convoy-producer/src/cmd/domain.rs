use serde::Serialize;

// ═══════════════════════════════════════════════════════════════
//  RNG (xorshift64)
// ═══════════════════════════════════════════════════════════════

pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: i64) -> Self {
        let state = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1 // ensure non-zero
        } else {
            seed as u64
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Returns f64 in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    /// Uniform f64 in [lo, hi)
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_f64() * (hi - lo)
    }

    /// Uniform integer in [lo, hi]
    pub fn range_int(&mut self, lo: i64, hi: i64) -> i64 {
        lo + (self.next_u64() % (hi - lo + 1) as u64) as i64
    }

    pub fn next_intn(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

// ═══════════════════════════════════════════════════════════════
//  Truck telemetry
// ═══════════════════════════════════════════════════════════════

const BASE_LAT: f64 = 27.7172;
const BASE_LON: f64 = 85.3240;

const HEALTH_STATUSES: [&str; 3] = ["NORMAL", "WARNING", "URGENT"];

/// One sensor reading per (truck, tick). Flat scalar fields only — this is
/// the payload shape the consumer's decoder accepts.
#[derive(Debug, Clone, Serialize)]
pub struct TruckTelemetry {
    pub truck_id: String,
    pub timestamp: String,
    pub tire_pressure_fl: f64,
    pub tire_pressure_fr: f64,
    pub tire_pressure_rl: f64,
    pub tire_pressure_rr: f64,
    pub engine_temp: f64,
    pub oil_pressure: f64,
    pub fuel_level: f64,
    pub brake_temp: f64,
    pub transmission_temp: f64,
    pub battery_voltage: f64,
    pub coolant_temp: f64,
    pub speed: f64,
    pub engine_rpm: i64,
    pub miles_since_maintenance: i64,
    pub ambient_temp: f64,
    pub vibration_level: f64,
    pub fuel_consumption_rate: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub health_status: String,
}

pub fn simulate_truck(truck_id: u32, timestamp: &str, rng: &mut Rng) -> TruckTelemetry {
    TruckTelemetry {
        truck_id: format!("TRUCK_{truck_id:03}"),
        timestamp: timestamp.to_string(),
        tire_pressure_fl: round2(rng.range(28.0, 35.0)),
        tire_pressure_fr: round2(rng.range(28.0, 35.0)),
        tire_pressure_rl: round2(rng.range(28.0, 35.0)),
        tire_pressure_rr: round2(rng.range(28.0, 35.0)),
        engine_temp: round2(rng.range(70.0, 120.0)),
        oil_pressure: round2(rng.range(20.0, 80.0)),
        fuel_level: round2(rng.range(0.0, 100.0)),
        brake_temp: round2(rng.range(70.0, 250.0)),
        transmission_temp: round2(rng.range(70.0, 250.0)),
        battery_voltage: round2(rng.range(11.5, 14.5)),
        coolant_temp: round2(rng.range(70.0, 130.0)),
        speed: round2(rng.range(0.0, 120.0)),
        engine_rpm: rng.range_int(600, 4000),
        miles_since_maintenance: rng.range_int(0, 20_000),
        ambient_temp: round2(rng.range(-10.0, 45.0)),
        vibration_level: round2(rng.range(0.0, 1.5)),
        fuel_consumption_rate: round2(rng.range(5.0, 15.0)),
        latitude: round6(BASE_LAT + rng.range(-0.01, 0.01)),
        longitude: round6(BASE_LON + rng.range(-0.01, 0.01)),
        health_status: HEALTH_STATUSES[rng.next_intn(HEALTH_STATUSES.len())].to_string(),
    }
}
