pub mod clean_reading;
pub mod location;
pub mod traffic_reading;

pub use clean_reading::{CleanReading, CleanTrafficLevel};
pub use location::{default_locations, Location, NewLocation};
pub use traffic_reading::{LiveTrafficLevel, NewTrafficReading, TrafficReading};
