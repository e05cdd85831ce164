pub mod distance;
pub mod geocoder;
