use crate::{errors::Error, ports::LocationProvider, Result};

/// A latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Parse `"lat,lon"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((lat, lon)) = raw.split_once(',') else {
            return Err(Error::Config(format!("expected `lat,lon`, got {raw:?}")));
        };
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid latitude: {lat}")))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid longitude: {lon}")))?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::Config(format!("coordinates out of range: {raw}")));
        }
        Ok(Self { lat, lon })
    }

    /// Text appended to a decoy message: a newline and a map link.
    pub fn to_message_suffix(self) -> String {
        format!("\nhttps://maps.google.com/maps?q={},{}", self.lat, self.lon)
    }
}

/// Location provider backed by a configured point (or none).
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticLocation(pub Option<GeoPoint>);

impl LocationProvider for StaticLocation {
    fn last_location(&self) -> Option<String> {
        self.0.map(GeoPoint::to_message_suffix)
    }
}
