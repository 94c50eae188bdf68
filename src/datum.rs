use std::{fmt, str::FromStr};

use nalgebra::Vector3;

#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    name: &'static str,
    semi_major_axis: f64,
    semi_minor_axis: f64,
    meridian_offset: f64,
}

impl Datum {
    pub const fn new(
        name: &'static str,
        semi_major_axis: f64,
        semi_minor_axis: f64,
        meridian_offset: f64,
    ) -> Datum {
        Datum {
            name,
            semi_major_axis,
            semi_minor_axis,
            meridian_offset,
        }
    }

    pub const fn wgs84() -> Datum {
        Datum::new("WGS84", 6_378_137.0, 6_356_752.314_245, 0.0)
    }

    pub const fn moon() -> Datum {
        Datum::new("D_MOON", 1_737_400.0, 1_737_400.0, 0.0)
    }

    pub const fn mars() -> Datum {
        Datum::new("D_MARS", 3_396_190.0, 3_396_190.0, 0.0)
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Converts longitude and latitude (degrees) and height above the ellipsoid into
    /// body-fixed Cartesian coordinates.
    pub fn geodetic_to_cartesian(&self, lon_lat_height: &Vector3<f64>) -> Vector3<f64> {
        let a = self.semi_major_axis;
        let b = self.semi_minor_axis;
        let e2 = 1.0 - (b * b) / (a * a);

        let lon = (lon_lat_height.x + self.meridian_offset).to_radians();
        let lat = lon_lat_height.y.to_radians();
        let height = lon_lat_height.z;
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        let radius_of_curvature = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        Vector3::new(
            (radius_of_curvature + height) * cos_lat * cos_lon,
            (radius_of_curvature + height) * cos_lat * sin_lon,
            (radius_of_curvature * (1.0 - e2) + height) * sin_lat,
        )
    }
}

impl FromStr for Datum {
    type Err = UnknownDatum;

    fn from_str(s: &str) -> Result<Datum, UnknownDatum> {
        match s.to_lowercase().as_str() {
            "wgs84" | "wgs_1984" | "earth" => Ok(Datum::wgs84()),
            "moon" | "d_moon" => Ok(Datum::moon()),
            "mars" | "d_mars" => Ok(Datum::mars()),
            _ => Err(UnknownDatum),
        }
    }
}

#[derive(Debug)]
pub struct UnknownDatum;

impl std::error::Error for UnknownDatum {}

impl fmt::Display for UnknownDatum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Unsupported datum")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn equator_and_pole() {
        let datum = Datum::wgs84();
        let equator = datum.geodetic_to_cartesian(&Vector3::new(90.0, 0.0, 100.0));
        assert_abs_diff_eq!(equator.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(equator.y, 6_378_237.0, epsilon = 1e-6);
        assert_abs_diff_eq!(equator.z, 0.0, epsilon = 1e-6);

        let pole = datum.geodetic_to_cartesian(&Vector3::new(0.0, 90.0, 0.0));
        assert_abs_diff_eq!(pole.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pole.z, 6_356_752.314_245, epsilon = 1e-3);
    }

    #[test]
    fn sphere_radius() {
        let datum = Datum::moon();
        let point = datum.geodetic_to_cartesian(&Vector3::new(-123.0, 37.0, 250.0));
        assert_abs_diff_eq!(point.norm(), 1_737_650.0, epsilon = 1e-6);
    }

    #[test]
    fn parse_names() {
        assert_eq!("WGS84".parse::<Datum>().unwrap(), Datum::wgs84());
        assert_eq!("moon".parse::<Datum>().unwrap().name(), "D_MOON");
        assert!("venus".parse::<Datum>().is_err());
    }
}
