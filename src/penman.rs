use std::f64::consts::PI;

use crate::error::{EtError, Result};

const SOLAR_CONSTANT: f64 = 0.0820; // [MJ m-2 min-1]
const STEFAN_BOLTZMANN: f64 = 4.903e-9; // [MJ K-4 m-2 day-1]
const ALBEDO: f64 = 0.23; // Grass reference crop albedo [-]

// Inputs of one daily reference evapotranspiration evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Et0Input {
    pub min_temp: f64,        // Daily minimum air temperature [°C]
    pub max_temp: f64,        // Daily maximum air temperature [°C]
    pub mean_temp: f64,       // Daily mean air temperature [°C]
    pub rh_mean: f64,         // Mean relative humidity [%]
    pub wind_speed_2m: f64,   // Wind speed at 2 m [m/s]
    pub solar_radiation: f64, // Incoming shortwave radiation [MJ m-2 day-1]
    pub elevation: f64,       // Station elevation [m]
    pub latitude: f64,        // Station latitude [rad]
    pub day_of_year: u32,     // 1..=366
}

/// A point model producing daily reference evapotranspiration [mm/day].
pub trait ReferenceEtModel {
    fn et0(&self, input: &Et0Input) -> Result<f64>;
}

/// FAO-56 Penman-Monteith grass reference ET0 with zero soil heat flux.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaoPenmanMonteith;

impl ReferenceEtModel for FaoPenmanMonteith {
    fn et0(&self, input: &Et0Input) -> Result<f64> {
        validate(input)?;

        let pressure = atmospheric_pressure(input.elevation);
        let gamma = psychrometric_constant(pressure);
        let es = mean_saturation_vapour_pressure(input.min_temp, input.max_temp);
        let ea = input.rh_mean / 100.0 * es;
        let delta = delta_svp(input.mean_temp);

        let ra = extraterrestrial_radiation(input.latitude, input.day_of_year);
        let rso = clear_sky_radiation(input.elevation, ra);
        let rns = (1.0 - ALBEDO) * input.solar_radiation;
        let rnl = net_longwave_radiation(
            input.min_temp,
            input.max_temp,
            ea,
            input.solar_radiation,
            rso,
        );
        let rn = rns - rnl;
        let g = 0.0; // Daily soil heat flux is negligible

        let u2 = input.wind_speed_2m;
        let numerator = 0.408 * delta * (rn - g)
            + gamma * (900.0 / (input.mean_temp + 273.0)) * u2 * (es - ea);
        let denominator = delta + gamma * (1.0 + 0.34 * u2);
        let et0 = numerator / denominator;

        if !et0.is_finite() {
            return Err(EtError::InvalidInput(format!(
                "Penman-Monteith produced a non-finite ET0 ({et0})"
            )));
        }
        Ok(et0.max(0.0))
    }
}

fn validate(input: &Et0Input) -> Result<()> {
    let fields = [
        ("min_temp", input.min_temp),
        ("max_temp", input.max_temp),
        ("mean_temp", input.mean_temp),
        ("rh_mean", input.rh_mean),
        ("wind_speed_2m", input.wind_speed_2m),
        ("solar_radiation", input.solar_radiation),
        ("elevation", input.elevation),
        ("latitude", input.latitude),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(EtError::InvalidInput(format!("{name} is not finite")));
        }
    }
    if input.min_temp > input.max_temp {
        return Err(EtError::InvalidInput(format!(
            "min_temp {} exceeds max_temp {}",
            input.min_temp, input.max_temp
        )));
    }
    if !(0.0..=100.0).contains(&input.rh_mean) {
        return Err(EtError::InvalidInput(format!(
            "rh_mean {} outside [0, 100]",
            input.rh_mean
        )));
    }
    if input.wind_speed_2m < 0.0 {
        return Err(EtError::InvalidInput("negative wind speed".into()));
    }
    if input.solar_radiation < 0.0 {
        return Err(EtError::InvalidInput("negative solar radiation".into()));
    }
    if !(1..=366).contains(&input.day_of_year) {
        return Err(EtError::InvalidInput(format!(
            "day of year {} outside 1..=366",
            input.day_of_year
        )));
    }
    Ok(())
}

// Atmospheric pressure from elevation [kPa]
pub fn atmospheric_pressure(elevation: f64) -> f64 {
    101.3 * ((293.0 - 0.0065 * elevation) / 293.0).powf(5.26)
}

// Psychrometric constant [kPa/°C]
pub fn psychrometric_constant(pressure: f64) -> f64 {
    0.000665 * pressure
}

// Saturation vapour pressure at temperature t [kPa]
pub fn saturation_vapour_pressure(t: f64) -> f64 {
    0.6108 * (17.27 * t / (t + 237.3)).exp()
}

pub fn mean_saturation_vapour_pressure(tmin: f64, tmax: f64) -> f64 {
    (saturation_vapour_pressure(tmin) + saturation_vapour_pressure(tmax)) / 2.0
}

// Slope of the saturation vapour pressure curve [kPa/°C]
pub fn delta_svp(t: f64) -> f64 {
    4098.0 * saturation_vapour_pressure(t) / (t + 237.3).powi(2)
}

// Extraterrestrial radiation [MJ m-2 day-1]
pub fn extraterrestrial_radiation(latitude: f64, day_of_year: u32) -> f64 {
    let j = day_of_year as f64;
    let dr = 1.0 + 0.033 * (2.0 * PI / 365.0 * j).cos();
    let decl = 0.409 * (2.0 * PI / 365.0 * j - 1.39).sin();
    // Clamped for polar day/night
    let ws = (-latitude.tan() * decl.tan()).clamp(-1.0, 1.0).acos();
    24.0 * 60.0 / PI
        * SOLAR_CONSTANT
        * dr
        * (ws * latitude.sin() * decl.sin() + latitude.cos() * decl.cos() * ws.sin())
}

// Clear-sky radiation [MJ m-2 day-1]
pub fn clear_sky_radiation(elevation: f64, ra: f64) -> f64 {
    (0.75 + 2e-5 * elevation) * ra
}

// Net outgoing longwave radiation [MJ m-2 day-1]
pub fn net_longwave_radiation(tmin: f64, tmax: f64, ea: f64, rs: f64, rso: f64) -> f64 {
    let tmin_k4 = (tmin + 273.16).powi(4);
    let tmax_k4 = (tmax + 273.16).powi(4);
    let relative_rs = if rso > 0.0 { (rs / rso).min(1.0) } else { 1.0 };
    STEFAN_BOLTZMANN * (tmin_k4 + tmax_k4) / 2.0
        * (0.34 - 0.14 * ea.max(0.0).sqrt())
        * (1.35 * relative_rs - 0.35)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn brussels_july() -> Et0Input {
        // FAO-56 example 18, with the mean of RHmax/RHmin as rh_mean
        Et0Input {
            min_temp: 12.3,
            max_temp: 21.5,
            mean_temp: 16.9,
            rh_mean: 73.5,
            wind_speed_2m: 2.078,
            solar_radiation: 22.07,
            elevation: 100.0,
            latitude: (50.0f64 + 48.0 / 60.0).to_radians(),
            day_of_year: 187,
        }
    }

    #[test]
    fn pressure_at_1800m() {
        assert_relative_eq!(atmospheric_pressure(1800.0), 81.8, epsilon = 0.1);
        assert_relative_eq!(psychrometric_constant(81.8), 0.054, epsilon = 0.001);
    }

    #[test]
    fn saturation_vapour_pressure_table_values() {
        assert_relative_eq!(saturation_vapour_pressure(20.0), 2.338, epsilon = 0.002);
        assert_relative_eq!(delta_svp(20.0), 0.145, epsilon = 0.001);
    }

    #[test]
    fn extraterrestrial_radiation_southern_september() {
        // FAO-56 example 8: 20°S on 3 September
        let ra = extraterrestrial_radiation((-20.0f64).to_radians(), 246);
        assert_relative_eq!(ra, 32.2, epsilon = 0.1);
    }

    #[test]
    fn brussels_reference_day() {
        let et0 = FaoPenmanMonteith.et0(&brussels_july()).unwrap();
        assert!(et0 > 3.5 && et0 < 4.2, "et0 = {et0}");
    }

    #[test]
    fn rejects_inverted_temperatures() {
        let input = Et0Input {
            min_temp: 25.0,
            max_temp: 10.0,
            ..brussels_july()
        };
        assert!(matches!(
            FaoPenmanMonteith.et0(&input),
            Err(EtError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_non_finite_humidity() {
        let input = Et0Input {
            rh_mean: f64::NAN,
            ..brussels_july()
        };
        assert!(FaoPenmanMonteith.et0(&input).is_err());
    }

    #[test]
    fn et0_is_never_negative() {
        let input = Et0Input {
            min_temp: -30.0,
            max_temp: -25.0,
            mean_temp: -27.5,
            rh_mean: 100.0,
            wind_speed_2m: 0.0,
            solar_radiation: 0.0,
            day_of_year: 1,
            ..brussels_july()
        };
        assert!(FaoPenmanMonteith.et0(&input).unwrap() >= 0.0);
    }
}
