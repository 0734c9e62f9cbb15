use crate::common::types::Dimension;

/// Every unit the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Celsius,
    Fahrenheit,
    TenthsCelsius,
    Millimeters,
    TenthsMillimeters,
    Centimeters,
    Inches,
    MegawattHours,
    GigawattHours,
    KilowattHours,
}

impl Unit {
    /// Case-insensitive lookup including the common aliases the APIs use.
    pub fn parse(raw: &str) -> Option<Unit> {
        let key = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let unit = match key.as_str() {
            "celsius" | "c" | "degc" | "deg_c" | "°c" | "degrees_celsius" => Unit::Celsius,
            "fahrenheit" | "f" | "degf" | "deg_f" | "°f" | "degrees_fahrenheit" => {
                Unit::Fahrenheit
            }
            "tenths_celsius" | "tenths_of_degrees_c" | "0.1c" => Unit::TenthsCelsius,
            "mm" | "millimeters" | "millimetres" => Unit::Millimeters,
            "tenths_mm" | "tenths_of_mm" | "0.1mm" => Unit::TenthsMillimeters,
            "cm" | "centimeters" | "centimetres" => Unit::Centimeters,
            "inches" | "inch" | "in" => Unit::Inches,
            "megawatthours" | "megawatt_hours" | "mwh" => Unit::MegawattHours,
            "gigawatthours" | "gigawatt_hours" | "gwh" => Unit::GigawattHours,
            "kilowatthours" | "kilowatt_hours" | "kwh" => Unit::KilowattHours,
            _ => return None,
        };
        Some(unit)
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::Celsius | Unit::Fahrenheit | Unit::TenthsCelsius => Dimension::Temperature,
            Unit::Millimeters | Unit::TenthsMillimeters | Unit::Centimeters | Unit::Inches => {
                Dimension::Length
            }
            Unit::MegawattHours | Unit::GigawattHours | Unit::KilowattHours => Dimension::Energy,
        }
    }

    /// Convert into the dimension's standard unit (°C, mm, MWh).
    pub fn to_standard(&self, value: f64) -> f64 {
        match self {
            Unit::Celsius | Unit::Millimeters | Unit::MegawattHours => value,
            Unit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
            Unit::TenthsCelsius | Unit::TenthsMillimeters => value / 10.0,
            Unit::Centimeters => value * 10.0,
            Unit::Inches => value * 25.4,
            Unit::GigawattHours => value * 1000.0,
            Unit::KilowattHours => value / 1000.0,
        }
    }
}
