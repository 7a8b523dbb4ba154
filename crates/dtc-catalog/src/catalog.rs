//! Subsystem and Description Tables

use crate::dtc::{Dtc, DtcClass};
use crate::error::CatalogError;
use std::collections::HashMap;
use std::sync::OnceLock;

const TRANSMISSION: &str = "Transmission";

/// Subsystem names keyed by class and the first two code digits
const SUBSYSTEMS: &[(DtcClass, u8, &str)] = &[
    (DtcClass::Powertrain, 0x00, "Fuel & Air Metering & Aux. Controls"),
    (DtcClass::Powertrain, 0x01, "Fuel & Air Metering"),
    (DtcClass::Powertrain, 0x02, "Fuel & Air Metering (Injector Circuit)"),
    (DtcClass::Powertrain, 0x03, "Ignition System & Misfire"),
    (DtcClass::Powertrain, 0x04, "Auxiliary Emissions Controls"),
    (DtcClass::Powertrain, 0x05, "Vehicle Speed Controls and Idle Control System"),
    (DtcClass::Powertrain, 0x06, "Computer Output Circuit"),
    (DtcClass::Powertrain, 0x07, TRANSMISSION),
    (DtcClass::Powertrain, 0x08, TRANSMISSION),
    (DtcClass::Powertrain, 0x09, TRANSMISSION),
    (DtcClass::Chassis, 0x00, "Chassis (includes ABS)"),
    (DtcClass::Body, 0x00, "Body (includes A/C & Airbag)"),
    (DtcClass::Network, 0x00, "Network"),
];

const DESCRIPTIONS: &[(u16, &str)] = &[
    (0x0001, "Fuel Volume Regulator Control Circuit / Open"),
    (0x0002, "Fuel Volume Regulator Control Circuit Range Performance"),
    (0x0003, "Fuel Volume Regulator Control Circuit Low"),
    (0x0004, "Fuel Volume Regulator Control Circuit High"),
    (0x0005, "Fuel Shutoff Valve A Control Circuit / Open"),
    (0x0006, "Fuel Shutoff Valve A Control Circuit Low"),
    (0x0007, "Fuel Shutoff Valve A Control Circuit High"),
    (0x0008, "Engine Position System Performance Bank 1"),
    (0x0009, "Engine Position System Performance Bank 2"),
    (0x000A, "A Camshaft Position Slow Response Bank 1"),
    (0x000B, "B Camshaft Position Slow Response Bank 1"),
    (0x000C, "A Camshaft Position Slow Response Bank 2"),
    (0x000D, "B Camshaft Position Slow Response Bank 2"),
];

/// Immutable trouble-code lookup tables
#[derive(Debug)]
pub struct DtcCatalog {
    subsystems: HashMap<(DtcClass, u8), &'static str>,
    descriptions: HashMap<Dtc, &'static str>,
}

impl DtcCatalog {
    fn build() -> Self {
        let subsystems = SUBSYSTEMS
            .iter()
            .map(|&(class, group, name)| ((class, group), name))
            .collect();
        let descriptions = DESCRIPTIONS
            .iter()
            .map(|&(code, text)| (Dtc::new(DtcClass::Powertrain, code), text))
            .collect();
        Self {
            subsystems,
            descriptions,
        }
    }

    /// Process-wide catalog, built on first use
    pub fn global() -> &'static DtcCatalog {
        static CATALOG: OnceLock<DtcCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::build)
    }

    /// Subsystem a code belongs to, by class and first two digits
    pub fn subsystem(&self, dtc: &Dtc) -> Result<&'static str, CatalogError> {
        self.subsystems
            .get(&(dtc.class(), dtc.group()))
            .copied()
            .ok_or_else(|| CatalogError::UnknownCode(dtc.to_string()))
    }

    pub fn description(&self, dtc: &Dtc) -> Result<&'static str, CatalogError> {
        self.descriptions
            .get(dtc)
            .copied()
            .ok_or_else(|| CatalogError::UnknownCode(dtc.to_string()))
    }

    /// Number of codes with a description
    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }
}

/// Resolve a textual code (e.g. `"P0301"`) to its subsystem name
pub fn subsystem(code: &str) -> Result<&'static str, CatalogError> {
    DtcCatalog::global().subsystem(&code.parse()?)
}

/// Resolve a textual code (e.g. `"P0001"`) to its description
pub fn description(code: &str) -> Result<&'static str, CatalogError> {
    DtcCatalog::global().description(&code.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_lookup() {
        assert_eq!(subsystem("P0001").unwrap(), "Fuel & Air Metering & Aux. Controls");
        assert_eq!(subsystem("P0301").unwrap(), "Ignition System & Misfire");
        assert_eq!(subsystem("C0035").unwrap(), "Chassis (includes ABS)");
        assert_eq!(subsystem("U0073").unwrap(), "Network");
    }

    #[test]
    fn test_transmission_spans_three_groups() {
        for code in ["P0700", "P0850", "P0901"] {
            assert_eq!(subsystem(code).unwrap(), "Transmission");
        }
    }

    #[test]
    fn test_description_lookup() {
        assert_eq!(
            description("P0001").unwrap(),
            "Fuel Volume Regulator Control Circuit / Open"
        );
        assert_eq!(
            description("p000d").unwrap(),
            "B Camshaft Position Slow Response Bank 2"
        );
        assert_eq!(DtcCatalog::global().len(), 13);
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(
            description("P0300"),
            Err(CatalogError::UnknownCode("P0300".to_string()))
        );
        assert_eq!(
            subsystem("P1234"),
            Err(CatalogError::UnknownCode("P1234".to_string()))
        );
        // class letter matters: C0001 is not the powertrain entry
        assert!(description("C0001").is_err());
    }

    #[test]
    fn test_malformed_code() {
        assert!(matches!(subsystem("P00"), Err(CatalogError::InvalidCode(_))));
    }
}
