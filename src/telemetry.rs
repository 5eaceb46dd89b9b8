//! Battery-management telemetry records and their normalized form.
//!
//! Devices post arrays of [`RawDeviceRecord`]s. Each one is reshaped into a
//! [`NormalizedRecord`]: the vehicle state code is classified into a coarse
//! [`MovementStatus`], CAN fields are renamed, and a handful of error flags
//! are derived from `ErrorState1`/`ErrorState2`.
//!
//! Error flags use exact equality against a single code, not bit tests. An
//! `ErrorState1` of `17` (over-voltage plus over-temperature) sets no flag at
//! all. Downstream dashboards are built on that behaviour.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Keys every device record must carry, checked in this order.
const REQUIRED_KEYS: [&str; 6] = [
    "uniqueId",
    "vehicleName",
    "timestamp",
    "latitude",
    "longitude",
    "evCanData",
];

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid JSON body: {0}")]
    Parse(String),
    #[error("{0}")]
    Validation(String),
}

/// Named states reported in the `VehicleState` CAN field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    Idle,
    Discharging,
    FastChargingEvq,
    Balancing,
    Alerts,
    UltraFastChargingGbT,
    FastChargingSoltera,
    FastChargingAther,
    LowPowerMode,
    FastChargingTvs,
    ChargingRapidtron,
    ChargingNeenjas,
}

impl VehicleState {
    pub fn from_code(code: i64) -> Option<Self> {
        let state = match code {
            0 => VehicleState::Idle,
            1 => VehicleState::Discharging,
            2 => VehicleState::FastChargingEvq,
            3 => VehicleState::Balancing,
            4 => VehicleState::Alerts,
            5 => VehicleState::UltraFastChargingGbT,
            6 => VehicleState::FastChargingSoltera,
            7 => VehicleState::FastChargingAther,
            8 => VehicleState::LowPowerMode,
            9 => VehicleState::FastChargingTvs,
            10 => VehicleState::ChargingRapidtron,
            11 => VehicleState::ChargingNeenjas,
            _ => return None,
        };
        Some(state)
    }

    /// Name as the controller firmware spells it.
    pub fn name(&self) -> &'static str {
        match self {
            VehicleState::Idle => "Idle",
            VehicleState::Discharging => "Discharging",
            VehicleState::FastChargingEvq => "FastChargingEVQ",
            VehicleState::Balancing => "Balancing",
            VehicleState::Alerts => "Alerts",
            VehicleState::UltraFastChargingGbT => "UltraFastChargingGB_T",
            VehicleState::FastChargingSoltera => "FastChargingSoltera",
            VehicleState::FastChargingAther => "FastChargingAther",
            VehicleState::LowPowerMode => "LowPowerMode",
            VehicleState::FastChargingTvs => "FastChargingTVS",
            VehicleState::ChargingRapidtron => "ChargingRapidtron",
            VehicleState::ChargingNeenjas => "ChargingNeenjas",
        }
    }

    /// Balancing and LowPowerMode have no bucket of their own and report `nogps`.
    pub fn movement_status(&self) -> MovementStatus {
        match self {
            VehicleState::Idle | VehicleState::Alerts => MovementStatus::Idle,
            VehicleState::FastChargingEvq
            | VehicleState::FastChargingSoltera
            | VehicleState::UltraFastChargingGbT
            | VehicleState::FastChargingTvs
            | VehicleState::FastChargingAther
            | VehicleState::ChargingRapidtron
            | VehicleState::ChargingNeenjas => MovementStatus::Charging,
            VehicleState::Discharging => MovementStatus::Moving,
            VehicleState::Balancing | VehicleState::LowPowerMode => MovementStatus::NoGps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementStatus {
    Idle,
    Charging,
    Moving,
    #[serde(rename = "nogps")]
    NoGps,
}

/// Classify a vehicle state code. Unknown codes map to [`MovementStatus::NoGps`].
pub fn classify(state_code: i64) -> MovementStatus {
    VehicleState::from_code(state_code)
        .map(|state| state.movement_status())
        .unwrap_or(MovementStatus::NoGps)
}

/// Reads a JSON number as an integer code. `1.0` counts as `1`; strings,
/// booleans and fractional numbers never match a code.
fn as_code(value: Option<&Value>) -> Option<i64> {
    let number = match value? {
        Value::Number(number) => number,
        _ => return None,
    };
    if let Some(code) = number.as_i64() {
        return Some(code);
    }
    number
        .as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
}

fn flag(value: Option<&Value>, code: i64) -> u8 {
    u8::from(as_code(value) == Some(code))
}

/// Raw CAN frame fields as posted by the controller. Everything is optional
/// and passed through untyped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CanFrame {
    #[serde(rename = "VehicleState")]
    pub vehicle_state: Option<Value>,
    #[serde(rename = "SOC")]
    pub soc: Option<Value>,
    #[serde(rename = "BatteryID")]
    pub battery_id: Option<Value>,
    #[serde(rename = "ErrorState1")]
    pub error_state1: Option<Value>,
    #[serde(rename = "ErrorState2")]
    pub error_state2: Option<Value>,
    #[serde(rename = "CurrentCSA")]
    pub current_csa: Option<Value>,
    #[serde(rename = "Vstack")]
    pub vstack: Option<Value>,
    #[serde(rename = "T1")]
    pub t1: Option<Value>,
    #[serde(rename = "T2")]
    pub t2: Option<Value>,
    #[serde(rename = "T3")]
    pub t3: Option<Value>,
    #[serde(rename = "T4")]
    pub t4: Option<Value>,
    #[serde(rename = "T5")]
    pub t5: Option<Value>,
    #[serde(rename = "T6")]
    pub t6: Option<Value>,
    #[serde(rename = "T7")]
    pub t7: Option<Value>,
    #[serde(rename = "T8")]
    pub t8: Option<Value>,
    #[serde(rename = "T9")]
    pub t9: Option<Value>,
    #[serde(rename = "T10")]
    pub t10: Option<Value>,
    #[serde(rename = "T11")]
    pub t11: Option<Value>,
    #[serde(rename = "T12")]
    pub t12: Option<Value>,
    #[serde(rename = "T13")]
    pub t13: Option<Value>,
    #[serde(rename = "T14")]
    pub t14: Option<Value>,
    #[serde(rename = "T15")]
    pub t15: Option<Value>,
    #[serde(rename = "T16")]
    pub t16: Option<Value>,
    #[serde(rename = "C1")]
    pub c1: Option<Value>,
    #[serde(rename = "C2")]
    pub c2: Option<Value>,
    #[serde(rename = "C3")]
    pub c3: Option<Value>,
    #[serde(rename = "C4")]
    pub c4: Option<Value>,
    #[serde(rename = "C5")]
    pub c5: Option<Value>,
    #[serde(rename = "C6")]
    pub c6: Option<Value>,
    #[serde(rename = "C7")]
    pub c7: Option<Value>,
    #[serde(rename = "C8")]
    pub c8: Option<Value>,
    #[serde(rename = "C9")]
    pub c9: Option<Value>,
    #[serde(rename = "C10")]
    pub c10: Option<Value>,
    #[serde(rename = "C11")]
    pub c11: Option<Value>,
    #[serde(rename = "C12")]
    pub c12: Option<Value>,
    #[serde(rename = "C13")]
    pub c13: Option<Value>,
    #[serde(rename = "C14")]
    pub c14: Option<Value>,
    #[serde(rename = "C15")]
    pub c15: Option<Value>,
    #[serde(rename = "C16")]
    pub c16: Option<Value>,
    #[serde(rename = "ChargerError1")]
    pub charger_error1: Option<Value>,
    #[serde(rename = "RatedCapacity")]
    pub rated_capacity: Option<Value>,
    #[serde(rename = "SWVersionMajor")]
    pub sw_version_major: Option<Value>,
    #[serde(rename = "CurrentAFE")]
    pub current_afe: Option<Value>,
    #[serde(rename = "FANStatus")]
    pub fan_status: Option<Value>,
    #[serde(rename = "Cvmin")]
    pub cv_min: Option<Value>,
    #[serde(rename = "Cvmax")]
    pub cv_max: Option<Value>,
    #[serde(rename = "ChargeETA")]
    pub charge_eta: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeviceRecord {
    pub unique_id: Value,
    pub vehicle_name: Value,
    pub timestamp: Value,
    pub latitude: Value,
    pub longitude: Value,
    #[serde(default)]
    pub speed: Option<Value>,
    pub ev_can_data: CanFrame,
}

impl RawDeviceRecord {
    /// Validates one element of a posted batch. `index` is only used in messages.
    pub fn from_value(index: usize, value: Value) -> Result<Self, TelemetryError> {
        let object: &Map<String, Value> = value.as_object().ok_or_else(|| {
            TelemetryError::Validation(format!("record {} is not a JSON object", index))
        })?;

        if let Some(missing) = REQUIRED_KEYS.iter().find(|key| !object.contains_key(**key)) {
            return Err(TelemetryError::Validation(format!("missing {}", missing)));
        }
        if !object["evCanData"].is_object() {
            return Err(TelemetryError::Validation(format!(
                "evCanData of record {} is not a JSON object",
                index
            )));
        }

        serde_json::from_value(value).map_err(|e| {
            TelemetryError::Validation(format!("record {} is malformed: {}", index, e))
        })
    }

    pub fn movement_status(&self) -> MovementStatus {
        as_code(self.ev_can_data.vehicle_state.as_ref())
            .map(classify)
            .unwrap_or(MovementStatus::NoGps)
    }

    pub fn normalize(self) -> NormalizedRecord {
        let movement_status = self.movement_status();
        NormalizedRecord {
            unique_id: self.unique_id,
            vehicle_name: self.vehicle_name,
            time_stamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            speed: self.speed,
            movement_status,
            ev_can_data: NormalizedCanData::from(self.ev_can_data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub unique_id: Value,
    pub vehicle_name: Value,
    pub time_stamp: Value,
    pub latitude: Value,
    pub longitude: Value,
    pub speed: Option<Value>,
    pub movement_status: MovementStatus,
    pub ev_can_data: NormalizedCanData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedCanData {
    #[serde(rename = "SOC")]
    pub soc: Option<Value>,
    #[serde(rename = "batteryId")]
    pub battery_id: Option<Value>,
    #[serde(rename = "OverVoltage")]
    pub over_voltage: u8,
    #[serde(rename = "Undervoltage")]
    pub under_voltage: u8,
    #[serde(rename = "OverCurrent")]
    pub over_current: u8,
    #[serde(rename = "OverTemp")]
    pub over_temp: u8,
    #[serde(rename = "shortCircuitError")]
    pub short_circuit_error: u8,
    #[serde(rename = "HSC_Low")]
    pub hsc_low: Option<Value>,
    #[serde(rename = "Vstack")]
    pub vstack: Option<Value>,
    #[serde(rename = "Temp1")]
    pub temp1: Option<Value>,
    #[serde(rename = "Temp2")]
    pub temp2: Option<Value>,
    #[serde(rename = "Temp3")]
    pub temp3: Option<Value>,
    #[serde(rename = "Temp4")]
    pub temp4: Option<Value>,
    #[serde(rename = "Temp5")]
    pub temp5: Option<Value>,
    #[serde(rename = "Temp6")]
    pub temp6: Option<Value>,
    #[serde(rename = "Temp7")]
    pub temp7: Option<Value>,
    #[serde(rename = "Temp8")]
    pub temp8: Option<Value>,
    #[serde(rename = "Temp9")]
    pub temp9: Option<Value>,
    #[serde(rename = "Temp10")]
    pub temp10: Option<Value>,
    #[serde(rename = "Temp11")]
    pub temp11: Option<Value>,
    #[serde(rename = "Temp12")]
    pub temp12: Option<Value>,
    #[serde(rename = "Temp13")]
    pub temp13: Option<Value>,
    #[serde(rename = "Temp14")]
    pub temp14: Option<Value>,
    #[serde(rename = "Temp15")]
    pub temp15: Option<Value>,
    #[serde(rename = "Temp16")]
    pub temp16: Option<Value>,
    #[serde(rename = "V1")]
    pub v1: Option<Value>,
    #[serde(rename = "V2")]
    pub v2: Option<Value>,
    #[serde(rename = "V3")]
    pub v3: Option<Value>,
    #[serde(rename = "V4")]
    pub v4: Option<Value>,
    #[serde(rename = "V5")]
    pub v5: Option<Value>,
    #[serde(rename = "V6")]
    pub v6: Option<Value>,
    #[serde(rename = "V7")]
    pub v7: Option<Value>,
    #[serde(rename = "V8")]
    pub v8: Option<Value>,
    #[serde(rename = "V9")]
    pub v9: Option<Value>,
    #[serde(rename = "V10")]
    pub v10: Option<Value>,
    #[serde(rename = "V11")]
    pub v11: Option<Value>,
    #[serde(rename = "V12")]
    pub v12: Option<Value>,
    #[serde(rename = "V13")]
    pub v13: Option<Value>,
    #[serde(rename = "V14")]
    pub v14: Option<Value>,
    #[serde(rename = "V15")]
    pub v15: Option<Value>,
    #[serde(rename = "V16")]
    pub v16: Option<Value>,
    #[serde(rename = "ChargerComError")]
    pub charger_com_error: Option<Value>,
    #[serde(rename = "FetShortCircuitError")]
    pub fet_short_circuit_error: u8,
    #[serde(rename = "FullCapacity")]
    pub full_capacity: Option<Value>,
    #[serde(rename = "chargerTimeout")]
    pub charger_timeout: u8,
    #[serde(rename = "Ready")]
    pub ready: u8,
    #[serde(rename = "VehicleState")]
    pub vehicle_state: Option<Value>,
    #[serde(rename = "SwVersion")]
    pub sw_version: Option<Value>,
    #[serde(rename = "HSC_HI")]
    pub hsc_hi: Option<Value>,
    #[serde(rename = "FetOverTemp")]
    pub fet_over_temp: u8,
    #[serde(rename = "FanStatus")]
    pub fan_status: Option<Value>,
    #[serde(rename = "Vmin")]
    pub v_min: Option<Value>,
    #[serde(rename = "Vmax")]
    pub v_max: Option<Value>,
    #[serde(rename = "ChargeETA")]
    pub charge_eta: Option<Value>,
}

impl From<CanFrame> for NormalizedCanData {
    fn from(can: CanFrame) -> Self {
        let es1 = can.error_state1.as_ref();
        let es2 = can.error_state2.as_ref();

        NormalizedCanData {
            over_voltage: flag(es1, 1),
            under_voltage: flag(es1, 2),
            over_current: flag(es1, 4),
            over_temp: flag(es1, 16),
            fet_over_temp: flag(es1, 16),
            fet_short_circuit_error: flag(es1, 32),
            ready: flag(es1, 128),
            short_circuit_error: flag(es2, 32),
            charger_timeout: flag(es2, 4),

            soc: can.soc,
            battery_id: can.battery_id,
            hsc_low: can.current_csa,
            vstack: can.vstack,
            temp1: can.t1,
            temp2: can.t2,
            temp3: can.t3,
            temp4: can.t4,
            temp5: can.t5,
            temp6: can.t6,
            temp7: can.t7,
            temp8: can.t8,
            temp9: can.t9,
            temp10: can.t10,
            temp11: can.t11,
            temp12: can.t12,
            temp13: can.t13,
            temp14: can.t14,
            temp15: can.t15,
            temp16: can.t16,
            v1: can.c1,
            v2: can.c2,
            v3: can.c3,
            v4: can.c4,
            v5: can.c5,
            v6: can.c6,
            v7: can.c7,
            v8: can.c8,
            v9: can.c9,
            v10: can.c10,
            v11: can.c11,
            v12: can.c12,
            v13: can.c13,
            v14: can.c14,
            v15: can.c15,
            v16: can.c16,
            charger_com_error: can.charger_error1,
            full_capacity: can.rated_capacity,
            vehicle_state: can.vehicle_state,
            sw_version: can.sw_version_major,
            hsc_hi: can.current_afe,
            fan_status: can.fan_status,
            v_min: can.cv_min,
            v_max: can.cv_max,
            charge_eta: can.charge_eta,
        }
    }
}
