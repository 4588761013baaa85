//! Closed tag sets used by contract terms

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ActusError;

/// Contract kinds with a state machine in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    /// Principal at maturity
    PAM,
    /// Linear amortizer
    LAM,
    /// Negative amortizer
    NAM,
    /// Annuity
    ANN,
    /// Call money
    CLM,
    /// Undefined maturity profile
    UMP,
    /// Exotic linear amortizer
    LAX,
    /// Plain vanilla interest rate swap
    SWPPV,
    /// Option
    OPTNS,
    /// Stock
    STK,
    /// Boundary controlled switch
    BCS,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::PAM => "PAM",
            ContractType::LAM => "LAM",
            ContractType::NAM => "NAM",
            ContractType::ANN => "ANN",
            ContractType::CLM => "CLM",
            ContractType::UMP => "UMP",
            ContractType::LAX => "LAX",
            ContractType::SWPPV => "SWPPV",
            ContractType::OPTNS => "OPTNS",
            ContractType::STK => "STK",
            ContractType::BCS => "BCS",
        }
    }

    /// Types that accrue interest and settle it at purchase/termination
    pub fn bears_interest(&self) -> bool {
        !matches!(self, ContractType::OPTNS | ContractType::STK | ContractType::BCS)
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = ActusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAM" | "PRINCIPALATMATURITY" => Ok(ContractType::PAM),
            "LAM" | "LINEARAMORTIZER" => Ok(ContractType::LAM),
            "NAM" | "NEGATIVEAMORTIZER" => Ok(ContractType::NAM),
            "ANN" | "ANNUITY" => Ok(ContractType::ANN),
            "CLM" | "CALLMONEY" => Ok(ContractType::CLM),
            "UMP" | "UNDEFINEDMATURITYPROFILE" => Ok(ContractType::UMP),
            "LAX" | "EXOTICLINEARAMORTIZER" => Ok(ContractType::LAX),
            "SWPPV" | "PLAINVANILLASWAP" => Ok(ContractType::SWPPV),
            "OPTNS" | "OPTION" => Ok(ContractType::OPTNS),
            "STK" | "STOCK" => Ok(ContractType::STK),
            "BCS" | "BOUNDARYCONTROLLEDSWITCH" => Ok(ContractType::BCS),
            _ => Err(ActusError::ContractTypeUnknown(s.to_string())),
        }
    }
}

/// Position taken in the contract; fixes the sign of every cash flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractRole {
    /// Real position asset
    RPA,
    /// Real position liability
    RPL,
    /// Receive first leg
    RFL,
    /// Pay first leg
    PFL,
    /// Receive fixed
    RF,
    /// Pay fixed
    PF,
    BUY,
    SEL,
    /// Collateral
    COL,
    /// Close-out netting
    CNO,
    /// Underlying
    UDL,
    /// Underlying, positive
    UDLP,
    /// Underlying, negative
    UDLM,
    /// Long
    LG,
    /// Short
    ST,
}

impl ContractRole {
    /// +1 for asset-side roles, -1 for liability-side roles
    pub fn sign(&self) -> f64 {
        match self {
            ContractRole::RPA
            | ContractRole::RFL
            | ContractRole::RF
            | ContractRole::BUY
            | ContractRole::COL
            | ContractRole::CNO
            | ContractRole::UDL
            | ContractRole::UDLP
            | ContractRole::LG => 1.0,
            ContractRole::RPL
            | ContractRole::PFL
            | ContractRole::PF
            | ContractRole::SEL
            | ContractRole::UDLM
            | ContractRole::ST => -1.0,
        }
    }
}

impl FromStr for ContractRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RPA" => Ok(ContractRole::RPA),
            "RPL" => Ok(ContractRole::RPL),
            "RFL" => Ok(ContractRole::RFL),
            "PFL" => Ok(ContractRole::PFL),
            "RF" => Ok(ContractRole::RF),
            "PF" => Ok(ContractRole::PF),
            "BUY" => Ok(ContractRole::BUY),
            "SEL" => Ok(ContractRole::SEL),
            "COL" => Ok(ContractRole::COL),
            "CNO" => Ok(ContractRole::CNO),
            "UDL" => Ok(ContractRole::UDL),
            "UDLP" => Ok(ContractRole::UDLP),
            "UDLM" => Ok(ContractRole::UDLM),
            "LG" => Ok(ContractRole::LG),
            "ST" => Ok(ContractRole::ST),
            other => Err(format!("unknown contract role `{other}`")),
        }
    }
}

/// Performance status carried in the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContractPerformance {
    /// Performant
    #[default]
    PF,
    /// Delayed
    DL,
    /// Delinquent
    DQ,
    /// Default
    DF,
    /// Matured
    MA,
    /// Terminated
    TE,
}

impl FromStr for ContractPerformance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PF" => Ok(Self::PF),
            "DL" => Ok(Self::DL),
            "DQ" => Ok(Self::DQ),
            "DF" => Ok(Self::DF),
            "MA" => Ok(Self::MA),
            "TE" => Ok(Self::TE),
            other => Err(format!("unknown contract performance `{other}`")),
        }
    }
}

/// How the fee rate is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeeBasis {
    /// Absolute amount per fee event
    A,
    /// Rate applied to notional
    #[default]
    N,
}

impl FromStr for FeeBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "N" => Ok(Self::N),
            other => Err(format!("unknown fee basis `{other}`")),
        }
    }
}

/// Base on which amortizer interest is calculated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterestCalculationBase {
    /// Current notional
    #[default]
    NT,
    /// Notional at initial exchange
    NTIED,
    /// Notional lagged, refixed on its own cycle
    NTL,
}

impl FromStr for InterestCalculationBase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NT" => Ok(Self::NT),
            "NTIED" => Ok(Self::NTIED),
            "NTL" => Ok(Self::NTL),
            other => Err(format!("unknown interest calculation base `{other}`")),
        }
    }
}

/// Three-letter scaling effect: position 1 interest, position 2 notional
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScalingEffect {
    pub interest: bool,
    pub notional: bool,
}

impl ScalingEffect {
    pub fn is_active(&self) -> bool {
        self.interest || self.notional
    }
}

impl FromStr for ScalingEffect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_uppercase();
        if tag.len() != 3 || !tag.chars().all(|c| matches!(c, 'O' | 'I' | 'N' | 'M' | '0')) {
            return Err(format!("unknown scaling effect `{s}`"));
        }
        Ok(ScalingEffect {
            interest: tag.contains('I'),
            notional: tag.contains('N'),
        })
    }
}

/// Swap settlement: deliver both legs gross or pay the net
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliverySettlement {
    /// Physical delivery (gross legs)
    #[default]
    D,
    /// Cash settlement (net)
    S,
}

impl FromStr for DeliverySettlement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "D" => Ok(Self::D),
            "S" => Ok(Self::S),
            other => Err(format!("unknown delivery settlement `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    /// Call
    C,
    /// Put
    P,
    /// Collar: call on strike 1 plus put on strike 2
    CP,
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" => Ok(Self::C),
            "P" => Ok(Self::P),
            "CP" => Ok(Self::CP),
            other => Err(format!("unknown option type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptionExerciseType {
    /// European
    #[default]
    E,
    /// Bermudan
    B,
    /// American
    A,
}

impl FromStr for OptionExerciseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "E" => Ok(Self::E),
            "B" => Ok(Self::B),
            "A" => Ok(Self::A),
            other => Err(format!("unknown option exercise type `{other}`")),
        }
    }
}

/// Direction in which the monitored index must move to cross the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryDirection {
    INCR,
    DECR,
}

impl BoundaryDirection {
    pub fn crossed(&self, observed: f64, boundary: f64) -> bool {
        match self {
            BoundaryDirection::INCR => observed >= boundary,
            BoundaryDirection::DECR => observed <= boundary,
        }
    }
}

impl FromStr for BoundaryDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCR" => Ok(Self::INCR),
            "DECR" => Ok(Self::DECR),
            other => Err(format!("unknown boundary direction `{other}`")),
        }
    }
}

/// What happens to the legs once the boundary is crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryEffect {
    /// Knock in the first leg
    INFIL,
    /// Knock in the second leg
    INSEL,
    /// Knock out the active leg
    OUT,
}

impl FromStr for BoundaryEffect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFIL" | "KNOCKINFIRSTLEG" => Ok(Self::INFIL),
            "INSEL" | "KNOCKINSECONDLEG" => Ok(Self::INSEL),
            "OUT" | "KNOCKOUTCURRENT" => Ok(Self::OUT),
            other => Err(format!("unknown boundary effect `{other}`")),
        }
    }
}

/// Leg selector for the boundary controlled switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegRole {
    /// First leg
    FIL,
    /// Second leg
    SEL,
}

impl FromStr for LegRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIL" => Ok(Self::FIL),
            "SEL" => Ok(Self::SEL),
            other => Err(format!("unknown leg `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncreaseDecrease {
    INC,
    DEC,
}

impl FromStr for IncreaseDecrease {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INC" => Ok(Self::INC),
            "DEC" => Ok(Self::DEC),
            other => Err(format!("unknown increase/decrease flag `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixedVariable {
    FIX,
    VAR,
}

impl FromStr for FixedVariable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIX" | "F" => Ok(Self::FIX),
            "VAR" | "V" => Ok(Self::VAR),
            other => Err(format!("unknown fixed/variable flag `{other}`")),
        }
    }
}
