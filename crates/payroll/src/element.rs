//! Element types and input values.
//!
//! Element kinds form a closed set; per-kind behavior (category, default
//! classification, processing type, default input values, hour apportionment)
//! lives in lookup tables keyed by the kind.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{DateEffective, DomainError, DomainResult, EffectiveDateInterval};
use tally_hr::PartyId;

tally_core::uuid_id!(
    /// Element type identifier.
    pub ElementTypeId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementCategory {
    DayOfWeekPremium,
    OvertimeEarning,
    RegularEarning,
    ShiftDifferential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Benefits,
    Bonus,
    EmployerFederalTax,
    EmployerStateTax,
    EmployerLocalTax,
    GroupTermLife,
    LaborHours,
    OvertimeEarnings,
    OvertimeHours,
    Pension,
    RegularEarnings,
    RegularHours,
    ShiftPay,
}

impl Classification {
    /// `(name, priority, group, costable)`.
    fn row(self) -> (&'static str, u32, &'static str, bool) {
        use Classification::*;
        match self {
            Benefits => ("Employer Benefits", 60, "Employer Liabilities", true),
            Bonus => ("Bonus", 25, "Supplemental", true),
            EmployerFederalTax => ("Employer Federal Tax", 40, "Employer Tax", true),
            EmployerStateTax => ("Employer State Tax", 40, "Employer Tax", true),
            EmployerLocalTax => ("Employer Local Tax", 40, "Employer Tax", true),
            GroupTermLife => ("Group Term Life", 30, "Imputed Earnings", true),
            LaborHours => ("Labor Hours", 0, "Information", false),
            OvertimeEarnings => ("Overtime Earnings", 15, "Earnings", true),
            OvertimeHours => ("Overtime Hours", 0, "Information", false),
            Pension => ("Pension", 25, "Supplemental", true),
            RegularEarnings => ("Regular Earnings", 15, "Earnings", true),
            RegularHours => ("Regular Hours", 0, "Information", false),
            ShiftPay => ("Shift Pay", 15, "Earnings", true),
        }
    }

    pub fn name(self) -> &'static str {
        self.row().0
    }

    pub fn priority(self) -> u32 {
        self.row().1
    }

    pub fn group(self) -> &'static str {
        self.row().2
    }

    pub fn is_costable(self) -> bool {
        self.row().3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingType {
    Recurring,
    NonRecurring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputValueKind {
    Amount,
    CoverageMultiple,
    CoverageAmount,
    DressCall,
    Hours,
    ImputedAmount,
    MinimumCall,
    MonthlySalary,
    Multiplier,
    OvertimeMultiplier,
    PayValueHours,
    PayValueMoney,
    Rate,
    Shift,
}

impl InputValueKind {
    pub fn meaning(self) -> &'static str {
        use InputValueKind::*;
        match self {
            Amount => "Amount",
            CoverageMultiple => "Coverage: Multiplier",
            CoverageAmount => "Coverage: Amount",
            DressCall => "Dress Call Hours",
            Hours => "Hours",
            ImputedAmount => "Imputed Amount",
            MinimumCall => "Minimum Call Hours",
            MonthlySalary => "Monthly Salary",
            Multiplier => "Multiplier",
            OvertimeMultiplier => "Overtime Multiplier",
            PayValueHours => "Value: Hours",
            PayValueMoney => "Value: Money",
            Rate => "Rate",
            Shift => "Shift",
        }
    }
}

/// Default input value row: `(kind, sequence, default, user enterable)`.
type InputTemplate = (InputValueKind, u32, Decimal, bool);

const WAGE_INPUTS: &[InputTemplate] = &[
    (InputValueKind::Hours, 1, Decimal::ZERO, false),
    (InputValueKind::PayValueMoney, 1, Decimal::ZERO, false),
    (InputValueKind::Multiplier, 2, Decimal::ONE, true),
    (InputValueKind::Rate, 3, Decimal::ZERO, true),
];

const OVERTIME_INPUTS: &[InputTemplate] = &[
    (InputValueKind::Hours, 1, Decimal::ZERO, true),
    (InputValueKind::PayValueMoney, 1, Decimal::ZERO, false),
    (InputValueKind::Rate, 2, Decimal::ZERO, true),
    (InputValueKind::OvertimeMultiplier, 3, Decimal::ONE, true),
];

const SHIFT_INPUTS: &[InputTemplate] = &[
    (InputValueKind::Hours, 1, Decimal::ZERO, false),
    (InputValueKind::PayValueMoney, 1, Decimal::ZERO, false),
    (InputValueKind::Rate, 2, Decimal::ZERO, true),
    (InputValueKind::Shift, 3, Decimal::ONE, true),
];

const GROUP_TERM_LIFE_INPUTS: &[InputTemplate] = &[
    (InputValueKind::PayValueMoney, 0, Decimal::ZERO, false),
    (InputValueKind::CoverageMultiple, 1, Decimal::ZERO, true),
    (InputValueKind::CoverageAmount, 2, Decimal::ZERO, true),
];

const PERFORMANCE_FEE_INPUTS: &[InputTemplate] =
    &[(InputValueKind::PayValueMoney, 0, Decimal::ZERO, true)];

const SALARY_INPUTS: &[InputTemplate] = &[(InputValueKind::MonthlySalary, 0, Decimal::ZERO, true)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Generic,
    GroupTermLife,
    Overtime,
    PerformanceFee,
    PerformanceWage,
    RegularSalary,
    RegularWage,
    Shift,
}

impl ElementKind {
    pub fn meaning(self) -> &'static str {
        match self {
            ElementKind::Generic => "Other Earning",
            ElementKind::GroupTermLife => "Group Term Life",
            ElementKind::Overtime => "Overtime",
            ElementKind::PerformanceFee => "Performance Fee",
            ElementKind::PerformanceWage => "Performance Wage",
            ElementKind::RegularSalary => "Regular Salary",
            ElementKind::RegularWage => "Regular Wage",
            ElementKind::Shift => "Shift",
        }
    }

    pub fn category(self) -> ElementCategory {
        match self {
            ElementKind::Overtime => ElementCategory::OvertimeEarning,
            ElementKind::Shift => ElementCategory::ShiftDifferential,
            _ => ElementCategory::RegularEarning,
        }
    }

    pub fn default_classification(self) -> Classification {
        match self {
            ElementKind::GroupTermLife => Classification::GroupTermLife,
            ElementKind::Overtime => Classification::OvertimeEarnings,
            ElementKind::Shift => Classification::ShiftPay,
            _ => Classification::RegularEarnings,
        }
    }

    pub fn processing_type(self) -> ProcessingType {
        match self {
            ElementKind::GroupTermLife
            | ElementKind::PerformanceFee
            | ElementKind::PerformanceWage
            | ElementKind::RegularSalary => ProcessingType::Recurring,
            ElementKind::Generic
            | ElementKind::Overtime
            | ElementKind::RegularWage
            | ElementKind::Shift => ProcessingType::NonRecurring,
        }
    }

    fn default_inputs(self) -> &'static [InputTemplate] {
        match self {
            ElementKind::Generic => &[],
            ElementKind::GroupTermLife => GROUP_TERM_LIFE_INPUTS,
            ElementKind::Overtime => OVERTIME_INPUTS,
            ElementKind::PerformanceFee => PERFORMANCE_FEE_INPUTS,
            ElementKind::PerformanceWage | ElementKind::RegularWage => WAGE_INPUTS,
            ElementKind::RegularSalary => SALARY_INPUTS,
            ElementKind::Shift => SHIFT_INPUTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputValue {
    pub kind: InputValueKind,
    pub sequence: u32,
    pub name: String,
    pub default_value: Decimal,
    pub effective: EffectiveDateInterval,
    pub user_enterable: bool,
}

impl DateEffective for InputValue {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.effective
    }
}

/// An earning or deduction definition with its input values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementType {
    pub id: ElementTypeId,
    pub name: String,
    pub description: Option<String>,
    pub kind: ElementKind,
    pub classification: Classification,
    pub processing_type: ProcessingType,
    pub effective: EffectiveDateInterval,
    input_values: Vec<InputValue>,
}

impl ElementType {
    /// New element with the kind's default input values, all sharing `effective`.
    pub fn new(
        id: ElementTypeId,
        name: impl Into<String>,
        kind: ElementKind,
        effective: EffectiveDateInterval,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("element name cannot be empty"));
        }
        let input_values = kind
            .default_inputs()
            .iter()
            .map(|&(kind, sequence, default_value, user_enterable)| InputValue {
                kind,
                sequence,
                name: kind.meaning().to_string(),
                default_value,
                effective,
                user_enterable,
            })
            .collect();
        Ok(Self {
            id,
            name: name.trim().to_string(),
            description: None,
            kind,
            classification: kind.default_classification(),
            processing_type: kind.processing_type(),
            effective,
            input_values,
        })
    }

    /// Override the default of an existing input value.
    pub fn with_default(mut self, kind: InputValueKind, value: Decimal) -> DomainResult<Self> {
        let input = self
            .input_values
            .iter_mut()
            .find(|iv| iv.kind == kind)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "element {} has no {} input value",
                    self.name,
                    kind.meaning()
                ))
            })?;
        input.default_value = value;
        Ok(self)
    }

    /// Add an input value the kind does not carry by default (e.g. a minimum call).
    pub fn with_input_value(mut self, input: InputValue) -> DomainResult<Self> {
        if !self.effective.contains(&input.effective) {
            return Err(DomainError::validation(
                "input value must be effective within its element",
            ));
        }
        self.input_values.push(input);
        self.input_values.sort_by_key(|iv| iv.sequence);
        Ok(self)
    }

    pub fn input_values(&self) -> &[InputValue] {
        &self.input_values
    }

    /// Input values in force on `date`.
    pub fn values_on(&self, date: NaiveDate) -> Vec<&InputValue> {
        self.input_values
            .iter()
            .filter(|iv| iv.is_effective(date))
            .collect()
    }

    pub fn value_on(&self, kind: InputValueKind, date: NaiveDate) -> Option<&InputValue> {
        self.input_values
            .iter()
            .find(|iv| iv.kind == kind && iv.is_effective(date))
    }
}

impl DateEffective for ElementType {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.effective
    }
}

/// Element attached to a position for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementLink {
    pub element_type_id: ElementTypeId,
    pub position_id: PartyId,
    pub effective: EffectiveDateInterval,
}

impl DateEffective for ElementLink {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.effective
    }
}
