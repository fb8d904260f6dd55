use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{DateEffective, DomainError, DomainResult, EffectiveDateInterval};
use tally_hr::PartyId;

use crate::element::{ElementKind, ElementType, ElementTypeId, InputValueKind};
use crate::timecard::Timecard;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementEntryValue {
    pub kind: InputValueKind,
    pub value: Decimal,
}

/// Outcome of running an entry against one timecard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub element_type_id: ElementTypeId,
    pub element_kind: ElementKind,
    pub hours: Decimal,
    pub rate: Decimal,
    pub multiplier: Decimal,
    pub pay: Decimal,
}

/// A position's instance of an element, holding one value per input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementEntry {
    pub position_id: PartyId,
    pub element_type_id: ElementTypeId,
    pub element_kind: ElementKind,
    pub effective: EffectiveDateInterval,
    values: Vec<ElementEntryValue>,
}

impl ElementEntry {
    /// Entry seeded with the element's default input values.
    pub fn for_element(position_id: PartyId, element: &ElementType, effective: EffectiveDateInterval) -> Self {
        let values = element
            .input_values()
            .iter()
            .map(|iv| ElementEntryValue {
                kind: iv.kind,
                value: iv.default_value,
            })
            .collect();
        Self {
            position_id,
            element_type_id: element.id,
            element_kind: element.kind,
            effective,
            values,
        }
    }

    pub fn values(&self) -> &[ElementEntryValue] {
        &self.values
    }

    pub fn value(&self, kind: InputValueKind) -> Option<Decimal> {
        self.values.iter().find(|v| v.kind == kind).map(|v| v.value)
    }

    pub fn set_value(&mut self, kind: InputValueKind, value: Decimal) -> DomainResult<()> {
        let slot = self
            .values
            .iter_mut()
            .find(|v| v.kind == kind)
            .ok_or_else(|| DomainError::validation(format!("entry has no {} value", kind.meaning())))?;
        slot.value = value;
        Ok(())
    }

    /// Compute hours, rate, multiplier and pay from the timecard.
    ///
    /// A performance fee pays its fee when the fee is effective at any point
    /// of the timecard's cycle. Every other kind pays
    /// `rate * multiplier * hours` for the hours recorded against the element.
    pub fn process(&mut self, element: &ElementType, timecard: &Timecard) -> DomainResult<ProcessedEntry> {
        if element.id != self.element_type_id {
            return Err(DomainError::invariant(format!(
                "entry is for element {}, not {}",
                self.element_type_id, element.id
            )));
        }

        if self.element_kind == ElementKind::PerformanceFee {
            let fee = element
                .input_values()
                .iter()
                .find(|iv| {
                    iv.kind == InputValueKind::PayValueMoney
                        && iv.effective.overlaps(timecard.effective_range())
                })
                .map(|iv| iv.default_value)
                .unwrap_or(Decimal::ZERO);
            self.set_value(InputValueKind::PayValueMoney, fee)?;
            return Ok(self.outcome(Decimal::ZERO, Decimal::ZERO, Decimal::ONE, fee));
        }

        let hours = timecard.hours_for(self.element_type_id);
        if self.value(InputValueKind::Hours).is_some() {
            self.set_value(InputValueKind::Hours, hours)?;
        }
        let rate = self.value(InputValueKind::Rate).unwrap_or(Decimal::ZERO);
        let multiplier = self
            .value(InputValueKind::Multiplier)
            .or_else(|| self.value(InputValueKind::OvertimeMultiplier))
            .unwrap_or(Decimal::ONE);
        let pay = rate * multiplier * hours;
        if self.value(InputValueKind::PayValueMoney).is_some() {
            self.set_value(InputValueKind::PayValueMoney, pay)?;
        }
        Ok(self.outcome(hours, rate, multiplier, pay))
    }

    fn outcome(&self, hours: Decimal, rate: Decimal, multiplier: Decimal, pay: Decimal) -> ProcessedEntry {
        ProcessedEntry {
            element_type_id: self.element_type_id,
            element_kind: self.element_kind,
            hours,
            rate,
            multiplier,
            pay,
        }
    }
}

impl DateEffective for ElementEntry {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.effective
    }
}
