//! Chart-of-accounts generation.
//!
//! The chart is the cartesian product of every segment's fixed values. Index
//! `i` is decoded as a mixed-radix number whose first digit belongs to the
//! first segment, so the earliest segment varies fastest and no intermediate
//! product lists are built.

use tally_core::{DomainError, DomainResult, IdGenerator};

use crate::structure::{AccountCode, AccountCodeId, AccountType, Segment, SegmentValue, Structure};

/// Separator used between segment values when none is configured.
pub const DEFAULT_SEPARATOR: &str = "-";

/// Separator between value descriptions in an account name.
const NAME_SEPARATOR: &str = ".";

pub struct AccountCodeGenerator<'a> {
    structure: &'a Structure,
    separator: String,
}

impl<'a> AccountCodeGenerator<'a> {
    pub fn new(structure: &'a Structure) -> Self {
        Self::with_separator(structure, DEFAULT_SEPARATOR)
    }

    pub fn with_separator(structure: &'a Structure, separator: impl Into<String>) -> Self {
        Self {
            structure,
            separator: separator.into(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Number of codes the structure produces (product of segment sizes).
    pub fn combinations(&self) -> DomainResult<usize> {
        self.structure
            .segments()
            .iter()
            .try_fold(1usize, |acc, segment| {
                acc.checked_mul(segment.selectable_values().len())
            })
            .ok_or_else(|| DomainError::validation("chart of accounts is too large to generate"))
    }

    /// Enumerate every combination, ordered by code, with fresh ids.
    pub fn generate<G: IdGenerator + ?Sized>(&self, ids: &G) -> DomainResult<Vec<AccountCode>> {
        let segments = self.structure.segments();
        if segments.is_empty() {
            return Err(DomainError::validation("structure has no segments"));
        }
        if segments.iter().all(|s| s.selectable_values().is_empty()) {
            return Err(DomainError::validation("structure has no segment values"));
        }

        let total = self.combinations()?;
        if self.structure.chart_of_accounts().len() == total {
            return Err(DomainError::validation("chart of accounts already generated"));
        }

        let values: Vec<Vec<&SegmentValue>> =
            segments.iter().map(Segment::selectable_values).collect();

        let mut codes = Vec::with_capacity(total);
        for i in 0..total {
            let mut radix = 1usize;
            let mut names = Vec::with_capacity(segments.len());
            let mut pieces = Vec::with_capacity(segments.len());
            let mut selected = Vec::with_capacity(segments.len());
            let mut account_type: Option<AccountType> = None;

            for (segment, candidates) in segments.iter().zip(&values) {
                let size = candidates.len();
                let value = candidates[(i / radix) % size];
                radix *= size;

                names.push(value.description.as_str());
                pieces.push(value.value.as_deref().unwrap_or_default());
                selected.push(value.id);
                if segment.natural_account {
                    account_type = value.account_type;
                }
            }

            codes.push(AccountCode {
                id: AccountCodeId::generate(ids),
                code: pieces.join(&self.separator),
                name: names.join(NAME_SEPARATOR),
                account_type,
                segment_values: selected,
            });
        }

        codes.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::Utc;
    use proptest::prelude::*;
    use tally_core::{Aggregate, AggregateRoot, SequentialIdGenerator};
    use uuid::Uuid;

    use crate::structure::{
        AddSegmentValue, CreateStructure, NewSegment, NewSegmentValue, RecordChartOfAccounts,
        SegmentId, SegmentValueId, StructureCommand, StructureId,
    };

    fn structure_with(sizes: &[usize]) -> Structure {
        let structure_id = StructureId::from_uuid(Uuid::from_u128(1));
        let mut structure = Structure::empty(structure_id);
        let segments: Vec<NewSegment> = sizes
            .iter()
            .enumerate()
            .map(|(j, _)| NewSegment {
                segment_id: SegmentId::from_uuid(Uuid::from_u128(100 + j as u128)),
                name: format!("Segment {j}"),
                sequence: j as u32 + 1,
                length: 3,
                natural_account: j == 0,
                cost_center: false,
            })
            .collect();

        let mut events = structure
            .handle(&StructureCommand::Create(CreateStructure {
                structure_id,
                name: "Test".to_string(),
                description: None,
                segments: segments.clone(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            structure.apply(e);
        }

        for (j, size) in sizes.iter().enumerate() {
            for k in 0..*size {
                events = structure
                    .handle(&StructureCommand::AddSegmentValue(AddSegmentValue {
                        structure_id,
                        segment_id: segments[j].segment_id,
                        value: NewSegmentValue {
                            value_id: SegmentValueId::from_uuid(Uuid::from_u128(
                                1000 * (j as u128 + 1) + k as u128,
                            )),
                            value: Some(format!("{k}")),
                            min: None,
                            max: None,
                            description: format!("s{j}v{k}"),
                            account_type: (j == 0).then_some(AccountType::Expense),
                        },
                        occurred_at: Utc::now(),
                    }))
                    .unwrap();
                for e in &events {
                    structure.apply(e);
                }
            }
        }
        structure
    }

    #[test]
    fn three_by_four_yields_twelve_unique_codes() {
        let structure = structure_with(&[3, 4]);
        let codes = AccountCodeGenerator::new(&structure)
            .generate(&SequentialIdGenerator::new())
            .unwrap();

        assert_eq!(codes.len(), 12);
        let pairs: HashSet<_> = codes.iter().map(|c| c.segment_values.clone()).collect();
        assert_eq!(pairs.len(), 12);
        let ids: HashSet<_> = codes.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 12);
    }

    #[test]
    fn single_value_yields_one_code() {
        let structure = structure_with(&[1]);
        let codes = AccountCodeGenerator::new(&structure)
            .generate(&SequentialIdGenerator::new())
            .unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "000");
        assert_eq!(codes[0].name, "s0v0");
        assert_eq!(codes[0].account_type, Some(AccountType::Expense));
    }

    #[test]
    fn codes_are_joined_and_sorted() {
        let structure = structure_with(&[2, 2]);
        let codes = AccountCodeGenerator::with_separator(&structure, ".")
            .generate(&SequentialIdGenerator::new())
            .unwrap();
        let rendered: Vec<_> = codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(rendered, vec!["000.000", "000.001", "001.000", "001.001"]);

        let first = &codes[0];
        assert_eq!(first.name, "s0v0.s1v0");
        assert_eq!(first.account_type, Some(AccountType::Expense));
    }

    #[test]
    fn rejects_structure_without_segments_or_values() {
        let empty = Structure::empty(StructureId::from_uuid(Uuid::from_u128(1)));
        let err = AccountCodeGenerator::new(&empty)
            .generate(&SequentialIdGenerator::new())
            .unwrap_err();
        assert_eq!(err, DomainError::validation("structure has no segments"));

        let no_values = structure_with(&[0, 0]);
        let err = AccountCodeGenerator::new(&no_values)
            .generate(&SequentialIdGenerator::new())
            .unwrap_err();
        assert_eq!(err, DomainError::validation("structure has no segment values"));
    }

    #[test]
    fn refuses_regeneration_once_chart_matches_product() {
        let mut structure = structure_with(&[2, 3]);
        let ids = SequentialIdGenerator::new();
        let codes = AccountCodeGenerator::new(&structure).generate(&ids).unwrap();

        let events = structure
            .handle(&StructureCommand::RecordChartOfAccounts(RecordChartOfAccounts {
                structure_id: *structure.id(),
                codes,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        structure.apply(&events[0]);
        assert_eq!(structure.chart_of_accounts().len(), 6);

        let err = AccountCodeGenerator::new(&structure).generate(&ids).unwrap_err();
        assert_eq!(err, DomainError::validation("chart of accounts already generated"));
    }

    #[test]
    fn generated_codes_validate_against_structure() {
        let structure = structure_with(&[2, 3]);
        let codes = AccountCodeGenerator::new(&structure)
            .generate(&SequentialIdGenerator::new())
            .unwrap();
        for code in codes {
            let selected = structure
                .validate_code_combination(&code.code, DEFAULT_SEPARATOR)
                .unwrap();
            assert_eq!(selected, code.segment_values);
        }
    }

    proptest! {
        #[test]
        fn chart_size_is_product_of_sizes(sizes in prop::collection::vec(1usize..5, 1..4)) {
            let structure = structure_with(&sizes);
            let codes = AccountCodeGenerator::new(&structure)
                .generate(&SequentialIdGenerator::new())
                .unwrap();
            let expected: usize = sizes.iter().product();
            prop_assert_eq!(codes.len(), expected);
            let unique: HashSet<_> = codes.iter().map(|c| c.code.clone()).collect();
            prop_assert_eq!(unique.len(), expected);
        }
    }
}
