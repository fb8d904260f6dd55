use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, DomainError, EventSourced};
use tally_events::Event;

tally_core::uuid_id!(
    /// Structure identifier (aggregate id).
    pub StructureId
);
tally_core::uuid_id!(pub SegmentId);
tally_core::uuid_id!(pub SegmentValueId);
tally_core::uuid_id!(pub AccountCodeId);

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// One allowed value of a segment: a fixed value or an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentValue {
    pub id: SegmentValueId,
    pub value: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub description: String,
    pub account_type: Option<AccountType>,
}

impl SegmentValue {
    /// Key used to keep values ordered within their segment.
    fn sort_key(&self) -> &str {
        self.value
            .as_deref()
            .or(self.min.as_deref())
            .unwrap_or_default()
    }

    /// Whether a fixed-width piece of an account code is covered by this value.
    pub fn matches(&self, piece: &str) -> bool {
        match (&self.value, &self.min, &self.max) {
            (Some(v), _, _) => v == piece,
            (None, Some(min), Some(max)) => min.as_str() <= piece && piece <= max.as_str(),
            _ => false,
        }
    }

    pub fn is_range(&self) -> bool {
        self.value.is_none()
    }
}

/// A fixed-width component of every account code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub sequence: u32,
    pub length: usize,
    pub natural_account: bool,
    pub cost_center: bool,
    /// Ordered by value.
    pub values: Vec<SegmentValue>,
}

impl Segment {
    /// Fixed values, in order; these are what the chart of accounts enumerates.
    pub fn selectable_values(&self) -> Vec<&SegmentValue> {
        self.values.iter().filter(|v| !v.is_range()).collect()
    }

    /// Left-pad with zeros, or truncate, to the segment width.
    pub fn format_value(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.chars().count() >= self.length {
            trimmed.chars().take(self.length).collect()
        } else {
            format!("{trimmed:0>width$}", width = self.length)
        }
    }
}

/// A generated, valid combination of segment values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCode {
    pub id: AccountCodeId,
    /// Segment values joined by the structure separator, e.g. `"100-2000"`.
    pub code: String,
    /// Value descriptions joined by `.`, e.g. `"Head Office.Cash"`.
    pub name: String,
    pub account_type: Option<AccountType>,
    /// Selected value per segment, in segment order.
    pub segment_values: Vec<SegmentValueId>,
}

/// Segment definition supplied when a structure or segment is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSegment {
    pub segment_id: SegmentId,
    pub name: String,
    pub sequence: u32,
    pub length: usize,
    pub natural_account: bool,
    pub cost_center: bool,
}

/// Segment value as entered, before formatting to the segment width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSegmentValue {
    pub value_id: SegmentValueId,
    pub value: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub description: String,
    pub account_type: Option<AccountType>,
}

/// Aggregate root: Structure (segmented account coding scheme).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    id: StructureId,
    name: String,
    description: Option<String>,
    enabled: bool,
    frozen: bool,
    segments: Vec<Segment>,
    chart: Vec<AccountCode>,
    version: u64,
    created: bool,
}

impl Structure {
    pub fn empty(id: StructureId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            enabled: false,
            frozen: false,
            segments: Vec::new(),
            chart: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StructureId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Segments in sequence order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn natural_account_segment(&self) -> Option<&Segment> {
        self.segments.iter().find(|s| s.natural_account)
    }

    /// Generated chart of accounts, ordered by code.
    pub fn chart_of_accounts(&self) -> &[AccountCode] {
        &self.chart
    }

    pub fn account_code(&self, code: &str) -> Option<&AccountCode> {
        self.chart.iter().find(|a| a.code == code)
    }

    /// Check that `code` is a valid combination of this structure's values.
    ///
    /// Separators are stripped, the rest is cut into segment-width pieces, and
    /// every piece must match a fixed value or fall inside a range value.
    pub fn validate_code_combination(
        &self,
        code: &str,
        separator: &str,
    ) -> Result<Vec<SegmentValueId>, DomainError> {
        let stripped: String = if separator.is_empty() {
            code.to_string()
        } else {
            code.replace(separator, "")
        };
        let expected_len: usize = self.segments.iter().map(|s| s.length).sum();
        if self.segments.is_empty() || stripped.chars().count() != expected_len {
            return Err(DomainError::validation(format!(
                "code '{code}' does not fit the structure (expected {expected_len} characters)"
            )));
        }

        let chars: Vec<char> = stripped.chars().collect();
        let mut offset = 0;
        let mut selected = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let piece: String = chars[offset..offset + segment.length].iter().collect();
            offset += segment.length;
            let value = segment
                .values
                .iter()
                .find(|v| v.matches(&piece))
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "invalid value '{piece}' for segment '{}'",
                        segment.name
                    ))
                })?;
            selected.push(value.id);
        }
        Ok(selected)
    }
}

impl AggregateRoot for Structure {
    type Id = StructureId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateStructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStructure {
    pub structure_id: StructureId,
    pub name: String,
    pub description: Option<String>,
    pub segments: Vec<NewSegment>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddSegment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSegment {
    pub structure_id: StructureId,
    pub segment: NewSegment,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddSegmentValue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSegmentValue {
    pub structure_id: StructureId,
    pub segment_id: SegmentId,
    pub value: NewSegmentValue,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteSegmentValue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSegmentValue {
    pub structure_id: StructureId,
    pub segment_id: SegmentId,
    pub value_id: SegmentValueId,
    pub occurred_at: DateTime<Utc>,
}

/// Command payload for enable/disable/freeze/unfreeze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStructureStatus {
    pub structure_id: StructureId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordChartOfAccounts (output of `AccountCodeGenerator`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordChartOfAccounts {
    pub structure_id: StructureId,
    pub codes: Vec<AccountCode>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureCommand {
    Create(CreateStructure),
    AddSegment(AddSegment),
    AddSegmentValue(AddSegmentValue),
    DeleteSegmentValue(DeleteSegmentValue),
    Enable(ChangeStructureStatus),
    Disable(ChangeStructureStatus),
    Freeze(ChangeStructureStatus),
    Unfreeze(ChangeStructureStatus),
    RecordChartOfAccounts(RecordChartOfAccounts),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureCreated {
    pub structure_id: StructureId,
    pub name: String,
    pub description: Option<String>,
    pub segments: Vec<NewSegment>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentAdded {
    pub structure_id: StructureId,
    pub segment: NewSegment,
    pub occurred_at: DateTime<Utc>,
}

/// Value already formatted to the segment width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentValueAdded {
    pub structure_id: StructureId,
    pub segment_id: SegmentId,
    pub value: SegmentValue,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentValueDeleted {
    pub structure_id: StructureId,
    pub segment_id: SegmentId,
    pub value_id: SegmentValueId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureStatusChanged {
    pub structure_id: StructureId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOfAccountsGenerated {
    pub structure_id: StructureId,
    pub codes: Vec<AccountCode>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureEvent {
    Created(StructureCreated),
    SegmentAdded(SegmentAdded),
    SegmentValueAdded(SegmentValueAdded),
    SegmentValueDeleted(SegmentValueDeleted),
    Enabled(StructureStatusChanged),
    Disabled(StructureStatusChanged),
    Frozen(StructureStatusChanged),
    Unfrozen(StructureStatusChanged),
    ChartOfAccountsGenerated(ChartOfAccountsGenerated),
}

impl Event for StructureEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StructureEvent::Created(_) => "gl.structure.created",
            StructureEvent::SegmentAdded(_) => "gl.structure.segment_added",
            StructureEvent::SegmentValueAdded(_) => "gl.structure.segment_value_added",
            StructureEvent::SegmentValueDeleted(_) => "gl.structure.segment_value_deleted",
            StructureEvent::Enabled(_) => "gl.structure.enabled",
            StructureEvent::Disabled(_) => "gl.structure.disabled",
            StructureEvent::Frozen(_) => "gl.structure.frozen",
            StructureEvent::Unfrozen(_) => "gl.structure.unfrozen",
            StructureEvent::ChartOfAccountsGenerated(_) => "gl.structure.chart_of_accounts_generated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StructureEvent::Created(e) => e.occurred_at,
            StructureEvent::SegmentAdded(e) => e.occurred_at,
            StructureEvent::SegmentValueAdded(e) => e.occurred_at,
            StructureEvent::SegmentValueDeleted(e) => e.occurred_at,
            StructureEvent::Enabled(e)
            | StructureEvent::Disabled(e)
            | StructureEvent::Frozen(e)
            | StructureEvent::Unfrozen(e) => e.occurred_at,
            StructureEvent::ChartOfAccountsGenerated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Structure {
    type Command = StructureCommand;
    type Event = StructureEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StructureEvent::Created(e) => {
                self.id = e.structure_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.enabled = true;
                self.frozen = false;
                self.segments = e.segments.iter().map(segment_from).collect();
                self.segments.sort_by_key(|s| s.sequence);
                self.created = true;
            }
            StructureEvent::SegmentAdded(e) => {
                self.segments.push(segment_from(&e.segment));
                self.segments.sort_by_key(|s| s.sequence);
            }
            StructureEvent::SegmentValueAdded(e) => {
                if let Some(segment) = self.segments.iter_mut().find(|s| s.id == e.segment_id) {
                    segment.values.push(e.value.clone());
                    segment
                        .values
                        .sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
                }
            }
            StructureEvent::SegmentValueDeleted(e) => {
                if let Some(segment) = self.segments.iter_mut().find(|s| s.id == e.segment_id) {
                    segment.values.retain(|v| v.id != e.value_id);
                }
            }
            StructureEvent::Enabled(_) => self.enabled = true,
            StructureEvent::Disabled(_) => self.enabled = false,
            StructureEvent::Frozen(_) => self.frozen = true,
            StructureEvent::Unfrozen(_) => self.frozen = false,
            StructureEvent::ChartOfAccountsGenerated(e) => {
                self.chart = e.codes.clone();
                self.chart.sort_by(|a, b| a.code.cmp(&b.code));
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StructureCommand::Create(cmd) => self.handle_create(cmd),
            StructureCommand::AddSegment(cmd) => self.handle_add_segment(cmd),
            StructureCommand::AddSegmentValue(cmd) => self.handle_add_value(cmd),
            StructureCommand::DeleteSegmentValue(cmd) => self.handle_delete_value(cmd),
            StructureCommand::Enable(cmd) => {
                self.ensure_created()?;
                if self.enabled {
                    return Err(DomainError::conflict("structure is already enabled"));
                }
                Ok(vec![StructureEvent::Enabled(status_changed(cmd))])
            }
            StructureCommand::Disable(cmd) => {
                self.ensure_created()?;
                if !self.enabled {
                    return Err(DomainError::conflict("structure is already disabled"));
                }
                Ok(vec![StructureEvent::Disabled(status_changed(cmd))])
            }
            StructureCommand::Freeze(cmd) => {
                self.ensure_created()?;
                if self.frozen {
                    return Err(DomainError::conflict("structure is already frozen"));
                }
                Ok(vec![StructureEvent::Frozen(status_changed(cmd))])
            }
            StructureCommand::Unfreeze(cmd) => {
                self.ensure_created()?;
                if !self.frozen {
                    return Err(DomainError::conflict("structure is not frozen"));
                }
                Ok(vec![StructureEvent::Unfrozen(status_changed(cmd))])
            }
            StructureCommand::RecordChartOfAccounts(cmd) => self.handle_record_chart(cmd),
        }
    }
}

impl EventSourced for Structure {
    const AGGREGATE_TYPE: &'static str = "gl.structure";

    fn empty(id: StructureId) -> Self {
        Structure::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

fn segment_from(new: &NewSegment) -> Segment {
    Segment {
        id: new.segment_id,
        name: new.name.clone(),
        sequence: new.sequence,
        length: new.length,
        natural_account: new.natural_account,
        cost_center: new.cost_center,
        values: Vec::new(),
    }
}

fn status_changed(cmd: &ChangeStructureStatus) -> StructureStatusChanged {
    StructureStatusChanged {
        structure_id: cmd.structure_id,
        occurred_at: cmd.occurred_at,
    }
}

fn validate_new_segment(segment: &NewSegment) -> Result<(), DomainError> {
    if segment.name.trim().is_empty() {
        return Err(DomainError::validation("segment name cannot be empty"));
    }
    if segment.length == 0 {
        return Err(DomainError::validation(format!(
            "segment '{}' must be at least one character wide",
            segment.name
        )));
    }
    Ok(())
}

impl Structure {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("structure {}", self.id)));
        }
        Ok(())
    }

    fn ensure_structure_id(&self, structure_id: StructureId) -> Result<(), DomainError> {
        if self.id != structure_id {
            return Err(DomainError::invariant("structure_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_frozen(&self) -> Result<(), DomainError> {
        if self.frozen {
            return Err(DomainError::invariant("structure is frozen"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateStructure) -> Result<Vec<StructureEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("structure already exists"));
        }
        self.ensure_structure_id(cmd.structure_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("structure name cannot be empty"));
        }

        let mut names = HashSet::new();
        let mut sequences = HashSet::new();
        for segment in &cmd.segments {
            validate_new_segment(segment)?;
            if !names.insert(segment.name.trim().to_lowercase()) {
                return Err(DomainError::validation(format!(
                    "duplicate segment name '{}'",
                    segment.name
                )));
            }
            if !sequences.insert(segment.sequence) {
                return Err(DomainError::validation(format!(
                    "duplicate segment sequence {}",
                    segment.sequence
                )));
            }
        }
        if cmd.segments.iter().filter(|s| s.natural_account).count() > 1 {
            return Err(DomainError::validation(
                "only one segment can be the natural account segment",
            ));
        }

        Ok(vec![StructureEvent::Created(StructureCreated {
            structure_id: cmd.structure_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            segments: cmd.segments.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_segment(&self, cmd: &AddSegment) -> Result<Vec<StructureEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_structure_id(cmd.structure_id)?;
        self.ensure_not_frozen()?;
        validate_new_segment(&cmd.segment)?;

        let name = cmd.segment.name.trim().to_lowercase();
        if self.segments.iter().any(|s| s.name.trim().to_lowercase() == name) {
            return Err(DomainError::validation(format!(
                "duplicate segment name '{}'",
                cmd.segment.name
            )));
        }
        if self.segments.iter().any(|s| s.sequence == cmd.segment.sequence) {
            return Err(DomainError::validation(format!(
                "duplicate segment sequence {}",
                cmd.segment.sequence
            )));
        }
        if cmd.segment.natural_account && self.natural_account_segment().is_some() {
            return Err(DomainError::validation(
                "only one segment can be the natural account segment",
            ));
        }

        Ok(vec![StructureEvent::SegmentAdded(SegmentAdded {
            structure_id: cmd.structure_id,
            segment: cmd.segment.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_value(&self, cmd: &AddSegmentValue) -> Result<Vec<StructureEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_structure_id(cmd.structure_id)?;
        self.ensure_not_frozen()?;

        let segment = self
            .segment(cmd.segment_id)
            .ok_or_else(|| DomainError::not_found(format!("segment {}", cmd.segment_id)))?;
        let value = build_segment_value(segment, &cmd.value)?;

        if segment.values.iter().any(|v| v.id == value.id) {
            return Err(DomainError::conflict("segment value already exists"));
        }
        if segment.values.iter().any(|existing| overlaps(existing, &value)) {
            return Err(DomainError::validation(format!(
                "duplicate value '{}' in segment '{}'",
                value.sort_key(),
                segment.name
            )));
        }

        Ok(vec![StructureEvent::SegmentValueAdded(SegmentValueAdded {
            structure_id: cmd.structure_id,
            segment_id: cmd.segment_id,
            value,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete_value(&self, cmd: &DeleteSegmentValue) -> Result<Vec<StructureEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_structure_id(cmd.structure_id)?;
        self.ensure_not_frozen()?;

        let segment = self
            .segment(cmd.segment_id)
            .ok_or_else(|| DomainError::not_found(format!("segment {}", cmd.segment_id)))?;
        if !segment.values.iter().any(|v| v.id == cmd.value_id) {
            return Err(DomainError::not_found(format!("segment value {}", cmd.value_id)));
        }

        Ok(vec![StructureEvent::SegmentValueDeleted(SegmentValueDeleted {
            structure_id: cmd.structure_id,
            segment_id: cmd.segment_id,
            value_id: cmd.value_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_chart(&self, cmd: &RecordChartOfAccounts) -> Result<Vec<StructureEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_structure_id(cmd.structure_id)?;
        self.ensure_not_frozen()?;

        if !self.chart.is_empty() && self.chart.len() == cmd.codes.len() {
            return Err(DomainError::validation("chart of accounts already generated"));
        }
        let mut seen = HashSet::new();
        for code in &cmd.codes {
            if code.segment_values.len() != self.segments.len() {
                return Err(DomainError::validation(format!(
                    "account code '{}' does not select one value per segment",
                    code.code
                )));
            }
            if !seen.insert(code.code.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate account code '{}'",
                    code.code
                )));
            }
        }

        Ok(vec![StructureEvent::ChartOfAccountsGenerated(ChartOfAccountsGenerated {
            structure_id: cmd.structure_id,
            codes: cmd.codes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Validate and format an entered value against its segment.
fn build_segment_value(segment: &Segment, new: &NewSegmentValue) -> Result<SegmentValue, DomainError> {
    let too_long = |raw: &str| raw.trim().chars().count() > segment.length;
    let blank = |raw: &Option<String>| raw.as_deref().is_none_or(|s| s.trim().is_empty());

    let (value, min, max) = match (&new.value, &new.min, &new.max) {
        (Some(value), _, _) if !value.trim().is_empty() => {
            if too_long(value) {
                return Err(DomainError::validation(format!(
                    "value '{value}' is longer than segment '{}' ({} characters)",
                    segment.name, segment.length
                )));
            }
            (Some(segment.format_value(value)), None, None)
        }
        (_, Some(min), Some(max)) if !blank(&new.min) && !blank(&new.max) => {
            if too_long(min) || too_long(max) {
                return Err(DomainError::validation(format!(
                    "range is longer than segment '{}' ({} characters)",
                    segment.name, segment.length
                )));
            }
            let (min, max) = (segment.format_value(min), segment.format_value(max));
            if max <= min {
                return Err(DomainError::validation(format!(
                    "range maximum '{max}' must be greater than minimum '{min}'"
                )));
            }
            (None, Some(min), Some(max))
        }
        (_, min, max) if blank(min) != blank(max) => {
            return Err(DomainError::validation(
                "a range needs both a minimum and a maximum value",
            ));
        }
        _ => return Err(DomainError::validation("segment value needs a value or a range")),
    };

    if new.account_type.is_some() && !segment.natural_account {
        return Err(DomainError::validation("invalid account type"));
    }

    Ok(SegmentValue {
        id: new.value_id,
        value,
        min,
        max,
        description: new.description.trim().to_string(),
        account_type: new.account_type,
    })
}

fn overlaps(existing: &SegmentValue, candidate: &SegmentValue) -> bool {
    match (&candidate.value, &existing.value) {
        (Some(v), _) => existing.matches(v),
        (None, Some(v)) => candidate.matches(v),
        (None, None) => {
            let (a_min, a_max) = (existing.min.as_deref(), existing.max.as_deref());
            let (b_min, b_max) = (candidate.min.as_deref(), candidate.max.as_deref());
            a_min <= b_max && b_min <= a_max
        }
    }
}
