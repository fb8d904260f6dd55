//! Integration tests for the handler pipeline over the in-memory store.
//!
//! Verifies:
//! - cross-aggregate rules run before anything is persisted
//! - rejected commands leave every stream untouched
//! - posting rolls journal lines into ledger balances exactly once
//! - generated hours land on timecards and price through element entries
//! - a post or an hour run that fails part way leaves nothing inconsistent

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use tally_core::{
        AggregateId, AggregateRoot, CurrencyCode, EffectiveDateInterval, ExpectedVersion, IdGenerator,
        SequentialIdGenerator,
    };
    use tally_foundation::{
        Address, BusinessUnitId, CreateBusinessUnit, CreateLocation, CreateUser, DeleteBusinessUnit,
        DeleteLocation, LocationId, UpdateBusinessUnit, UserId,
    };
    use tally_gl::{
        AccountType, AddSegmentValue, CalendarId, CreateCalendar, CreateJournalEntry,
        CreateStructure, EntryStatus, JournalEntryId, LedgerId, NewJournalLine, NewSegment,
        NewSegmentValue, PeriodDraft, PeriodId, PeriodType, PostJournalEntry, SegmentId,
        SegmentValueId, StructureCommand, StructureId,
    };
    use tally_hr::{
        AccountabilityKind, AddAccountability, PartyId, PartyKind, PositionDetails, PositionType,
        RegisterParty, WorkRules,
    };
    use tally_payroll::{
        ElementKind, ElementLink, ElementType, ElementTypeId, Frequency, InputValueKind, PayCycle,
        Payroll, PayrollId,
    };
    use tally_projects::{
        ActivityId, ActivityKind, ActivityResource, AddActivity, AssignPosition, CreateProject,
        ProjectCommand, ProjectId,
    };

    use crate::config::Settings;
    use crate::directory::{InMemoryDirectory, TimecardDirectory};
    use crate::error::CommandError;
    use crate::event_store::{
        EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent,
    };
    use crate::handlers::{
        BusinessUnitHandler, CalendarHandler, JournalHandler, LedgerHandler, LocationHandler,
        NewLedger, PartyHandler, ProjectHandler, StructureHandler, TimecardHandler, UserHandler,
    };

    type Store = Arc<InMemoryEventStore>;

    struct Harness {
        store: Store,
        ids: Arc<dyn IdGenerator>,
        directory: Arc<InMemoryDirectory>,
    }

    fn setup() -> Harness {
        Harness {
            store: Arc::new(InMemoryEventStore::new()),
            ids: Arc::new(SequentialIdGenerator::starting_at(1_000_000)),
            directory: InMemoryDirectory::shared(),
        }
    }

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32) -> NaiveDateTime {
        d.and_hms_opt(h, 0, 0).unwrap()
    }

    // ---- foundation -------------------------------------------------------

    fn business_units(h: &Harness) -> BusinessUnitHandler<Store> {
        BusinessUnitHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone())
    }

    fn create_unit(
        handler: &BusinessUnitHandler<Store>,
        n: u128,
        parent: Option<u128>,
        name: &str,
        currency: Option<&str>,
    ) -> Result<BusinessUnitId, CommandError> {
        let id = BusinessUnitId::from_uuid(uuid(n));
        handler.create(CreateBusinessUnit {
            business_unit_id: id,
            parent_id: parent.map(|p| BusinessUnitId::from_uuid(uuid(p))),
            location_id: None,
            name: name.to_string(),
            base_currency: currency.map(|c| CurrencyCode::parse(c).unwrap()),
            occurred_at: Utc::now(),
        })?;
        Ok(id)
    }

    #[test]
    fn business_unit_cycles_are_rejected_without_persisting() {
        let h = setup();
        let handler = business_units(&h);
        let root = create_unit(&handler, 1, None, "Holding", Some("usd")).unwrap();
        let child = create_unit(&handler, 2, Some(1), "Opera", None).unwrap();
        create_unit(&handler, 3, Some(2), "Ballet", None).unwrap();

        let before = handler.repository().history(root).unwrap().len();
        let err = handler
            .update(UpdateBusinessUnit {
                business_unit_id: root,
                parent_id: Some(BusinessUnitId::from_uuid(uuid(3))),
                location_id: None,
                name: "Holding".to_string(),
                base_currency: None,
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, CommandError::InvariantViolation(msg) if msg == "invalid parent"));
        assert_eq!(handler.repository().history(root).unwrap().len(), before);

        // The currency was inherited from the parent at creation.
        let opera = handler.repository().load(child).unwrap();
        assert_eq!(opera.base_currency().map(|c| c.as_str()), Some("USD"));
    }

    #[test]
    fn sibling_names_are_unique_and_parents_with_children_stay() {
        let h = setup();
        let handler = business_units(&h);
        let root = create_unit(&handler, 1, None, "Holding", None).unwrap();
        create_unit(&handler, 2, Some(1), "Opera", None).unwrap();

        let err = create_unit(&handler, 3, Some(1), "opera", None).unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
        assert!(!handler.repository().exists(BusinessUnitId::from_uuid(uuid(3))).unwrap());
        // Same name under another parent is fine.
        create_unit(&handler, 4, None, "Opera", None).unwrap();

        let err = handler
            .delete(DeleteBusinessUnit {
                business_unit_id: root,
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, CommandError::Validation(msg) if msg.contains("child units")));
    }

    #[test]
    fn referenced_locations_cannot_be_deleted() {
        let h = setup();
        let locations = LocationHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let units = business_units(&h);
        let location_id = LocationId::from_uuid(uuid(50));
        locations
            .create(CreateLocation {
                location_id,
                name: "Main Stage".to_string(),
                business_unit_id: None,
                description: None,
                inactive_date: None,
                address: Address::default(),
                occurred_at: Utc::now(),
            })
            .unwrap();
        let unit = BusinessUnitId::from_uuid(uuid(1));
        units
            .create(CreateBusinessUnit {
                business_unit_id: unit,
                parent_id: None,
                location_id: Some(location_id),
                name: "Opera".to_string(),
                base_currency: None,
                occurred_at: Utc::now(),
            })
            .unwrap();

        let delete = DeleteLocation {
            location_id,
            occurred_at: Utc::now(),
        };
        let err = locations.delete(delete.clone()).unwrap_err();
        assert!(matches!(err, CommandError::Validation(msg) if msg.contains("in use")));

        units
            .delete(DeleteBusinessUnit {
                business_unit_id: unit,
                occurred_at: Utc::now(),
            })
            .unwrap();
        let deleted = locations.delete(delete).unwrap();
        assert!(deleted.is_deleted());
    }

    #[test]
    fn usernames_are_unique_and_resolve_for_login() {
        let h = setup();
        let users = UserHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let create = |n: u128| CreateUser {
            user_id: UserId::from_uuid(uuid(n)),
            username: "stage.manager".to_string(),
            raw_credentials: "curtain-up".to_string(),
            start_date: date(2024, 1, 1),
            end_date: None,
            description: None,
            email: None,
            occurred_at: Utc::now(),
        };
        users.create(create(1)).unwrap();
        let err = users.create(create(2)).unwrap_err();
        assert!(matches!(err, CommandError::Validation(msg) if msg.contains("already taken")));

        let user = users
            .authenticate("stage.manager", "curtain-up", Utc::now())
            .unwrap();
        assert_eq!(*user.id(), UserId::from_uuid(uuid(1)));
        assert!(user.last_login().is_some());

        let err = users.authenticate("nobody", "x", Utc::now()).unwrap_err();
        assert!(matches!(err, CommandError::NotFound(_)));
    }

    // ---- general ledger ---------------------------------------------------

    struct Books {
        ledger_id: LedgerId,
        period_id: PeriodId,
        cash: tally_gl::AccountCodeId,
        revenue: tally_gl::AccountCodeId,
        journal: JournalHandler<Store>,
        ledgers: LedgerHandler<Store>,
    }

    fn books(h: &Harness) -> Books {
        let settings = Settings::default();
        let structures = StructureHandler::new(
            Arc::clone(&h.store),
            Arc::clone(&h.ids),
            h.directory.clone(),
            &settings,
        );
        let calendars = CalendarHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let ledgers = LedgerHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids));
        let journal = JournalHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids));

        let structure_id = StructureId::from_uuid(uuid(10));
        let natural = SegmentId::from_uuid(uuid(11));
        let department = SegmentId::from_uuid(uuid(12));
        structures
            .create(CreateStructure {
                structure_id,
                name: "Operating".to_string(),
                description: None,
                segments: vec![
                    NewSegment {
                        segment_id: natural,
                        name: "Account".to_string(),
                        sequence: 1,
                        length: 4,
                        natural_account: true,
                        cost_center: false,
                    },
                    NewSegment {
                        segment_id: department,
                        name: "Department".to_string(),
                        sequence: 2,
                        length: 2,
                        natural_account: false,
                        cost_center: true,
                    },
                ],
                occurred_at: Utc::now(),
            })
            .unwrap();

        let values = [
            (natural, 20, "1000", "Cash", Some(AccountType::Asset)),
            (natural, 21, "3000", "Retained Earnings", Some(AccountType::Equity)),
            (natural, 22, "4000", "Ticket Sales", Some(AccountType::Revenue)),
            (department, 23, "10", "Box Office", None),
        ];
        for (segment_id, n, value, description, account_type) in values {
            structures
                .dispatch(
                    structure_id,
                    StructureCommand::AddSegmentValue(AddSegmentValue {
                        structure_id,
                        segment_id,
                        value: NewSegmentValue {
                            value_id: SegmentValueId::from_uuid(uuid(n)),
                            value: Some(value.to_string()),
                            min: None,
                            max: None,
                            description: description.to_string(),
                            account_type,
                        },
                        occurred_at: Utc::now(),
                    }),
                )
                .unwrap();
        }
        let structure = structures.generate_chart(structure_id, Utc::now()).unwrap();
        let codes: Vec<&str> = structure.chart_of_accounts().iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["1000-10", "3000-10", "4000-10"]);
        let cash = structure.account_code("1000-10").unwrap().id;
        let revenue = structure.account_code("4000-10").unwrap().id;

        let calendar_id = CalendarId::from_uuid(uuid(30));
        let quarters = (1..=4u32)
            .map(|q| PeriodDraft {
                period_id: PeriodId::from_uuid(uuid(30 + q as u128)),
                name: format!("Q{q}-24"),
                description: None,
                start: date(2024, 3 * q - 2, 1),
                end: if q == 4 {
                    date(2024, 12, 31)
                } else {
                    date(2024, 3 * q + 1, 1).pred_opt().unwrap()
                },
                period_type: PeriodType::Quarter,
                period_year: 2024,
                period_num: q,
                adjustment: false,
            })
            .collect();
        calendars
            .create(CreateCalendar {
                calendar_id,
                name: "FY2024".to_string(),
                description: None,
                periods: quarters,
                occurred_at: Utc::now(),
            })
            .unwrap();

        let ledger_id = LedgerId::from_uuid(uuid(40));
        ledgers
            .create(NewLedger {
                ledger_id,
                name: "Operating Ledger".to_string(),
                short_name: "OPS".to_string(),
                description: None,
                currency: CurrencyCode::parse("USD").unwrap(),
                calendar_id,
                structure_id,
                retained_earnings_code: "3000-10".to_string(),
                net_income_code: "3000-10".to_string(),
                occurred_at: Utc::now(),
            })
            .unwrap();

        Books {
            ledger_id,
            period_id: PeriodId::from_uuid(uuid(32)),
            cash,
            revenue,
            journal,
            ledgers,
        }
    }

    fn entry(books: &Books, n: u128, debit: rust_decimal::Decimal, credit: rust_decimal::Decimal) -> CreateJournalEntry {
        CreateJournalEntry {
            entry_id: JournalEntryId::from_uuid(uuid(n)),
            ledger_id: books.ledger_id,
            period_id: books.period_id,
            name: format!("Box office {n}"),
            description: None,
            category: None,
            currency: CurrencyCode::parse("USD").unwrap(),
            effective_date: date(2024, 5, 2),
            lines: vec![
                NewJournalLine {
                    account_code_id: books.cash,
                    debit,
                    credit: dec!(0),
                    description: None,
                },
                NewJournalLine {
                    account_code_id: books.revenue,
                    debit: dec!(0),
                    credit,
                    description: None,
                },
            ],
            occurred_at: Utc::now(),
        }
    }

    fn post(n: u128) -> PostJournalEntry {
        PostJournalEntry {
            entry_id: JournalEntryId::from_uuid(uuid(n)),
            posted_date: date(2024, 5, 3),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn posting_rolls_lines_into_ledger_balances_once() {
        let h = setup();
        let books = books(&h);
        books.journal.create(entry(&books, 60, dec!(100), dec!(100))).unwrap();

        let posted = books.journal.post(post(60)).unwrap();
        assert_eq!(posted.status(), EntryStatus::Posted);

        let ledger = books.ledgers.repository().load(books.ledger_id).unwrap();
        let cash = ledger.balance(books.cash, books.period_id).unwrap();
        assert_eq!(cash.period_net_debit, dec!(100));
        assert_eq!(cash.period_net_credit, dec!(0));
        let revenue = ledger.balance(books.revenue, books.period_id).unwrap();
        assert_eq!(revenue.period_net_credit, dec!(100));

        let err = books.journal.post(post(60)).unwrap_err();
        assert!(matches!(err, CommandError::InvariantViolation(msg) if msg.contains("already posted")));
        let ledger = books.ledgers.repository().load(books.ledger_id).unwrap();
        assert_eq!(
            ledger.balance(books.cash, books.period_id).unwrap().period_net_debit,
            dec!(100)
        );
    }

    #[test]
    fn unbalanced_entries_post_nothing() {
        let h = setup();
        let books = books(&h);
        books.journal.create(entry(&books, 61, dec!(100), dec!(90))).unwrap();
        let ledger_before = books.ledgers.repository().history(books.ledger_id).unwrap().len();

        let err = books.journal.post(post(61)).unwrap_err();
        assert!(matches!(err, CommandError::Validation(msg) if msg.contains("out of balance")));

        let entry_id = JournalEntryId::from_uuid(uuid(61));
        assert_eq!(books.journal.repository().history(entry_id).unwrap().len(), 1);
        assert_eq!(
            books.ledgers.repository().history(books.ledger_id).unwrap().len(),
            ledger_before
        );
        let ledger = books.ledgers.repository().load(books.ledger_id).unwrap();
        assert_eq!(
            ledger.balance(books.cash, books.period_id).unwrap().period_net_debit,
            dec!(0)
        );
    }

    /// Refuses appends for one aggregate type while a failure is armed.
    #[derive(Clone)]
    struct FailingStore {
        inner: Store,
        failing: Arc<Mutex<Option<&'static str>>>,
    }

    impl FailingStore {
        fn over(inner: &Store) -> Self {
            Self {
                inner: Arc::clone(inner),
                failing: Arc::new(Mutex::new(None)),
            }
        }

        fn fail(&self, aggregate_type: Option<&'static str>) {
            *self.failing.lock().unwrap() = aggregate_type;
        }
    }

    impl EventStore for FailingStore {
        fn append(
            &self,
            events: Vec<UncommittedEvent>,
            expected_version: ExpectedVersion,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            let failing = *self.failing.lock().unwrap();
            if events.iter().any(|e| Some(e.aggregate_type.as_str()) == failing) {
                return Err(EventStoreError::Unavailable("io".to_string()));
            }
            self.inner.append(events, expected_version)
        }

        fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.inner.load_stream(aggregate_id)
        }
    }

    fn cash_debit(books: &Books) -> rust_decimal::Decimal {
        let ledger = books.ledgers.repository().load(books.ledger_id).unwrap();
        ledger.balance(books.cash, books.period_id).unwrap().period_net_debit
    }

    #[test]
    fn failed_entry_save_leaves_ledger_untouched_and_entry_deletable() {
        let h = setup();
        let books = books(&h);
        let store = FailingStore::over(&h.store);
        let journal = JournalHandler::new(store.clone(), Arc::clone(&h.ids));
        journal.create(entry(&books, 70, dec!(100), dec!(100))).unwrap();
        let ledger_before = books.ledgers.repository().history(books.ledger_id).unwrap().len();

        store.fail(Some("gl.journal_entry"));
        let err = journal.post(post(70)).unwrap_err();
        assert!(matches!(err, CommandError::Store(EventStoreError::Unavailable(_))));
        assert_eq!(
            books.ledgers.repository().history(books.ledger_id).unwrap().len(),
            ledger_before
        );
        assert_eq!(cash_debit(&books), dec!(0));

        store.fail(None);
        journal
            .delete(tally_gl::DeleteJournalEntry {
                entry_id: JournalEntryId::from_uuid(uuid(70)),
                occurred_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(cash_debit(&books), dec!(0));
    }

    #[test]
    fn failed_roll_up_blocks_deletion_and_completes_on_resubmit() {
        let h = setup();
        let books = books(&h);
        let store = FailingStore::over(&h.store);
        let journal = JournalHandler::new(store.clone(), Arc::clone(&h.ids));
        journal.create(entry(&books, 71, dec!(100), dec!(100))).unwrap();
        let entry_id = JournalEntryId::from_uuid(uuid(71));

        store.fail(Some("gl.ledger"));
        let err = journal.post(post(71)).unwrap_err();
        assert!(matches!(err, CommandError::Store(EventStoreError::Unavailable(_))));
        let entry = journal.repository().load(entry_id).unwrap();
        assert_eq!(entry.status(), EntryStatus::Posted);
        assert_eq!(cash_debit(&books), dec!(0));

        store.fail(None);
        let err = journal
            .delete(tally_gl::DeleteJournalEntry {
                entry_id,
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, CommandError::InvariantViolation(msg) if msg.contains("cannot be deleted")));

        journal.post(post(71)).unwrap();
        assert_eq!(cash_debit(&books), dec!(100));
        assert_eq!(journal.repository().history(entry_id).unwrap().len(), 2);

        let err = journal.post(post(71)).unwrap_err();
        assert!(matches!(err, CommandError::InvariantViolation(msg) if msg.contains("already posted")));
        assert_eq!(cash_debit(&books), dec!(100));
    }

    #[test]
    fn entries_must_hit_ledger_accounts() {
        let h = setup();
        let books = books(&h);
        let mut cmd = entry(&books, 62, dec!(5), dec!(5));
        cmd.period_id = PeriodId::from_uuid(uuid(99));
        let err = books.journal.create(cmd).unwrap_err();
        assert!(matches!(err, CommandError::Validation(msg) if msg.contains("no balance")));
    }

    // ---- concurrency ------------------------------------------------------

    #[test]
    fn stale_project_save_is_a_retryable_conflict() {
        let h = setup();
        let projects = ProjectHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let project_id = ProjectId::from_uuid(uuid(70));
        projects
            .create(CreateProject {
                project_id,
                name: "Spring Season".to_string(),
                description: None,
                sequence: 1,
                start_date: None,
                completion_date: None,
                occurred_at: Utc::now(),
            })
            .unwrap();

        let repo = projects.repository();
        let mut first = repo.load(project_id).unwrap();
        let mut second = repo.load(project_id).unwrap();
        let add = |n: u128| {
            ProjectCommand::AddActivity(AddActivity {
                project_id,
                activity_id: ActivityId::from_uuid(uuid(n)),
                name: format!("Rehearsal {n}"),
                description: None,
                kind: ActivityKind::Rehearsal,
                scheduled_start: at(date(2024, 6, 12), 10),
                scheduled_end: at(date(2024, 6, 12), 14),
                parent_id: None,
                occurred_at: Utc::now(),
            })
        };
        first.execute(add(71)).unwrap();
        second.execute(add(72)).unwrap();

        repo.save(&mut first).unwrap();
        let err = repo.save(&mut second).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, CommandError::ConcurrencyConflict { expected: 1, actual: 2, .. }));
        assert_eq!(repo.history(project_id).unwrap().len(), 2);
    }

    // ---- parties ----------------------------------------------------------

    fn rules() -> WorkRules {
        WorkRules {
            normal_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            normal_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            working_hours: dec!(8),
            minimum_call: dec!(4),
            maximum_hours: dec!(40),
            weekend_overtime: true,
        }
    }

    fn register_position(parties: &PartyHandler<Store>, n: u128, name: &str) -> PartyId {
        let id = PartyId::from_uuid(uuid(n));
        parties
            .register(RegisterParty {
                party_id: id,
                kind: PartyKind::Position,
                name: name.to_string(),
                effective: EffectiveDateInterval::ALWAYS,
                position: Some(PositionDetails {
                    position_type: PositionType::Single,
                    max_persons: 1,
                    location_id: None,
                    work_rules: rules(),
                }),
                occurred_at: Utc::now(),
            })
            .unwrap();
        id
    }

    fn reports_to(child: PartyId, parent: PartyId) -> AddAccountability {
        AddAccountability {
            party_id: child,
            parent_id: parent,
            // Replaced by the stored parent's kind.
            parent_kind: PartyKind::Organization,
            kind: AccountabilityKind::ReportingLine,
            effective: EffectiveDateInterval::ALWAYS,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn reporting_lines_cannot_loop() {
        let h = setup();
        let parties = PartyHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let director = register_position(&parties, 80, "Technical Director");
        let carpenter = register_position(&parties, 81, "Master Carpenter");
        let flyman = register_position(&parties, 82, "Flyman");

        parties.add_accountability(reports_to(carpenter, director)).unwrap();
        parties.add_accountability(reports_to(flyman, carpenter)).unwrap();

        let before = parties.repository().history(director).unwrap().len();
        let err = parties.add_accountability(reports_to(director, flyman)).unwrap_err();
        assert!(matches!(err, CommandError::InvariantViolation(msg) if msg == "invalid parent"));
        assert_eq!(parties.repository().history(director).unwrap().len(), before);

        let err = parties.add_accountability(reports_to(director, director)).unwrap_err();
        assert!(matches!(err, CommandError::InvariantViolation(_)));
    }

    // ---- payroll ----------------------------------------------------------

    #[test]
    fn generated_hours_price_regular_and_overtime_and_converge() {
        let h = setup();
        let parties = PartyHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let projects = ProjectHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let timecards = TimecardHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());

        let position = register_position(&parties, 90, "Stagehand");
        let payroll_id = PayrollId::from_uuid(uuid(91));
        h.directory
            .register_payroll(Payroll {
                id: payroll_id,
                name: "Weekly Crew".to_string(),
                pay_cycle: PayCycle {
                    name: "Weekly".to_string(),
                    frequency: Frequency::Weekly,
                    period_end_day: Weekday::Sat,
                    pay_date_offset: 5,
                    non_cash: false,
                },
                effective: EffectiveDateInterval::ALWAYS,
            })
            .unwrap();

        let wage = ElementType::new(
            ElementTypeId::from_uuid(uuid(92)),
            "Crew Wage",
            ElementKind::RegularWage,
            EffectiveDateInterval::ALWAYS,
        )
        .unwrap()
        .with_default(InputValueKind::Rate, dec!(30))
        .unwrap();
        let overtime = ElementType::new(
            ElementTypeId::from_uuid(uuid(93)),
            "Crew Overtime",
            ElementKind::Overtime,
            EffectiveDateInterval::ALWAYS,
        )
        .unwrap()
        .with_default(InputValueKind::Rate, dec!(30))
        .unwrap()
        .with_default(InputValueKind::OvertimeMultiplier, dec!(1.5))
        .unwrap();
        for element in [&wage, &overtime] {
            h.directory.register_element(element.clone()).unwrap();
            h.directory
                .link_element(ElementLink {
                    element_type_id: element.id,
                    position_id: position,
                    effective: EffectiveDateInterval::ALWAYS,
                })
                .unwrap();
        }

        let project_id = ProjectId::from_uuid(uuid(94));
        let activity_id = ActivityId::from_uuid(uuid(95));
        projects
            .create(CreateProject {
                project_id,
                name: "La Boheme".to_string(),
                description: None,
                sequence: 1,
                start_date: None,
                completion_date: None,
                occurred_at: Utc::now(),
            })
            .unwrap();
        // Wednesday, 07:00 to 19:00.
        projects
            .add_activity(AddActivity {
                project_id,
                activity_id,
                name: "Load-in".to_string(),
                description: None,
                kind: ActivityKind::Generic,
                scheduled_start: at(date(2024, 6, 12), 7),
                scheduled_end: at(date(2024, 6, 12), 19),
                parent_id: None,
                occurred_at: Utc::now(),
            })
            .unwrap();
        projects
            .assign_position(AssignPosition {
                project_id,
                activity_id,
                resource: ActivityResource {
                    position_id: position,
                    payroll_id,
                },
                occurred_at: Utc::now(),
            })
            .unwrap();

        let entries = timecards.generate_hours(project_id, activity_id, Utc::now()).unwrap();
        assert_eq!(entries.len(), 2);
        let regular = entries.iter().find(|e| e.element_kind == ElementKind::RegularWage).unwrap();
        assert_eq!(regular.hours, dec!(8));
        assert_eq!(regular.pay, dec!(240));
        let extra = entries.iter().find(|e| e.element_kind == ElementKind::Overtime).unwrap();
        assert_eq!(extra.hours, dec!(4));
        assert_eq!(extra.multiplier, dec!(1.5));
        assert_eq!(extra.pay, dec!(180));

        // The weekly cycle runs Sunday 9 June to Saturday 15 June.
        let timecard_id = h
            .directory
            .timecard_for(position, date(2024, 6, 9))
            .unwrap()
            .unwrap();
        let card = timecards.repository().load(timecard_id).unwrap();
        assert_eq!(card.total_hours(), dec!(12));
        assert_eq!(card.summaries().count(), 7);

        // Regenerating replaces the activity's hours instead of adding to them.
        let again = timecards.generate_hours(project_id, activity_id, Utc::now()).unwrap();
        assert_eq!(again, entries);
        let card = timecards.repository().load(timecard_id).unwrap();
        assert_eq!(card.total_hours(), dec!(12));
    }

    #[test]
    fn a_rejected_cycle_saves_no_hours_for_earlier_cycles() {
        let h = setup();
        let parties = PartyHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let projects = ProjectHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let timecards = TimecardHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());

        let position = PartyId::from_uuid(uuid(110));
        parties
            .register(RegisterParty {
                party_id: position,
                kind: PartyKind::Position,
                name: "Follow Spot".to_string(),
                effective: EffectiveDateInterval::ALWAYS,
                position: Some(PositionDetails {
                    position_type: PositionType::Single,
                    max_persons: 1,
                    location_id: None,
                    work_rules: WorkRules {
                        weekend_overtime: false,
                        ..rules()
                    },
                }),
                occurred_at: Utc::now(),
            })
            .unwrap();
        let payroll_id = PayrollId::from_uuid(uuid(111));
        h.directory
            .register_payroll(Payroll {
                id: payroll_id,
                name: "Weekly Crew".to_string(),
                pay_cycle: PayCycle {
                    name: "Weekly".to_string(),
                    frequency: Frequency::Weekly,
                    period_end_day: Weekday::Sat,
                    pay_date_offset: 5,
                    non_cash: false,
                },
                effective: EffectiveDateInterval::ALWAYS,
            })
            .unwrap();

        // Overtime only applies from the second cycle, starting Sunday 16 June.
        let wage = ElementType::new(
            ElementTypeId::from_uuid(uuid(112)),
            "Crew Wage",
            ElementKind::RegularWage,
            EffectiveDateInterval::ALWAYS,
        )
        .unwrap()
        .with_default(InputValueKind::Rate, dec!(30))
        .unwrap();
        let overtime = ElementType::new(
            ElementTypeId::from_uuid(uuid(113)),
            "Crew Overtime",
            ElementKind::Overtime,
            EffectiveDateInterval::ALWAYS,
        )
        .unwrap()
        .with_default(InputValueKind::Rate, dec!(30))
        .unwrap();
        let links = [
            (&wage, EffectiveDateInterval::ALWAYS),
            (&overtime, EffectiveDateInterval::from_dates(Some(date(2024, 6, 16)), None).unwrap()),
        ];
        for (element, effective) in links {
            h.directory.register_element(element.clone()).unwrap();
            h.directory
                .link_element(ElementLink {
                    element_type_id: element.id,
                    position_id: position,
                    effective,
                })
                .unwrap();
        }

        let project_id = ProjectId::from_uuid(uuid(114));
        let activity_id = ActivityId::from_uuid(uuid(115));
        projects
            .create(CreateProject {
                project_id,
                name: "Turandot".to_string(),
                description: None,
                sequence: 3,
                start_date: None,
                completion_date: None,
                occurred_at: Utc::now(),
            })
            .unwrap();
        // Friday 22:00 to Monday 18:00: each day runs 22:00 to 18:00 the next
        // morning, so Sunday's overtime falls on Monday and is refused.
        projects
            .add_activity(AddActivity {
                project_id,
                activity_id,
                name: "Changeover".to_string(),
                description: None,
                kind: ActivityKind::Generic,
                scheduled_start: at(date(2024, 6, 14), 22),
                scheduled_end: at(date(2024, 6, 17), 18),
                parent_id: None,
                occurred_at: Utc::now(),
            })
            .unwrap();
        projects
            .assign_position(AssignPosition {
                project_id,
                activity_id,
                resource: ActivityResource {
                    position_id: position,
                    payroll_id,
                },
                occurred_at: Utc::now(),
            })
            .unwrap();
        let streams_before = h.store.stream_count().unwrap();

        let err = timecards.generate_hours(project_id, activity_id, Utc::now()).unwrap_err();
        assert!(matches!(err, CommandError::Validation(msg) if msg.contains("start on the date worked")));
        assert_eq!(h.store.stream_count().unwrap(), streams_before);
        assert_eq!(h.directory.timecard_for(position, date(2024, 6, 9)).unwrap(), None);
        assert_eq!(h.directory.timecard_for(position, date(2024, 6, 16)).unwrap(), None);
    }

    #[test]
    fn positions_need_a_known_payroll() {
        let h = setup();
        let parties = PartyHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let projects = ProjectHandler::new(Arc::clone(&h.store), Arc::clone(&h.ids), h.directory.clone());
        let position = register_position(&parties, 100, "Dresser");
        let project_id = ProjectId::from_uuid(uuid(101));
        let activity_id = ActivityId::from_uuid(uuid(102));
        projects
            .create(CreateProject {
                project_id,
                name: "Tosca".to_string(),
                description: None,
                sequence: 2,
                start_date: None,
                completion_date: None,
                occurred_at: Utc::now(),
            })
            .unwrap();
        projects
            .add_activity(AddActivity {
                project_id,
                activity_id,
                name: "Dress".to_string(),
                description: None,
                kind: ActivityKind::Rehearsal,
                scheduled_start: at(date(2024, 6, 13), 18),
                scheduled_end: at(date(2024, 6, 13), 22),
                parent_id: None,
                occurred_at: Utc::now(),
            })
            .unwrap();

        let err = projects
            .assign_position(AssignPosition {
                project_id,
                activity_id,
                resource: ActivityResource {
                    position_id: position,
                    payroll_id: PayrollId::from_uuid(uuid(103)),
                },
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFound(msg) if msg.starts_with("payroll")));
        assert_eq!(projects.repository().history(project_id).unwrap().len(), 2);
    }
}
