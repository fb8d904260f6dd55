use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use tally_core::{
    Aggregate, AggregateRoot, DateEffective, DomainError, DomainResult, EffectiveDateInterval,
    EventSourced,
};
use tally_events::Event;

tally_core::uuid_id!(
    /// User identifier (aggregate id).
    pub UserId
);

/// Characters a username may not contain.
const FORBIDDEN_USERNAME_CHARS: &[char] = &['/', '"', '(', '*', '+', ',', ';', '<', '>', '\\', '~', ':'];

/// Hex-encoded SHA-256 of the raw credentials. Only the digest is ever stored.
pub fn hash_credentials(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn validate_username(username: &str) -> DomainResult<()> {
    if username.trim().is_empty() {
        return Err(DomainError::validation("user name cannot be blank"));
    }
    if username.trim() != username {
        return Err(DomainError::validation("invalid space in user name"));
    }
    if username.contains(FORBIDDEN_USERNAME_CHARS) {
        return Err(DomainError::validation("invalid user name"));
    }
    Ok(())
}

fn validate_email(email: &Option<String>) -> DomainResult<()> {
    match email {
        Some(address) if !address.contains('@') || address.trim() != address => Err(
            DomainError::validation(format!("invalid email address '{address}'")),
        ),
        _ => Ok(()),
    }
}

/// Aggregate root: User (application account).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    username: String,
    credentials_hash: String,
    active: EffectiveDateInterval,
    password_date: Option<NaiveDate>,
    description: Option<String>,
    email: Option<String>,
    last_login: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            username: String::new(),
            credentials_hash: String::new(),
            active: EffectiveDateInterval::ALWAYS,
            password_date: None,
            description: None,
            email: None,
            last_login: None,
            version: 0,
            created: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn credentials_hash(&self) -> &str {
        &self.credentials_hash
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.active.start_date()
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.active.end_date()
    }

    pub fn password_date(&self) -> Option<NaiveDate> {
        self.password_date
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }
}

impl DateEffective for User {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.active
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateUser. Credentials arrive raw and are hashed before any event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUser {
    pub user_id: UserId,
    pub username: String,
    pub raw_credentials: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AuthenticateUser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateUser {
    pub user_id: UserId,
    pub raw_credentials: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DisableUser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableUser {
    pub user_id: UserId,
    pub end_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeUserCredentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeUserCredentials {
    pub user_id: UserId,
    pub new_credentials: String,
    pub change_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeUserEmail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeUserEmail {
    pub user_id: UserId,
    pub email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    Authenticate(AuthenticateUser),
    Disable(DisableUser),
    ChangeCredentials(ChangeUserCredentials),
    ChangeEmail(ChangeUserEmail),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub username: String,
    pub credentials_hash: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub password_date: NaiveDate,
    pub description: Option<String>,
    pub email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAuthenticated {
    pub user_id: UserId,
    pub username: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDisabled {
    pub user_id: UserId,
    pub end_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentialsChanged {
    pub user_id: UserId,
    pub credentials_hash: String,
    pub change_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEmailChanged {
    pub user_id: UserId,
    pub email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    Authenticated(UserAuthenticated),
    Disabled(UserDisabled),
    CredentialsChanged(UserCredentialsChanged),
    EmailChanged(UserEmailChanged),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "foundation.user.created",
            UserEvent::Authenticated(_) => "foundation.user.authenticated",
            UserEvent::Disabled(_) => "foundation.user.disabled",
            UserEvent::CredentialsChanged(_) => "foundation.user.credentials_changed",
            UserEvent::EmailChanged(_) => "foundation.user.email_changed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::Authenticated(e) => e.occurred_at,
            UserEvent::Disabled(e) => e.occurred_at,
            UserEvent::CredentialsChanged(e) => e.occurred_at,
            UserEvent::EmailChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.username = e.username.clone();
                self.credentials_hash = e.credentials_hash.clone();
                // Validated on creation; an inverted range cannot reach the stream.
                self.active = EffectiveDateInterval::from_dates(Some(e.start_date), e.end_date)
                    .unwrap_or_else(|_| EffectiveDateInterval::starting_on(e.start_date));
                self.password_date = Some(e.password_date);
                self.description = e.description.clone();
                self.email = e.email.clone();
                self.created = true;
            }
            UserEvent::Authenticated(e) => {
                self.last_login = Some(e.occurred_at);
            }
            UserEvent::Disabled(e) => {
                self.active = EffectiveDateInterval::from_dates(self.active.start_date(), Some(e.end_date))
                    .unwrap_or(self.active);
            }
            UserEvent::CredentialsChanged(e) => {
                self.credentials_hash = e.credentials_hash.clone();
                self.password_date = Some(e.change_date);
            }
            UserEvent::EmailChanged(e) => {
                self.email = e.email.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::Authenticate(cmd) => {
                self.ensure_created()?;
                if hash_credentials(&cmd.raw_credentials) != self.credentials_hash {
                    return Err(DomainError::Unauthorized);
                }
                if !self.is_effective(cmd.occurred_at.date_naive()) {
                    return Err(DomainError::Unauthorized);
                }
                Ok(vec![UserEvent::Authenticated(UserAuthenticated {
                    user_id: cmd.user_id,
                    username: self.username.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            UserCommand::Disable(cmd) => {
                self.ensure_created()?;
                if self.start_date().is_some_and(|start| cmd.end_date < start) {
                    return Err(DomainError::validation("end date cannot be before start date"));
                }
                Ok(vec![UserEvent::Disabled(UserDisabled {
                    user_id: cmd.user_id,
                    end_date: cmd.end_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            UserCommand::ChangeCredentials(cmd) => {
                self.ensure_created()?;
                if cmd.new_credentials.is_empty() {
                    return Err(DomainError::validation("credentials cannot be empty"));
                }
                let credentials_hash = hash_credentials(&cmd.new_credentials);
                if credentials_hash == self.credentials_hash {
                    return Err(DomainError::validation(
                        "new password must be different from old password",
                    ));
                }
                Ok(vec![UserEvent::CredentialsChanged(UserCredentialsChanged {
                    user_id: cmd.user_id,
                    credentials_hash,
                    change_date: cmd.change_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            UserCommand::ChangeEmail(cmd) => {
                self.ensure_created()?;
                validate_email(&cmd.email)?;
                Ok(vec![UserEvent::EmailChanged(UserEmailChanged {
                    user_id: cmd.user_id,
                    email: cmd.email.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl EventSourced for User {
    const AGGREGATE_TYPE: &'static str = "foundation.user";

    fn empty(id: UserId) -> Self {
        User::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

impl User {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("user {}", self.id)));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        if self.id != cmd.user_id {
            return Err(DomainError::invariant("user_id mismatch"));
        }
        validate_username(&cmd.username)?;
        if cmd.raw_credentials.is_empty() {
            return Err(DomainError::validation("credentials cannot be empty"));
        }
        validate_email(&cmd.email)?;
        EffectiveDateInterval::from_dates(Some(cmd.start_date), cmd.end_date)?;

        Ok(vec![UserEvent::Created(UserCreated {
            user_id: cmd.user_id,
            username: cmd.username.clone(),
            credentials_hash: hash_credentials(&cmd.raw_credentials),
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            password_date: cmd.occurred_at.date_naive(),
            description: cmd.description.clone(),
            email: cmd.email.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn user_id() -> UserId {
        UserId::from_uuid(Uuid::from_u128(1))
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn create(username: &str) -> UserCommand {
        UserCommand::Create(CreateUser {
            user_id: user_id(),
            username: username.to_string(),
            raw_credentials: "s3cret".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            description: None,
            email: Some("stage@example.org".to_string()),
            occurred_at: at(2024, 1, 1),
        })
    }

    fn created() -> User {
        let mut user = User::empty(user_id());
        let events = user.handle(&create("jsmith")).unwrap();
        user.apply(&events[0]);
        user
    }

    fn authenticate(raw: &str, when: DateTime<Utc>) -> UserCommand {
        UserCommand::Authenticate(AuthenticateUser {
            user_id: user_id(),
            raw_credentials: raw.to_string(),
            occurred_at: when,
        })
    }

    #[test]
    fn credentials_are_stored_hashed() {
        let user = created();
        assert_ne!(user.credentials_hash(), "s3cret");
        assert_eq!(user.credentials_hash(), hash_credentials("s3cret"));
        assert_eq!(user.credentials_hash().len(), 64);
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("jsmith").is_ok());
        assert_eq!(validate_username("   "), Err(DomainError::validation("user name cannot be blank")));
        assert_eq!(validate_username(" jsmith"), Err(DomainError::validation("invalid space in user name")));
        assert_eq!(validate_username("j:smith"), Err(DomainError::validation("invalid user name")));
        assert_eq!(validate_username("a\\b"), Err(DomainError::validation("invalid user name")));
    }

    #[test]
    fn authenticate_checks_hash_and_active_range() {
        let mut user = created();
        assert_eq!(user.handle(&authenticate("wrong", at(2024, 2, 1))), Err(DomainError::Unauthorized));

        let events = user.handle(&authenticate("s3cret", at(2024, 2, 1))).unwrap();
        user.apply(&events[0]);
        assert_eq!(user.last_login(), Some(at(2024, 2, 1)));

        let events = user
            .handle(&UserCommand::Disable(DisableUser {
                user_id: user_id(),
                end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                occurred_at: at(2024, 3, 1),
            }))
            .unwrap();
        user.apply(&events[0]);
        assert_eq!(user.end_date(), NaiveDate::from_ymd_opt(2024, 3, 31));
        assert!(user.handle(&authenticate("s3cret", at(2024, 3, 31))).is_ok());
        assert_eq!(user.handle(&authenticate("s3cret", at(2024, 4, 1))), Err(DomainError::Unauthorized));
    }

    #[test]
    fn disable_end_date_cannot_precede_start() {
        let user = created();
        let err = user
            .handle(&UserCommand::Disable(DisableUser {
                user_id: user_id(),
                end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
                occurred_at: at(2024, 3, 1),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn new_credentials_must_differ() {
        let mut user = created();
        let change = |raw: &str| {
            UserCommand::ChangeCredentials(ChangeUserCredentials {
                user_id: user_id(),
                new_credentials: raw.to_string(),
                change_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                occurred_at: at(2024, 5, 1),
            })
        };
        assert_eq!(
            user.handle(&change("s3cret")),
            Err(DomainError::validation("new password must be different from old password"))
        );

        let events = user.handle(&change("n3w")).unwrap();
        user.apply(&events[0]);
        assert_eq!(user.credentials_hash(), hash_credentials("n3w"));
        assert_eq!(user.password_date(), NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn email_changes_are_validated() {
        let mut user = created();
        let change = |email: Option<&str>| {
            UserCommand::ChangeEmail(ChangeUserEmail {
                user_id: user_id(),
                email: email.map(str::to_string),
                occurred_at: at(2024, 5, 1),
            })
        };
        assert!(user.handle(&change(Some("not-an-address"))).is_err());
        let events = user.handle(&change(Some("box@example.org"))).unwrap();
        user.apply(&events[0]);
        assert_eq!(user.email(), Some("box@example.org"));
    }

    proptest! {
        #[test]
        fn names_with_forbidden_chars_are_rejected(
            prefix in "[a-z]{1,8}",
            suffix in "[a-z]{0,8}",
            idx in 0usize..12,
        ) {
            let name = format!("{prefix}{}{suffix}", FORBIDDEN_USERNAME_CHARS[idx]);
            prop_assert!(validate_username(&name).is_err());
        }

        #[test]
        fn plain_names_are_accepted(name in "[a-zA-Z0-9._-]{1,20}") {
            prop_assert!(validate_username(&name).is_ok());
        }
    }
}
