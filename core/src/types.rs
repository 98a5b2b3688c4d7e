//! Domain types for Campus Events.
//!
//! Identifiers, the `Event` and `User` documents, and the small enums they
//! carry. Status is modelled twice on purpose: [`StoredStatus`] is the
//! coordinator's explicit override persisted on the document, [`EventStatus`]
//! is the value derived from it and the calendar.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A string did not name a known variant of one of the domain enums.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enum was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Event category, as offered by the coordinator dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Dance
    #[serde(rename = "dance")]
    Dance,
    /// Hackathon
    #[serde(rename = "hackathon")]
    Hackathon,
    /// Workshop
    #[serde(rename = "workshop")]
    Workshop,
    /// Competition
    #[serde(rename = "competition")]
    Competition,
    /// Festival
    #[serde(rename = "festival")]
    Festival,
    /// Anything else
    #[serde(rename = "other")]
    Other,
    /// Cultural & Sports Fest
    #[serde(rename = "Cultural & Sports Fest")]
    CulturalAndSportsFest,
    /// National Festival
    #[serde(rename = "National Festival")]
    NationalFestival,
    /// Academic & Cultural Support
    #[serde(rename = "Academic & Cultural Support")]
    AcademicAndCulturalSupport,
    /// Health & Social Welfare
    #[serde(rename = "Health & Social Welfare")]
    HealthAndSocialWelfare,
    /// Wellness & Personal Development
    #[serde(rename = "Wellness & Personal Development")]
    WellnessAndPersonalDevelopment,
    /// Academic Workshop
    #[serde(rename = "Academic Workshop")]
    AcademicWorkshop,
    /// Project Exhibition
    #[serde(rename = "Project Exhibition")]
    ProjectExhibition,
}

impl Category {
    /// Wire and storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dance => "dance",
            Self::Hackathon => "hackathon",
            Self::Workshop => "workshop",
            Self::Competition => "competition",
            Self::Festival => "festival",
            Self::Other => "other",
            Self::CulturalAndSportsFest => "Cultural & Sports Fest",
            Self::NationalFestival => "National Festival",
            Self::AcademicAndCulturalSupport => "Academic & Cultural Support",
            Self::HealthAndSocialWelfare => "Health & Social Welfare",
            Self::WellnessAndPersonalDevelopment => "Wellness & Personal Development",
            Self::AcademicWorkshop => "Academic Workshop",
            Self::ProjectExhibition => "Project Exhibition",
        }
    }

    /// Every category, in dashboard order.
    pub const ALL: [Self; 13] = [
        Self::Dance,
        Self::Hackathon,
        Self::Workshop,
        Self::Competition,
        Self::Festival,
        Self::Other,
        Self::CulturalAndSportsFest,
        Self::NationalFestival,
        Self::AcademicAndCulturalSupport,
        Self::HealthAndSocialWelfare,
        Self::WellnessAndPersonalDevelopment,
        Self::AcademicWorkshop,
        Self::ProjectExhibition,
    ];
}

impl FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("category", s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status persisted on the event document.
///
/// Only `Completed` has an effect: it closes the event regardless of its date.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredStatus {
    /// No override
    #[default]
    Upcoming,
    /// Closed by a coordinator
    Completed,
}

impl StoredStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for StoredStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseEnumError::new("stored status", s)),
        }
    }
}

/// Status derived from the event date, today's date and the stored override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Event day is in the future
    Upcoming,
    /// Event day is today
    Ongoing,
    /// Event day has passed, or a coordinator marked it completed
    Completed,
}

impl EventStatus {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for EventStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseEnumError::new("event status", s)),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a user account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Browses and registers for events
    Student,
    /// Publishes events and manages rosters
    Coordinator,
    /// Provisions accounts, full access
    Admin,
}

impl Role {
    /// Wire and storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Coordinator => "coordinator",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "coordinator" => Ok(Self::Coordinator),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Year of study, required for students.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Year {
    /// 1st Year
    #[serde(rename = "1st Year")]
    First,
    /// 2nd Year
    #[serde(rename = "2nd Year")]
    Second,
    /// 3rd Year
    #[serde(rename = "3rd Year")]
    Third,
    /// 4th Year
    #[serde(rename = "4th Year")]
    Fourth,
}

impl Year {
    /// Wire and storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::First => "1st Year",
            Self::Second => "2nd Year",
            Self::Third => "3rd Year",
            Self::Fourth => "4th Year",
        }
    }
}

impl FromStr for Year {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1st Year" => Ok(Self::First),
            "2nd Year" => Ok(Self::Second),
            "3rd Year" => Ok(Self::Third),
            "4th Year" => Ok(Self::Fourth),
            _ => Err(ParseEnumError::new("year", s)),
        }
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Event
// ============================================================================

/// Practical details shown on the event card.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    /// Duration in minutes
    pub duration: Option<u32>,
    /// Prize description
    pub prizes: Option<String>,
    /// Rules, one per entry
    #[serde(default)]
    pub rules: Vec<String>,
    /// Venue name
    pub venue: Option<String>,
}

/// An event document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Optional theme
    pub theme: Option<String>,
    /// Optional long description
    pub description: Option<String>,
    /// Who may attend (free text, "all" by default)
    pub eligibility: String,
    /// Category
    pub category: Category,
    /// When the event takes place
    pub date: DateTime<Utc>,
    /// Stored override; see [`Event::status_on`] for the effective status
    pub status: StoredStatus,
    /// Whether students must register to attend
    pub registration_required: bool,
    /// Creator of the event
    pub created_by: UserId,
    /// Practical details
    pub details: EventDetails,
    /// Banner image URL
    pub image: Option<String>,
    /// Registered users, in registration order, without duplicates
    pub participants: Vec<UserId>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Create a new event with no participants and default settings.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: Category,
        date: DateTime<Utc>,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            theme: None,
            description: None,
            eligibility: "all".to_string(),
            category,
            date,
            status: StoredStatus::Upcoming,
            registration_required: true,
            created_by,
            details: EventDetails::default(),
            image: None,
            participants: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Effective status on the given calendar day.
    ///
    /// A stored `completed` wins over the date; otherwise the event day is
    /// compared with `today`.
    #[must_use]
    pub fn status_on(&self, today: NaiveDate) -> EventStatus {
        if self.status == StoredStatus::Completed {
            return EventStatus::Completed;
        }

        let day = self.date.date_naive();
        if day < today {
            EventStatus::Completed
        } else if day == today {
            EventStatus::Ongoing
        } else {
            EventStatus::Upcoming
        }
    }

    /// Whether registrations can no longer change on the given day.
    #[must_use]
    pub fn is_closed_on(&self, today: NaiveDate) -> bool {
        self.status_on(today) == EventStatus::Completed
    }

    /// Whether the user is in the participant list.
    #[must_use]
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// Apply a descriptive update. Never touches `participants`.
    pub fn apply_update(&mut self, update: EventUpdate, now: DateTime<Utc>) {
        let EventUpdate {
            name,
            theme,
            description,
            eligibility,
            category,
            date,
            status,
            registration_required,
            details,
            image,
        } = update;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(theme) = theme {
            self.theme = Some(theme);
        }
        if let Some(description) = description {
            self.description = Some(description);
        }
        if let Some(eligibility) = eligibility {
            self.eligibility = eligibility;
        }
        if let Some(category) = category {
            self.category = category;
        }
        if let Some(date) = date {
            self.date = date;
        }
        if let Some(status) = status {
            self.status = status;
        }
        if let Some(registration_required) = registration_required {
            self.registration_required = registration_required;
        }
        if let Some(details) = details {
            self.details = details;
        }
        if let Some(image) = image {
            self.image = Some(image);
        }
        self.updated_at = now;
    }
}

/// Partial update of an event's descriptive fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    /// New name
    pub name: Option<String>,
    /// New theme
    pub theme: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New eligibility text
    pub eligibility: Option<String>,
    /// New category
    pub category: Option<Category>,
    /// New date
    pub date: Option<DateTime<Utc>>,
    /// New stored status
    pub status: Option<StoredStatus>,
    /// New registration flag
    pub registration_required: Option<bool>,
    /// Replacement details
    pub details: Option<EventDetails>,
    /// New image URL
    pub image: Option<String>,
}

// ============================================================================
// User
// ============================================================================

/// A user document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User identifier
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Unique, lowercased email
    pub email: String,
    /// Account role
    pub role: Role,
    /// Year of study (students only)
    pub year: Option<Year>,
    /// Short biography
    pub bio: String,
    /// Events this user is registered for, without duplicates
    pub registered_events: Vec<EventId>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with no registrations. The email is trimmed and lowercased.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: &str,
        role: Role,
        year: Option<Year>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            name: name.into().trim().to_string(),
            email: email.trim().to_lowercase(),
            role,
            year,
            bio: String::new(),
            registered_events: Vec::new(),
            created_at,
        }
    }

    /// Whether the event is in this user's registration list.
    #[must_use]
    pub fn is_registered_for(&self, event_id: EventId) -> bool {
        self.registered_events.contains(&event_id)
    }

    /// Apply a profile update. Never touches `registered_events` or `role`.
    pub fn apply_update(&mut self, update: UserUpdate) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(email) = update.email {
            self.email = email.trim().to_lowercase();
        }
        if let Some(year) = update.year {
            self.year = Some(year);
        }
        if let Some(bio) = update.bio {
            self.bio = bio;
        }
    }
}

/// Partial update of a user's own profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    /// New display name
    pub name: Option<String>,
    /// New email, stored trimmed and lowercased
    pub email: Option<String>,
    /// New year of study
    pub year: Option<Year>,
    /// New biography; an empty string clears it
    pub bio: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_on(year: i32, month: u32, day: u32) -> Event {
        let date = Utc.with_ymd_and_hms(year, month, day, 18, 30, 0).unwrap();
        Event::new("Spring Fest", Category::Festival, date, UserId::new(), date)
    }

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn status_is_upcoming_before_event_day() {
        let event = event_on(2025, 4, 10);
        assert_eq!(event.status_on(day(2025, 4, 9)), EventStatus::Upcoming);
    }

    #[test]
    fn status_is_ongoing_on_event_day_regardless_of_time() {
        let event = event_on(2025, 4, 10);
        assert_eq!(event.status_on(day(2025, 4, 10)), EventStatus::Ongoing);
        assert!(!event.is_closed_on(day(2025, 4, 10)));
    }

    #[test]
    fn status_is_completed_after_event_day() {
        let event = event_on(2025, 4, 10);
        assert_eq!(event.status_on(day(2025, 4, 11)), EventStatus::Completed);
    }

    #[test]
    fn stored_completed_overrides_future_date() {
        let mut event = event_on(2030, 1, 1);
        event.status = StoredStatus::Completed;
        assert_eq!(event.status_on(day(2025, 1, 1)), EventStatus::Completed);
    }

    #[test]
    fn apply_update_keeps_participants() {
        let mut event = event_on(2025, 4, 10);
        let participant = UserId::new();
        event.participants.push(participant);

        let now = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        event.apply_update(
            EventUpdate {
                name: Some("Spring Fest 2025".to_string()),
                registration_required: Some(false),
                ..EventUpdate::default()
            },
            now,
        );

        assert_eq!(event.name, "Spring Fest 2025");
        assert!(!event.registration_required);
        assert_eq!(event.participants, vec![participant]);
        assert_eq!(event.updated_at, now);
    }

    #[test]
    fn profile_update_normalizes_email_and_keeps_registrations() {
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let mut user = User::new("Asha", "asha@college.edu", Role::Student, Some(Year::First), now);
        let event_id = EventId::new();
        user.registered_events.push(event_id);
        user.bio = "Robotics".to_string();

        user.apply_update(UserUpdate {
            email: Some("  Asha.K@College.edu ".to_string()),
            year: Some(Year::Second),
            bio: Some(String::new()),
            ..UserUpdate::default()
        });

        assert_eq!(user.name, "Asha");
        assert_eq!(user.email, "asha.k@college.edu");
        assert_eq!(user.year, Some(Year::Second));
        assert!(user.bio.is_empty());
        assert_eq!(user.registered_events, vec![event_id]);
        assert_eq!(user.role, Role::Student);
    }

    #[test]
    fn category_round_trips_through_strings() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!("karaoke".parse::<Category>().is_err());
    }

    #[test]
    fn category_serializes_with_display_names() {
        let json = serde_json::to_string(&Category::CulturalAndSportsFest).unwrap();
        assert_eq!(json, "\"Cultural & Sports Fest\"");
    }

    #[test]
    fn user_email_is_normalized() {
        let user = User::new(" Asha ", "  Asha@College.EDU ", Role::Student, Some(Year::Second), Utc::now());
        assert_eq!(user.email, "asha@college.edu");
        assert_eq!(user.name, "Asha");
        assert!(user.registered_events.is_empty());
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = event_on(2025, 4, 10);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["registrationRequired"], serde_json::json!(true));
        assert_eq!(json["status"], serde_json::json!("upcoming"));
        assert_eq!(json["participants"], serde_json::json!([]));
    }
}
