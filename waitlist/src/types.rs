//! Domain types shared by the stores, the admission workflow and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which pool a registration code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodePool {
    /// Codes valid before the late-registration cutoff
    Standard,
    /// Codes additionally required at or after the cutoff
    Late,
}

impl CodePool {
    /// Both pools, standard first.
    pub const ALL: [Self; 2] = [Self::Standard, Self::Late];

    /// Storage name of the pool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Late => "late",
        }
    }

    /// The other pool.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Standard => Self::Late,
            Self::Late => Self::Standard,
        }
    }
}

impl fmt::Display for CodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable sequential identifier, e.g. `edo-ahapn-0042`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wrap an identifier string as-is (lookups use the caller's value).
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Formatting rule for event identifiers: constant prefix plus a
/// zero-padded decimal sequence number.
///
/// Sequences wider than `width` are written in full, so ordering by
/// sequence number stays correct past `9999`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventIdFormat {
    prefix: String,
    width: usize,
}

impl Default for EventIdFormat {
    fn default() -> Self {
        Self::new("edo-ahapn-", 4)
    }
}

impl EventIdFormat {
    /// Create a format with the given prefix and minimum digit count.
    #[must_use]
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width: width.max(1),
        }
    }

    /// The constant prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Render sequence number `sequence`.
    #[must_use]
    pub fn format(&self, sequence: u64) -> EventId {
        EventId(format!("{}{:0width$}", self.prefix, sequence, width = self.width))
    }

    /// Recover the sequence number from an identifier of this format.
    #[must_use]
    pub fn sequence_of(&self, id: &EventId) -> Option<u64> {
        let digits = id.as_str().strip_prefix(&self.prefix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// An accepted registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registrant {
    /// Full name as submitted
    pub name: String,
    /// Normalised contact address (unique)
    pub email: String,
    /// Contact phone number
    pub phone_number: String,
    /// State of residence
    pub state: String,
    /// Public path of the uploaded photo, if any
    pub photo_reference: Option<String>,
    /// Assigned identifier (unique)
    pub event_id: EventId,
    /// Standard-pool code used for admission
    pub submitted_code: String,
    /// Late-pool code, when one was required
    pub late_code: Option<String>,
    /// Persistence time
    pub created_at: DateTime<Utc>,
}

/// Registration fields as submitted by a client.
///
/// Blank strings count as missing; see [`RegistrationForm::normalized`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    /// Full name
    pub name: String,
    /// Contact address
    pub email: String,
    /// Contact phone number
    pub phone_number: String,
    /// State of residence
    pub state: String,
    /// Standard-pool registration code (`regId`)
    pub code: String,
    /// Late-pool registration code (`lateRegId`)
    pub late_code: Option<String>,
    /// Public path of an already stored photo
    pub photo_reference: Option<String>,
}

impl RegistrationForm {
    /// Trim every field, lower-case the email and drop a blank late code.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: normalize_email(&self.email),
            phone_number: self.phone_number.trim().to_string(),
            state: self.state.trim().to_string(),
            code: self.code.trim().to_string(),
            late_code: self
                .late_code
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            photo_reference: self.photo_reference.filter(|p| !p.is_empty()),
        }
    }

    /// Name of the first required field that is blank.
    #[must_use]
    pub fn first_missing_field(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("phoneNumber", &self.phone_number),
            ("state", &self.state),
            ("regId", &self.code),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

/// A registration attempt as seen by the admission workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRequest {
    /// Unique per attempt; also the claim token for codes
    pub admission_id: Uuid,
    /// Normalised form fields
    pub form: RegistrationForm,
    /// When the request entered the workflow
    pub submitted_at: DateTime<Utc>,
}

impl AdmissionRequest {
    /// Start an attempt for `form` at `submitted_at`.
    #[must_use]
    pub fn new(form: RegistrationForm, submitted_at: DateTime<Utc>) -> Self {
        Self {
            admission_id: Uuid::new_v4(),
            form: form.normalized(),
            submitted_at,
        }
    }
}

/// Canonical form of an email address for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_pads_to_width() {
        let format = EventIdFormat::default();
        assert_eq!(format.format(1).as_str(), "edo-ahapn-0001");
        assert_eq!(format.format(42).as_str(), "edo-ahapn-0042");
        assert_eq!(format.format(12_345).as_str(), "edo-ahapn-12345");
    }

    #[test]
    fn sequence_parses_only_matching_ids() {
        let format = EventIdFormat::default();
        assert_eq!(format.sequence_of(&EventId::new("edo-ahapn-0007")), Some(7));
        assert_eq!(format.sequence_of(&EventId::new("edo-ahapn-")), None);
        assert_eq!(format.sequence_of(&EventId::new("edo-ahapn-00a1")), None);
        assert_eq!(format.sequence_of(&EventId::new("other-0001")), None);
    }

    #[test]
    fn form_normalisation() {
        let form = RegistrationForm {
            name: " Jane Doe ".into(),
            email: " Jane@X.com ".into(),
            phone_number: "0800".into(),
            state: "Edo".into(),
            code: " A1 ".into(),
            late_code: Some("   ".into()),
            photo_reference: Some(String::new()),
        }
        .normalized();

        assert_eq!(form.name, "Jane Doe");
        assert_eq!(form.email, "jane@x.com");
        assert_eq!(form.code, "A1");
        assert_eq!(form.late_code, None);
        assert_eq!(form.photo_reference, None);
        assert_eq!(form.first_missing_field(), None);
    }

    #[test]
    fn missing_fields_are_reported_by_wire_name() {
        let form = RegistrationForm {
            name: "Jane".into(),
            email: "jane@x.com".into(),
            ..RegistrationForm::default()
        };
        assert_eq!(form.first_missing_field(), Some("phoneNumber"));
    }

    #[test]
    fn registrant_serialises_camel_case() {
        let registrant = Registrant {
            name: "Jane".into(),
            email: "jane@x.com".into(),
            phone_number: "0800".into(),
            state: "Edo".into(),
            photo_reference: None,
            event_id: EventId::new("edo-ahapn-0001"),
            submitted_code: "A1".into(),
            late_code: None,
            created_at: DateTime::<Utc>::default(),
        };
        let json = serde_json::to_value(&registrant).unwrap_or_default();
        assert_eq!(json["eventId"], "edo-ahapn-0001");
        assert_eq!(json["phoneNumber"], "0800");
    }
}
