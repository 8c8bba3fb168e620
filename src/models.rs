use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{
    DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, SubsecRound, TimeZone, Utc,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::store::Record;

/// Generate a fresh record id (UUID v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time at the millisecond precision records are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// The instant of local midnight at the start of `date`.
///
/// If midnight does not exist locally (a DST gap), the first valid local
/// instant after it is used instead.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    let local = match Local.from_local_datetime(&midnight) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => (1..=96).find_map(|step| {
            Local
                .from_local_datetime(&(midnight + Duration::minutes(15 * step)))
                .earliest()
        }),
    };
    match local {
        Some(t) => t.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&midnight),
    }
}

/// Calendar date of `ts` in the local timezone.
pub fn local_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Applied,
    #[serde(rename = "Pending Response")]
    PendingResponse,
    #[serde(rename = "Interview Scheduled")]
    InterviewScheduled,
    Rejected,
    Accepted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Applied,
        JobStatus::PendingResponse,
        JobStatus::InterviewScheduled,
        JobStatus::Rejected,
        JobStatus::Accepted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Applied => "Applied",
            JobStatus::PendingResponse => "Pending Response",
            JobStatus::InterviewScheduled => "Interview Scheduled",
            JobStatus::Rejected => "Rejected",
            JobStatus::Accepted => "Accepted",
        }
    }

    /// Following status in display order, wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|status| normalize(status.as_str()) == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown job status '{}' (expected one of: {})",
                    s,
                    Self::ALL.map(|st| st.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SkillStatus {
    #[default]
    #[serde(rename = "Yet to start")]
    YetToStart,
    Learning,
    Completed,
}

impl SkillStatus {
    pub const ALL: [SkillStatus; 3] = [
        SkillStatus::YetToStart,
        SkillStatus::Learning,
        SkillStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillStatus::YetToStart => "Yet to start",
            SkillStatus::Learning => "Learning",
            SkillStatus::Completed => "Completed",
        }
    }

    /// The following status, wrapping back to the first.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for SkillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkillStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|status| normalize(status.as_str()) == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown skill status '{}' (expected one of: {})",
                    s,
                    Self::ALL.map(|st| st.as_str()).join(", ")
                )
            })
    }
}

/// Binary payload of an attachment.
///
/// Stored as a base64 string. A plain array of byte values is also accepted
/// when reading, so buffers written by older tooling decode to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttachmentData(Vec<u8>);

impl AttachmentData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AttachmentData {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for AttachmentData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for AttachmentData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Encoded(String),
            Buffer(Vec<u8>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Encoded(text) => STANDARD
                .decode(text.as_bytes())
                .map(Self)
                .map_err(D::Error::custom),
            Raw::Buffer(bytes) => Ok(Self(bytes)),
        }
    }
}

/// A named file embedded in a job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    /// `None` for missing or unreadable payloads; the codec treats it as
    /// "no file".
    #[serde(
        default,
        deserialize_with = "lenient_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<AttachmentData>,
}

/// A payload that is neither base64 text nor a byte array reads as absent,
/// so one damaged record never hides the rest of its collection.
fn lenient_data<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<AttachmentData>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match AttachmentData::deserialize(value) {
        Ok(data) => Ok(Some(data)),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable attachment payload, treating as absent");
            Ok(None)
        }
    }
}

/// Same leniency one level up, for an attachment that is not an object with
/// a `name`.
fn lenient_attachment<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Attachment>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match Attachment::deserialize(value) {
        Ok(attachment) => Ok(Some(attachment)),
        Err(e) => {
            tracing::warn!(error = %e, "malformed attachment, treating as absent");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub position: String,
    pub company: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>, // "LinkedIn", "Referral", ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_date: Option<NaiveDate>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_round: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_attachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub cv_file: Option<Attachment>,
    #[serde(
        default,
        deserialize_with = "lenient_attachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_letter_file: Option<Attachment>,
}

impl JobRecord {
    /// A new application with a fresh id, created now.
    pub fn new(position: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            position: position.into(),
            company: company.into(),
            status: JobStatus::default(),
            method: None,
            country: None,
            hr_contact: None,
            location: None,
            job_url: None,
            remarks: None,
            applied_date: None,
            created_at: now(),
            interview_date: None,
            interview_time: None,
            interview_round: None,
            cv_file: None,
            cover_letter_file: None,
        }
    }

    /// Set the applied date; `created_at` follows it (local midnight), or
    /// becomes "now" when the date is cleared.
    pub fn set_applied_date(&mut self, date: Option<NaiveDate>) {
        self.applied_date = date;
        self.created_at = date.map(local_midnight).unwrap_or_else(now);
    }

    pub fn with_applied_date(mut self, date: NaiveDate) -> Self {
        self.set_applied_date(Some(date));
        self
    }

    /// Whether interview details are relevant for display.
    pub fn shows_interview_details(&self) -> bool {
        self.status == JobStatus::InterviewScheduled
    }
}

impl Record for JobRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecord {
    pub id: String,
    pub name: String,
    pub status: SkillStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl SkillRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            status: SkillStatus::default(),
            created_at: now(),
        }
    }
}

impl Record for SkillRecord {
    fn id(&self) -> &str {
        &self.id
    }
}
