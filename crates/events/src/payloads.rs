//! Typed payloads for the most common standard events.
//!
//! The bus carries `data` as an untyped JSON object; these structs are the
//! agreed shapes publishers and subscribers of the matching [`kinds`] use.
//! Publish with [`EventPayload::to_new_event`], decode with
//! [`Event::decode_data`](crate::Event::decode_data).
//!
//! [`kinds`]: crate::kinds

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use edumyles_core::{DomainError, TenantId};

use crate::kinds;
use crate::NewEvent;

/// A payload bound to one event type.
pub trait EventPayload: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;

    /// Build a [`NewEvent`] of [`Self::EVENT_TYPE`] carrying this payload.
    fn to_new_event(
        &self,
        source: impl Into<String>,
        tenant_id: impl Into<TenantId>,
    ) -> Result<NewEvent, DomainError> {
        NewEvent::new(Self::EVENT_TYPE, source, tenant_id).with_payload(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreated {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub tenant_id: String,
}

impl EventPayload for UserCreated {
    const EVENT_TYPE: &'static str = kinds::USER_CREATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeAdded {
    pub student_id: String,
    pub subject_id: String,
    pub grade: f64,
    pub max_grade: f64,
    pub teacher_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
}

impl EventPayload for GradeAdded {
    const EVENT_TYPE: &'static str = kinds::GRADE_ADDED;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMarked {
    pub student_id: String,
    pub class_id: String,
    /// Calendar date as sent by the attendance module (`YYYY-MM-DD`).
    pub date: String,
    pub status: AttendanceStatus,
    pub marked_by: String,
}

impl EventPayload for AttendanceMarked {
    const EVENT_TYPE: &'static str = kinds::ATTENDANCE_MARKED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceived {
    pub student_id: String,
    pub amount: f64,
    pub currency: String,
    pub payment_method: String,
    pub transaction_id: String,
    pub fee_type: String,
}

impl EventPayload for PaymentReceived {
    const EVENT_TYPE: &'static str = kinds::PAYMENT_RECEIVED;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Email,
    Sms,
    Push,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSent {
    pub from_user_id: String,
    pub to_user_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub priority: MessagePriority,
}

impl EventPayload for MessageSent {
    const EVENT_TYPE: &'static str = kinds::MESSAGE_SENT;
}
