//! Member detail dialog: view, role-gated edit, save and soft delete.
//!
//! ```text
//! Closed -> Viewing -> Editing -> Saving -> Closed
//!              |          |
//!              +----------+-> ConfirmingDelete -> Deleting -> Closed
//! ```
//!
//! Opening a member snapshots its mutable fields. Field edits only land when
//! the signed-in role may change that field; everything else is silently
//! ignored. Saving sends the whole snapshot, rebuilt from the original
//! member with only the permitted fields taken from the edits.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    client::{guarded, Gateway, GatewayError},
    member::{Member, MemberField, MemberId, MemberStatus, Ministry, Sex, VisionStatus},
    roster::Roster,
    session::{Capabilities, Capability, SessionContext},
};

const UPDATE_FAILED_MESSAGE: &str = "Error al actualizar los datos";
const DELETE_FAILED_MESSAGE: &str = "Error al eliminar el miembro";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Closed,
    Viewing,
    Editing,
    Saving,
    ConfirmingDelete,
    Deleting,
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("No active session")]
    NotAuthenticated,

    #[error("Not allowed to {0}")]
    Forbidden(&'static str),

    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: EditState,
    },

    #[error("{message}")]
    Request {
        message: String,
        #[source]
        source: GatewayError,
    },
}

/// Editable copy of a member's mutable fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSnapshot {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub reference: String,
    pub birth_date: Option<NaiveDate>,
    pub sex: Sex,
    pub status: MemberStatus,
    pub conversion_date: Option<NaiveDate>,
    pub baptism_date: Option<NaiveDate>,
    pub wedding_date: Option<NaiveDate>,
    pub ministries: BTreeSet<String>,
    pub vision_process: BTreeMap<String, VisionStatus>,
}

impl EditSnapshot {
    pub fn from_member(member: &Member) -> Self {
        Self {
            name: member.name.clone(),
            phone: member.phone.clone(),
            address: member.address.clone(),
            reference: member.reference.clone(),
            birth_date: member.birth_date,
            sex: member.sex,
            status: member.status,
            conversion_date: member.conversion_date,
            baptism_date: member.baptism_date,
            wedding_date: member.wedding_date,
            ministries: member.ministries.clone(),
            vision_process: member.vision_process.clone(),
        }
    }

    /// Copy one field over from `other`
    fn take_field(&mut self, other: &EditSnapshot, field: MemberField) {
        match field {
            MemberField::Name => self.name.clone_from(&other.name),
            MemberField::Phone => self.phone.clone_from(&other.phone),
            MemberField::Address => self.address.clone_from(&other.address),
            MemberField::Reference => self.reference.clone_from(&other.reference),
            MemberField::BirthDate => self.birth_date = other.birth_date,
            MemberField::Sex => self.sex = other.sex,
            MemberField::Status => self.status = other.status,
            MemberField::ConversionDate => self.conversion_date = other.conversion_date,
            MemberField::BaptismDate => self.baptism_date = other.baptism_date,
            MemberField::WeddingDate => self.wedding_date = other.wedding_date,
            MemberField::Ministries => self.ministries.clone_from(&other.ministries),
            MemberField::VisionProcess => self.vision_process.clone_from(&other.vision_process),
        }
    }
}

/// A single scalar field change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    Name(String),
    Phone(String),
    Address(String),
    Reference(String),
    BirthDate(Option<NaiveDate>),
    Sex(Sex),
    Status(MemberStatus),
    ConversionDate(Option<NaiveDate>),
    BaptismDate(Option<NaiveDate>),
    WeddingDate(Option<NaiveDate>),
}

impl FieldEdit {
    pub fn field(&self) -> MemberField {
        match self {
            Self::Name(_) => MemberField::Name,
            Self::Phone(_) => MemberField::Phone,
            Self::Address(_) => MemberField::Address,
            Self::Reference(_) => MemberField::Reference,
            Self::BirthDate(_) => MemberField::BirthDate,
            Self::Sex(_) => MemberField::Sex,
            Self::Status(_) => MemberField::Status,
            Self::ConversionDate(_) => MemberField::ConversionDate,
            Self::BaptismDate(_) => MemberField::BaptismDate,
            Self::WeddingDate(_) => MemberField::WeddingDate,
        }
    }

    fn apply(self, snapshot: &mut EditSnapshot) {
        match self {
            Self::Name(v) => snapshot.name = v,
            Self::Phone(v) => snapshot.phone = v,
            Self::Address(v) => snapshot.address = v,
            Self::Reference(v) => snapshot.reference = v,
            Self::BirthDate(v) => snapshot.birth_date = v,
            Self::Sex(v) => snapshot.sex = v,
            Self::Status(v) => snapshot.status = v,
            Self::ConversionDate(v) => snapshot.conversion_date = v,
            Self::BaptismDate(v) => snapshot.baptism_date = v,
            Self::WeddingDate(v) => snapshot.wedding_date = v,
        }
    }
}

/// Body of `PUT /miembros-universal/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberUpdate {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "telefono")]
    pub phone: String,
    #[serde(rename = "direccion")]
    pub address: String,
    #[serde(rename = "referencia")]
    pub reference: String,
    #[serde(rename = "fechaNacimiento")]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "sexo")]
    pub sex: Sex,
    #[serde(rename = "estado")]
    pub status: MemberStatus,
    #[serde(rename = "fechaConversion")]
    pub conversion_date: Option<NaiveDate>,
    #[serde(rename = "fechaBautizo")]
    pub baptism_date: Option<NaiveDate>,
    #[serde(rename = "fechaBoda")]
    pub wedding_date: Option<NaiveDate>,
    #[serde(rename = "ministerios")]
    pub ministries: BTreeSet<String>,
    #[serde(rename = "procesoVision")]
    pub vision_process: BTreeMap<String, VisionStatus>,
}

impl MemberUpdate {
    /// Start from the member as the server sent it and take only the fields
    /// `capabilities` allows from the edited snapshot.
    pub fn gated(original: &Member, edited: &EditSnapshot, capabilities: &Capabilities) -> Self {
        let mut outgoing = EditSnapshot::from_member(original);
        for field in capabilities.editable_fields() {
            outgoing.take_field(edited, *field);
        }
        Self::from(outgoing)
    }
}

impl From<EditSnapshot> for MemberUpdate {
    fn from(snapshot: EditSnapshot) -> Self {
        Self {
            name: snapshot.name,
            phone: snapshot.phone,
            address: snapshot.address,
            reference: snapshot.reference,
            birth_date: snapshot.birth_date,
            sex: snapshot.sex,
            status: snapshot.status,
            conversion_date: snapshot.conversion_date,
            baptism_date: snapshot.baptism_date,
            wedding_date: snapshot.wedding_date,
            ministries: snapshot.ministries,
            vision_process: snapshot.vision_process,
        }
    }
}

#[derive(Debug)]
struct OpenMember {
    member: Member,
    snapshot: EditSnapshot,
    capabilities: Capabilities,
    cancel: CancellationToken,
    /// State to return to when a delete is aborted or fails
    resume: EditState,
}

/// The member detail dialog. At most one member is open at a time.
#[derive(Debug)]
pub struct EditSession {
    state: EditState,
    open: Option<OpenMember>,
    error: Option<String>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            state: EditState::Closed,
            open: None,
            error: None,
        }
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn member(&self) -> Option<&Member> {
        self.open.as_ref().map(|open| &open.member)
    }

    pub fn snapshot(&self) -> Option<&EditSnapshot> {
        self.open.as_ref().map(|open| &open.snapshot)
    }

    /// Last failure surfaced to the user, cleared by the next transition
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether `field` renders as an input right now
    pub fn is_editable(&self, field: MemberField) -> bool {
        self.state == EditState::Editing
            && self
                .open
                .as_ref()
                .is_some_and(|open| open.capabilities.can_edit(field))
    }

    /// Token tied to the open dialog; cancelled when it closes. A request
    /// cancelled through it leaves a fresh token behind for the retry.
    pub fn cancellation(&self) -> Option<CancellationToken> {
        self.open.as_ref().map(|open| open.cancel.clone())
    }

    /// Show a member's details. Whatever was open before is dropped,
    /// unsaved edits included.
    pub fn open(&mut self, member: Member, session: &SessionContext) -> Result<(), EditError> {
        let capabilities = session
            .capabilities()
            .cloned()
            .ok_or(EditError::NotAuthenticated)?;

        self.close();

        tracing::debug!(member_id = member.id, "Opening member details");
        self.open = Some(OpenMember {
            snapshot: EditSnapshot::from_member(&member),
            member,
            capabilities,
            cancel: CancellationToken::new(),
            resume: EditState::Viewing,
        });
        self.state = EditState::Viewing;

        Ok(())
    }

    /// Close the dialog, discarding the snapshot and cancelling any request
    /// still in flight.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.cancel.cancel();
        }
        self.state = EditState::Closed;
        self.error = None;
    }

    pub fn begin_edit(&mut self) -> Result<(), EditError> {
        self.expect_state("edit", &[EditState::Viewing])?;
        self.state = EditState::Editing;
        self.error = None;
        Ok(())
    }

    /// Leave edit mode, throwing away the edits
    pub fn cancel_edit(&mut self) -> Result<(), EditError> {
        self.expect_state("cancel editing", &[EditState::Editing])?;
        if let Some(open) = self.open.as_mut() {
            open.snapshot = EditSnapshot::from_member(&open.member);
        }
        self.state = EditState::Viewing;
        self.error = None;
        Ok(())
    }

    /// Apply a field change. Returns `false` and leaves the snapshot alone
    /// when not editing or when the role may not touch the field.
    pub fn apply(&mut self, edit: FieldEdit) -> bool {
        let field = edit.field();
        if !self.is_editable(field) {
            tracing::debug!(?field, "Ignoring edit to read-only field");
            return false;
        }

        let Some(open) = self.open.as_mut() else {
            return false;
        };

        // Reactivation is not possible from here
        if let FieldEdit::Status(MemberStatus::Active) = edit {
            if open.member.status == MemberStatus::Inactive {
                tracing::debug!(member_id = open.member.id, "Ignoring reactivation");
                return false;
            }
        }

        edit.apply(&mut open.snapshot);
        true
    }

    /// Add or remove a ministry. Names outside the catalog are ignored.
    pub fn toggle_ministry(&mut self, name: &str, catalog: &[Ministry]) -> bool {
        if !self.is_editable(MemberField::Ministries) || !catalog.iter().any(|m| m.name == name) {
            return false;
        }

        let Some(open) = self.open.as_mut() else {
            return false;
        };

        let ministries = &mut open.snapshot.ministries;
        if !ministries.remove(name) {
            ministries.insert(name.to_string());
        }
        true
    }

    /// Set one vision-process step. Steps are fixed by the backend, so an
    /// unknown step is ignored.
    pub fn set_vision_step(&mut self, step: &str, status: VisionStatus) -> bool {
        if !self.is_editable(MemberField::VisionProcess) {
            return false;
        }

        match self
            .open
            .as_mut()
            .and_then(|open| open.snapshot.vision_process.get_mut(step))
        {
            Some(value) => {
                *value = status;
                true
            }
            None => false,
        }
    }

    /// The body a save would send right now
    pub fn pending_update(&self) -> Option<MemberUpdate> {
        self.open
            .as_ref()
            .map(|open| MemberUpdate::gated(&open.member, &open.snapshot, &open.capabilities))
    }

    /// Send the edits. On success the dialog closes and the roster reloads;
    /// on failure it stays in edit mode with the error surfaced.
    pub async fn save(
        &mut self,
        gateway: &dyn Gateway,
        session: &SessionContext,
        roster: &Roster,
    ) -> Result<(), EditError> {
        self.expect_state("save", &[EditState::Editing])?;
        let token = session.token().ok_or(EditError::NotAuthenticated)?;
        let (Some(id), Some(update), Some(cancel)) =
            (self.member_id(), self.pending_update(), self.cancellation())
        else {
            return Err(self.invalid_state("save"));
        };

        self.state = EditState::Saving;
        self.error = None;

        match guarded(&cancel, gateway.update_member(token, id, &update)).await {
            Ok(()) => {
                tracing::info!(member_id = id, "Member updated");
                self.close();
                roster.load(gateway, session).await;
                Ok(())
            }
            Err(source) => {
                tracing::warn!(member_id = id, "Member update failed: {}", source);
                self.rearm();
                self.state = EditState::Editing;
                Err(self.surface(source, UPDATE_FAILED_MESSAGE))
            }
        }
    }

    /// First step of deleting: ask for confirmation
    pub fn request_delete(&mut self) -> Result<(), EditError> {
        self.expect_state("delete", &[EditState::Viewing, EditState::Editing])?;

        let open = self.open.as_mut().ok_or(EditError::InvalidState {
            action: "delete",
            state: self.state,
        })?;
        if !open.capabilities.has(Capability::DeleteMembers) {
            return Err(EditError::Forbidden("delete members"));
        }

        open.resume = self.state;
        self.state = EditState::ConfirmingDelete;
        Ok(())
    }

    /// Back out of the confirmation step
    pub fn abort_delete(&mut self) -> Result<(), EditError> {
        self.expect_state("abort delete", &[EditState::ConfirmingDelete])?;
        self.state = self.resume_state();
        Ok(())
    }

    /// Second step of deleting: mark the member inactive on the server.
    /// On success the dialog closes and the roster reloads; on failure the
    /// dialog returns to where it was.
    pub async fn confirm_delete(
        &mut self,
        gateway: &dyn Gateway,
        session: &SessionContext,
        roster: &Roster,
    ) -> Result<(), EditError> {
        self.expect_state("confirm delete", &[EditState::ConfirmingDelete])?;
        let token = session.token().ok_or(EditError::NotAuthenticated)?;
        let (id, cancel) = match self.open.as_ref() {
            Some(open) => (open.member.id, open.cancel.clone()),
            None => return Err(self.invalid_state("confirm delete")),
        };

        self.state = EditState::Deleting;

        match guarded(&cancel, gateway.delete_member(token, id)).await {
            Ok(()) => {
                tracing::info!(member_id = id, "Member marked inactive");
                self.close();
                roster.load(gateway, session).await;
                Ok(())
            }
            Err(source) => {
                tracing::warn!(member_id = id, "Member delete failed: {}", source);
                self.rearm();
                self.state = self.resume_state();
                Err(self.surface(source, DELETE_FAILED_MESSAGE))
            }
        }
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.member().map(|member| member.id)
    }

    /// Replace a spent token so the dialog can send again
    fn rearm(&mut self) {
        if let Some(open) = self.open.as_mut().filter(|open| open.cancel.is_cancelled()) {
            open.cancel = CancellationToken::new();
        }
    }

    fn resume_state(&self) -> EditState {
        self.open
            .as_ref()
            .map_or(EditState::Closed, |open| open.resume)
    }

    fn surface(&mut self, source: GatewayError, fallback: &str) -> EditError {
        let message = source.user_message(fallback);
        self.error = Some(message.clone());
        EditError::Request { message, source }
    }

    fn expect_state(&self, action: &'static str, allowed: &[EditState]) -> Result<(), EditError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    fn invalid_state(&self, action: &'static str) -> EditError {
        EditError::InvalidState {
            action,
            state: self.state,
        }
    }
}
