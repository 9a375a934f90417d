//! New member dialog

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    client::{guarded, Gateway, GatewayError},
    member::{Ministry, MinistryId, Sex},
    roster::Roster,
    session::{Capability, SessionContext, UserId},
};

pub const CREATED_MESSAGE: &str = "Miembro registrado correctamente";
pub const MISSING_REQUIRED_MESSAGE: &str = "Nombre y Fecha de Nacimiento son obligatorios";
const CREATE_FAILED_MESSAGE: &str = "Error en el servidor al crear";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateProgress {
    Idle,
    Pending,
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("No active session")]
    NotAuthenticated,

    #[error("Not allowed to create members")]
    Forbidden,

    #[error("The new member dialog is not open")]
    NotOpen,

    #[error("{}", MISSING_REQUIRED_MESSAGE)]
    MissingRequired,

    #[error("{message}")]
    Request {
        message: String,
        #[source]
        source: GatewayError,
    },
}

/// The new member form as the user fills it in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMemberDraft {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub reference: String,
    pub birth_date: Option<NaiveDate>,
    pub sex: Sex,
    pub conversion_date: Option<NaiveDate>,
    pub baptism_date: Option<NaiveDate>,
    pub wedding_date: Option<NaiveDate>,
    /// Selected by name, resolved to ids on submit
    pub ministries: BTreeSet<String>,
}

impl NewMemberDraft {
    pub fn validate(&self) -> Result<(), CreateError> {
        if self.name.trim().is_empty() || self.birth_date.is_none() {
            return Err(CreateError::MissingRequired);
        }
        Ok(())
    }

    pub fn toggle_ministry(&mut self, name: &str) {
        if !self.ministries.remove(name) {
            self.ministries.insert(name.to_string());
        }
    }
}

/// Body of `POST /miembros`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMemberPayload {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "id_lider")]
    pub leader_id: UserId,
    #[serde(rename = "telefono")]
    pub phone: String,
    #[serde(rename = "direccion")]
    pub address: String,
    #[serde(rename = "referencia")]
    pub reference: String,
    /// Single-character code, `M` or `F`
    #[serde(rename = "sexo")]
    pub sex: String,
    #[serde(rename = "fecha_nacimiento")]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "fecha_conversion")]
    pub conversion_date: Option<NaiveDate>,
    #[serde(rename = "fecha_bautizo")]
    pub baptism_date: Option<NaiveDate>,
    #[serde(rename = "fecha_boda")]
    pub wedding_date: Option<NaiveDate>,
    #[serde(rename = "ministeriosSeleccionados")]
    pub ministry_ids: Vec<MinistryId>,
}

impl NewMemberPayload {
    /// Ministry names missing from `catalog` are dropped.
    pub fn build(draft: &NewMemberDraft, leader_id: UserId, catalog: &[Ministry]) -> Self {
        let ministry_ids = draft
            .ministries
            .iter()
            .filter_map(|name| catalog.iter().find(|m| &m.name == name).map(|m| m.id))
            .collect();

        Self {
            name: draft.name.clone(),
            leader_id,
            phone: draft.phone.clone(),
            address: draft.address.clone(),
            reference: draft.reference.clone(),
            sex: draft.sex.code(),
            birth_date: draft.birth_date,
            conversion_date: draft.conversion_date,
            baptism_date: draft.baptism_date,
            wedding_date: draft.wedding_date,
            ministry_ids,
        }
    }
}

/// Drives the creation dialog and reports submit progress to watchers
#[derive(Debug)]
pub struct CreateWorkflow {
    draft: NewMemberDraft,
    open: bool,
    progress: watch::Sender<CreateProgress>,
    cancel: CancellationToken,
}

impl Default for CreateWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateWorkflow {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(CreateProgress::Idle);

        Self {
            draft: NewMemberDraft::default(),
            open: false,
            progress,
            cancel: CancellationToken::new(),
        }
    }

    /// Watch submissions go from pending to success or failure
    pub fn subscribe(&self) -> watch::Receiver<CreateProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> CreateProgress {
        self.progress.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open the dialog with an empty draft
    pub fn open_dialog(&mut self) {
        self.reset();
        self.open = true;
    }

    /// Close the dialog and drop the draft
    pub fn close_dialog(&mut self) {
        self.reset();
        self.open = false;
    }

    pub fn draft(&self) -> &NewMemberDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut NewMemberDraft {
        &mut self.draft
    }

    /// Token for the submission in flight. Cancelling it fails the submit
    /// and keeps the draft; the next submit gets a fresh token.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Submit the draft. On success the dialog closes and the roster
    /// reloads; on failure the draft is kept so the user can retry.
    pub async fn submit(
        &mut self,
        gateway: &dyn Gateway,
        session: &SessionContext,
        roster: &Roster,
    ) -> Result<(), CreateError> {
        let (leader_id, token) = match self.preflight(session) {
            Ok(user) => user,
            Err(e) => {
                self.progress.send_replace(CreateProgress::Failed(e.to_string()));
                return Err(e);
            }
        };

        let catalog = roster.ministries().await;
        let payload = NewMemberPayload::build(&self.draft, leader_id, &catalog);
        let dropped = self.draft.ministries.len().saturating_sub(payload.ministry_ids.len());
        if dropped > 0 {
            tracing::debug!(dropped, "Skipping ministries missing from the catalog");
        }

        self.progress.send_replace(CreateProgress::Pending);
        let cancel = self.cancel.clone();

        match guarded(&cancel, gateway.create_member(token, &payload)).await {
            Ok(()) => {
                tracing::info!(leader_id, "Member created");
                self.close_dialog();
                self.progress
                    .send_replace(CreateProgress::Succeeded(CREATED_MESSAGE.to_string()));
                roster.load(gateway, session).await;
                Ok(())
            }
            Err(source) => {
                tracing::warn!("Member creation failed: {}", source);
                if self.cancel.is_cancelled() {
                    self.cancel = CancellationToken::new();
                }
                let message = source.user_message(CREATE_FAILED_MESSAGE);
                self.progress
                    .send_replace(CreateProgress::Failed(message.clone()));
                Err(CreateError::Request { message, source })
            }
        }
    }

    /// Everything a submit checks before it talks to the backend
    fn preflight<'s>(
        &self,
        session: &'s SessionContext,
    ) -> Result<(UserId, &'s str), CreateError> {
        if !self.open {
            return Err(CreateError::NotOpen);
        }
        let user = session.current().ok_or(CreateError::NotAuthenticated)?;
        if !session
            .capabilities()
            .is_some_and(|c| c.has(Capability::CreateMembers))
        {
            return Err(CreateError::Forbidden);
        }
        self.draft.validate()?;

        Ok((user.id, user.token.as_str()))
    }

    fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.draft = NewMemberDraft::default();
    }
}
