//! In-memory backend for workflow tests

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::{
    account::{LoginRequest, LoginResponse, LoginUser, PasswordUpdateRequest},
    client::{server_message, Gateway, GatewayError},
    create::NewMemberPayload,
    edit::MemberUpdate,
    member::{Member, MemberId, MemberStatus, Ministry, Sex, VisionStatus},
    session::{Role, Session, SessionContext, SessionStore},
};

const PASSWORD: &str = "secreto";
const LEADER_ID: i64 = 39;
const LEADER_NAME: &str = "Ana López";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login,
    UpdatePassword,
    ListMinistries,
    ListMembers,
    UpdateMember(MemberId),
    CreateMember,
    DeleteMember(MemberId),
}

#[derive(Debug, Default)]
struct State {
    members: Vec<Member>,
    ministries: Vec<Ministry>,
    created: Vec<NewMemberPayload>,
    calls: Vec<Call>,
    fail_members: bool,
    fail_ministries: bool,
    fail_delete: bool,
    fail_update: Option<(u16, Option<String>)>,
    fail_create: Option<(u16, Option<String>)>,
    hang: bool,
}

#[derive(Debug)]
pub struct FakeGateway {
    state: Mutex<State>,
}

/// Route tracing output through the test harness, `RUST_LOG` filtered
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A signed-in context for `role`, backed by a temporary directory
pub fn signed_in(role: &str) -> (TempDir, SessionContext) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut context = SessionContext::new(SessionStore::new(dir.path()));
    context
        .establish(Session {
            id: LEADER_ID,
            name: LEADER_NAME.to_string(),
            role: Role::parse(role),
            token: "test-token".to_string(),
        })
        .unwrap();
    (dir, context)
}

pub fn ministries() -> Vec<Ministry> {
    vec![
        Ministry {
            id: 1,
            name: "Evangelismo".to_string(),
        },
        Ministry {
            id: 2,
            name: "Jóvenes".to_string(),
        },
    ]
}

pub fn members() -> Vec<Member> {
    let vision = BTreeMap::from([
        ("Consolidación".to_string(), VisionStatus::Completed),
        ("Encuentro".to_string(), VisionStatus::Pending),
    ]);

    vec![
        Member {
            id: 1,
            name: "José Pérez".to_string(),
            phone: "5555-1234".to_string(),
            address: "Zona 5".to_string(),
            reference: "Frente al parque".to_string(),
            sex: Sex::Male,
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 17),
            age: Some(35),
            conversion_date: NaiveDate::from_ymd_opt(2015, 1, 4),
            baptism_date: None,
            wedding_date: None,
            status: MemberStatus::Active,
            leader: LEADER_NAME.to_string(),
            subnet_leader: None,
            ministries: BTreeSet::from(["Evangelismo".to_string()]),
            vision_process: vision.clone(),
        },
        Member {
            id: 2,
            name: "María López".to_string(),
            phone: "5555-9876".to_string(),
            address: "Mixco".to_string(),
            reference: String::new(),
            sex: Sex::Female,
            birth_date: NaiveDate::from_ymd_opt(1985, 11, 2),
            age: Some(39),
            conversion_date: NaiveDate::from_ymd_opt(2010, 6, 20),
            baptism_date: NaiveDate::from_ymd_opt(2011, 3, 13),
            wedding_date: NaiveDate::from_ymd_opt(2012, 8, 1),
            status: MemberStatus::Active,
            leader: LEADER_NAME.to_string(),
            subnet_leader: Some("Pedro Ruiz".to_string()),
            ministries: BTreeSet::new(),
            vision_process: vision.clone(),
        },
        Member {
            id: 3,
            name: "Carlos Ruiz".to_string(),
            phone: String::new(),
            address: String::new(),
            reference: String::new(),
            sex: Sex::Male,
            birth_date: NaiveDate::from_ymd_opt(1978, 1, 30),
            age: Some(47),
            conversion_date: None,
            baptism_date: None,
            wedding_date: None,
            status: MemberStatus::Inactive,
            leader: LEADER_NAME.to_string(),
            subnet_leader: None,
            ministries: BTreeSet::new(),
            vision_process: vision,
        },
    ]
}

fn rejected(status: u16, body: Option<&str>) -> GatewayError {
    GatewayError::Status {
        status,
        message: body.and_then(server_message),
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                members: members(),
                ministries: ministries(),
                ..Default::default()
            }),
        }
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Call) -> bool,
    {
        self.state.lock().await.calls.iter().filter(|c| predicate(c)).count()
    }

    pub async fn created(&self) -> Vec<NewMemberPayload> {
        self.state.lock().await.created.clone()
    }

    pub async fn fail_members(&self, fail: bool) {
        self.state.lock().await.fail_members = fail;
    }

    pub async fn fail_ministries(&self, fail: bool) {
        self.state.lock().await.fail_ministries = fail;
    }

    pub async fn fail_delete(&self, fail: bool) {
        self.state.lock().await.fail_delete = fail;
    }

    pub async fn fail_update(&self, status: u16, body: Option<&str>) {
        self.state.lock().await.fail_update = Some((status, body.map(str::to_string)));
    }

    pub async fn fail_create(&self, status: u16, body: Option<&str>) {
        self.state.lock().await.fail_create = Some((status, body.map(str::to_string)));
    }

    /// Leave member writes unanswered
    pub async fn hang(&self, hang: bool) {
        self.state.lock().await.hang = hang;
    }

    async fn record(&self, call: Call) -> tokio::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().await;
        state.calls.push(call);
        state
    }

    async fn maybe_hang(&self) {
        if self.state.lock().await.hang {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, GatewayError> {
        drop(self.record(Call::Login).await);

        if request.password != PASSWORD {
            return Err(rejected(401, Some(r#"{"mensaje":"Credenciales inválidas"}"#)));
        }

        Ok(LoginResponse {
            message: Some("Login exitoso".to_string()),
            token: "test-token".to_string(),
            user: LoginUser {
                id: LEADER_ID,
                name: LEADER_NAME.to_string(),
                role: "Lider".to_string(),
            },
        })
    }

    async fn update_password(
        &self,
        _token: &str,
        request: &PasswordUpdateRequest,
    ) -> Result<(), GatewayError> {
        drop(self.record(Call::UpdatePassword).await);

        if request.password_actual != PASSWORD {
            return Err(rejected(
                400,
                Some(r#"{"mensaje":"La contraseña actual es incorrecta"}"#),
            ));
        }
        Ok(())
    }

    async fn list_ministries(&self, _token: &str) -> Result<Vec<Ministry>, GatewayError> {
        let state = self.record(Call::ListMinistries).await;
        if state.fail_ministries {
            return Err(rejected(500, None));
        }
        Ok(state.ministries.clone())
    }

    async fn list_members(&self, _token: &str) -> Result<Vec<Member>, GatewayError> {
        let state = self.record(Call::ListMembers).await;
        if state.fail_members {
            return Err(rejected(500, None));
        }
        Ok(state.members.clone())
    }

    async fn update_member(
        &self,
        _token: &str,
        id: MemberId,
        update: &MemberUpdate,
    ) -> Result<(), GatewayError> {
        drop(self.record(Call::UpdateMember(id)).await);
        self.maybe_hang().await;

        let mut state = self.state.lock().await;
        if let Some((status, body)) = state.fail_update.clone() {
            return Err(rejected(status, body.as_deref()));
        }

        let member = state
            .members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| rejected(404, Some(r#"{"error":"Miembro no encontrado"}"#)))?;

        member.name.clone_from(&update.name);
        member.phone.clone_from(&update.phone);
        member.address.clone_from(&update.address);
        member.reference.clone_from(&update.reference);
        member.birth_date = update.birth_date;
        member.sex = update.sex;
        member.status = update.status;
        member.conversion_date = update.conversion_date;
        member.baptism_date = update.baptism_date;
        member.wedding_date = update.wedding_date;
        member.ministries.clone_from(&update.ministries);
        for (step, value) in member.vision_process.iter_mut() {
            if let Some(updated) = update.vision_process.get(step) {
                *value = *updated;
            }
        }

        Ok(())
    }

    async fn create_member(
        &self,
        _token: &str,
        payload: &NewMemberPayload,
    ) -> Result<(), GatewayError> {
        drop(self.record(Call::CreateMember).await);
        self.maybe_hang().await;

        let mut state = self.state.lock().await;
        if let Some((status, body)) = state.fail_create.clone() {
            return Err(rejected(status, body.as_deref()));
        }

        let ministries = payload
            .ministry_ids
            .iter()
            .filter_map(|id| state.ministries.iter().find(|m| m.id == *id))
            .map(|m| m.name.clone())
            .collect();
        let id = state.members.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let sex = if payload.sex == "F" { Sex::Female } else { Sex::Male };

        state.members.push(Member {
            id,
            name: payload.name.clone(),
            phone: payload.phone.clone(),
            address: payload.address.clone(),
            reference: payload.reference.clone(),
            sex,
            birth_date: payload.birth_date,
            age: None,
            conversion_date: payload.conversion_date,
            baptism_date: payload.baptism_date,
            wedding_date: payload.wedding_date,
            status: MemberStatus::Active,
            leader: LEADER_NAME.to_string(),
            subnet_leader: None,
            ministries,
            vision_process: BTreeMap::new(),
        });
        state.created.push(payload.clone());

        Ok(())
    }

    async fn delete_member(&self, _token: &str, id: MemberId) -> Result<(), GatewayError> {
        drop(self.record(Call::DeleteMember(id)).await);
        self.maybe_hang().await;

        let mut state = self.state.lock().await;
        if state.fail_delete {
            return Err(rejected(500, None));
        }

        match state.members.iter_mut().find(|m| m.id == id) {
            Some(member) => {
                member.status = MemberStatus::Inactive;
                Ok(())
            }
            None => Err(rejected(404, None)),
        }
    }
}
