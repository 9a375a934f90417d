use std::{collections::BTreeSet, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    member::MemberField,
    search::normalize_text,
    storage::{JsonFile, StoreError},
};

pub type UserId = i64;

const SESSION_FILE: &str = "current_user.json";

/// Role names as the backend spells them. Matching folds case and accents,
/// so `"Lider"` and `"Líder"` are the same role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    SuperAdmin,
    Administrator,
    SubnetLeader,
    ServiceLeader,
    Leader,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match normalize_text(raw.trim()).as_str() {
            "super admin" => Self::SuperAdmin,
            "administracion" => Self::Administrator,
            "lider de subred" => Self::SubnetLeader,
            "lider de servicio" => Self::ServiceLeader,
            "lider" => Self::Leader,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SuperAdmin => "Super Admin",
            Self::Administrator => "Administración",
            Self::SubnetLeader => "Líder de Subred",
            Self::ServiceLeader => "Líder de Servicio",
            Self::Leader => "Líder",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Change phone, address and reference
    EditContact,
    /// Change every other member field
    EditRestricted,
    CreateMembers,
    DeleteMembers,
}

/// What a role may do, computed once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    granted: BTreeSet<Capability>,
    editable: Vec<MemberField>,
}

impl Capabilities {
    pub fn for_role(role: &Role) -> Self {
        let mut granted = BTreeSet::from([Capability::EditContact, Capability::DeleteMembers]);

        match role {
            Role::Administrator => {
                granted.insert(Capability::EditRestricted);
            }
            Role::Leader => {
                granted.insert(Capability::CreateMembers);
            }
            _ => {}
        }

        let editable = MemberField::ALL
            .into_iter()
            .filter(|field| {
                if field.is_contact() {
                    granted.contains(&Capability::EditContact)
                } else {
                    granted.contains(&Capability::EditRestricted)
                }
            })
            .collect();

        Self { granted, editable }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }

    /// Fields this role may mutate while editing a member
    pub fn editable_fields(&self) -> &[MemberField] {
        &self.editable
    }

    pub fn can_edit(&self, field: MemberField) -> bool {
        self.editable.contains(&field)
    }
}

/// Signed-in user as persisted on the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: UserId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "rol")]
    pub role: Role,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    file: JsonFile,
}

impl SessionStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(base_path, SESSION_FILE),
        }
    }

    pub fn load(&self) -> Option<Session> {
        self.file.load()
    }

    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.file.save(session)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.file.delete()
    }
}

/// Explicit handle on the current session, handed to every workflow.
///
/// The stored session is read once on construction; call [`refresh`] to
/// pick up changes made elsewhere and [`invalidate`] to sign out.
///
/// [`refresh`]: SessionContext::refresh
/// [`invalidate`]: SessionContext::invalidate
#[derive(Debug)]
pub struct SessionContext {
    store: SessionStore,
    current: Option<(Session, Capabilities)>,
}

impl SessionContext {
    pub fn new(store: SessionStore) -> Self {
        let mut context = Self {
            store,
            current: None,
        };
        context.refresh();
        context
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref().map(|(session, _)| session)
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.current.as_ref().map(|(_, capabilities)| capabilities)
    }

    pub fn token(&self) -> Option<&str> {
        self.current().map(|session| session.token.as_str())
    }

    /// Re-read the stored session
    pub fn refresh(&mut self) {
        self.current = self.store.load().map(with_capabilities);
    }

    /// Persist a freshly issued session and make it current
    pub fn establish(&mut self, session: Session) -> Result<(), StoreError> {
        self.store.save(&session)?;
        tracing::info!(user_id = session.id, role = %session.role, "Session established");
        self.current = Some(with_capabilities(session));
        Ok(())
    }

    /// Forget the session in memory and on disk
    pub fn invalidate(&mut self) -> Result<(), StoreError> {
        self.current = None;
        self.store.clear()
    }
}

fn with_capabilities(session: Session) -> (Session, Capabilities) {
    let capabilities = Capabilities::for_role(&session.role);
    (session, capabilities)
}
