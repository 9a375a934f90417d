use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::search::normalize_text;

pub type MemberId = i64;
pub type MinistryId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Sex {
    #[default]
    #[serde(rename = "Masculino")]
    Male,
    #[serde(rename = "Femenino")]
    Female,
}

impl<'de> Deserialize<'de> for Sex {
    /// `Femenino`, `F` and anything else starting with `f` is female;
    /// the rest, `null` included, falls back to male.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(match sex_code(&raw).as_str() {
            "F" => Self::Female,
            _ => Self::Male,
        })
    }
}

impl Sex {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Male => "Masculino",
            Self::Female => "Femenino",
        }
    }

    /// Single-character code the create endpoint expects
    pub fn code(&self) -> String {
        sex_code(self.label())
    }
}

/// First character of a sex label, uppercased: `"Femenino"` becomes `"F"`.
pub fn sex_code(label: &str) -> String {
    label
        .trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum MemberStatus {
    #[default]
    #[serde(rename = "Activo")]
    Active,
    #[serde(rename = "Inactivo")]
    Inactive,
}

impl<'de> Deserialize<'de> for MemberStatus {
    /// Only an explicit `Inactivo` marks a member inactive
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(match normalize_text(raw.trim()).as_str() {
            "inactivo" => Self::Inactive,
            _ => Self::Active,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum VisionStatus {
    #[serde(rename = "Completado")]
    Completed,
    #[default]
    #[serde(rename = "Pendiente")]
    Pending,
}

impl<'de> Deserialize<'de> for VisionStatus {
    /// A step counts as done only when it reads `Completado`
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(match normalize_text(raw.trim()).as_str() {
            "completado" => Self::Completed,
            _ => Self::Pending,
        })
    }
}

/// Member record as returned by `GET /miembros-universal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "telefono", default, deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(rename = "direccion", default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(rename = "referencia", default, deserialize_with = "null_as_default")]
    pub reference: String,
    #[serde(rename = "sexo", default)]
    pub sex: Sex,
    #[serde(rename = "fechaNacimiento", default, deserialize_with = "calendar_date")]
    pub birth_date: Option<NaiveDate>,
    /// Computed by the backend
    #[serde(rename = "edad", default)]
    pub age: Option<u32>,
    #[serde(rename = "fechaConversion", default, deserialize_with = "calendar_date")]
    pub conversion_date: Option<NaiveDate>,
    #[serde(rename = "fechaBautizo", default, deserialize_with = "calendar_date")]
    pub baptism_date: Option<NaiveDate>,
    #[serde(rename = "fechaBoda", default, deserialize_with = "calendar_date")]
    pub wedding_date: Option<NaiveDate>,
    #[serde(rename = "estado", default)]
    pub status: MemberStatus,
    #[serde(rename = "lider", default, deserialize_with = "null_as_default")]
    pub leader: String,
    #[serde(rename = "liderSubred", default)]
    pub subnet_leader: Option<String>,
    #[serde(rename = "ministerios", default, deserialize_with = "null_as_default")]
    pub ministries: BTreeSet<String>,
    #[serde(rename = "procesoVision", default, deserialize_with = "null_as_default")]
    pub vision_process: BTreeMap<String, VisionStatus>,
}

impl Member {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Ministry catalog entry, owned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ministry {
    pub id: MinistryId,
    #[serde(rename = "nombre")]
    pub name: String,
}

/// Mutable fields of a member, used by the edit gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberField {
    Name,
    Phone,
    Address,
    Reference,
    BirthDate,
    Sex,
    Status,
    ConversionDate,
    BaptismDate,
    WeddingDate,
    Ministries,
    VisionProcess,
}

impl MemberField {
    pub const ALL: [MemberField; 12] = [
        Self::Name,
        Self::Phone,
        Self::Address,
        Self::Reference,
        Self::BirthDate,
        Self::Sex,
        Self::Status,
        Self::ConversionDate,
        Self::BaptismDate,
        Self::WeddingDate,
        Self::Ministries,
        Self::VisionProcess,
    ];

    /// Contact details any signed-in role may change
    pub const CONTACT: [MemberField; 3] = [Self::Phone, Self::Address, Self::Reference];

    pub fn is_contact(&self) -> bool {
        Self::CONTACT.contains(self)
    }
}

/// Truncate a backend timestamp to its calendar date.
///
/// Accepts `2001-04-09`, `2001-04-09T06:00:00.000Z` and `2001-04-09 06:00:00`.
/// Blank input yields `None`.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn calendar_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;

    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_calendar_date(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date {value:?}"))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMBER_JSON: &str = r#"{
        "id": 12,
        "nombre": "José Pérez",
        "telefono": "5555-1234",
        "direccion": null,
        "referencia": "Frente al parque",
        "sexo": "Masculino",
        "fechaNacimiento": "1990-05-17T06:00:00.000Z",
        "edad": 35,
        "fechaConversion": "2015-01-04",
        "fechaBautizo": null,
        "fechaBoda": "",
        "estado": "Activo",
        "lider": "Ana López",
        "ministerios": ["Alabanza", "Evangelismo"],
        "procesoVision": {"Consolidación": "Completado", "Encuentro": "Pendiente"}
    }"#;

    #[test]
    fn test_member_from_backend_json() {
        let member: Member = serde_json::from_str(MEMBER_JSON).unwrap();

        assert_eq!(12, member.id);
        assert_eq!("", member.address);
        assert_eq!(NaiveDate::from_ymd_opt(1990, 5, 17), member.birth_date);
        assert_eq!(None, member.baptism_date);
        assert_eq!(None, member.wedding_date);
        assert_eq!(None, member.subnet_leader);
        assert!(member.is_active());
        assert_eq!(2, member.ministries.len());
        assert_eq!(
            Some(&VisionStatus::Completed),
            member.vision_process.get("Consolidación")
        );
    }

    #[test]
    fn test_sex_accepts_short_codes() {
        let sex: Sex = serde_json::from_str(r#""F""#).unwrap();
        assert_eq!(Sex::Female, sex);
        let sex: Sex = serde_json::from_str("null").unwrap();
        assert_eq!(Sex::Male, sex);
    }

    #[test]
    fn test_odd_record_does_not_sink_the_roster() {
        let odd = r#"{
            "id": 13,
            "nombre": "Marta Díaz",
            "sexo": null,
            "estado": "Suspendido",
            "ministerios": null,
            "procesoVision": {
                "Encuentro": "En proceso",
                "Consolidación": "completado",
                "Bautizo": null
            }
        }"#;
        let no_steps = r#"{"id": 14, "nombre": "Luis Mejía", "procesoVision": null}"#;
        let json = format!("[{MEMBER_JSON}, {odd}, {no_steps}]");

        let members: Vec<Member> = serde_json::from_str(&json).unwrap();

        assert_eq!(3, members.len());
        let marta = &members[1];
        assert!(marta.is_active());
        assert_eq!(Sex::Male, marta.sex);
        assert!(marta.ministries.is_empty());
        assert_eq!(Some(&VisionStatus::Pending), marta.vision_process.get("Encuentro"));
        assert_eq!(Some(&VisionStatus::Completed), marta.vision_process.get("Consolidación"));
        assert_eq!(Some(&VisionStatus::Pending), marta.vision_process.get("Bautizo"));
        assert!(members[2].vision_process.is_empty());
    }

    #[test]
    fn test_status_reads_inactive() {
        let status: MemberStatus = serde_json::from_str(r#""Inactivo""#).unwrap();
        assert_eq!(MemberStatus::Inactive, status);
    }

    #[test]
    fn test_sex_code() {
        assert_eq!("F", sex_code("Femenino"));
        assert_eq!("M", sex_code("masculino"));
        assert_eq!("", sex_code("  "));
        assert_eq!("F", Sex::Female.code());
    }

    #[test]
    fn test_calendar_date_drops_time_of_day() {
        assert_eq!(
            NaiveDate::from_ymd_opt(2020, 2, 29),
            parse_calendar_date("2020-02-29T23:59:59.999Z")
        );
        assert_eq!(None, parse_calendar_date("yesterday"));
    }
}
