//! User record schema.
//!
//! Field names are the schema's snake_case names. Empty and default values
//! are omitted on output; on input unknown fields are ignored, missing or
//! `null` fields take their defaults, and lowerCamelCase spellings of the
//! field names are accepted too. Types are strict: a string where a list is
//! expected, or an identity kind outside the enumeration, fails the record.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A user entity as exchanged with the identity-provider host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Unique identifier within a file.
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub id: String,
    #[serde(
        alias = "displayName",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_default"
    )]
    pub display_name: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub email: String,
    /// Picture URL.
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub picture: String,
    /// Identity sources keyed by identity value (login name, email, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "null_default")]
    pub identities: BTreeMap<String, IdentitySource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttrSet>,
    /// Per-application attribute sets keyed by application name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "null_default")]
    pub applications: BTreeMap<String, AttrSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "is_false", deserialize_with = "null_default")]
    pub enabled: bool,
    /// Soft-delete marker. Set together with `metadata.deleted_at`.
    #[serde(skip_serializing_if = "is_false", deserialize_with = "null_default")]
    pub deleted: bool,
}

impl User {
    /// Create a user with the basic identity fields set.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    /// Soft-delete this user.
    ///
    /// # Postconditions
    /// - `deleted` is true and `metadata.deleted_at` is `at`
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted = true;
        self.metadata.get_or_insert_with(Metadata::default).deleted_at = Some(at);
    }

    /// Check that the deletion timestamp is present exactly when the user
    /// is marked deleted.
    pub fn is_consistent(&self) -> bool {
        let deleted_at = self
            .metadata
            .as_ref()
            .and_then(|m| m.deleted_at)
            .is_some();
        self.deleted == deleted_at
    }
}

/// Where an identity comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySource {
    #[serde(skip_serializing_if = "IdentityKind::is_unknown", deserialize_with = "null_default")]
    pub kind: IdentityKind,
    /// Name of the identity provider.
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub provider: String,
    #[serde(skip_serializing_if = "is_false", deserialize_with = "null_default")]
    pub verified: bool,
}

/// Free-form properties plus role and permission lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttrSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_default")]
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_default")]
    pub permissions: Vec<String>,
}

/// Lifecycle timestamps of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(alias = "createdAt", skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "updatedAt", skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(alias = "deletedAt", skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Kind of identity an identity source describes.
///
/// Written by name; read from either the name or its number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    #[default]
    Unknown,
    Pid,
    Email,
    Username,
    Dn,
    Phone,
    Empid,
}

impl IdentityKind {
    const ALL: [IdentityKind; 7] = [
        IdentityKind::Unknown,
        IdentityKind::Pid,
        IdentityKind::Email,
        IdentityKind::Username,
        IdentityKind::Dn,
        IdentityKind::Phone,
        IdentityKind::Empid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Unknown => "IDENTITY_KIND_UNKNOWN",
            IdentityKind::Pid => "IDENTITY_KIND_PID",
            IdentityKind::Email => "IDENTITY_KIND_EMAIL",
            IdentityKind::Username => "IDENTITY_KIND_USERNAME",
            IdentityKind::Dn => "IDENTITY_KIND_DN",
            IdentityKind::Phone => "IDENTITY_KIND_PHONE",
            IdentityKind::Empid => "IDENTITY_KIND_EMPID",
        }
    }

    pub fn from_number(number: i64) -> Option<Self> {
        usize::try_from(number)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == name)
    }

    fn is_unknown(&self) -> bool {
        *self == IdentityKind::Unknown
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for IdentityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IdentityKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KindVisitor;

        impl Visitor<'_> for KindVisitor {
            type Value = IdentityKind;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an IdentityKind name or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                IdentityKind::from_name(v).ok_or_else(|| {
                    E::custom(format!("invalid value for enum type IdentityKind: {v:?}"))
                })
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                IdentityKind::from_number(v).ok_or_else(|| {
                    E::custom(format!("invalid value for enum type IdentityKind: {v}"))
                })
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                let number = i64::try_from(v).map_err(|_| {
                    E::custom(format!("invalid value for enum type IdentityKind: {v}"))
                })?;
                self.visit_i64(number)
            }
        }

        deserializer.deserialize_any(KindVisitor)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// RFC 3339 timestamps in UTC with 0, 3, 6 or 9 fractional digits.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<DateTime<Utc>>::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_user() -> User {
        let created = Utc.with_ymd_and_hms(2021, 9, 14, 16, 2, 7).unwrap();
        let mut user = User::new(
            "dfdadc39-7335-404d-af66-c77cf13a15f8",
            "Euan Garden",
            "euang@contoso.com",
        );
        user.picture = "https://example.com/euan.png".to_string();
        user.identities.insert(
            "euang@contoso.com".to_string(),
            IdentitySource {
                kind: IdentityKind::Email,
                provider: "contoso".to_string(),
                verified: true,
            },
        );
        user.attributes = Some(AttrSet {
            properties: Some(
                json!({"department": "Sales", "level": 3})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
            roles: vec!["user".to_string()],
            permissions: vec![],
        });
        user.metadata = Some(Metadata {
            created_at: Some(created),
            updated_at: Some(created),
            deleted_at: None,
        });
        user.enabled = true;
        user
    }

    #[test]
    fn test_serialize_omits_defaults() {
        let user = User::new("1", "Test Name", "test@email.com");
        let value = serde_json::to_value(&user).unwrap();

        assert_eq!(
            value,
            json!({"id": "1", "display_name": "Test Name", "email": "test@email.com"})
        );
    }

    #[test]
    fn test_serialize_names_and_timestamps() {
        let value = serde_json::to_value(sample_user()).unwrap();

        assert_eq!(
            value["identities"]["euang@contoso.com"]["kind"],
            "IDENTITY_KIND_EMAIL"
        );
        assert_eq!(value["metadata"]["created_at"], "2021-09-14T16:02:07Z");
        assert!(value["metadata"].get("deleted_at").is_none());
        assert!(value.get("deleted").is_none());
        assert!(value["attributes"].get("permissions").is_none());
    }

    #[test]
    fn test_decode_ignores_unknown_and_null_fields() {
        let raw = json!({
            "id": "42",
            "displayName": "Chris Johnson [SALES]",
            "email": null,
            "favourite_colour": "teal",
            "identities": {"chrisj": {"kind": 3, "provider": "ad", "extra": 1}},
            "metadata": {"createdAt": "2021-09-14T16:02:07.120+02:00"}
        });

        let user: User = serde_json::from_value(raw).unwrap();

        assert_eq!(user.display_name, "Chris Johnson [SALES]");
        assert_eq!(user.email, "");
        assert_eq!(user.identities["chrisj"].kind, IdentityKind::Username);
        let created = user.metadata.unwrap().created_at.unwrap();
        assert_eq!(created.to_rfc3339(), "2021-09-14T14:02:07.120+00:00");
    }

    #[test]
    fn test_decode_rejects_out_of_range_kind() {
        let raw = json!({"id": "1", "identities": {"x": {"kind": 99}}});
        let err = serde_json::from_value::<User>(raw).unwrap_err();
        assert!(err
            .to_string()
            .contains("invalid value for enum type IdentityKind: 99"));

        let raw = json!({"id": "1", "identities": {"x": {"kind": "IDENTITY_KIND_FAX"}}});
        assert!(serde_json::from_value::<User>(raw).is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_types() {
        let raw = json!({"id": "1", "attributes": {"roles": "admin"}});
        assert!(serde_json::from_value::<User>(raw).is_err());

        let raw = json!({"id": 7});
        assert!(serde_json::from_value::<User>(raw).is_err());
    }

    #[test]
    fn test_mark_deleted_sets_timestamp() {
        let mut user = User::new("1", "Test Name", "test@email.com");
        assert!(user.is_consistent());

        let at = Utc.with_ymd_and_hms(2022, 1, 2, 3, 4, 5).unwrap();
        user.mark_deleted(at);

        assert!(user.deleted);
        assert_eq!(user.metadata.unwrap().deleted_at, Some(at));
        assert!(user.is_consistent());
    }

    #[test]
    fn test_mark_deleted_keeps_other_metadata() {
        let mut user = sample_user();
        let created = user.metadata.unwrap().created_at;

        user.mark_deleted(Utc::now());

        assert_eq!(user.metadata.unwrap().created_at, created);
    }

    #[test]
    fn test_identity_kind_lookup() {
        assert_eq!(IdentityKind::from_number(6), Some(IdentityKind::Empid));
        assert_eq!(IdentityKind::from_number(7), None);
        assert_eq!(IdentityKind::from_number(-1), None);
        assert_eq!(
            IdentityKind::from_name("IDENTITY_KIND_PID"),
            Some(IdentityKind::Pid)
        );
    }

    fn arb_timestamp() -> impl Strategy<Value = Option<DateTime<Utc>>> {
        proptest::option::of(
            (0i64..4_000_000_000, 0u32..1_000_000_000)
                .prop_map(|(secs, nanos)| DateTime::<Utc>::from_timestamp(secs, nanos).unwrap()),
        )
    }

    fn arb_attr_set() -> impl Strategy<Value = AttrSet> {
        let value = prop_oneof![
            "[a-z ]{0,8}".prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ];
        (
            proptest::option::of(prop::collection::btree_map("[a-z]{1,6}", value, 0..3)),
            prop::collection::vec("[a-z]{1,6}", 0..3),
            prop::collection::vec("[a-z:]{1,8}", 0..3),
        )
            .prop_map(|(properties, roles, permissions)| AttrSet {
                properties: properties.map(|p| p.into_iter().collect()),
                roles,
                permissions,
            })
    }

    fn arb_user() -> impl Strategy<Value = User> {
        let identity = (0i64..7, "[a-z]{0,6}", any::<bool>()).prop_map(|(kind, provider, verified)| {
            IdentitySource {
                kind: IdentityKind::from_number(kind).unwrap(),
                provider,
                verified,
            }
        });
        (
            ("[a-f0-9-]{0,12}", "[A-Za-z \\[\\]]{0,12}", "[a-z@.]{0,12}", "[a-z:/.]{0,12}"),
            prop::collection::btree_map("[a-z@.]{1,8}", identity, 0..3),
            proptest::option::of(arb_attr_set()),
            prop::collection::btree_map("[a-z]{1,6}", arb_attr_set(), 0..2),
            proptest::option::of((arb_timestamp(), arb_timestamp(), arb_timestamp())),
            (any::<bool>(), any::<bool>()),
        )
            .prop_map(
                |((id, display_name, email, picture), identities, attributes, applications, metadata, (enabled, deleted))| User {
                    id,
                    display_name,
                    email,
                    picture,
                    identities,
                    attributes,
                    applications,
                    metadata: metadata.map(|(created_at, updated_at, deleted_at)| Metadata {
                        created_at,
                        updated_at,
                        deleted_at,
                    }),
                    enabled,
                    deleted,
                },
            )
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(user in arb_user()) {
            let encoded = serde_json::to_vec(&user).unwrap();
            let decoded: User = serde_json::from_slice(&encoded).unwrap();
            prop_assert_eq!(decoded, user);
        }
    }
}
