//! Directory object models
//!
//! Field names follow Microsoft Graph. The AAD Graph backend translates its own
//! names at the wire boundary, so everything above the backends sees one shape.
//! Known fields are `Option`s: a value built for a write only carries the fields
//! that are set, which gives delta semantics on PATCH.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Directory entity collections addressed by the backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Applications,
    ServicePrincipals,
    Users,
}

impl Entity {
    /// URL path segment of the collection
    pub fn path(self) -> &'static str {
        match self {
            Entity::Applications => "applications",
            Entity::ServicePrincipals => "servicePrincipals",
            Entity::Users => "users",
        }
    }

    /// Singular human-readable name, used in diagnostics
    pub fn describe(self) -> &'static str {
        match self {
            Entity::Applications => "application",
            Entity::ServicePrincipals => "service principal",
            Entity::Users => "user",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Kind of credential held in a parent's credential collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Password,
    Certificate,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 2] = [CredentialKind::Password, CredentialKind::Certificate];

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKind::Password => "password",
            CredentialKind::Certificate => "certificate",
        }
    }

    /// Name of the collection property on the parent object
    pub fn collection_field(self) -> &'static str {
        match self {
            CredentialKind::Password => "passwordCredentials",
            CredentialKind::Certificate => "keyCredentials",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(CredentialKind::Password),
            "certificate" => Ok(CredentialKind::Certificate),
            other => Err(format!("unknown credential kind {other:?}")),
        }
    }
}

/// Open-ended properties not modelled as typed fields.
///
/// Accessors fail closed: a missing or differently-typed key reads as the
/// empty/default value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditionalProperties(Map<String, Value>);

impl AdditionalProperties {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or_default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An object stored in one of the directory collections.
pub trait DirectoryObject: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ENTITY: Entity;

    /// Backend-assigned primary key; absent on objects built for create.
    fn object_id(&self) -> Option<&str>;
}

/// An object carrying password and certificate credential collections.
pub trait CredentialHolder: DirectoryObject {
    fn password_credentials(&self) -> &[PasswordCredential];
    fn key_credentials(&self) -> &[KeyCredential];
}

/// A member of a credential collection.
pub trait Credential: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: CredentialKind;

    fn key_id(&self) -> Option<&str>;

    /// The parent's collection this credential kind lives in
    fn collection<P: CredentialHolder>(parent: &P) -> &[Self];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordCredential {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_key_identifier: Option<String>,
    /// Fields not modelled above, written back untouched
    #[serde(flatten)]
    pub additional: AdditionalProperties,
}

impl Credential for PasswordCredential {
    const KIND: CredentialKind = CredentialKind::Password;

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn collection<P: CredentialHolder>(parent: &P) -> &[Self] {
        parent.password_credentials()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCredential {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_key_identifier: Option<String>,
    #[serde(flatten)]
    pub additional: AdditionalProperties,
}

impl Credential for KeyCredential {
    const KIND: CredentialKind = CredentialKind::Certificate;

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn collection<P: CredentialHolder>(parent: &P) -> &[Self] {
        parent.key_credentials()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign_in_audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_uris: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_credentials: Option<Vec<PasswordCredential>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_credentials: Option<Vec<KeyCredential>>,
    #[serde(flatten)]
    pub additional: AdditionalProperties,
}

impl DirectoryObject for Application {
    const ENTITY: Entity = Entity::Applications;

    fn object_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl CredentialHolder for Application {
    fn password_credentials(&self) -> &[PasswordCredential] {
        self.password_credentials.as_deref().unwrap_or_default()
    }

    fn key_credentials(&self) -> &[KeyCredential] {
        self.key_credentials.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_role_assignment_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_credentials: Option<Vec<PasswordCredential>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_credentials: Option<Vec<KeyCredential>>,
    #[serde(flatten)]
    pub additional: AdditionalProperties,
}

impl DirectoryObject for ServicePrincipal {
    const ENTITY: Entity = Entity::ServicePrincipals;

    fn object_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl CredentialHolder for ServicePrincipal {
    fn password_credentials(&self) -> &[PasswordCredential] {
        self.password_credentials.as_deref().unwrap_or_default()
    }

    fn key_credentials(&self) -> &[KeyCredential] {
        self.key_credentials.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_change_password_next_sign_in: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_profile: Option<PasswordProfile>,
    #[serde(flatten)]
    pub additional: AdditionalProperties,
}

impl User {
    /// A user ready to be created. The mail nickname defaults to the local
    /// part of the UPN, matching what the portal does.
    pub fn for_create(
        user_principal_name: &str,
        display_name: &str,
        password: &str,
        force_password_change: bool,
    ) -> Self {
        let mail_nickname = user_principal_name
            .split('@')
            .next()
            .unwrap_or(user_principal_name)
            .to_string();

        Self {
            user_principal_name: Some(user_principal_name.to_string()),
            display_name: Some(display_name.to_string()),
            mail_nickname: Some(mail_nickname),
            account_enabled: Some(true),
            password_profile: Some(PasswordProfile {
                force_change_password_next_sign_in: Some(force_password_change),
                password: Some(password.to_string()),
            }),
            ..Default::default()
        }
    }

    pub fn job_title(&self) -> &str {
        self.additional.get_str("jobTitle")
    }

    pub fn department(&self) -> &str {
        self.additional.get_str("department")
    }
}

impl DirectoryObject for User {
    const ENTITY: Entity = Entity::Users;

    fn object_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delta_serialization_skips_unset_fields() {
        let delta = User {
            display_name: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&delta).unwrap(), json!({"displayName": "Renamed"}));
    }

    #[test]
    fn test_unknown_fields_land_in_additional_properties() {
        let user: User = serde_json::from_value(json!({
            "id": "u1",
            "userPrincipalName": "ada@contoso.com",
            "jobTitle": "Engineer",
            "department": 42
        }))
        .unwrap();

        assert_eq!(user.job_title(), "Engineer");
        // Wrong type reads as the default
        assert_eq!(user.department(), "");
        assert_eq!(user.additional.get_str("city"), "");
        assert!(!user.additional.get_bool("showInAddressList"));
    }

    #[test]
    fn test_for_create_defaults_mail_nickname() {
        let user = User::for_create("ada.lovelace@contoso.com", "Ada", "P@ssw0rd!", true);
        assert_eq!(user.mail_nickname.as_deref(), Some("ada.lovelace"));
        assert_eq!(
            user.password_profile
                .as_ref()
                .and_then(|p| p.force_change_password_next_sign_in),
            Some(true)
        );
    }

    #[test]
    fn test_credential_collections() {
        let app: Application = serde_json::from_value(json!({
            "id": "a1",
            "passwordCredentials": [{"keyId": "k0"}],
            "keyCredentials": [{"keyId": "c0", "type": "AsymmetricX509Cert"}]
        }))
        .unwrap();

        assert_eq!(PasswordCredential::collection(&app)[0].key_id(), Some("k0"));
        assert_eq!(
            KeyCredential::collection(&app)[0].key_type.as_deref(),
            Some("AsymmetricX509Cert")
        );

        let empty = Application::default();
        assert!(PasswordCredential::collection(&empty).is_empty());
    }

    #[test]
    fn test_credential_keeps_unmodelled_fields() {
        let wire = json!({
            "keyId": "k0",
            "customKeyIdentifier": "ZGVzYw==",
            "futureField": {"nested": true}
        });
        let cred: PasswordCredential = serde_json::from_value(wire.clone()).unwrap();

        assert_eq!(cred.custom_key_identifier.as_deref(), Some("ZGVzYw=="));
        assert_eq!(serde_json::to_value(&cred).unwrap(), wire);
    }

    #[test]
    fn test_credential_kind_parse() {
        for kind in CredentialKind::ALL {
            assert_eq!(kind.as_str().parse::<CredentialKind>().unwrap(), kind);
        }
        assert!("secret".parse::<CredentialKind>().is_err());
    }
}
