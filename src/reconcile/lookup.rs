//! Single-object lookups
//!
//! Lookups by attribute go through [`Directory::find_one`], so zero or several
//! matches are errors. The matched object's attribute is checked against the
//! requested value as well: a server that ignores the filter must not hand
//! back an unrelated object.

use super::{cancellable, Diagnostic, Outcome};
use crate::backend::directory::eq_filter;
use crate::backend::Directory;
use crate::error::{Error, Result};
use crate::models::{Application, DirectoryObject, ServicePrincipal, User};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationQuery {
    ObjectId(String),
    ApplicationId(String),
    DisplayName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServicePrincipalQuery {
    ObjectId(String),
    ApplicationId(String),
    DisplayName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserQuery {
    ObjectId(String),
    UserPrincipalName(String),
    MailNickname(String),
}

/// How a query is resolved: by primary key, or by a filtered attribute.
enum Lookup<'a, T> {
    Get(&'a str),
    Filter {
        field: &'static str,
        value: &'a str,
        matched: fn(&T) -> Option<&str>,
    },
}

fn application_app_id(a: &Application) -> Option<&str> {
    a.app_id.as_deref()
}

fn application_display_name(a: &Application) -> Option<&str> {
    a.display_name.as_deref()
}

fn service_principal_app_id(s: &ServicePrincipal) -> Option<&str> {
    s.app_id.as_deref()
}

fn service_principal_display_name(s: &ServicePrincipal) -> Option<&str> {
    s.display_name.as_deref()
}

fn user_principal_name(u: &User) -> Option<&str> {
    u.user_principal_name.as_deref()
}

fn user_mail_nickname(u: &User) -> Option<&str> {
    u.mail_nickname.as_deref()
}

async fn resolve<T: DirectoryObject>(directory: &Directory, lookup: Lookup<'_, T>) -> Result<T> {
    match lookup {
        Lookup::Get(id) => directory.get::<T>(id).await,
        Lookup::Filter {
            field,
            value,
            matched,
        } => {
            let filter = eq_filter(field, value);
            let object: T = directory.find_one(&filter).await?;
            match matched(&object) {
                Some(found) if found == value => Ok(object),
                found => Err(Error::BadResponse {
                    operation: format!("looking up {} by {field}", T::ENTITY.describe()),
                    reason: format!("asked for {value:?}, got {found:?}"),
                }),
            }
        }
    }
}

async fn run<T: DirectoryObject>(
    directory: &Directory,
    lookup: Lookup<'_, T>,
    summary: String,
    attribute: &str,
    cancel: &CancellationToken,
) -> Outcome<T> {
    cancellable(cancel, &summary, resolve(directory, lookup))
        .await
        .map_err(|e| Diagnostic::new(summary.clone(), e).at(attribute))
}

pub async fn application(
    directory: &Directory,
    query: &ApplicationQuery,
    cancel: &CancellationToken,
) -> Outcome<Application> {
    let (lookup, summary, attribute) = match query {
        ApplicationQuery::ObjectId(id) => (
            Lookup::Get(id.as_str()),
            format!("Retrieving application with object ID {id:?}"),
            "object_id",
        ),
        ApplicationQuery::ApplicationId(app_id) => (
            Lookup::Filter {
                field: "appId",
                value: app_id.as_str(),
                matched: application_app_id,
            },
            format!("Retrieving application with application ID {app_id:?}"),
            "application_id",
        ),
        ApplicationQuery::DisplayName(name) => (
            Lookup::Filter {
                field: "displayName",
                value: name.as_str(),
                matched: application_display_name,
            },
            format!("Retrieving application with display name {name:?}"),
            "display_name",
        ),
    };
    run(directory, lookup, summary, attribute, cancel).await
}

pub async fn service_principal(
    directory: &Directory,
    query: &ServicePrincipalQuery,
    cancel: &CancellationToken,
) -> Outcome<ServicePrincipal> {
    let (lookup, summary, attribute) = match query {
        ServicePrincipalQuery::ObjectId(id) => (
            Lookup::Get(id.as_str()),
            format!("Retrieving service principal with object ID {id:?}"),
            "object_id",
        ),
        ServicePrincipalQuery::ApplicationId(app_id) => (
            Lookup::Filter {
                field: "appId",
                value: app_id.as_str(),
                matched: service_principal_app_id,
            },
            format!("Retrieving service principal with application ID {app_id:?}"),
            "application_id",
        ),
        ServicePrincipalQuery::DisplayName(name) => (
            Lookup::Filter {
                field: "displayName",
                value: name.as_str(),
                matched: service_principal_display_name,
            },
            format!("Retrieving service principal with display name {name:?}"),
            "display_name",
        ),
    };
    run(directory, lookup, summary, attribute, cancel).await
}

pub async fn user(
    directory: &Directory,
    query: &UserQuery,
    cancel: &CancellationToken,
) -> Outcome<User> {
    let (lookup, summary, attribute) = match query {
        UserQuery::ObjectId(id) => (
            Lookup::Get(id.as_str()),
            format!("Retrieving user with object ID {id:?}"),
            "object_id",
        ),
        UserQuery::UserPrincipalName(upn) => (
            Lookup::Filter {
                field: "userPrincipalName",
                value: upn.as_str(),
                matched: user_principal_name,
            },
            format!("Retrieving user with UPN {upn:?}"),
            "user_principal_name",
        ),
        UserQuery::MailNickname(nickname) => (
            Lookup::Filter {
                field: "mailNickname",
                value: nickname.as_str(),
                matched: user_mail_nickname,
            },
            format!("Retrieving user with mail nickname {nickname:?}"),
            "mail_nickname",
        ),
    };
    run(directory, lookup, summary, attribute, cancel).await
}
