//! Basic authentication backed by a Kubernetes secret.

use super::util::NamespacedName;
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser};
use crate::errors::AnnotationError;
use crate::kube::{secret_entries, secret_value};
use serde::Serialize;
use tracing::warn;

const AUTH_TYPE: &str = "auth-type";
const AUTH_REALM: &str = "auth-realm";
const AUTH_SECRET: &str = "auth-secret";
const AUTH_SECRET_TYPE: &str = "auth-secret-type";

const BASIC: &str = "basic";
const AUTH_FILE_KEY: &str = "auth";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthSecretType {
    /// htpasswd-style lines under the `auth` key
    #[default]
    AuthFile,
    /// One entry per user, value is the password hash
    AuthMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub auth_type: String,
    pub auth_realm: String,
    pub auth_secret: NamespacedName,
    pub secret_type: AuthSecretType,
    /// `user:password-hash` entries
    pub credentials: Vec<String>,
}

pub struct Auth;

impl Parser for Auth {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, ctx: &mut GlobalContext) -> ParseResult {
        if !annotations.has_asap(AUTH_TYPE) {
            return Ok(Parsed::Absent);
        }

        let auth_type = annotations.parse_string_asap(AUTH_TYPE)?;
        if auth_type != BASIC {
            return Err(AnnotationError::unsupported(AUTH_TYPE, auth_type));
        }

        let raw_secret = annotations.parse_string_asap(AUTH_SECRET)?;
        let secret_name = NamespacedName::parse(AUTH_SECRET, &raw_secret, &config.meta.namespace)?;
        // Watch before resolving so a secret created later re-triggers processing.
        ctx.watch_secret(&secret_name.namespace, &secret_name.name);

        let secret_type = match annotations.parse_string_asap(AUTH_SECRET_TYPE).as_deref() {
            Ok("auth-file") | Err(_) => AuthSecretType::AuthFile,
            Ok("auth-map") => AuthSecretType::AuthMap,
            Ok(other) => {
                warn!(secret_type = other, "unknown auth secret type, using auth-file");
                AuthSecretType::AuthFile
            }
        };

        let secret = ctx.secret(&config.meta.cluster_id, &secret_name.namespace, &secret_name.name)?;
        let credentials = match secret_type {
            AuthSecretType::AuthFile => {
                let users = secret_value(&secret, AUTH_FILE_KEY)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_default();
                users.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
            }
            AuthSecretType::AuthMap => secret_entries(&secret)
                .into_iter()
                .map(|(user, password)| format!("{user}:{}", password.trim()))
                .collect::<Vec<_>>(),
        };
        if credentials.is_empty() {
            return Err(AnnotationError::invalid_value(AUTH_SECRET, raw_secret, "secret holds no credentials"));
        }

        config.auth = Some(AuthConfig {
            auth_type,
            auth_realm: annotations.parse_string_asap(AUTH_REALM).unwrap_or_default(),
            auth_secret: secret_name,
            secret_type,
            credentials,
        });
        Ok(Parsed::Applied)
    }
}
